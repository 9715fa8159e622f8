pub mod capture;
pub mod cli;
pub mod db;
pub mod landmarks;
pub mod settings;
pub mod source;
mod utils;

pub use capture::{CaptureController, CaptureMode, CaptureSnapshot};
pub use db::{Database, EmbeddingRecord, RecordStore};
pub use landmarks::{HandFrame, LandmarkPoint};
pub use source::LandmarkSource;

pub async fn run(cli: cli::Cli) -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("palmprint starting up...");

    cli::execute(cli).await
}

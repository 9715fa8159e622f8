use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    palmprint_lib::run(palmprint_lib::cli::Cli::parse()).await
}

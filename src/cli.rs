use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use crate::capture::{
    CaptureController, CaptureMachine, GameSession, GuidedCapture, LoopSettings, RandomSampler,
    SessionSummary,
};
use crate::db::Database;
use crate::settings::{CaptureSettings, SettingsStore};
use crate::source::{DetectorProcess, LandmarkSource, ReplaySource};

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const DATA_DIR_ENV: &str = "PALMPRINT_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "palmprint-data";

#[derive(Parser)]
#[command(name = "palmprint", about = "Palm landmark capture", version)]
pub struct Cli {
    /// Where settings.json and the embeddings database live.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Box-guided capture: move into the box, then hold still.
    Guided {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        user: Option<String>,
    },
    /// Target game: hit targets with the wrist, hold an open palm after each hit.
    Game {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        user: Option<String>,
        /// Fixed seed for target placement.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print stored embeddings as JSON, newest first.
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// Number of stored embeddings.
    Count,
    /// Remember the user id records are attributed to. Omit to clear it.
    SetUser { user_id: Option<String> },
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Hand detector executable speaking the line-delimited JSON protocol.
    #[arg(long, conflicts_with = "replay")]
    pub detector: Option<String>,
    /// Extra argument passed to the detector (repeatable).
    #[arg(long = "detector-arg", allow_hyphen_values = true)]
    pub detector_args: Vec<String>,
    /// Recorded detection log, one JSON result per line.
    #[arg(long)]
    pub replay: Option<PathBuf>,
}

pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub async fn execute(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let database = Database::new(data_dir.join("palmprint.sqlite3"))?;

    match cli.cmd {
        Command::Guided { source, user } => {
            let settings = settings_store.settings();
            let machine: Box<dyn CaptureMachine> =
                Box::new(GuidedCapture::new(settings.guided_config(), 0));
            let summary =
                capture(database, &settings, user, machine, source, false).await?;
            print_json(&summary)?;
        }
        Command::Game { source, user, seed } => {
            let settings = settings_store.settings();
            let form_factor = settings.form_factor();
            log_info!("form factor: {form_factor:?}");

            let sampler = match seed {
                Some(seed) => RandomSampler::seeded(seed),
                None => RandomSampler::new(),
            };
            let machine: Box<dyn CaptureMachine> = Box::new(GameSession::new(
                settings.game_config(form_factor),
                Box::new(sampler),
                0,
            ));
            let summary = capture(database, &settings, user, machine, source, true).await?;
            print_json(&summary)?;
        }
        Command::List { user } => {
            let records = database.list_embeddings(user.as_deref()).await?;
            print_json(&records)?;
        }
        Command::Count => {
            println!("{}", database.count_embeddings().await?);
        }
        Command::SetUser { user_id } => {
            let user_id = user_id.filter(|id| !id.trim().is_empty());
            settings_store.set_user_id(user_id.clone())?;
            match user_id {
                Some(id) => log_info!("records will be attributed to {id}"),
                None => log_info!("user id cleared"),
            }
        }
    }

    Ok(())
}

async fn capture(
    database: Database,
    settings: &CaptureSettings,
    user: Option<String>,
    machine: Box<dyn CaptureMachine>,
    source: SourceArgs,
    press_start: bool,
) -> Result<SessionSummary> {
    let loop_settings = LoopSettings {
        frame_interval: Duration::from_millis(settings.frame_interval_ms.max(1)),
        detect_timeout: Duration::from_millis(settings.detect_timeout_ms.max(1)),
        user_id: user.or_else(|| settings.user_id.clone()),
    };
    let controller = CaptureController::new(database, loop_settings);
    let options = settings.detector.clone();
    let size = settings.video_size();

    match (source.detector, source.replay) {
        (Some(program), None) => {
            let args = source.detector_args;
            run_session(&controller, machine, press_start, move || {
                DetectorProcess::spawn(&program, &args, options, size)
            })
            .await
        }
        (None, Some(path)) => {
            run_session(&controller, machine, press_start, move || {
                ReplaySource::open(&path, options, size)
            })
            .await
        }
        _ => bail!("pass exactly one of --detector or --replay"),
    }
}

async fn run_session<L, F>(
    controller: &CaptureController<Database>,
    machine: Box<dyn CaptureMachine>,
    press_start: bool,
    open_source: F,
) -> Result<SessionSummary>
where
    L: LandmarkSource,
    F: FnOnce() -> Result<L> + Send + 'static,
{
    controller.start_session(machine, open_source).await?;
    if press_start {
        controller.press_start().await?;
    }

    let stopper = controller.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info!("interrupt received, stopping capture");
            stopper.stop().await;
        }
    });

    let summary = controller.wait().await;
    interrupt.abort();
    summary
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::RecordStore;
use crate::source::LandmarkSource;

use super::loop_worker::{capture_loop, ControlCommand, LoopSettings, SessionSummary};
use super::state::{CaptureMachine, CaptureSnapshot};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

pub const STATUS_UNAVAILABLE: &str = "Camera or hand detector unavailable";

struct ActiveSession {
    commands: mpsc::UnboundedSender<ControlCommand>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<SessionSummary>>,
}

/// Owns one capture session at a time: opens the landmark source, runs the
/// frame loop, relays manual controls, and tears everything down on stop.
#[derive(Clone)]
pub struct CaptureController<S: RecordStore> {
    store: S,
    settings: LoopSettings,
    snapshot: Arc<Mutex<Option<CaptureSnapshot>>>,
    session: Arc<Mutex<Option<ActiveSession>>>,
}

impl<S: RecordStore> CaptureController<S> {
    pub fn new(store: S, settings: LoopSettings) -> Self {
        Self {
            store,
            settings,
            snapshot: Arc::new(Mutex::new(None)),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get_snapshot(&self) -> Option<CaptureSnapshot> {
        self.snapshot.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Opens the source on a blocking worker and starts the frame loop.
    ///
    /// If the source cannot be opened the session never starts and the
    /// snapshot keeps an "unavailable" status until the next attempt.
    pub async fn start_session<L, F>(
        &self,
        mut machine: Box<dyn CaptureMachine>,
        open_source: F,
    ) -> Result<()>
    where
        L: LandmarkSource,
        F: FnOnce() -> Result<L> + Send + 'static,
    {
        let mut session = self.session.lock().await;
        if session.is_some() {
            bail!("capture session already active");
        }

        let opened = tokio::task::spawn_blocking(open_source)
            .await
            .context("landmark source worker join failed")?;

        let source = match opened {
            Ok(source) => source,
            Err(err) => {
                log_error!("failed to open landmark source: {err:#}");
                machine.set_status(format!("{STATUS_UNAVAILABLE}: {err:#}"));
                *self.snapshot.lock().await = Some(machine.snapshot());
                return Err(err.context("failed to initialize landmark source"));
            }
        };

        *self.snapshot.lock().await = Some(machine.snapshot());

        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(capture_loop(
            machine,
            source,
            self.store.clone(),
            self.settings.clone(),
            self.snapshot.clone(),
            command_rx,
            cancel_token.clone(),
        ));

        *session = Some(ActiveSession {
            commands: command_tx,
            cancel_token,
            handle: Some(handle),
        });

        log_info!("capture session started");
        Ok(())
    }

    /// The manual "start" control.
    pub async fn press_start(&self) -> Result<()> {
        self.send(ControlCommand::Start).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(ControlCommand::Reset).await
    }

    async fn send(&self, command: ControlCommand) -> Result<()> {
        let session = self.session.lock().await;
        let session = session
            .as_ref()
            .ok_or_else(|| anyhow!("no active capture session"))?;
        session
            .commands
            .send(command)
            .map_err(|_| anyhow!("capture loop is no longer running"))
    }

    /// Asks the loop to stop without waiting for it.
    pub async fn stop(&self) {
        if let Some(session) = self.session.lock().await.as_ref() {
            session.cancel_token.cancel();
        }
    }

    /// Waits for the loop to finish on its own (game over, source exhausted,
    /// or a `stop` from elsewhere).
    pub async fn wait(&self) -> Result<SessionSummary> {
        let handle = {
            let mut session = self.session.lock().await;
            session
                .as_mut()
                .and_then(|active| active.handle.take())
                .ok_or_else(|| anyhow!("no capture session to wait for"))?
        };

        let summary = handle.await.context("capture loop task failed to join")?;
        self.session.lock().await.take();
        log_summary(&summary);
        Ok(summary)
    }

    /// Cancels the loop, releases the source and returns the summary.
    pub async fn end_session(&self) -> Result<SessionSummary> {
        let mut active = self
            .session
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("no active capture session to end"))?;

        active.cancel_token.cancel();
        let handle = active
            .handle
            .take()
            .ok_or_else(|| anyhow!("capture session is already being awaited"))?;

        let summary = handle.await.context("capture loop task failed to join")?;
        log_summary(&summary);
        Ok(summary)
    }
}

fn log_summary(summary: &SessionSummary) {
    log_info!(
        "{} session ended after {} ticks ({} skipped, {} saves issued)",
        summary.mode.as_str(),
        summary.ticks,
        summary.skipped_frames,
        summary.saves_requested
    );
}

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::{EmbeddingRecord, RecordStore, EMBEDDINGS_TABLE};
use crate::landmarks::HandFrame;
use crate::source::LandmarkSource;

use super::state::{CaptureMachine, CaptureMode, CaptureSnapshot, SaveRequest};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Reset,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub frame_interval: Duration,
    pub detect_timeout: Duration,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub mode: CaptureMode,
    pub ticks: u64,
    pub skipped_frames: u64,
    pub saves_requested: u64,
    pub final_snapshot: CaptureSnapshot,
}

/// A detection running on the blocking pool. The task owns the source while
/// it runs and hands it back with the result.
type InFlight<L> = JoinHandle<(L, Result<Option<HandFrame>>)>;

/// Longest teardown waits for a busy detector before leaving it to finish
/// on its own.
const RELEASE_GRACE: Duration = Duration::from_secs(2);

pub(crate) async fn capture_loop<L, S>(
    mut machine: Box<dyn CaptureMachine>,
    source: L,
    store: S,
    settings: LoopSettings,
    snapshot: Arc<Mutex<Option<CaptureSnapshot>>>,
    mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    cancel_token: CancellationToken,
) -> SessionSummary
where
    L: LandmarkSource,
    S: RecordStore,
{
    let frame_size = source.frame_size();
    let started = Instant::now();
    let mode = machine.mode();

    // At most one of these is set: the source is either idle here or lent to
    // the detection in flight.
    let mut idle: Option<L> = Some(source);
    let mut in_flight: Option<InFlight<L>> = None;

    let mut ticker = tokio::time::interval(settings.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;
    let mut skipped_frames: u64 = 0;
    let mut saves_requested: u64 = 0;
    let mut pending_saves: Vec<JoinHandle<()>> = Vec::new();
    let mut last_status = machine.snapshot().status().to_string();

    log_info!(
        "{} capture loop started ({}x{}, every {:?})",
        mode.as_str(),
        frame_size.0,
        frame_size.1,
        settings.frame_interval
    );

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
            Some(command) = commands.recv() => {
                let now_ms = elapsed_ms(started);
                match command {
                    ControlCommand::Start => machine.start(now_ms),
                    ControlCommand::Reset => machine.reset(now_ms),
                }
                publish(&snapshot, machine.snapshot(), &mut last_status).await;
            }
            _ = ticker.tick() => {
                ticks += 1;
                let now_ms = elapsed_ms(started);

                if let Some(pending) = in_flight.take() {
                    if !pending.is_finished() {
                        in_flight = Some(pending);
                        skipped_frames += 1;
                        log_warn!("detector still busy, skipping frame at {now_ms}ms");
                        continue;
                    }
                    // The late result belongs to an older frame; only the source is reclaimed.
                    match pending.await {
                        Ok((source, _stale)) => idle = Some(source),
                        Err(join_err) => {
                            log_error!("detection worker failed, ending session: {join_err}");
                            break;
                        }
                    }
                }

                let Some(mut source) = idle.take() else {
                    log_error!("landmark source lost, ending session");
                    break;
                };
                let mut detection = tokio::task::spawn_blocking(move || {
                    let result = source.detect(now_ms);
                    (source, result)
                });

                let outcome = tokio::time::timeout(settings.detect_timeout, &mut detection).await;
                let (hand, exhausted) = match outcome {
                    Ok(Ok((source, result))) => {
                        let exhausted = source.is_exhausted();
                        idle = Some(source);
                        match result {
                            Ok(hand) => (hand, exhausted),
                            Err(err) => {
                                skipped_frames += 1;
                                log_warn!("skipping frame at {now_ms}ms: {err:#}");
                                continue;
                            }
                        }
                    }
                    Ok(Err(join_err)) => {
                        skipped_frames += 1;
                        log_error!("detection worker failed, ending session: {join_err}");
                        break;
                    }
                    Err(_) => {
                        skipped_frames += 1;
                        log_warn!("detection timeout (> {:?}) at {now_ms}ms", settings.detect_timeout);
                        in_flight = Some(detection);
                        continue;
                    }
                };

                if let Some(request) = machine.tick(hand.as_ref(), frame_size, now_ms) {
                    saves_requested += 1;
                    pending_saves.retain(|handle| !handle.is_finished());
                    pending_saves.push(spawn_save(
                        store.clone(),
                        request,
                        mode,
                        settings.user_id.as_deref(),
                    ));
                }

                publish(&snapshot, machine.snapshot(), &mut last_status).await;

                if machine.is_finished() {
                    log_info!("session finished: {}", machine.snapshot().status());
                    break;
                }
                if exhausted {
                    log_info!("landmark source exhausted after {ticks} ticks");
                    break;
                }
            }
        }
    }

    release_source(idle, in_flight, settings.detect_timeout.max(RELEASE_GRACE)).await;

    // Saves already issued are allowed to land.
    for handle in pending_saves {
        if let Err(err) = handle.await {
            log_error!("embedding save task failed to join: {err}");
        }
    }

    SessionSummary {
        mode,
        ticks,
        skipped_frames,
        saves_requested,
        final_snapshot: machine.snapshot(),
    }
}

/// Drops the source, first waiting (bounded) for a detection that still
/// holds it.
async fn release_source<L: LandmarkSource>(
    idle: Option<L>,
    in_flight: Option<InFlight<L>>,
    grace: Duration,
) {
    drop(idle);
    let Some(pending) = in_flight else {
        return;
    };
    match tokio::time::timeout(grace, pending).await {
        Ok(Ok((source, _stale))) => drop(source),
        Ok(Err(join_err)) => log_error!("detection worker failed during teardown: {join_err}"),
        Err(_) => log_warn!(
            "detector did not answer within {grace:?}; it is released when the call returns"
        ),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

async fn publish(
    snapshot: &Mutex<Option<CaptureSnapshot>>,
    current: CaptureSnapshot,
    last_status: &mut String,
) {
    if current.status() != last_status.as_str() {
        log_info!("{}", current.status());
        *last_status = current.status().to_string();
    }
    *snapshot.lock().await = Some(current);
}

/// Issues the save in the background; the loop never waits on it.
fn spawn_save<S: RecordStore>(
    store: S,
    request: SaveRequest,
    mode: CaptureMode,
    user_id: Option<&str>,
) -> JoinHandle<()> {
    let frame_count = request.frame_count;
    let record = EmbeddingRecord::new(request.embedding, user_id, mode, frame_count, Utc::now());

    tokio::spawn(async move {
        let id = record.id.clone();
        let user = record.user_id.clone();
        match store.append(record).await {
            Ok(()) => log_info!(
                "saved embedding {id} for {user} to {EMBEDDINGS_TABLE} ({frame_count} frames)"
            ),
            Err(err) => log_error!("failed to save embedding {id}: {err:#}"),
        }
    })
}

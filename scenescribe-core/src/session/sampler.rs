//! The periodic capture → infer → display/caption scheduler.
//!
//! Two states: `Idle` and `Sampling`, nothing in between. One tick runs at a
//! time; the inter-tick sleep is measured from the end of one tick's work to
//! the start of the next, so a slow inference response pushes the schedule
//! out instead of overlapping requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::source::Capture;

use super::controller::SessionCore;
use super::events::SessionEvent;

/// Handle to the sampling task. `start` enters `Sampling`; `stop` cancels
/// the pending sleep immediately and returns to `Idle` — an in-flight
/// inference call completes in the background but its result is dropped.
#[derive(Default)]
pub struct SamplingLoop {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SamplingLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sampling(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub(crate) fn start(
        &mut self,
        core: Arc<Mutex<SessionCore>>,
        period: Duration,
        generation: u64,
    ) -> Result<()> {
        anyhow::ensure!(!self.is_sampling(), "Sampling already running");
        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(run_ticks(core, period, generation, stop_rx)));
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        // The task winds down on its own; any result it is still waiting on
        // is discarded by the stop flag and generation check.
        self.task = None;
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    core: Arc<Mutex<SessionCore>>,
    period: Duration,
    generation: u64,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(period_ms = period.as_millis() as u64, "Sampling started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        // Capture under the core lock; the network call runs without it.
        let work = {
            let mut core = core.lock().await;
            if core.generation != generation {
                break;
            }
            let outcome = match core.active_source_mut() {
                Some(source) => source.capture(),
                None => break,
            };
            match outcome {
                Ok(Capture::Frame(frame)) => Some((
                    core.config.instruction.clone(),
                    core.client.clone(),
                    frame,
                )),
                Ok(Capture::NotReady) => {
                    core.emit(SessionEvent::Status(
                        "Failed to capture image. Stream might not be active.".to_string(),
                    ));
                    None
                }
                Err(e) => {
                    core.emit(SessionEvent::Status(format!("Error: capture failed: {e:#}")));
                    None
                }
            }
        };

        if let Some((instruction, client, frame)) = work {
            let result = client.describe(&instruction, &frame).await;

            let mut core = core.lock().await;
            // A result arriving after stop or a source switch is dropped,
            // never displayed or appended.
            if core.generation != generation || *stop_rx.borrow() {
                break;
            }
            let text = match result {
                Ok(text) => text,
                Err(e) => e.display_message(),
            };
            core.emit(SessionEvent::Response(text.clone()));
            if let Some(source) = core.active_source_mut() {
                if let Some(clock) = source.clock() {
                    if let Some(track) = source.caption_track_mut() {
                        track.append(&text, clock);
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = stop_rx.changed() => {
                // A closed channel means the loop handle is gone; wind down.
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Sampling stopped");
}

// Live poller - re-runs the pipeline over a trailing window on a fixed interval
use crate::application::pipeline::{ArchivePipeline, PipelineOutcome, SeriesRequest};
use crate::domain::error::PipelineError;
use crate::domain::operator::Operator;
use crate::domain::time_range::TimeRange;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

pub type LiveUpdate = Result<PipelineOutcome, PipelineError>;

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub interval: Duration,
    pub window: chrono::Duration,
    pub target_width: u32,
    pub operator: Option<Operator>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            window: chrono::Duration::minutes(5),
            target_width: 1000,
            operator: None,
        }
    }
}

/// Stop handle for a running poller.
pub struct LiveHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveHandle {
    /// Cancels the timer and waits for the in-flight run, if any, to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Live poller task failed: {}", e);
        }
    }

    /// Detach the task; it is cancelled when the returned guard is dropped.
    pub fn into_drop_guard(self) -> DropGuard {
        self.cancel.drop_guard()
    }
}

pub struct LivePoller;

impl LivePoller {
    pub fn spawn(
        pipeline: Arc<ArchivePipeline>,
        pvs: Vec<String>,
        settings: LiveSettings,
    ) -> (LiveHandle, mpsc::Receiver<LiveUpdate>) {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(pvs = pvs.len(), interval_ms = settings.interval.as_millis() as u64, "Live polling started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                // an in-flight run is never interrupted by stop
                let update = match TimeRange::trailing(Utc::now(), settings.window) {
                    Ok(range) => {
                        let request = SeriesRequest {
                            pvs: pvs.clone(),
                            from: range.from(),
                            to: range.to(),
                            target_width: settings.target_width,
                            operator: settings.operator,
                        };
                        pipeline.run(&request).await
                    }
                    Err(e) => Err(e),
                };
                if tx.send(update).await.is_err() {
                    break;
                }
            }

            tracing::info!("Live polling stopped");
        });

        (LiveHandle { cancel, task }, rx)
    }
}

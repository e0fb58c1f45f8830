// Pipeline progress events and the observer seam that receives them
use crate::domain::binning::ResolvedBinning;
use crate::domain::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    BinningResolved {
        binning: ResolvedBinning,
        span_secs: i64,
    },
    BatchDispatched {
        index: usize,
        size: usize,
    },
    RequestFailed {
        pv: String,
        error: FetchError,
    },
    SeriesNormalized {
        pv: String,
        points: usize,
    },
    MatrixAssembled {
        timestamps: usize,
        columns: usize,
    },
}

pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Default observer: forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::BinningResolved { binning, span_secs } => {
                tracing::debug!(?binning, span_secs, "Resolved binning");
            }
            PipelineEvent::BatchDispatched { index, size } => {
                tracing::debug!(batch = index, size, "Dispatching archive batch");
            }
            PipelineEvent::RequestFailed { pv, error } => {
                tracing::warn!(pv = %pv, error = %error, "Archive request failed");
            }
            PipelineEvent::SeriesNormalized { pv, points } => {
                tracing::debug!(pv = %pv, points, "Normalized series");
            }
            PipelineEvent::MatrixAssembled { timestamps, columns } => {
                tracing::debug!(timestamps, columns, "Assembled series matrix");
            }
        }
    }
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<PipelineEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn batches(&self) -> Vec<(usize, usize)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    PipelineEvent::BatchDispatched { index, size } => Some((index, size)),
                    _ => None,
                })
                .collect()
        }
    }

    impl PipelineObserver for RecordingObserver {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

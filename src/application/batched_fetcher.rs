// Batched fetcher - bounded concurrency with per-request deadlines
use crate::application::archive_client::{ArchiveClient, ArchiveRequest, RawResponse};
use crate::application::observer::{PipelineEvent, PipelineObserver};
use crate::domain::error::FetchError;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Clones share one permit pool, so `batch_size` caps in-flight archive
/// requests across every caller, not just within one `fetch_all`.
#[derive(Clone)]
pub struct BatchedFetcher {
    client: Arc<dyn ArchiveClient>,
    batch_size: usize,
    permits: Arc<Semaphore>,
}

impl BatchedFetcher {
    pub fn new(client: Arc<dyn ArchiveClient>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            client,
            batch_size,
            permits: Arc::new(Semaphore::new(batch_size)),
        }
    }

    /// One result per request, in request order. Each batch settles completely
    /// before the next is dispatched.
    pub async fn fetch_all(
        &self,
        requests: &[ArchiveRequest],
        timeout: Duration,
        observer: &dyn PipelineObserver,
    ) -> Vec<Result<RawResponse, FetchError>> {
        let mut results = Vec::with_capacity(requests.len());

        for (index, batch) in requests.chunks(self.batch_size).enumerate() {
            observer.on_event(&PipelineEvent::BatchDispatched {
                index,
                size: batch.len(),
            });

            let settled = join_all(batch.iter().map(|request| self.fetch_one(request, timeout))).await;
            results.extend(settled);
        }

        results
    }

    /// The deadline starts once a permit is held; queueing behind other
    /// callers does not count against it.
    async fn fetch_one(
        &self,
        request: &ArchiveRequest,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError> {
        let _permit = self.permits.acquire().await.map_err(|e| FetchError::Transport {
            message: format!("fetcher shut down: {}", e),
        })?;

        match tokio::time::timeout(timeout, self.client.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(pv = %request.label, timeout_ms = timeout.as_millis() as u64, "Archive request timed out");
                Err(FetchError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

// Scriptable in-memory archive client for pipeline tests
use crate::application::archive_client::{ArchiveClient, ArchiveRequest, RawResponse};
use crate::domain::error::FetchError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct FakeArchiveClient {
    delays: HashMap<String, Duration>,
    failures: HashMap<String, FetchError>,
    bodies: HashMap<String, RawResponse>,
    dispatched: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<String>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeArchiveClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, label: &str, delay: Duration) -> Self {
        self.delays.insert(label.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, label: &str, error: FetchError) -> Self {
        self.failures.insert(label.to_string(), error);
        self
    }

    pub fn with_body(mut self, label: &str, body: RawResponse) -> Self {
        self.bodies.insert(label.to_string(), body);
        self
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Default body: one raw sample at `secs = 1` valued 1.0.
    pub fn single_sample_body(label: &str) -> RawResponse {
        json!([{
            "meta": { "name": label, "EGU": "mA" },
            "data": [{ "secs": 1, "nanos": 0, "val": 1.0 }]
        }])
    }
}

#[async_trait]
impl ArchiveClient for FakeArchiveClient {
    async fn execute(&self, request: &ArchiveRequest) -> Result<RawResponse, FetchError> {
        let label = request.label.clone();
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.log.lock().unwrap().push(format!("start:{}", label));

        if let Some(delay) = self.delays.get(&label) {
            tokio::time::sleep(*delay).await;
        }
        self.log.lock().unwrap().push(format!("end:{}", label));

        if let Some(error) = self.failures.get(&label) {
            return Err(error.clone());
        }
        Ok(self
            .bodies
            .get(&label)
            .cloned()
            .unwrap_or_else(|| Self::single_sample_body(&label)))
    }
}

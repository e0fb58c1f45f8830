// Archive client port - executes built requests against the archive
use crate::domain::error::FetchError;
use async_trait::async_trait;

/// Parsed JSON body of a successful archive response.
pub type RawResponse = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// What the request is for: the PV name, or the PV list of a point-in-time lookup.
    pub label: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// One attempt, no retries. Timeouts are enforced by the caller.
    async fn execute(&self, request: &ArchiveRequest) -> Result<RawResponse, FetchError>;
}

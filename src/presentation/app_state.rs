// Application state for HTTP handlers
use crate::application::pipeline::ArchivePipeline;
use crate::infrastructure::config::{LiveConfig, TargetPoints};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ArchivePipeline>,
    pub target_points: TargetPoints,
    pub live: LiveConfig,
}

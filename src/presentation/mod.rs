// Presentation layer - HTTP surface over the pipeline
pub mod app_state;
pub mod handlers;
pub mod routes;

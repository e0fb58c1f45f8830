// Application layer - Retrieval pipeline use cases
pub mod archive_client;
pub mod assembler;
pub mod batched_fetcher;
pub mod live_poller;
pub mod normalizer;
pub mod observer;
pub mod pipeline;
pub mod request_builder;

#[cfg(test)]
pub mod test_support;

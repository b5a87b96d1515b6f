//! navsync core: domain types, date codec, upstream sources, watermark store, sink.
//!
//! This crate holds everything a single worker touches:
//! - Domain types (tasks, payloads, catalog entries, reconciled batches, chunks)
//! - `DD-MM-YYYY` date codec and the injectable clock
//! - The `NavSource` / `EnrichmentSource` capabilities and their HTTP clients
//! - The JSON watermark store with merge-update and fallback dumps
//! - The `Sink` capability and its Parquet implementation
//!
//! Orchestration (pool, reconciler, committer, flows) lives in `navsync-runner`.

pub mod data;
pub mod dates;
pub mod domain;

pub use dates::{Clock, DateError, FixedClock, SystemClock};
pub use domain::{
    Batch, CatalogEntry, Chunk, ChunkId, EnrichTask, NavRecord, Payload, RawRecord,
    SchemeMeta, SubjectId, Task,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Everything handed to a pool worker crosses a thread boundary.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Task>();
        require_sync::<Task>();
        require_send::<EnrichTask>();
        require_sync::<EnrichTask>();
        require_send::<Payload>();
        require_sync::<Payload>();
        require_send::<Batch>();
        require_sync::<Batch>();
        require_send::<Chunk>();
        require_sync::<Chunk>();
        require_send::<data::provider::TaskError>();
        require_sync::<data::provider::TaskError>();
        require_send::<data::parquet_sink::ParquetSink>();
        require_sync::<data::parquet_sink::ParquetSink>();
        require_send::<data::mfapi::MfApiClient>();
        require_sync::<data::mfapi::MfApiClient>();
    }
}

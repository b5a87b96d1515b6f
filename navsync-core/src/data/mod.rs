pub mod enrichment;
pub mod http;
pub mod mfapi;
pub mod parquet_sink;
pub mod provider;
pub mod sink;
pub mod watermark;

pub use enrichment::EnrichmentClient;
pub use http::{HttpFetcher, HttpSettings};
pub use mfapi::MfApiClient;
pub use parquet_sink::ParquetSink;
pub use provider::{EnrichmentRecord, EnrichmentSource, ErrorKind, NavSource, TaskError};
pub use sink::{NavRow, Sink, SinkError};
pub use watermark::{Watermark, WatermarkError, WatermarkStore};

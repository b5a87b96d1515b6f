//! Domain types for navsync

pub mod catalog;
pub mod ids;
pub mod payload;
pub mod task;

pub use catalog::{CatalogEntry, IsinKind};
pub use ids::ChunkId;
pub use payload::{Batch, Chunk, NavRecord, Payload, RawRecord, SchemeMeta};
pub use task::{EnrichTask, Task};

/// Subject (instrument) identifier, e.g. a scheme code.
pub type SubjectId = String;

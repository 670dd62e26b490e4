//! Checkpoint storage for trained spherix tables.

pub mod snapshot;

pub use snapshot::{EmbeddingSnapshot, SnapshotDescription, SnapshotManager};

//! Task module - chunks, tasks and the persisted snapshot.
//!
//! - A [`Chunk`] is produced fresh by every segmentation pass and carries no history.
//! - A [`Task`] is a chunk enriched with persisted history, addressed by its
//!   content fingerprint rather than by its position.
//! - A [`Snapshot`] is the full task set for one document and the only durable
//!   state the orchestrator relies on across runs.

mod fingerprint;
pub mod task;

pub use fingerprint::fingerprint;
pub use task::{
    AssetMap, Chunk, ChunkKind, Snapshot, StatusCounts, Task, TaskError, TaskId, TaskStatus,
};

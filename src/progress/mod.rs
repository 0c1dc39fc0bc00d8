//! Progress channel.
//!
//! Observers never talk to the engine. They watch the snapshot file: whenever
//! its modification time or size changes the snapshot is re-read and pushed,
//! and once every task has succeeded a final `Done` is sent and the stream
//! ends. Reads that fail (a half-visible file, a concurrent rename) are
//! skipped and retried on the next tick.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Serialize;

use crate::store::{SnapshotStore, SnapshotVersion};
use crate::task::{Snapshot, StatusCounts, Task};

/// Full task list plus counts, as sent to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub tasks: Vec<Task>,
    pub counts: StatusCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Snapshot> for ProgressUpdate {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            counts: snapshot.counts(),
            updated_at: snapshot.updated_at,
            tasks: snapshot.tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    Snapshot(ProgressUpdate),
    /// Every task succeeded. Always the last event.
    Done(StatusCounts),
}

impl ProgressEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Done(_) => "done",
        }
    }
}

/// Shortest polling period; a zero interval is raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Watch `store`, polling every `interval`.
///
/// The stream is infinite until completion; dropping it stops the polling.
pub fn watch(store: SnapshotStore, interval: Duration) -> impl Stream<Item = ProgressEvent> {
    let interval = interval.max(MIN_POLL_INTERVAL);
    async_stream::stream! {
        let mut last_seen: Option<SnapshotVersion> = None;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(version) = store.version().await else {
                continue;
            };
            if last_seen == Some(version) {
                continue;
            }

            let snapshot = match store.load().await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!("Skipping unreadable snapshot: {}", e);
                    continue;
                }
            };
            last_seen = Some(version);

            let complete = snapshot.is_complete();
            let update = ProgressUpdate::from(snapshot);
            let counts = update.counts;
            yield ProgressEvent::Snapshot(update);

            if complete {
                yield ProgressEvent::Done(counts);
                break;
            }
        }
    }
}

//! Fingerprint merge of fresh chunks against the previous snapshot.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::segment::Segmentation;
use crate::task::{Snapshot, Task, TaskStatus};

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Tasks whose history was carried over by fingerprint.
    pub adopted: usize,
    /// Tasks created fresh (fingerprint miss).
    pub created: usize,
    /// Adopted tasks reset to pending (interrupted or failed last time).
    pub reset: usize,
    /// Old tasks with no counterpart in the fresh segmentation.
    pub dropped: usize,
}

/// Merge a fresh segmentation into the history held by `previous`.
///
/// The result follows fresh chunk order. A chunk whose fingerprint matches an
/// old task adopts that task's status, translation, hint and previous
/// translation; only `id` and `type` come from the fresh chunk.
pub fn merge(segmentation: Segmentation, previous: &Snapshot) -> (Snapshot, MergeReport) {
    let mut index: HashMap<&str, &Task> = HashMap::with_capacity(previous.tasks.len());
    for task in &previous.tasks {
        index.entry(task.fingerprint.as_str()).or_insert(task);
    }

    let mut report = MergeReport::default();
    let mut matched: HashSet<&str> = HashSet::new();
    let mut tasks = Vec::with_capacity(segmentation.chunks.len());

    for chunk in &segmentation.chunks {
        let mut task = Task::from_chunk(chunk);

        if let Some(old) = index.get(task.fingerprint.as_str()) {
            if old.kind != chunk.kind {
                tracing::warn!(
                    task_id = chunk.index,
                    old_type = %old.kind,
                    new_type = %chunk.kind,
                    "Chunk type changed for identical text, keeping previous translation"
                );
            }
            matched.insert(old.fingerprint.as_str());

            task.status = old.status;
            task.translated_text = old.translated_text.clone();
            task.user_hint = old.user_hint.clone();
            task.previous_translation = old.previous_translation.clone();

            if matches!(task.status, TaskStatus::Processing | TaskStatus::Failed) {
                task.status = TaskStatus::Pending;
                report.reset += 1;
            }
            report.adopted += 1;
        } else {
            report.created += 1;
        }

        tasks.push(task);
    }

    report.dropped = previous
        .tasks
        .iter()
        .filter(|t| !matched.contains(t.fingerprint.as_str()))
        .count();

    let snapshot = Snapshot {
        tasks,
        references: segmentation.references,
        asset_map: segmentation.asset_map,
        updated_at: None,
    };
    (snapshot, report)
}

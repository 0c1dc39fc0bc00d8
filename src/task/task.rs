//! Core data model: chunks, tasks, statuses and the snapshot record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fingerprint::fingerprint;

/// Position of a task in the document. Reassigned on every merge.
pub type TaskId = usize;

/// Task id → resource ids that must be rendered next to that task.
pub type AssetMap = BTreeMap<TaskId, Vec<String>>;

/// Kind of content unit. Selects the first-pass prompt strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Document metadata field (title, authors, abstract)
    Meta,
    /// Section header
    Header,
    /// Running body text
    Body,
    /// Trailing block of resource captions and descriptions
    AssetBlock,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Header => "header",
            Self::Body => "body",
            Self::AssetBlock => "asset_block",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, typed unit of source text produced by segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub text: String,
    /// Position in reading order.
    pub index: usize,
}

/// Translation state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task {id} has no translation to correct (status: {status})")]
    NotTranslated { id: TaskId, status: TaskStatus },

    #[error("Correction hint must not be empty")]
    EmptyHint,
}

/// The persisted, addressable unit of translation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// Identity key across runs, derived from `source_text` only.
    pub fingerprint: String,
    pub status: TaskStatus,
    pub source_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_hint: Option<String>,
    /// Translation superseded by the latest correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_translation: Option<String>,
}

impl Task {
    /// Create a fresh pending task for a chunk with no history.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.index,
            kind: chunk.kind,
            fingerprint: fingerprint(&chunk.text),
            status: TaskStatus::Pending,
            source_text: chunk.text.clone(),
            translated_text: String::new(),
            user_hint: None,
            previous_translation: None,
        }
    }

    /// A task is a correction when it carries both a hint and the translation it supersedes.
    pub fn is_correction(&self) -> bool {
        let has_hint = self
            .user_hint
            .as_deref()
            .map_or(false, |h| !h.trim().is_empty());
        let has_previous = self
            .previous_translation
            .as_deref()
            .map_or(false, |p| !p.trim().is_empty());
        has_hint && has_previous
    }

    /// Archive the current translation and queue the task for re-translation.
    pub fn request_correction(&mut self, hint: &str) -> Result<(), TaskError> {
        let hint = hint.trim();
        if hint.is_empty() {
            return Err(TaskError::EmptyHint);
        }
        if self.status != TaskStatus::Success || self.translated_text.trim().is_empty() {
            return Err(TaskError::NotTranslated {
                id: self.id,
                status: self.status,
            });
        }

        self.previous_translation = Some(std::mem::take(&mut self.translated_text));
        self.user_hint = Some(hint.to_string());
        self.status = TaskStatus::Pending;
        Ok(())
    }
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.success + self.failed
    }
}

/// Full persisted task set for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    /// Bibliography text passed through untranslated.
    #[serde(default)]
    pub references: String,
    #[serde(default)]
    pub asset_map: AssetMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Success => counts.success += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// True when every task has reached `success`.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Success)
    }

    /// Reset tasks left `processing` by an interrupted run. Returns how many were reset.
    pub fn heal_interrupted(&mut self) -> usize {
        let mut healed = 0;
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Processing)
        {
            task.status = TaskStatus::Pending;
            healed += 1;
        }
        healed
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}

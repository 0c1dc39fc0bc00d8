//! Control surface over documents: start, cancel, correct, observe.
//!
//! Each document owns a snapshot in `llm_dir` and an extracted stream in
//! `extract_dir`. At most one run per document is active at a time; a run
//! lives on its own tokio task and drops out of the registry when it ends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{prompts, ExecutionEngine, RunContext, RunRegistry};
use crate::llm::LlmClient;
use crate::progress::{self, ProgressEvent};
use crate::segment::segment;
use crate::store::{merge, MergeReport, SnapshotStore, StoreError};
use crate::task::{ChunkKind, Snapshot, StatusCounts, Task, TaskError, TaskId};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("A translation run is already active for '{0}'")]
    AlreadyRunning(String),

    #[error("No extracted text for '{document}' (expected {path})")]
    NotExtracted { document: String, path: PathBuf },

    #[error("No translation state for '{0}' yet")]
    NoSnapshot(String),

    #[error("Task {task_id} not found in '{document}'")]
    TaskNotFound { document: String, task_id: TaskId },

    #[error("Invalid correction: {0}")]
    InvalidCorrection(#[from] TaskError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Returned by [`Orchestrator::start_run`] once the task set is merged and checkpointed.
#[derive(Debug, Clone, Serialize)]
pub struct RunStarted {
    pub document_id: String,
    pub run_id: Uuid,
    pub counts: StatusCounts,
    pub merge: MergeReport,
}

/// Turn an arbitrary file name into a document id.
///
/// `papers/My Paper (v2).pdf` becomes `My_Paper_(v2)`.
pub fn sanitize_document_id(raw: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let stem = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    };
    let cleaned: String = stem
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let trimmed = joined.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Assemble the translated document from a snapshot, in task order.
pub fn assemble_translation(snapshot: &Snapshot) -> String {
    let mut tasks: Vec<&Task> = snapshot.tasks.iter().collect();
    tasks.sort_by_key(|t| t.id);

    let mut parts: Vec<String> = tasks
        .into_iter()
        .map(|t| match t.kind {
            ChunkKind::Header => format!("## {}", t.translated_text.trim()),
            _ => t.translated_text.trim().to_string(),
        })
        .filter(|p| !p.is_empty())
        .collect();

    if !snapshot.references.trim().is_empty() {
        parts.push(format!("## References\n\n{}", snapshot.references.trim()));
    }
    let mut out = parts.join("\n\n");
    out.push('\n');
    out
}

pub struct Orchestrator {
    config: Config,
    llm: Arc<dyn LlmClient>,
    runs: Arc<RunRegistry>,
}

impl Orchestrator {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            llm,
            runs: Arc::new(RunRegistry::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self, document_id: &str) -> SnapshotStore {
        SnapshotStore::for_document(&self.config.llm_dir, document_id)
    }

    fn context_path(&self, document_id: &str) -> PathBuf {
        self.config
            .extract_dir
            .join(format!("{}_context.txt", document_id))
    }

    fn labels_path(&self, document_id: &str) -> PathBuf {
        self.config
            .extract_dir
            .join(format!("{}_assets.json", document_id))
    }

    fn result_path(&self, document_id: &str) -> PathBuf {
        self.config
            .llm_dir
            .join(format!("{}_llm_result.txt", document_id))
    }

    pub async fn is_running(&self, document: &str) -> bool {
        self.runs
            .is_active(&sanitize_document_id(document))
            .await
    }

    /// Segment, merge against history, checkpoint, then run in the background.
    pub async fn start_run(&self, document: &str) -> OrchestratorResult<RunStarted> {
        let document_id = sanitize_document_id(document);
        let ctx = RunContext::new(&document_id);
        if !self.runs.try_register(&ctx).await {
            return Err(OrchestratorError::AlreadyRunning(document_id));
        }

        let prepared = self.prepare(&document_id).await;
        let (mut snapshot, report) = match prepared {
            Ok(p) => p,
            Err(e) => {
                self.runs.finish(&ctx).await;
                return Err(e);
            }
        };

        let started = RunStarted {
            document_id: document_id.clone(),
            run_id: ctx.run_id,
            counts: snapshot.counts(),
            merge: report,
        };

        let labels = self.load_labels(&document_id).await;
        let engine = ExecutionEngine::new(
            Arc::clone(&self.llm),
            self.config.fast_profile.clone(),
            self.config.strong_profile.clone(),
            self.config.retry,
        )
        .with_labels(labels);
        let store = self.store(&document_id);
        let result_path = self.result_path(&document_id);
        let runs = Arc::clone(&self.runs);
        let run_ctx = ctx.clone();

        let worker = tokio::spawn(async move {
            let ctx = run_ctx;
            match engine.run(&ctx, &store, &mut snapshot).await {
                Ok(_) if snapshot.is_complete() => {
                    if let Err(e) = write_result(&result_path, &snapshot).await {
                        tracing::error!(
                            document = %ctx.document_id,
                            "Failed to write assembled translation: {}",
                            e
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        document = %ctx.document_id,
                        run_id = %ctx.run_id,
                        "Run aborted: {}",
                        e
                    );
                }
            }
        });

        // The slot is released even when the worker panics.
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                tracing::error!(
                    document = %ctx.document_id,
                    run_id = %ctx.run_id,
                    "Run task failed: {}",
                    e
                );
            }
            runs.finish(&ctx).await;
        });

        Ok(started)
    }

    async fn prepare(&self, document_id: &str) -> OrchestratorResult<(Snapshot, MergeReport)> {
        let stream = self.read_stream(document_id).await?;
        let segmentation = segment(&stream, &self.config.segmenter);

        let store = self.store(document_id);
        let previous = store.load_or_default().await;
        let (mut snapshot, report) = merge(segmentation, &previous);
        tracing::info!(
            document = %document_id,
            tasks = snapshot.tasks.len(),
            adopted = report.adopted,
            created = report.created,
            reset = report.reset,
            dropped = report.dropped,
            "Merged task set"
        );

        store.save(&mut snapshot).await?;
        Ok((snapshot, report))
    }

    async fn read_stream(&self, document_id: &str) -> OrchestratorResult<String> {
        let path = self.context_path(document_id);
        match fs::read_to_string(&path).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OrchestratorError::NotExtracted {
                    document: document_id.to_string(),
                    path,
                })
            }
            Err(source) => Err(OrchestratorError::Io { path, source }),
        }
    }

    async fn load_labels(&self, document_id: &str) -> BTreeMap<String, String> {
        let path = self.labels_path(document_id);
        let Ok(contents) = fs::read_to_string(&path).await else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&contents) {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable label table: {}", e);
                BTreeMap::new()
            }
        }
    }

    /// Signal the active run of `document`. False when nothing was running.
    pub async fn request_cancel(&self, document: &str) -> bool {
        let document_id = sanitize_document_id(document);
        let signalled = self.runs.cancel(&document_id).await;
        if signalled {
            tracing::info!(document = %document_id, "Cancellation requested");
        }
        signalled
    }

    /// Signal every active run.
    pub async fn cancel_all(&self) -> usize {
        self.runs.cancel_all().await
    }

    /// Documents with an active run.
    pub async fn active_runs(&self) -> Vec<String> {
        self.runs.active_documents().await
    }

    /// Queue a translated task for correction with a user hint.
    ///
    /// The task becomes pending again; the next run retranslates it with the
    /// correction prompt.
    pub async fn submit_correction(
        &self,
        document: &str,
        task_id: TaskId,
        hint: &str,
    ) -> OrchestratorResult<Task> {
        let document_id = sanitize_document_id(document);
        // Hold the document slot so no run starts while the snapshot is rewritten.
        let ctx = RunContext::new(&document_id);
        if !self.runs.try_register(&ctx).await {
            return Err(OrchestratorError::AlreadyRunning(document_id));
        }
        let result = self.apply_correction(&document_id, task_id, hint).await;
        self.runs.finish(&ctx).await;
        result
    }

    async fn apply_correction(
        &self,
        document_id: &str,
        task_id: TaskId,
        hint: &str,
    ) -> OrchestratorResult<Task> {
        let store = self.store(document_id);
        let mut snapshot = store
            .load()
            .await?
            .ok_or_else(|| OrchestratorError::NoSnapshot(document_id.to_string()))?;

        let task = snapshot
            .task_mut(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound {
                document: document_id.to_string(),
                task_id,
            })?;
        task.request_correction(hint)?;
        let updated = task.clone();

        store.save(&mut snapshot).await?;
        tracing::info!(document = %document_id, task_id, "Correction queued");
        Ok(updated)
    }

    /// Snapshot updates for `document` until it is complete.
    pub fn subscribe_progress(&self, document: &str) -> impl Stream<Item = ProgressEvent> {
        let document_id = sanitize_document_id(document);
        progress::watch(self.store(&document_id), self.config.progress_poll)
    }

    /// Persisted tasks, or an unsaved preview when only the extracted stream exists.
    pub async fn tasks(&self, document: &str) -> OrchestratorResult<Vec<Task>> {
        let document_id = sanitize_document_id(document);
        if let Some(snapshot) = self.store(&document_id).load().await? {
            return Ok(snapshot.tasks);
        }

        let stream = self.read_stream(&document_id).await?;
        let segmentation = segment(&stream, &self.config.segmenter);
        let (preview, _) = merge(segmentation, &Snapshot::default());
        Ok(preview.tasks)
    }

    /// System prompt of every strategy, keyed by strategy name.
    pub fn prompts(&self) -> BTreeMap<&'static str, &'static str> {
        prompts::catalog()
    }
}

async fn write_result(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("txt.tmp");
    fs::write(&tmp, assemble_translation(snapshot)).await?;
    fs::rename(&tmp, path).await?;
    tracing::info!(path = %path.display(), "Wrote assembled translation");
    Ok(())
}

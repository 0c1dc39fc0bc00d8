//! Execution engine.
//!
//! Drives every pending task of a snapshot through the generation provider,
//! in ascending id order, one at a time. The snapshot is checkpointed on each
//! status change so an observer (or a restart) always sees where the run is.
//!
//! Per task:
//! 1. stop if the run was cancelled (nothing is left `processing`)
//! 2. mark `processing`, checkpoint
//! 3. pick the prompt strategy: correction when the task carries one,
//!    otherwise the first-pass prompt for its kind
//! 4. call the provider with bounded retries
//! 5. record `success` with the cleaned text, or `failed`; checkpoint
//!
//! A task failure never aborts the run.

mod context;
pub mod prompts;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::segment::markers::has_translatable_text;
use crate::store::{SnapshotStore, StoreResult};
use crate::task::{Snapshot, Task, TaskStatus};

pub use context::{RunContext, RunRegistry};
use prompts::AssetTable;

/// Model identifier plus sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: f64,
}

impl ModelProfile {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }

    fn options(&self) -> ChatOptions {
        ChatOptions {
            temperature: Some(self.temperature),
            max_tokens: None,
        }
    }
}

/// How often a failing provider call is tried, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per task, at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks still pending when the run stopped.
    pub skipped_pending: usize,
    pub provider_calls: usize,
    /// Tasks found `processing` at start and reset to pending.
    pub healed: usize,
    pub cancelled: bool,
}

pub struct ExecutionEngine {
    llm: Arc<dyn LlmClient>,
    fast: ModelProfile,
    strong: ModelProfile,
    retry: RetryPolicy,
    labels: BTreeMap<String, String>,
}

impl ExecutionEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        fast: ModelProfile,
        strong: ModelProfile,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            fast,
            strong,
            retry,
            labels: BTreeMap::new(),
        }
    }

    /// Human-readable resource labels, used in correction prompts.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Process every pending task of `snapshot`, checkpointing to `store`.
    ///
    /// Only checkpoint failures are returned as errors; provider failures end
    /// up as `failed` tasks.
    pub async fn run(
        &self,
        ctx: &RunContext,
        store: &SnapshotStore,
        snapshot: &mut Snapshot,
    ) -> StoreResult<RunSummary> {
        let mut summary = RunSummary {
            healed: snapshot.heal_interrupted(),
            ..RunSummary::default()
        };
        let assets = AssetTable::build(&snapshot.asset_map, &self.labels);

        let mut queue: Vec<usize> = (0..snapshot.tasks.len())
            .filter(|&i| snapshot.tasks[i].status == TaskStatus::Pending)
            .collect();
        queue.sort_by_key(|&i| snapshot.tasks[i].id);

        tracing::info!(
            document = %ctx.document_id,
            run_id = %ctx.run_id,
            pending = queue.len(),
            total = snapshot.tasks.len(),
            "Starting translation run"
        );

        for idx in queue {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                snapshot.heal_interrupted();
                store.save(snapshot).await?;
                tracing::info!(
                    document = %ctx.document_id,
                    run_id = %ctx.run_id,
                    next_task = snapshot.tasks[idx].id,
                    "Run cancelled"
                );
                break;
            }

            snapshot.tasks[idx].status = TaskStatus::Processing;
            store.save(snapshot).await?;

            let outcome = self
                .process(ctx, &snapshot.tasks[idx], &assets, &mut summary.provider_calls)
                .await;

            let task = &mut snapshot.tasks[idx];
            match outcome {
                Ok(text) => {
                    task.translated_text = text;
                    task.status = TaskStatus::Success;
                    summary.succeeded += 1;
                }
                Err(e) => {
                    task.status = TaskStatus::Failed;
                    summary.failed += 1;
                    tracing::error!(
                        document = %ctx.document_id,
                        task_id = task.id,
                        error = %format!("{:#}", e),
                        "Task failed"
                    );
                }
            }
            store.save(snapshot).await?;
        }

        summary.skipped_pending = snapshot.counts().pending;
        tracing::info!(
            document = %ctx.document_id,
            run_id = %ctx.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped_pending = summary.skipped_pending,
            provider_calls = summary.provider_calls,
            cancelled = summary.cancelled,
            "Translation run finished"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        ctx: &RunContext,
        task: &Task,
        assets: &AssetTable,
        calls: &mut usize,
    ) -> anyhow::Result<String> {
        if !has_translatable_text(&task.source_text) {
            tracing::debug!(task_id = task.id, "Nothing to translate, keeping source");
            return Ok(task.source_text.clone());
        }

        let strategy = prompts::for_task(task);
        let profile = if task.is_correction() {
            &self.strong
        } else {
            &self.fast
        };
        let messages = [
            ChatMessage::system(strategy.system_prompt()),
            ChatMessage::user(strategy.user_prompt(task, assets)),
        ];

        tracing::debug!(
            document = %ctx.document_id,
            task_id = task.id,
            kind = %task.kind,
            strategy = strategy.name(),
            model = %profile.model,
            "Processing task"
        );

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            *calls += 1;

            let err = match self
                .llm
                .chat_completion_with_options(&profile.model, &messages, profile.options())
                .await
            {
                Ok(response) => {
                    let text = strip_code_fence(response.content.as_deref().unwrap_or_default());
                    if !text.is_empty() {
                        return Ok(text);
                    }
                    anyhow::Error::new(LlmError::empty_response(
                        "Response was empty after cleanup".to_string(),
                    ))
                }
                Err(e) => e,
            };

            let llm_error = err.downcast_ref::<LlmError>();
            let retryable = llm_error.map_or(true, LlmError::is_retryable);
            if !retryable || attempt >= max_attempts {
                return Err(err.context(format!("gave up after {} attempt(s)", attempt)));
            }

            let delay = llm_error
                .and_then(|e| e.retry_after)
                .map_or(self.retry.delay, |d| d.max(self.retry.delay));
            tracing::warn!(
                task_id = task.id,
                attempt,
                max_attempts,
                error = %err,
                "Provider call failed, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Trim a response and drop a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Opening fence may carry a language tag.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

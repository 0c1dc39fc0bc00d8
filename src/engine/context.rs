//! Per-run context and the registry of active runs.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything one run needs to know about itself.
///
/// The cancellation token is checked by the engine between tasks only; an
/// in-flight provider call always runs to completion.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub document_id: String,
    pub run_id: Uuid,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self::with_token(document_id, CancellationToken::new())
    }

    pub fn with_token(document_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            document_id: document_id.into(),
            run_id: Uuid::new_v4(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the run to stop at the next task boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[derive(Debug, Clone)]
struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

/// Active runs keyed by document. At most one run per document.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, ActiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctx`. Returns false when the document already has a run.
    pub async fn try_register(&self, ctx: &RunContext) -> bool {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&ctx.document_id) {
            return false;
        }
        runs.insert(
            ctx.document_id.clone(),
            ActiveRun {
                run_id: ctx.run_id,
                cancel: ctx.token(),
            },
        );
        true
    }

    /// Remove the entry for `ctx`, unless a newer run has replaced it.
    pub async fn finish(&self, ctx: &RunContext) {
        let mut runs = self.runs.write().await;
        if runs
            .get(&ctx.document_id)
            .is_some_and(|r| r.run_id == ctx.run_id)
        {
            runs.remove(&ctx.document_id);
        }
    }

    pub async fn is_active(&self, document_id: &str) -> bool {
        self.runs.read().await.contains_key(document_id)
    }

    /// Signal the run of `document_id`. Returns false when there is none.
    pub async fn cancel(&self, document_id: &str) -> bool {
        match self.runs.read().await.get(document_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every active run. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let runs = self.runs.read().await;
        for run in runs.values() {
            run.cancel.cancel();
        }
        runs.len()
    }

    pub async fn active_documents(&self) -> Vec<String> {
        let mut docs: Vec<String> = self.runs.read().await.keys().cloned().collect();
        docs.sort();
        docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_run_per_document() {
        let registry = RunRegistry::new();
        let first = RunContext::new("paper");
        let second = RunContext::new("paper");

        assert!(registry.try_register(&first).await);
        assert!(!registry.try_register(&second).await);
        assert!(registry.try_register(&RunContext::new("other")).await);
        assert_eq!(registry.active_documents().await, vec!["other", "paper"]);

        // A stale context must not evict the live run.
        registry.finish(&second).await;
        assert!(registry.is_active("paper").await);

        registry.finish(&first).await;
        assert!(!registry.is_active("paper").await);
    }

    #[tokio::test]
    async fn test_cancel_reaches_context() {
        let registry = RunRegistry::new();
        let ctx = RunContext::new("paper");
        registry.try_register(&ctx).await;

        assert!(!registry.cancel("missing").await);
        assert!(!ctx.is_cancelled());
        assert!(registry.cancel("paper").await);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let registry = RunRegistry::new();
        let a = RunContext::new("a");
        let b = RunContext::new("b");
        registry.try_register(&a).await;
        registry.try_register(&b).await;

        assert_eq!(registry.cancel_all().await, 2);
        assert!(a.is_cancelled() && b.is_cancelled());
    }
}

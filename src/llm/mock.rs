//! Scripted in-memory provider for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ChatMessage, ChatResponse, LlmClient, LlmError};

type Reply = Box<dyn Fn(usize, &str) -> Result<String, LlmError> + Send + Sync>;

/// Answers via `reply(call_number, user_prompt)`; call numbers start at 1.
pub struct ScriptedClient {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
    reply: Reply,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedClient {
    pub fn new(
        reply: impl Fn(usize, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            reply: Box::new(reply),
            cancel_after: None,
        }
    }

    /// Replies `译:<prompt>`.
    pub fn echo() -> Self {
        Self::new(|_, prompt| Ok(format!("译:{}", prompt)))
    }

    /// Cancel `token` while serving call number `calls`.
    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(model, user prompt)` of every call so far.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> anyhow::Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.seen
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.clone()));
        if let Some((after, token)) = &self.cancel_after {
            if n >= *after {
                token.cancel();
            }
        }
        let content = (self.reply)(n, &prompt)?;
        Ok(ChatResponse {
            content: Some(content),
            finish_reason: Some("stop".to_string()),
            usage: None,
            model: Some(model.to_string()),
        })
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionRequest, LlmClient, LlmError};

/// Replays canned completions in order and records every request. Drives
/// routing and gateway tests, and offline demos, without a provider.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    pub fn from_results(script: impl IntoIterator<Item = Result<Completion, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), ..Self::default() }
    }

    /// Sleeps before every answer; used to exercise call timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, completion: Completion) {
        lock(&self.script).push_back(Ok(completion));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.script).pop_front().unwrap_or_else(|| {
            Err(LlmError::Api {
                error_type: "script_exhausted".to_string(),
                message: "no scripted completion left".to_string(),
            })
        })
    }
}

//! In-memory scoring client for tests and dry runs

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::scoring_client::{ModelScore, ScoringClient, ScoringFailure};
use crate::models::ModelConfig;

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub model: String,
    /// Timeout the call was made under
    pub timeout: Duration,
}

/// Scoring client answering from a fixed per-model table
///
/// One-shot answers queued with [`MockScoringClient::push_result`] are used
/// first; after that each model repeats its fixed answer. Models without a
/// configured answer fail with a fatal error.
pub struct MockScoringClient {
    results: Mutex<HashMap<String, Result<ModelScore, ScoringFailure>>>,
    queued: Mutex<HashMap<String, VecDeque<Result<ModelScore, ScoringFailure>>>>,
    calls: Mutex<Vec<MockCall>>,
    timeout_ms: AtomicU64,
    delay: Duration,
}

impl MockScoringClient {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            timeout_ms: AtomicU64::new(30_000),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_result(&self, model: impl Into<String>, result: Result<ModelScore, ScoringFailure>) {
        lock(&self.results).insert(model.into(), result);
    }

    /// Answer the next call for `model` with `result`, once
    pub fn push_result(&self, model: impl Into<String>, result: Result<ModelScore, ScoringFailure>) {
        lock(&self.queued)
            .entry(model.into())
            .or_default()
            .push_back(result);
    }

    pub fn succeed(&self, model: impl Into<String>, score: f64, confidence: f64) {
        self.set_result(model, Ok(ModelScore { score, confidence }));
    }

    pub fn fail(&self, model: impl Into<String>, failure: ScoringFailure) {
        self.set_result(model, Err(failure));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn called_models(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.model.clone()).collect()
    }
}

impl Default for MockScoringClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ScoringClient for MockScoringClient {
    async fn score_with_timeout(
        &self,
        _content: &str,
        model: &ModelConfig,
        timeout: Duration,
    ) -> Result<ModelScore, ScoringFailure> {
        lock(&self.calls).push(MockCall {
            model: model.name.clone(),
            timeout,
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(result) = lock(&self.queued)
            .get_mut(&model.name)
            .and_then(|queue| queue.pop_front())
        {
            return result;
        }

        lock(&self.results)
            .get(&model.name)
            .cloned()
            .unwrap_or_else(|| {
                Err(ScoringFailure::fatal(format!(
                    "no response configured for model '{}'",
                    model.name
                )))
            })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }
}

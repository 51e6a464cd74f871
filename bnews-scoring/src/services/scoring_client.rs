//! Scoring capability client
//!
//! The scoring core only consumes success/failure outcomes from the model
//! endpoints. Every failure is tagged with a [`FailureKind`] so callers can
//! apply one rule to all of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::ModelConfig;

/// Failure class of a scoring call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Endpoint refused because of quota (HTTP 429)
    RateLimited,
    /// Timeout, connection failure, 5xx
    Transient,
    /// Anything a retry will not fix (bad request, auth, unparseable reply)
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::RateLimited => "rate limited",
            FailureKind::Transient => "transient",
            FailureKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Tagged scoring failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScoringFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScoringFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }
}

/// One model's answer for one document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub score: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Scoring capability
///
/// The per-call timeout travels with the call; the client's own timeout is
/// the main scoring timeout and is only read by [`ScoringClient::score`].
#[async_trait]
pub trait ScoringClient: Send + Sync {
    /// Score `content` with one model, giving up after `timeout`
    async fn score_with_timeout(
        &self,
        content: &str,
        model: &ModelConfig,
        timeout: Duration,
    ) -> Result<ModelScore, ScoringFailure>;

    /// Score `content` with one model under the main timeout
    async fn score(&self, content: &str, model: &ModelConfig) -> Result<ModelScore, ScoringFailure> {
        self.score_with_timeout(content, model, self.timeout()).await
    }

    /// Main per-call timeout
    fn timeout(&self) -> Duration;

    /// Replace the main per-call timeout
    fn set_timeout(&self, timeout: Duration);
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    model: &'a str,
    content: &'a str,
}

/// JSON-over-HTTP scoring client
///
/// POSTs `{model, content}` to the model's own url, or to `base_url` when the
/// model has none, and expects `{score, confidence}` back.
pub struct HttpScoringClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout_ms: AtomicU64,
}

impl HttpScoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScoringFailure> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("bnews-scoring/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScoringFailure::fatal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        })
    }

    fn endpoint<'a>(&'a self, model: &'a ModelConfig) -> &'a str {
        model.url.as_deref().unwrap_or(&self.base_url)
    }
}

/// Map a transport error to its failure class
fn classify_request_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        FailureKind::Transient
    } else {
        FailureKind::Fatal
    }
}

/// Map a non-success HTTP status to its failure class
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::Transient,
        _ => FailureKind::Fatal,
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn score_with_timeout(
        &self,
        content: &str,
        model: &ModelConfig,
        timeout: Duration,
    ) -> Result<ModelScore, ScoringFailure> {
        let url = self.endpoint(model);

        tracing::debug!(
            model = %model.name,
            url = %url,
            timeout_ms = timeout.as_millis() as u64,
            "Requesting model score"
        );

        let response = self
            .http_client
            .post(url)
            .timeout(timeout)
            .json(&ScoreRequest {
                model: &model.name,
                content,
            })
            .send()
            .await
            .map_err(|e| ScoringFailure::new(classify_request_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = classify_status(status.as_u16());
            tracing::warn!(
                model = %model.name,
                status_code = status.as_u16(),
                kind = %kind,
                "Model endpoint returned error status"
            );
            return Err(ScoringFailure::new(
                kind,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        response
            .json::<ModelScore>()
            .await
            .map_err(|e| ScoringFailure::fatal(format!("Unparseable score response: {}", e)))
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }
}

//! Inference client contract consumed by the workflow stages.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sacdj_core::Criterion;
use tracing::warn;

use crate::error::InferenceError;

/// What a call is for. Used for logging and by [`crate::MockClient`] for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Extraction,
    Criterion(Criterion),
    Decision,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction => f.write_str("extraction"),
            Self::Criterion(c) => write!(f, "criterion:{c}"),
            Self::Decision => f.write_str("decision"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub kind: CallKind,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw model output plus timing.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub elapsed: Duration,
}

/// A language-model service that turns a prompt into text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, InferenceError>;

    /// Model identifier recorded with classifications.
    fn model_name(&self) -> &str;
}

/// Run one inference call under `timeout`.
///
/// Dropping the returned future cancels the in-flight call.
pub async fn complete_with_timeout(
    client: &dyn InferenceClient,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<Completion, InferenceError> {
    match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(kind = %request.kind, timeout_ms = timeout.as_millis() as u64, "inference call timed out");
            Err(InferenceError::Timeout(timeout))
        }
    }
}

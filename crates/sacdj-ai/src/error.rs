use std::time::Duration;

use thiserror::Error;

/// Failure talking to the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unreadable response from inference service: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model {0} is not available")]
    ModelUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// No structured record could be recovered from model output.
#[derive(Debug, Error)]
#[error("no JSON object found in model output ({} chars)", raw.len())]
pub struct DecodeError {
    /// The model output as received, for diagnostics.
    pub raw: String,
}

/// Failure inside a single stage, before it is turned into data.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The model answered with an explicit `error` key.
    #[error("model reported an error: {0}")]
    Model(String),

    /// The record decoded but a field has an unusable value.
    #[error("malformed model answer: {0}")]
    Malformed(String),

    #[error("document content is empty")]
    EmptyDocument,

    #[error("analysis task panicked: {0}")]
    Panicked(String),
}

/// Why a guard refused to continue the workflow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("insufficient data: neither an applicant nor a date could be extracted")]
    InsufficientData,

    #[error("insufficient analysis: {valid}/{total} criteria analysed, {required} required")]
    InsufficientAnalysis {
        valid: usize,
        total: usize,
        required: usize,
    },

    #[error("{0}")]
    Upstream(String),
}

/// The decision stage could not produce a decision.
#[derive(Debug, Error)]
#[error("decision stage failed: {0}")]
pub struct AggregationError(#[from] pub StageError);

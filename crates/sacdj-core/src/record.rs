//! Hand-off types for the persistence layer.
//!
//! The engine stores nothing itself. These types are what a caller persists
//! once a [`CaseState`] reaches a terminal stage.

use serde::{Deserialize, Serialize};

use crate::state::{CaseState, Classification, Verdicts};

/// Status a document moves to once its analysis ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Completed,
    NeedsReview,
}

impl DocumentStatus {
    pub fn from_state(state: &CaseState) -> Self {
        if state.is_review_required || state.final_classification.is_none() {
            Self::NeedsReview
        } else {
            Self::Completed
        }
    }
}

/// A classification ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub document_id: String,
    pub result: Option<Classification>,
    pub justification: Option<String>,
    pub confidence: f64,
    pub is_review_required: bool,
    pub critical_issues: Vec<String>,
    pub verdicts: Verdicts,
    pub processing_time_ms: Option<u64>,
    pub model_version: String,
    pub document_status: DocumentStatus,
}

impl ClassificationRecord {
    pub fn from_state(state: &CaseState, model_version: impl Into<String>) -> Self {
        Self {
            document_id: state.document_id.clone(),
            result: state.final_classification,
            justification: state.final_justification.clone(),
            confidence: state.final_confidence.unwrap_or(0.0),
            is_review_required: state.is_review_required,
            critical_issues: state.critical_issues.clone(),
            verdicts: state.verdicts.clone(),
            processing_time_ms: state
                .processing_time()
                .map(|d| d.num_milliseconds().max(0) as u64),
            model_version: model_version.into(),
            document_status: DocumentStatus::from_state(state),
        }
    }
}

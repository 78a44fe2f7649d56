//! Case state threaded through the analysis workflow.
//!
//! Stages never mutate a [`CaseState`] in place. Each stage produces a
//! [`StageUpdate`] and the controller folds it into a new state with
//! [`CaseState::apply`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criterion::{Criterion, CriterionVerdict};
use crate::facts::CaseFacts;

/// Criterion verdicts keyed by criterion.
pub type Verdicts = BTreeMap<Criterion, CriterionVerdict>;

/// Final admissibility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Recevable,
    Irrecevable,
}

impl Classification {
    /// Parse a model-supplied label. Case and surrounding whitespace are ignored.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "RECEVABLE" => Some(Self::Recevable),
            "IRRECEVABLE" => Some(Self::Irrecevable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recevable => "RECEVABLE",
            Self::Irrecevable => "IRRECEVABLE",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    /// A decision was reached by the aggregator.
    Completed,
    /// The workflow ended in the fallback decision.
    Failed,
}

/// States of the workflow controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Extracting,
    Analyzing,
    Deciding,
    FallbackDecision,
    Done,
}

/// Outcome of a guard evaluated after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue,
    InsufficientData,
    InsufficientAnalysis,
    Error,
}

impl WorkflowStage {
    /// The transition function of the workflow.
    ///
    /// Any non-`Continue` transition out of extraction or analysis leads to the
    /// fallback decision. `Deciding` always ends in `Done`. `Done` and
    /// `FallbackDecision` are terminal.
    pub fn next(self, transition: Transition) -> WorkflowStage {
        match (self, transition) {
            (Self::Extracting, Transition::Continue) => Self::Analyzing,
            (Self::Analyzing, Transition::Continue) => Self::Deciding,
            (Self::Extracting | Self::Analyzing, _) => Self::FallbackDecision,
            (Self::Deciding, _) => Self::Done,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::FallbackDecision)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Deciding => "deciding",
            Self::FallbackDecision => "fallback_decision",
            Self::Done => "done",
        }
    }
}

/// Summary of the criterion analyses behind a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_criteria: usize,
    pub compliant_criteria: usize,
    pub successful_analyses: usize,
    pub average_confidence: f64,
    pub decided_at: DateTime<Utc>,
    pub processing_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl AnalysisSummary {
    pub fn from_verdicts(verdicts: &Verdicts) -> Self {
        Self {
            total_criteria: Criterion::ALL.len(),
            compliant_criteria: verdicts
                .values()
                .filter(|v| v.is_valid() && v.is_compliant)
                .count(),
            successful_analyses: valid_count(verdicts),
            average_confidence: average_confidence(verdicts),
            decided_at: Utc::now(),
            processing_time_ms: None,
            error: None,
        }
    }
}

/// Mean confidence of the verdicts that did not fail, or `0.0` when none are valid.
pub fn average_confidence(verdicts: &Verdicts) -> f64 {
    let valid: Vec<f64> = verdicts
        .values()
        .filter(|v| v.is_valid())
        .map(|v| v.confidence)
        .collect();
    if valid.is_empty() {
        0.0
    } else {
        valid.iter().sum::<f64>() / valid.len() as f64
    }
}

/// Number of verdicts without an error.
pub fn valid_count(verdicts: &Verdicts) -> usize {
    verdicts.values().filter(|v| v.is_valid()).count()
}

/// A final decision, from the aggregator or from the fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub classification: Classification,
    pub justification: String,
    pub confidence: f64,
    pub is_review_required: bool,
    pub critical_issues: Vec<String>,
    pub summary: AnalysisSummary,
}

/// Partial result of one stage, merged into the state by [`CaseState::apply`].
#[derive(Debug, Clone)]
pub enum StageUpdate {
    /// The controller entered a stage.
    Entered(WorkflowStage),
    Facts(CaseFacts),
    ExtractionFailed(String),
    Verdicts(Verdicts),
    Decision(Decision),
    /// Fallback decision with the reason the workflow could not decide normally.
    Fallback { decision: Decision, reason: String },
}

/// The record threaded through the workflow for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseState {
    pub document_id: String,
    pub document_content: String,
    pub facts: Option<CaseFacts>,
    pub verdicts: Verdicts,
    pub final_classification: Option<Classification>,
    pub final_justification: Option<String>,
    pub final_confidence: Option<f64>,
    pub is_review_required: bool,
    pub critical_issues: Vec<String>,
    pub error_message: Option<String>,
    pub summary: Option<AnalysisSummary>,
    pub status: ProcessingStatus,
    pub stages: Vec<WorkflowStage>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CaseState {
    /// Fresh state for one analysis request. Review is required until a decision says otherwise.
    pub fn new(document_id: impl Into<String>, document_content: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            document_content: document_content.into(),
            facts: None,
            verdicts: Verdicts::new(),
            final_classification: None,
            final_justification: None,
            final_confidence: None,
            is_review_required: true,
            critical_issues: Vec::new(),
            error_message: None,
            summary: None,
            status: ProcessingStatus::Pending,
            stages: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Fold a stage update into a new state.
    pub fn apply(self, update: StageUpdate) -> Self {
        let mut next = self;
        match update {
            StageUpdate::Entered(stage) => {
                next.stages.push(stage);
                if !stage.is_terminal() {
                    next.status = ProcessingStatus::Processing;
                }
            }
            StageUpdate::Facts(facts) => {
                next.facts = Some(facts);
            }
            StageUpdate::ExtractionFailed(message) => {
                next.facts = None;
                next.error_message = Some(message);
            }
            StageUpdate::Verdicts(verdicts) => {
                for criterion in Criterion::ALL {
                    if !verdicts.contains_key(&criterion) {
                        next.warnings
                            .push(format!("analyse manquante: {}", criterion.key()));
                    }
                }
                next.verdicts.extend(verdicts);
            }
            StageUpdate::Decision(decision) => {
                next.finish(decision);
                next.status = ProcessingStatus::Completed;
            }
            StageUpdate::Fallback { decision, reason } => {
                next.finish(decision);
                if next.error_message.is_none() {
                    next.error_message = Some(reason);
                }
                next.status = ProcessingStatus::Failed;
            }
        }
        next
    }

    fn finish(&mut self, mut decision: Decision) {
        let completed_at = Utc::now();
        let elapsed = (completed_at - self.started_at).num_milliseconds().max(0) as u64;
        decision.summary.processing_time_ms = Some(elapsed);

        self.final_classification = Some(decision.classification);
        self.final_justification = Some(decision.justification);
        self.final_confidence = Some(decision.confidence);
        self.is_review_required = decision.is_review_required;
        self.critical_issues = decision.critical_issues;
        self.summary = Some(decision.summary);
        self.completed_at = Some(completed_at);
    }

    pub fn verdict(&self, criterion: Criterion) -> Option<&CriterionVerdict> {
        self.verdicts.get(&criterion)
    }

    /// Number of verdicts present and not failed.
    pub fn valid_analyses(&self) -> usize {
        valid_count(&self.verdicts)
    }

    /// Mean confidence over the verdicts that did not fail.
    pub fn overall_confidence(&self) -> f64 {
        average_confidence(&self.verdicts)
    }

    /// All four verdicts are present without errors and a classification is set.
    pub fn is_analysis_complete(&self) -> bool {
        Criterion::ALL
            .iter()
            .all(|c| self.verdict(*c).is_some_and(|v| v.is_valid()))
            && self.final_classification.is_some()
    }

    /// The top-level error followed by each failed criterion, labelled.
    pub fn analysis_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(message) = &self.error_message {
            errors.push(message.clone());
        }
        for (criterion, verdict) in &self.verdicts {
            if let Some(error) = &verdict.error {
                errors.push(format!("{}: {error}", criterion.label()));
            }
        }
        errors
    }

    /// Wall-clock time from creation to the final decision.
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// The stage the workflow is in (or ended in).
    pub fn current_stage(&self) -> Option<WorkflowStage> {
        self.stages.last().copied()
    }
}

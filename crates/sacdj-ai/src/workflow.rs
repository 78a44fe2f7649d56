//! Workflow controller: the guarded state machine over the three stages.
//!
//! ```text
//! Extracting ──ok──▶ Analyzing ──ok──▶ Deciding ──▶ Done
//!      │                 │
//!      └── guard fails ──┴──▶ FallbackDecision
//! ```
//!
//! Each stage reads a [`CaseState`] snapshot and returns a [`StageUpdate`];
//! [`Pipeline::run`] folds the updates in with [`CaseState::apply`]. No stage
//! retries. Dropping the future returned by `run` cancels any inference call
//! in flight.
//!
//! Observers registered with [`Pipeline::with_observer`] receive a
//! [`StageEvent`] as each stage is entered and once the run ends.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use sacdj_core::{
    AnalysisSummary, CaseState, Classification, Criterion, Decision, EngineConfig,
    ProcessingStatus, StageUpdate, Transition, WorkflowStage,
};
use tracing::{error, info, warn};

use crate::aggregator::DecisionAggregator;
use crate::client::InferenceClient;
use crate::coordinator::AnalysisCoordinator;
use crate::error::GuardError;
use crate::extractor::EntityExtractor;

/// Progress notification emitted by [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Entered {
        document_id: String,
        stage: WorkflowStage,
    },
    Finished {
        document_id: String,
        classification: Option<Classification>,
        status: ProcessingStatus,
    },
}

impl StageEvent {
    pub fn document_id(&self) -> &str {
        match self {
            Self::Entered { document_id, .. } | Self::Finished { document_id, .. } => document_id,
        }
    }
}

pub type StageObserver = dyn Fn(&StageEvent) + Send + Sync;

/// A reusable, stateless analysis pipeline. Cheap to clone; documents can be
/// analysed concurrently from clones or from shared references.
#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn InferenceClient>,
    config: EngineConfig,
    observers: Vec<Arc<StageObserver>>,
}

impl Pipeline {
    pub fn new(client: Arc<dyn InferenceClient>, config: EngineConfig) -> Self {
        Self {
            client,
            config,
            observers: Vec::new(),
        }
    }

    /// Register a callback for [`StageEvent`]s. Observers run on the task
    /// driving `run`; a panicking observer is logged and skipped.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StageEvent) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Analyse one document from start to a terminal state.
    ///
    /// Never fails: every failure ends in a fallback decision recorded in the
    /// returned state.
    pub async fn run(
        &self,
        document_id: impl Into<String>,
        document_content: impl Into<String>,
    ) -> CaseState {
        let mut state = CaseState::new(document_id, document_content);
        let mut stage = WorkflowStage::Extracting;
        let mut refusal: Option<(WorkflowStage, GuardError)> = None;

        info!(
            document_id = %state.document_id,
            chars = state.document_content.chars().count(),
            "analysis started"
        );

        loop {
            state = state.apply(StageUpdate::Entered(stage));
            self.notify(StageEvent::Entered {
                document_id: state.document_id.clone(),
                stage,
            });
            stage = match stage {
                WorkflowStage::Extracting => {
                    let update = self.extract(&state).await;
                    state = state.apply(update);
                    route(stage, check_extraction(&state), &mut refusal)
                }
                WorkflowStage::Analyzing => {
                    let update = self.analyze(&state).await;
                    state = state.apply(update);
                    let check = check_analysis(&state, self.config.min_valid_analyses);
                    route(stage, check, &mut refusal)
                }
                WorkflowStage::Deciding => {
                    let update = self.decide(&state).await;
                    state = state.apply(update);
                    stage.next(Transition::Continue)
                }
                WorkflowStage::FallbackDecision => {
                    if let Some((failed, guard)) = refusal.take() {
                        let decision = fallback_decision(&state, failed, &guard);
                        state = state.apply(StageUpdate::Fallback {
                            decision,
                            reason: guard.to_string(),
                        });
                    }
                    break;
                }
                WorkflowStage::Done => break,
            };
        }

        info!(
            document_id = %state.document_id,
            classification = ?state.final_classification,
            confidence = ?state.final_confidence,
            review = state.is_review_required,
            status = ?state.status,
            "analysis finished"
        );
        self.notify(StageEvent::Finished {
            document_id: state.document_id.clone(),
            classification: state.final_classification,
            status: state.status,
        });
        state
    }

    fn notify(&self, event: StageEvent) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                warn!(document_id = event.document_id(), "stage observer panicked");
            }
        }
    }

    /// Extraction stage alone.
    pub async fn extract(&self, state: &CaseState) -> StageUpdate {
        info!(document_id = %state.document_id, "extracting entities");
        match EntityExtractor::new(self.client.as_ref(), &self.config)
            .extract(&state.document_content)
            .await
        {
            Ok(facts) => StageUpdate::Facts(facts),
            Err(e) => {
                error!(document_id = %state.document_id, error = %e, "entity extraction failed");
                StageUpdate::ExtractionFailed(format!(
                    "Erreur lors de l'extraction des entités: {e}"
                ))
            }
        }
    }

    /// Criterion analysis stage alone. Missing facts are analysed as all-absent.
    pub async fn analyze(&self, state: &CaseState) -> StageUpdate {
        info!(document_id = %state.document_id, "analysing criteria");
        let facts = state.facts.clone().unwrap_or_default();
        let verdicts = AnalysisCoordinator::new(self.client.as_ref(), &self.config)
            .analyze_all(&facts, &state.document_content)
            .await;
        StageUpdate::Verdicts(verdicts)
    }

    /// Decision stage alone. A failing decision call yields the technical
    /// fallback as a [`StageUpdate::Fallback`].
    pub async fn decide(&self, state: &CaseState) -> StageUpdate {
        info!(document_id = %state.document_id, "deciding");
        match DecisionAggregator::new(self.client.as_ref(), &self.config)
            .decide(&state.verdicts, state.facts.as_ref())
            .await
        {
            Ok(decision) => StageUpdate::Decision(decision),
            Err(e) => {
                error!(document_id = %state.document_id, error = %e, "decision stage failed");
                StageUpdate::Fallback {
                    decision: DecisionAggregator::failure_decision(&state.verdicts, &e),
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn route(
    stage: WorkflowStage,
    check: Result<(), GuardError>,
    refusal: &mut Option<(WorkflowStage, GuardError)>,
) -> WorkflowStage {
    match check {
        Ok(()) => stage.next(Transition::Continue),
        Err(guard) => {
            warn!(stage = stage.as_str(), error = %guard, "guard refused to continue");
            let next = stage.next(guard.transition());
            *refusal = Some((stage, guard));
            next
        }
    }
}

impl GuardError {
    pub fn transition(&self) -> Transition {
        match self {
            Self::InsufficientData => Transition::InsufficientData,
            Self::InsufficientAnalysis { .. } => Transition::InsufficientAnalysis,
            Self::Upstream(_) => Transition::Error,
        }
    }
}

/// Post-extraction guard: an upstream error, or neither an applicant nor a
/// date, stops the workflow.
pub fn check_extraction(state: &CaseState) -> Result<(), GuardError> {
    if let Some(message) = &state.error_message {
        return Err(GuardError::Upstream(message.clone()));
    }
    match &state.facts {
        Some(facts) if facts.has_applicant() || facts.has_any_date() => Ok(()),
        _ => Err(GuardError::InsufficientData),
    }
}

/// Post-analysis guard: at least `required` verdicts must be free of errors.
pub fn check_analysis(state: &CaseState, required: usize) -> Result<(), GuardError> {
    if let Some(message) = &state.error_message {
        return Err(GuardError::Upstream(message.clone()));
    }
    let valid = state.valid_analyses();
    if valid < required {
        return Err(GuardError::InsufficientAnalysis {
            valid,
            total: Criterion::ALL.len(),
            required,
        });
    }
    Ok(())
}

/// The deterministic decision taken when a guard stops the workflow.
pub fn fallback_decision(state: &CaseState, failed: WorkflowStage, guard: &GuardError) -> Decision {
    let total = Criterion::ALL.len();
    let successful = state.valid_analyses();
    let cause = state
        .error_message
        .clone()
        .unwrap_or_else(|| guard.to_string());

    let (justification, stage_issue) = match failed {
        WorkflowStage::Extracting => (
            format!("Impossible d'analyser le document: {cause}"),
            "Document illisible ou malformé",
        ),
        _ => (
            format!("Analyse incomplète ({successful}/{total} critères analysés): {cause}"),
            "Analyse incomplète",
        ),
    };

    Decision {
        classification: Classification::Irrecevable,
        justification,
        confidence: 0.0,
        is_review_required: true,
        critical_issues: vec![
            "Erreur technique".to_string(),
            stage_issue.to_string(),
            format!("Étape en échec: {}", failed.as_str()),
            format!("Analyses réussies: {successful}/{total}"),
        ],
        summary: AnalysisSummary {
            compliant_criteria: 0,
            successful_analyses: successful,
            average_confidence: 0.0,
            error: Some(cause),
            ..AnalysisSummary::from_verdicts(&state.verdicts)
        },
    }
}

pub mod config;
pub mod criterion;
pub mod facts;
pub mod record;
pub mod state;

pub use config::{
    ClassificationPolicy, ConfidenceLevel, ConfidenceThresholds, ConfigError, EngineConfig,
    InferenceSettings,
};
pub use criterion::{Criterion, CriterionDefinition, CriterionVerdict, clamp_confidence};
pub use facts::CaseFacts;
pub use record::{ClassificationRecord, DocumentStatus};
pub use state::{
    AnalysisSummary, CaseState, Classification, Decision, ProcessingStatus, StageUpdate,
    Transition, Verdicts, WorkflowStage,
};

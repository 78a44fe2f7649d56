//! Admissibility analysis engine: inference clients, tolerant decoding of
//! model output, the extraction/analysis/decision stages, and the workflow
//! controller that sequences them.

pub mod aggregator;
pub mod analyzer;
pub mod client;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod mock;
pub mod ollama;
pub mod prompts;
pub mod workflow;

pub use aggregator::{DecisionAggregator, derive_classification};
pub use analyzer::CriterionAnalyzer;
pub use client::{CallKind, Completion, CompletionRequest, InferenceClient, complete_with_timeout};
pub use coordinator::AnalysisCoordinator;
pub use decoder::{Record, decode_record};
pub use error::{AggregationError, DecodeError, GuardError, InferenceError, StageError};
pub use extractor::EntityExtractor;
pub use mock::MockClient;
pub use ollama::OllamaClient;
pub use workflow::{
    Pipeline, StageEvent, StageObserver, check_analysis, check_extraction, fallback_decision,
};

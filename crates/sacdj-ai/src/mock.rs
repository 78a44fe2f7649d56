//! Scripted inference client for development and tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sacdj_core::Criterion;
use serde_json::json;
use tracing::debug;

use crate::client::{CallKind, Completion, CompletionRequest, InferenceClient};
use crate::error::InferenceError;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, InferenceError> + Send + Sync;
type DelayFn = dyn Fn(&CompletionRequest) -> Duration + Send + Sync;

pub const MOCK_MODEL: &str = "mock";

/// An [`InferenceClient`] that answers from a closure instead of a server.
///
/// An optional delay is slept (on the tokio clock) before each answer, so
/// timeouts and concurrency can be exercised with a paused clock.
pub struct MockClient {
    responder: Box<Responder>,
    delay: Option<Box<DelayFn>>,
    calls: AtomicUsize,
    kinds: Mutex<Vec<CallKind>>,
}

impl MockClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            kinds: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay(request)` before answering each request.
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// A plausible admissible run: full facts, four compliant verdicts, a
    /// `RECEVABLE` decision.
    pub fn canned() -> Self {
        Self::new(|request| {
            let body = match request.kind {
                CallKind::Extraction => json!({
                    "date_decision": "15/01/2024",
                    "date_recours": "28/02/2024",
                    "demandeur": "SARL Énergie du Rhône",
                    "objet_recours": "Contestation de la CSPE 2023",
                    "montant_conteste": "1250.00",
                    "autorite_competente": "Commission de régulation de l'énergie",
                    "type_decision": "Décision de rejet"
                }),
                CallKind::Criterion(criterion) => json!({
                    "is_compliant": true,
                    "reasoning": canned_reasoning(criterion),
                    "confidence": 0.9,
                    "source_quote": null
                }),
                CallKind::Decision => json!({
                    "final_classification": "RECEVABLE",
                    "final_justification": "Les quatre critères de recevabilité sont respectés.",
                    "final_confidence": 0.9,
                    "is_review_required": false,
                    "critical_issues": []
                }),
            };
            Ok(body.to_string())
        })
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Kinds of the calls received so far, in arrival order.
    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.kinds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn canned_reasoning(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Deadline => "Le recours a été formé dans le délai de deux mois.",
        Criterion::Quality => "Le demandeur est le redevable de la contribution.",
        Criterion::Object => "Le recours conteste une décision relative à la CSPE.",
        Criterion::Documents => "La décision contestée est jointe au recours.",
    }
}

#[async_trait]
impl InferenceClient for MockClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.kind);

        let elapsed = match &self.delay {
            Some(delay) => {
                let d = delay(request);
                tokio::time::sleep(d).await;
                d
            }
            None => Duration::ZERO,
        };

        let text = (self.responder)(request)?;
        debug!(kind = %request.kind, chars = text.len(), "mock completion");
        Ok(Completion { text, elapsed })
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL
    }
}

//! Runs the four criterion analyses concurrently and joins them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use sacdj_core::state::valid_count;
use sacdj_core::{CaseFacts, Criterion, CriterionVerdict, EngineConfig, Verdicts};
use tracing::{error, info};

use crate::analyzer::CriterionAnalyzer;
use crate::client::InferenceClient;
use crate::error::StageError;

/// Fixed-size concurrent join over [`Criterion::ALL`].
///
/// The analyses run as futures on the caller's task, so the join takes about
/// as long as the slowest call and dropping it cancels every call in flight.
pub struct AnalysisCoordinator<'a> {
    client: &'a dyn InferenceClient,
    config: &'a EngineConfig,
}

impl<'a> AnalysisCoordinator<'a> {
    pub fn new(client: &'a dyn InferenceClient, config: &'a EngineConfig) -> Self {
        Self { client, config }
    }

    /// Analyse every criterion. The result always has all four keys; a
    /// criterion whose analysis failed or panicked has a failed verdict.
    pub async fn analyze_all(&self, facts: &CaseFacts, content: &str) -> Verdicts {
        let start = Instant::now();

        let tasks = Criterion::ALL.map(move |criterion| async move {
            let verdict = match self.config.definition(criterion) {
                Some(definition) => {
                    let analyzer = CriterionAnalyzer::new(self.client, self.config, definition);
                    AssertUnwindSafe(analyzer.analyze(facts, content))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            let e = StageError::Panicked(panic_message(payload.as_ref()));
                            error!(criterion = %criterion, error = %e, "criterion analysis aborted");
                            CriterionVerdict::failed(&definition.name, e.to_string())
                        })
                }
                None => CriterionVerdict::failed(criterion.label(), "no criterion definition configured"),
            };
            (criterion, verdict)
        });

        let verdicts: Verdicts = join_all(tasks).await.into_iter().collect();
        info!(
            valid = valid_count(&verdicts),
            total = verdicts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "criterion analyses joined"
        );
        verdicts
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CallKind;
    use crate::error::InferenceError;
    use crate::mock::MockClient;
    use std::time::Duration;

    fn compliant() -> Result<String, InferenceError> {
        Ok(r#"{"is_compliant": true, "reasoning": "ok", "confidence": 0.9}"#.into())
    }

    #[tokio::test]
    async fn all_four_keys_are_present() {
        let client = MockClient::canned();
        let config = EngineConfig::default();
        let verdicts = AnalysisCoordinator::new(&client, &config)
            .analyze_all(&CaseFacts::default(), "texte")
            .await;
        assert_eq!(verdicts.keys().copied().collect::<Vec<_>>(), Criterion::ALL.to_vec());
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let client = MockClient::new(|request| match request.kind {
            CallKind::Criterion(Criterion::Object) => Err(InferenceError::Server {
                status: 500,
                body: "erreur interne".into(),
            }),
            _ => compliant(),
        });
        let config = EngineConfig::default();
        let verdicts = AnalysisCoordinator::new(&client, &config)
            .analyze_all(&CaseFacts::default(), "texte")
            .await;
        assert!(verdicts[&Criterion::Object].is_failed());
        assert_eq!(valid_count(&verdicts), 3);
    }

    #[tokio::test]
    async fn panic_is_isolated() {
        let client = MockClient::new(|request| match request.kind {
            CallKind::Criterion(Criterion::Quality) => panic!("réponse inattendue"),
            _ => compliant(),
        });
        let config = EngineConfig::default();
        let verdicts = AnalysisCoordinator::new(&client, &config)
            .analyze_all(&CaseFacts::default(), "texte")
            .await;
        let failed = &verdicts[&Criterion::Quality];
        assert!(failed.is_failed());
        assert!(failed.error.as_deref().unwrap().contains("réponse inattendue"));
        assert_eq!(valid_count(&verdicts), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_the_slowest_call_not_the_sum() {
        let client = MockClient::new(|_| compliant()).with_delay(|request| match request.kind {
            CallKind::Criterion(Criterion::Deadline) => Duration::from_secs(2),
            CallKind::Criterion(Criterion::Quality) => Duration::from_secs(5),
            CallKind::Criterion(Criterion::Object) => Duration::from_secs(3),
            _ => Duration::from_secs(4),
        });
        let config = EngineConfig::default();
        let start = tokio::time::Instant::now();
        let verdicts = AnalysisCoordinator::new(&client, &config)
            .analyze_all(&CaseFacts::default(), "texte")
            .await;
        let elapsed = start.elapsed();
        assert_eq!(valid_count(&verdicts), 4);
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}

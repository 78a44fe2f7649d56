//! Decision stage: four verdicts in, one classification out.

use sacdj_core::state::average_confidence;
use sacdj_core::{
    AnalysisSummary, CaseFacts, Classification, ClassificationPolicy, Criterion, Decision,
    EngineConfig, Verdicts, clamp_confidence,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::analyzer::{number, text, truthy};
use crate::client::{CallKind, CompletionRequest, InferenceClient, complete_with_timeout};
use crate::decoder::{Record, decode_record};
use crate::error::{AggregationError, StageError};
use crate::prompts::{DECISION_SYSTEM_PROMPT, decision_prompt};

const DEFAULT_JUSTIFICATION: &str = "Décision par défaut";
const TECHNICAL_ISSUE: &str = "Erreur technique lors de l'analyse";

pub struct DecisionAggregator<'a> {
    client: &'a dyn InferenceClient,
    config: &'a EngineConfig,
}

impl<'a> DecisionAggregator<'a> {
    pub fn new(client: &'a dyn InferenceClient, config: &'a EngineConfig) -> Self {
        Self { client, config }
    }

    /// Ask the model for a decision over `verdicts` and combine it with the
    /// configured [`ClassificationPolicy`] and confidence thresholds.
    ///
    /// Review is required when the model asks for it or does not say, when
    /// it gives no final confidence or one below the medium threshold, or
    /// when the mean confidence of the valid verdicts is below it.
    pub async fn decide(
        &self,
        verdicts: &Verdicts,
        facts: Option<&CaseFacts>,
    ) -> Result<Decision, AggregationError> {
        let request = CompletionRequest {
            kind: CallKind::Decision,
            prompt: decision_prompt(verdicts, facts),
            system_prompt: Some(DECISION_SYSTEM_PROMPT.to_string()),
            temperature: self.config.inference.temperature,
            max_tokens: self.config.inference.max_tokens,
        };
        let completion = complete_with_timeout(self.client, &request, self.config.inference.timeout)
            .await
            .map_err(StageError::from)?;
        let record = decode_record(&completion.text).map_err(StageError::from)?;

        let decision = self.combine(verdicts, &record)?;
        info!(
            classification = %decision.classification,
            confidence = decision.confidence,
            review = decision.is_review_required,
            issues = decision.critical_issues.len(),
            "final decision"
        );
        Ok(decision)
    }

    fn combine(&self, verdicts: &Verdicts, record: &Record) -> Result<Decision, StageError> {
        if let Some(error) = record.get("error").filter(|v| !v.is_null()) {
            return Err(StageError::Model(text(error)));
        }

        let average = average_confidence(verdicts);
        let medium = self.config.thresholds.medium;

        let model_label = record
            .get("final_classification")
            .and_then(Value::as_str)
            .and_then(Classification::parse);
        // A missing confidence is recorded as the verdict average but still
        // counts as below threshold for review.
        let (confidence, confidence_given) = match record.get("final_confidence") {
            None | Some(Value::Null) => (average, false),
            Some(value) => {
                let n = number(value).ok_or_else(|| {
                    StageError::Malformed(format!("final_confidence is not a number: {value}"))
                })?;
                (n, true)
            }
        };
        let confidence = clamp_confidence(confidence);
        let model_review = record
            .get("is_review_required")
            .filter(|v| !v.is_null())
            .is_none_or(truthy);
        let justification = record
            .get("final_justification")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_JUSTIFICATION)
            .to_string();
        let mut critical_issues = issues(record.get("critical_issues"));

        let mut diverged = false;
        let classification = match self.config.policy {
            ClassificationPolicy::ModelAuthoritative => {
                model_label.unwrap_or(Classification::Irrecevable)
            }
            ClassificationPolicy::Deterministic => {
                let derived = derive_classification(verdicts);
                if model_label != Some(derived) {
                    diverged = true;
                    let proposed = model_label.map_or("aucune classification", |c| c.as_str());
                    warn!(derived = %derived, proposed, "model classification diverges from criteria");
                    critical_issues.push(format!(
                        "Divergence : le modèle propose {proposed} alors que les critères conduisent à {derived}"
                    ));
                }
                derived
            }
        };

        let is_review_required = model_review
            || !confidence_given
            || confidence < medium
            || average < medium
            || diverged;

        Ok(Decision {
            classification,
            justification,
            confidence,
            is_review_required,
            critical_issues,
            summary: AnalysisSummary::from_verdicts(verdicts),
        })
    }

    /// The decision recorded when the decision stage itself fails.
    pub fn failure_decision(verdicts: &Verdicts, error: &AggregationError) -> Decision {
        let mut summary = AnalysisSummary::from_verdicts(verdicts);
        summary.compliant_criteria = 0;
        summary.average_confidence = 0.0;
        summary.error = Some(error.to_string());
        Decision {
            classification: Classification::Irrecevable,
            justification: format!("Erreur lors de l'analyse: {error}"),
            confidence: 0.0,
            is_review_required: true,
            critical_issues: vec![TECHNICAL_ISSUE.to_string()],
            summary,
        }
    }
}

/// `RECEVABLE` iff all four criteria have a valid, compliant verdict.
pub fn derive_classification(verdicts: &Verdicts) -> Classification {
    let all_met = Criterion::ALL.iter().all(|c| {
        verdicts
            .get(c)
            .is_some_and(|v| v.is_valid() && v.is_compliant)
    });
    if all_met {
        Classification::Recevable
    } else {
        Classification::Irrecevable
    }
}

fn issues(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().map(text).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::mock::MockClient;
    use sacdj_core::CriterionVerdict;

    fn verdicts(compliance: [bool; 4], confidence: [f64; 4]) -> Verdicts {
        Criterion::ALL
            .iter()
            .zip(compliance.iter().zip(confidence))
            .map(|(c, (ok, conf))| (*c, CriterionVerdict::new(c.label(), *ok, "r", conf, None)))
            .collect()
    }

    fn answer(json: &'static str) -> MockClient {
        MockClient::new(move |_| Ok(json.to_string()))
    }

    const CONFIDENT_RECEVABLE: &str = r#"{"final_classification": "RECEVABLE", "final_justification": "Tous les critères sont remplis.", "final_confidence": 0.93, "is_review_required": false, "critical_issues": []}"#;

    #[tokio::test]
    async fn all_compliant_and_confident_needs_no_review() {
        let client = answer(CONFIDENT_RECEVABLE);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.90, 0.95, 0.92, 0.97]), None)
            .await
            .unwrap();
        assert_eq!(d.classification, Classification::Recevable);
        assert!(!d.is_review_required);
        assert!(d.critical_issues.is_empty());
        assert_eq!(d.summary.compliant_criteria, 4);
    }

    #[tokio::test]
    async fn low_average_confidence_forces_review() {
        let client = answer(CONFIDENT_RECEVABLE);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.9, 0.5, 0.5, 0.6]), None)
            .await
            .unwrap();
        assert!(d.is_review_required);
    }

    #[tokio::test]
    async fn missing_review_opinion_means_review() {
        let client = answer(r#"{"final_classification": "RECEVABLE", "final_confidence": 0.95}"#);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.95; 4]), None)
            .await
            .unwrap();
        assert!(d.is_review_required);
        assert_eq!(d.justification, DEFAULT_JUSTIFICATION);
    }

    #[tokio::test]
    async fn missing_final_confidence_uses_average_and_forces_review() {
        let client = answer(r#"{"final_classification": "RECEVABLE", "is_review_required": false}"#);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.8, 0.8, 0.9, 0.9]), None)
            .await
            .unwrap();
        assert!((d.confidence - 0.85).abs() < 1e-9);
        assert!(d.is_review_required);

        let client = answer(r#"{"final_classification": "RECEVABLE", "final_confidence": null, "is_review_required": false}"#);
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.9; 4]), None)
            .await
            .unwrap();
        assert!(d.is_review_required);
    }

    #[tokio::test]
    async fn null_review_opinion_means_review() {
        let client = answer(r#"{"final_classification": "RECEVABLE", "final_confidence": 0.9, "is_review_required": null, "critical_issues": []}"#);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.9; 4]), None)
            .await
            .unwrap();
        assert!(d.is_review_required);
    }

    #[tokio::test]
    async fn deterministic_policy_overrides_and_flags_divergence() {
        let client = answer(CONFIDENT_RECEVABLE);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true, false, true, true], [0.9; 4]), None)
            .await
            .unwrap();
        assert_eq!(d.classification, Classification::Irrecevable);
        assert!(d.is_review_required);
        assert!(d.critical_issues.iter().any(|i| i.starts_with("Divergence")));
    }

    #[tokio::test]
    async fn model_authoritative_policy_trusts_the_label() {
        let client = answer(CONFIDENT_RECEVABLE);
        let config = EngineConfig {
            policy: ClassificationPolicy::ModelAuthoritative,
            ..Default::default()
        };
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true, false, true, true], [0.9; 4]), None)
            .await
            .unwrap();
        assert_eq!(d.classification, Classification::Recevable);
        assert!(!d.is_review_required);

        let client = answer(r#"{"final_classification": "A_REVOIR", "final_confidence": 0.9, "is_review_required": false}"#);
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.9; 4]), None)
            .await
            .unwrap();
        assert_eq!(d.classification, Classification::Irrecevable);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let client = answer(r#"{"final_classification": "RECEVABLE", "final_confidence": 1.4, "is_review_required": false}"#);
        let config = EngineConfig::default();
        let d = DecisionAggregator::new(&client, &config)
            .decide(&verdicts([true; 4], [0.9; 4]), None)
            .await
            .unwrap();
        assert_eq!(d.confidence, 1.0);
    }

    #[tokio::test]
    async fn failed_call_is_an_aggregation_error() {
        let client = MockClient::new(|_| Err(InferenceError::Other("panne".into())));
        let config = EngineConfig::default();
        let v = verdicts([true; 4], [0.9; 4]);
        let err = DecisionAggregator::new(&client, &config)
            .decide(&v, None)
            .await
            .unwrap_err();
        let d = DecisionAggregator::failure_decision(&v, &err);
        assert_eq!(d.classification, Classification::Irrecevable);
        assert_eq!(d.confidence, 0.0);
        assert!(d.is_review_required);
        assert_eq!(d.critical_issues, vec![TECHNICAL_ISSUE.to_string()]);
        assert!(d.justification.contains("panne"));
    }

    #[test]
    fn issues_accept_loose_shapes() {
        let v: Value = serde_json::json!(["  délai dépassé ", "", 3]);
        assert_eq!(issues(Some(&v)), vec!["délai dépassé", "3"]);
        assert_eq!(issues(Some(&Value::String("pièce manquante".into()))), vec!["pièce manquante"]);
        assert!(issues(None).is_empty());
    }

    #[test]
    fn derived_classification_needs_four_valid_compliant_verdicts() {
        assert_eq!(
            derive_classification(&verdicts([true; 4], [0.9; 4])),
            Classification::Recevable
        );
        let mut v = verdicts([true; 4], [0.9; 4]);
        v.insert(Criterion::Documents, CriterionVerdict::failed("d", "timeout"));
        assert_eq!(derive_classification(&v), Classification::Irrecevable);
        v.remove(&Criterion::Documents);
        assert_eq!(derive_classification(&v), Classification::Irrecevable);
    }
}

//! Criterion analysis stage, one instance per admissibility criterion.

use sacdj_core::{CaseFacts, CriterionDefinition, CriterionVerdict, EngineConfig};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{CallKind, CompletionRequest, InferenceClient, complete_with_timeout};
use crate::decoder::{Record, decode_record};
use crate::error::StageError;
use crate::prompts::{criterion_prompt, criterion_system_prompt, excerpt};

const NO_REASONING: &str = "Analyse non disponible";

/// Evaluates one criterion against the extracted facts and a document excerpt.
pub struct CriterionAnalyzer<'a> {
    client: &'a dyn InferenceClient,
    config: &'a EngineConfig,
    definition: &'a CriterionDefinition,
}

impl<'a> CriterionAnalyzer<'a> {
    pub fn new(
        client: &'a dyn InferenceClient,
        config: &'a EngineConfig,
        definition: &'a CriterionDefinition,
    ) -> Self {
        Self {
            client,
            config,
            definition,
        }
    }

    /// Analyse the criterion. Never fails: any failure becomes a verdict with
    /// `error` set, zero confidence, and `is_compliant = false`.
    pub async fn analyze(&self, facts: &CaseFacts, content: &str) -> CriterionVerdict {
        let criterion = self.definition.criterion;
        match self.try_analyze(facts, content).await {
            Ok(verdict) => {
                info!(
                    criterion = %criterion,
                    compliant = verdict.is_compliant,
                    confidence = verdict.confidence,
                    "criterion analysed"
                );
                verdict
            }
            Err(e) => {
                warn!(criterion = %criterion, error = %e, "criterion analysis failed");
                CriterionVerdict::failed(&self.definition.name, e.to_string())
            }
        }
    }

    async fn try_analyze(
        &self,
        facts: &CaseFacts,
        content: &str,
    ) -> Result<CriterionVerdict, StageError> {
        let criterion = self.definition.criterion;
        let request = CompletionRequest {
            kind: CallKind::Criterion(criterion),
            prompt: criterion_prompt(
                self.definition,
                &facts.projection(criterion),
                excerpt(content, self.config.analysis_excerpt_chars),
            ),
            system_prompt: Some(criterion_system_prompt(self.definition)),
            temperature: self.config.inference.temperature,
            max_tokens: self.config.inference.max_tokens,
        };

        let completion =
            complete_with_timeout(self.client, &request, self.config.inference.timeout).await?;
        let record = decode_record(&completion.text)?;
        verdict_from_record(&self.definition.name, &record)
    }
}

/// Build a verdict from a decoded answer, coercing loosely-typed fields.
fn verdict_from_record(name: &str, record: &Record) -> Result<CriterionVerdict, StageError> {
    if let Some(error) = record.get("error").filter(|v| !v.is_null()) {
        return Err(StageError::Model(text(error)));
    }

    let is_compliant = record.get("is_compliant").is_some_and(truthy);
    let confidence = match record.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(value) => number(value).ok_or_else(|| {
            StageError::Malformed(format!("confidence is not a number: {value}"))
        })?,
    };
    let reasoning = record
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_REASONING);
    let source_quote = record
        .get("source_quote")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string);

    Ok(CriterionVerdict::new(
        name,
        is_compliant,
        reasoning,
        confidence,
        source_quote,
    ))
}

/// Numbers and numeric strings. `"0,85"` is accepted as well as `"0.85"`.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "oui" | "yes" | "vrai" | "1"
        ),
        _ => false,
    }
}

pub(crate) fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Entity extraction stage: document text to [`CaseFacts`].

use sacdj_core::{CaseFacts, EngineConfig};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{CallKind, CompletionRequest, InferenceClient, complete_with_timeout};
use crate::decoder::decode_record;
use crate::error::StageError;
use crate::prompts::{EXTRACTION_SYSTEM_PROMPT, excerpt, extraction_prompt};

/// Extracts the seven case facts from the leading slice of a document.
pub struct EntityExtractor<'a> {
    client: &'a dyn InferenceClient,
    config: &'a EngineConfig,
}

impl<'a> EntityExtractor<'a> {
    pub fn new(client: &'a dyn InferenceClient, config: &'a EngineConfig) -> Self {
        Self { client, config }
    }

    /// Run one extraction call.
    ///
    /// A fact the model could not find is `None` in the result, not an error.
    /// Errors are transport failures, undecodable output, an explicit `error`
    /// key in the model's answer, or an empty document (no call is made).
    pub async fn extract(&self, content: &str) -> Result<CaseFacts, StageError> {
        if content.trim().is_empty() {
            return Err(StageError::EmptyDocument);
        }

        let slice = excerpt(content, self.config.extraction_excerpt_chars);
        let request = CompletionRequest {
            kind: CallKind::Extraction,
            prompt: extraction_prompt(slice),
            system_prompt: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            temperature: self.config.inference.temperature,
            max_tokens: self.config.inference.max_tokens,
        };

        let completion =
            complete_with_timeout(self.client, &request, self.config.inference.timeout).await?;
        let record = decode_record(&completion.text).inspect_err(|e| {
            warn!(error = %e, raw = %e.raw, "extraction output could not be decoded");
        })?;

        if let Some(error) = record.get("error").filter(|v| !v.is_null()) {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(StageError::Model(message));
        }

        let facts = CaseFacts::from_record(&record);
        info!(
            extracted = facts.extracted_count(),
            applicant = facts.has_applicant(),
            dates = facts.has_any_date(),
            elapsed_ms = completion.elapsed.as_millis() as u64,
            "entities extracted"
        );
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::mock::MockClient;

    #[tokio::test]
    async fn extracts_facts_from_prose_wrapped_answer() {
        let client = MockClient::new(|_| {
            Ok(r#"Voici les entités : {"demandeur": "M. Martin", "date_recours": "02/03/2024", "montant_conteste": 830, "date_decision": null}"#.into())
        });
        let config = EngineConfig::default();
        let facts = EntityExtractor::new(&client, &config)
            .extract("Recours de M. Martin")
            .await
            .unwrap();
        assert_eq!(facts.applicant.as_deref(), Some("M. Martin"));
        assert_eq!(facts.appeal_date.as_deref(), Some("02/03/2024"));
        assert_eq!(facts.amount.as_deref(), Some("830"));
        assert!(facts.decision_date.is_none());
    }

    #[tokio::test]
    async fn empty_document_makes_no_call() {
        let client = MockClient::canned();
        let config = EngineConfig::default();
        let err = EntityExtractor::new(&client, &config)
            .extract("   \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::EmptyDocument));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn explicit_error_key_fails_the_stage() {
        let client = MockClient::new(|_| Ok(r#"{"error": "document illisible"}"#.into()));
        let config = EngineConfig::default();
        let err = EntityExtractor::new(&client, &config)
            .extract("???")
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Model(msg) if msg == "document illisible"));
    }

    #[tokio::test]
    async fn transport_and_decode_failures_are_errors() {
        let config = EngineConfig::default();

        let down = MockClient::new(|_| Err(InferenceError::Other("connexion refusée".into())));
        let err = EntityExtractor::new(&down, &config).extract("texte").await.unwrap_err();
        assert!(matches!(err, StageError::Inference(_)));

        let chatty = MockClient::new(|_| Ok("Je ne peux pas répondre.".into()));
        let err = EntityExtractor::new(&chatty, &config).extract("texte").await.unwrap_err();
        assert!(matches!(err, StageError::Decode(_)));
    }

    #[tokio::test]
    async fn prompt_carries_only_the_leading_slice() {
        let client = MockClient::new(|request| {
            assert!(request.prompt.contains("DEBUT"));
            assert!(!request.prompt.contains("FIN"));
            Ok(r#"{"demandeur": "X"}"#.into())
        });
        let config = EngineConfig {
            extraction_excerpt_chars: 10,
            ..Default::default()
        };
        let content = format!("DEBUT{}FIN", "-".repeat(50));
        EntityExtractor::new(&client, &config).extract(&content).await.unwrap();
    }
}

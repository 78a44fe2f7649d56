//! HTTP client for an Ollama inference server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sacdj_core::InferenceSettings;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::client::{Completion, CompletionRequest, InferenceClient};
use crate::error::InferenceError;

/// Pulling a model can take far longer than a completion.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Ollama client for the `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    settings: InferenceSettings,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
    stop: [&'static str; 2],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    /// Create a client from inference settings.
    ///
    /// The configured timeout bounds every HTTP request made by this client.
    pub fn new(settings: InferenceSettings) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            settings,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn generate_payload<'a>(&'a self, request: &'a CompletionRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.settings.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
                num_predict: request.max_tokens,
                stop: ["</s>", "<|end|>"],
            },
        }
    }

    /// True when the server answers on `/api/tags`.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(url = %url, error = %e, "inference service health check failed");
                false
            }
        }
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// True when the configured model is installed (tag suffixes like `:latest` match).
    pub async fn is_model_available(&self) -> Result<bool, InferenceError> {
        let models = self.list_models().await?;
        info!(available = ?models, "models on inference service");
        Ok(models.iter().any(|m| m.contains(&self.settings.model)))
    }

    /// Pull the configured model if it is not installed yet.
    pub async fn ensure_model(&self) -> Result<(), InferenceError> {
        if self.is_model_available().await? {
            return Ok(());
        }

        let url = format!("{}/api/pull", self.base_url);
        info!(model = %self.settings.model, "pulling model");
        let resp = self
            .client
            .post(&url)
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({ "name": self.settings.model, "stream": false }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "model pull failed");
            return Err(InferenceError::ModelUnavailable(self.settings.model.clone()));
        }
        info!(model = %self.settings.model, "model pulled");
        Ok(())
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let start = Instant::now();

        info!(
            kind = %request.kind,
            model = %self.settings.model,
            prompt_chars = request.prompt.len(),
            "sending inference request"
        );
        let resp = self
            .client
            .post(&url)
            .json(&self.generate_payload(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.settings.timeout)
                } else {
                    InferenceError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(kind = %request.kind, status = status.as_u16(), "inference service error");
            return Err(InferenceError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = resp.json().await?;
        let elapsed = start.elapsed();
        info!(
            kind = %request.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            eval_count = body.eval_count,
            response_chars = body.response.len(),
            "inference complete"
        );

        Ok(Completion {
            text: body.response.trim().to_string(),
            elapsed,
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CallKind;

    fn settings(base_url: &str) -> InferenceSettings {
        InferenceSettings {
            base_url: base_url.into(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            kind: CallKind::Extraction,
            prompt: "Analyse ce document".into(),
            system_prompt: Some("Tu es un expert".into()),
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OllamaClient::new(settings("http://localhost:11434/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn payload_shape() {
        let client = OllamaClient::new(settings("http://localhost:11434")).unwrap();
        let req = request();
        let payload = serde_json::to_value(client.generate_payload(&req)).unwrap();
        assert_eq!(payload["model"], "mistral:7b-instruct");
        assert_eq!(payload["system"], "Tu es un expert");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["options"]["num_predict"], 512);
        assert_eq!(payload["options"]["top_k"], 40);
    }

    #[test]
    fn payload_omits_missing_system_prompt() {
        let client = OllamaClient::new(settings("http://localhost:11434")).unwrap();
        let mut req = request();
        req.system_prompt = None;
        let payload = serde_json::to_value(client.generate_payload(&req)).unwrap();
        assert!(payload.get("system").is_none());
    }

    #[test]
    fn generate_response_tolerates_missing_fields() {
        let body: GenerateResponse = serde_json::from_str(r#"{"response": " {} "}"#).unwrap();
        assert_eq!(body.response, " {} ");
        assert_eq!(body.eval_count, 0);
    }

    #[tokio::test]
    async fn unreachable_server_is_an_inference_error() {
        let client = OllamaClient::new(settings("http://127.0.0.1:9")).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            InferenceError::Http(_) | InferenceError::Timeout(_)
        ));
        assert!(!client.health_check().await);
    }
}

//! Engine configuration: inference settings, confidence thresholds, criteria.
//!
//! Values come from the environment (see [`EngineConfig::from_env`]) on top of
//! defaults that match the production deployment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::criterion::{Criterion, CriterionDefinition};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection and sampling parameters for the inference service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub base_url: String,
    pub model: String,
    /// Timeout applied to every individual inference call.
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "mistral:7b-instruct".into(),
            timeout: Duration::from_secs(180),
            temperature: 0.1,
            max_tokens: 2048,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// Confidence bands. Scores at or above `medium` do not by themselves require review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.9,
            medium: 0.7,
            low: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn of(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// How the final classification is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Admissible iff all four criteria are met; the model's own label is only
    /// compared against this and any divergence is flagged for review.
    #[default]
    Deterministic,
    /// The decision model's label is taken as-is.
    ModelAuthoritative,
}

impl ClassificationPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Some(Self::Deterministic),
            "model" | "model_authoritative" => Some(Self::ModelAuthoritative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub inference: InferenceSettings,
    pub thresholds: ConfidenceThresholds,
    /// Characters of the document sent to the extraction call.
    pub extraction_excerpt_chars: usize,
    /// Characters of the document sent to each criterion call.
    pub analysis_excerpt_chars: usize,
    /// Valid criterion analyses needed before a decision is attempted.
    pub min_valid_analyses: usize,
    pub policy: ClassificationPolicy,
    pub criteria: Vec<CriterionDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inference: InferenceSettings::default(),
            thresholds: ConfidenceThresholds::default(),
            extraction_excerpt_chars: 3000,
            analysis_excerpt_chars: 2000,
            min_valid_analyses: 3,
            policy: ClassificationPolicy::default(),
            criteria: CriterionDefinition::defaults(),
        }
    }
}

impl EngineConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, starting from the defaults.
    ///
    /// Recognised keys: `OLLAMA_BASE_URL`, `LLM_MODEL`, `LLM_TIMEOUT` (seconds),
    /// `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`, `LLM_TOP_P`, `LLM_TOP_K`,
    /// `SACDJ_CLASSIFICATION_POLICY`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let inf = &mut config.inference;

        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            inf.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LLM_MODEL") {
            inf.model = model;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LLM_TIMEOUT")? {
            inf.timeout = Duration::from_secs(secs);
        }
        if let Some(t) = parse_var::<f32>(&lookup, "LLM_TEMPERATURE")? {
            inf.temperature = t;
        }
        if let Some(n) = parse_var::<u32>(&lookup, "LLM_MAX_TOKENS")? {
            inf.max_tokens = n;
        }
        if let Some(p) = parse_var::<f32>(&lookup, "LLM_TOP_P")? {
            inf.top_p = p;
        }
        if let Some(k) = parse_var::<u32>(&lookup, "LLM_TOP_K")? {
            inf.top_k = k;
        }
        if let Some(raw) = lookup("SACDJ_CLASSIFICATION_POLICY") {
            config.policy =
                ClassificationPolicy::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "SACDJ_CLASSIFICATION_POLICY".into(),
                    value: raw.clone(),
                    reason: "expected `deterministic` or `model`".into(),
                })?;
        }

        config.validate()?;
        debug!(
            base_url = %config.inference.base_url,
            model = %config.inference.model,
            timeout_secs = config.inference.timeout.as_secs(),
            policy = ?config.policy,
            "engine configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let in_unit = |x: f64| (0.0..=1.0).contains(&x);
        if !(in_unit(t.low) && in_unit(t.medium) && in_unit(t.high)) {
            return Err(ConfigError::Invalid(
                "confidence thresholds must lie within [0, 1]".into(),
            ));
        }
        if !(t.low <= t.medium && t.medium <= t.high) {
            return Err(ConfigError::Invalid(
                "confidence thresholds must satisfy low <= medium <= high".into(),
            ));
        }
        if self.inference.timeout.is_zero() {
            return Err(ConfigError::Invalid("inference timeout must be > 0".into()));
        }
        if !(1..=Criterion::ALL.len()).contains(&self.min_valid_analyses) {
            return Err(ConfigError::Invalid(format!(
                "min_valid_analyses must be within 1..={}",
                Criterion::ALL.len()
            )));
        }
        for criterion in Criterion::ALL {
            if self.definition(criterion).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "no definition for criterion `{criterion}`"
                )));
            }
        }
        Ok(())
    }

    pub fn definition(&self, criterion: Criterion) -> Option<&CriterionDefinition> {
        self.criteria.iter().find(|d| d.criterion == criterion)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

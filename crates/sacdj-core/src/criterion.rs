//! The four admissibility criteria and their per-criterion verdicts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four independent admissibility tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Appeal lodged within the legal deadline.
    Deadline,
    /// Applicant has standing (direct and personal interest).
    Quality,
    /// Appeal targets a contestable administrative decision.
    Object,
    /// Required supporting documents are attached.
    Documents,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Deadline,
        Criterion::Quality,
        Criterion::Object,
        Criterion::Documents,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Quality => "quality",
            Self::Object => "object",
            Self::Documents => "documents",
        }
    }

    /// Human-readable label used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Deadline => "Analyse des délais",
            Self::Quality => "Analyse de la qualité",
            Self::Object => "Analyse de l'objet",
            Self::Documents => "Analyse des documents",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Configured rule for one criterion: display name and the rule text given to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub criterion: Criterion,
    pub name: String,
    pub description: String,
    pub weight: f64,
}

impl CriterionDefinition {
    pub fn new(criterion: Criterion, name: &str, description: &str) -> Self {
        Self {
            criterion,
            name: name.to_string(),
            description: description.to_string(),
            weight: 1.0,
        }
    }

    /// The four CSPE rules.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                Criterion::Deadline,
                "Respect des délais",
                "Le recours doit être formé dans un délai de 2 mois à compter de la \
                 notification de la décision contestée.",
            ),
            Self::new(
                Criterion::Quality,
                "Qualité pour agir",
                "Le demandeur doit avoir qualité pour agir (intérêt direct et personnel).",
            ),
            Self::new(
                Criterion::Object,
                "Objet du recours",
                "L'objet du recours doit être clairement défini et porter sur une décision \
                 administrative susceptible de recours.",
            ),
            Self::new(
                Criterion::Documents,
                "Pièces justificatives",
                "Le recours doit être accompagné des pièces justificatives nécessaires.",
            ),
        ]
    }
}

/// Clamp a confidence score into `[0.0, 1.0]`. NaN maps to `0.0`.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Result of analysing one criterion.
///
/// A verdict with `error` set is *failed*, not negative: the analysis could not
/// be carried out, and it does not count towards the valid-analysis quorum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionVerdict {
    pub criterion_name: String,
    pub is_compliant: bool,
    pub reasoning: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    /// Verbatim excerpt of the document supporting the verdict.
    pub source_quote: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl CriterionVerdict {
    /// A successful verdict. The confidence is clamped.
    pub fn new(
        criterion_name: impl Into<String>,
        is_compliant: bool,
        reasoning: impl Into<String>,
        confidence: f64,
        source_quote: Option<String>,
    ) -> Self {
        Self {
            criterion_name: criterion_name.into(),
            is_compliant,
            reasoning: reasoning.into(),
            confidence: clamp_confidence(confidence),
            source_quote,
            analyzed_at: Utc::now(),
            error: None,
        }
    }

    /// A failed verdict: non-compliant, zero confidence, with the failure recorded.
    pub fn failed(criterion_name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            criterion_name: criterion_name.into(),
            is_compliant: false,
            reasoning: format!("Erreur lors de l'analyse: {error}"),
            confidence: 0.0,
            source_quote: None,
            analyzed_at: Utc::now(),
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_confidence(1.4), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(f64::INFINITY), 1.0);
    }

    #[test]
    fn new_verdict_clamps_confidence() {
        let v = CriterionVerdict::new("Respect des délais", true, "ok", 1.4, None);
        assert_eq!(v.confidence, 1.0);
        assert!(v.is_valid());
    }

    #[test]
    fn failed_verdict_shape() {
        let v = CriterionVerdict::failed("Qualité pour agir", "timeout after 5s");
        assert!(!v.is_compliant);
        assert_eq!(v.confidence, 0.0);
        assert!(v.is_failed());
        assert!(v.reasoning.contains("timeout after 5s"));
    }

    #[test]
    fn defaults_cover_every_criterion_once() {
        let defs = CriterionDefinition::defaults();
        assert_eq!(defs.len(), 4);
        for c in Criterion::ALL {
            assert_eq!(defs.iter().filter(|d| d.criterion == c).count(), 1);
        }
    }

    #[test]
    fn criterion_serializes_as_key() {
        let json = serde_json::to_string(&Criterion::Documents).unwrap();
        assert_eq!(json, "\"documents\"");
        assert_eq!(Criterion::Documents.to_string(), "documents");
    }
}

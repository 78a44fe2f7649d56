//! Case facts extracted from an appeal document.
//!
//! Every field is optional: a fact the model could not find is `None`, which is
//! a valid outcome rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::criterion::Criterion;

/// Keys the extraction prompt asks the model to fill, in schema order.
pub const FACT_KEYS: [&str; 7] = [
    "date_decision",
    "date_recours",
    "demandeur",
    "objet_recours",
    "montant_conteste",
    "autorite_competente",
    "type_decision",
];

/// Structured facts of a CSPE recourse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFacts {
    /// Date of the contested decision.
    pub decision_date: Option<String>,
    /// Date the appeal was lodged.
    pub appeal_date: Option<String>,
    pub applicant: Option<String>,
    /// Object of the appeal.
    pub object: Option<String>,
    /// Contested amount, as written in the document.
    pub amount: Option<String>,
    /// Authority that took the contested decision.
    pub authority: Option<String>,
    pub decision_type: Option<String>,
}

impl CaseFacts {
    /// Build facts from a decoded model record keyed by [`FACT_KEYS`].
    ///
    /// Nulls, blanks, and the literal strings `"null"` / `"N/A"` are treated as
    /// absent. Numbers are kept in their textual form (e.g. an amount of `1500`).
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let field = |key: &str| record.get(key).and_then(text_value);
        Self {
            decision_date: field("date_decision"),
            appeal_date: field("date_recours"),
            applicant: field("demandeur"),
            object: field("objet_recours"),
            amount: field("montant_conteste"),
            authority: field("autorite_competente"),
            decision_type: field("type_decision"),
        }
    }

    pub fn has_applicant(&self) -> bool {
        self.applicant.is_some()
    }

    /// True when at least one of the two dates was extracted.
    pub fn has_any_date(&self) -> bool {
        self.decision_date.is_some() || self.appeal_date.is_some()
    }

    /// Number of facts that were extracted.
    pub fn extracted_count(&self) -> usize {
        [
            &self.decision_date,
            &self.appeal_date,
            &self.applicant,
            &self.object,
            &self.amount,
            &self.authority,
            &self.decision_type,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }

    /// The subset of facts relevant to one criterion, as sent to the model.
    ///
    /// Dates, applicant, object and authority are always included; the amount
    /// only matters for standing and object, the decision type only for object
    /// and supporting documents.
    pub fn projection(&self, criterion: Criterion) -> Value {
        let mut out = Map::new();
        out.insert(
            "dates".into(),
            json!({
                "date_decision": self.decision_date,
                "date_recours": self.appeal_date,
            }),
        );
        out.insert("demandeur".into(), json!(self.applicant));
        out.insert("objet".into(), json!(self.object));
        if matches!(criterion, Criterion::Quality | Criterion::Object) {
            out.insert("montant".into(), json!(self.amount));
        }
        out.insert("autorite".into(), json!(self.authority));
        if matches!(criterion, Criterion::Object | Criterion::Documents) {
            out.insert("type_decision".into(), json!(self.decision_type));
        }
        Value::Object(out)
    }

    /// All facts keyed by [`FACT_KEYS`], for the decision prompt.
    pub fn to_record(&self) -> Value {
        json!({
            "date_decision": self.decision_date,
            "date_recours": self.appeal_date,
            "demandeur": self.applicant,
            "objet_recours": self.object,
            "montant_conteste": self.amount,
            "autorite_competente": self.authority,
            "type_decision": self.decision_type,
        })
    }
}

fn text_value(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = s.to_ascii_lowercase();
    if s.is_empty() || lowered == "null" || lowered == "n/a" || lowered == "none" {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn from_record_reads_all_keys() {
        let facts = CaseFacts::from_record(&record(json!({
            "date_decision": "15/03/2024",
            "date_recours": "10/05/2024",
            "demandeur": "SARL du Pont",
            "objet_recours": "Remboursement CSPE 2009-2014",
            "montant_conteste": "12 450 €",
            "autorite_competente": "CRE",
            "type_decision": "Rejet implicite",
        })));
        assert_eq!(facts.applicant.as_deref(), Some("SARL du Pont"));
        assert_eq!(facts.authority.as_deref(), Some("CRE"));
        assert_eq!(facts.extracted_count(), 7);
    }

    #[test]
    fn null_like_values_are_absent() {
        let facts = CaseFacts::from_record(&record(json!({
            "date_decision": null,
            "date_recours": "  ",
            "demandeur": "null",
            "objet_recours": "N/A",
            "montant_conteste": 1500,
            "autorite_competente": false,
        })));
        assert!(!facts.has_applicant());
        assert!(!facts.has_any_date());
        assert_eq!(facts.amount.as_deref(), Some("1500"));
        assert!(facts.authority.is_none());
        assert_eq!(facts.extracted_count(), 1);
    }

    #[test]
    fn projection_varies_by_criterion() {
        let facts = CaseFacts {
            amount: Some("100".into()),
            decision_type: Some("Rejet".into()),
            ..Default::default()
        };

        let deadline = facts.projection(Criterion::Deadline);
        assert!(deadline.get("montant").is_none());
        assert!(deadline.get("type_decision").is_none());
        assert!(deadline.get("dates").is_some());

        let quality = facts.projection(Criterion::Quality);
        assert_eq!(quality["montant"], "100");
        assert!(quality.get("type_decision").is_none());

        let object = facts.projection(Criterion::Object);
        assert_eq!(object["montant"], "100");
        assert_eq!(object["type_decision"], "Rejet");

        let documents = facts.projection(Criterion::Documents);
        assert!(documents.get("montant").is_none());
        assert_eq!(documents["type_decision"], "Rejet");
    }
}

//! Vertical card display for analysis results.
//!
//! Renders a terminal [`CaseState`] as a grouped, human-readable card: the
//! decision first, then the extracted facts, the four verdicts, issues and
//! processing metadata. Empty sections are skipped.

use std::fmt::Write;

use sacdj_core::{
    CaseFacts, CaseState, ConfidenceLevel, ConfidenceThresholds, Criterion, EngineConfig,
};

const MAX_TEXT: usize = 100;

// ── Public API ──

pub fn print_decision_card(state: &CaseState, thresholds: &ConfidenceThresholds) {
    print!("{}", render_decision_card(state, thresholds));
}

pub fn print_facts(facts: &CaseFacts) {
    print!("{}", render_facts(facts));
}

pub fn print_criteria(config: &EngineConfig) {
    print!("{}", render_criteria(config));
}

// ── Rendering ──

pub fn render_decision_card(state: &CaseState, thresholds: &ConfidenceThresholds) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", state.document_id);
    let label = state
        .final_classification
        .map_or("NON DÉCIDÉ", |c| c.as_str());
    let _ = writeln!(
        out,
        "{label}{}",
        if state.is_review_required {
            "  (révision requise)"
        } else {
            ""
        }
    );
    out.push('\n');

    let mut decision = Vec::new();
    if let Some(confidence) = state.final_confidence {
        let level = ConfidenceLevel::of(confidence, thresholds);
        decision.push(("confiance", format!("{confidence:.2} ({})", level.as_str())));
    }
    if let Some(justification) = &state.final_justification {
        decision.push(("justification", truncate(justification, MAX_TEXT)));
    }
    decision.push(("statut", format!("{:?}", state.status).to_lowercase()));
    section(&mut out, "Décision", &decision);

    if let Some(facts) = &state.facts {
        out.push_str(&render_facts(facts));
    }

    let mut verdicts = Vec::new();
    for criterion in Criterion::ALL {
        let line = match state.verdict(criterion) {
            None => "absente".to_string(),
            Some(v) if v.is_failed() => {
                format!("ÉCHEC  {}", truncate(v.error.as_deref().unwrap_or(""), MAX_TEXT))
            }
            Some(v) => format!(
                "{}  {:.2}  {}",
                if v.is_compliant { "conforme" } else { "non conforme" },
                v.confidence,
                truncate(&v.reasoning, MAX_TEXT)
            ),
        };
        verdicts.push((criterion.key(), line));
    }
    section(&mut out, "Critères", &verdicts);

    let issues: Vec<_> = state
        .critical_issues
        .iter()
        .map(|i| ("-", truncate(i, MAX_TEXT)))
        .collect();
    section(&mut out, "Problèmes critiques", &issues);

    let warnings: Vec<_> = state
        .warnings
        .iter()
        .map(|w| ("-", w.clone()))
        .collect();
    section(&mut out, "Avertissements", &warnings);

    let mut processing = Vec::new();
    if let Some(error) = &state.error_message {
        processing.push(("erreur", truncate(error, MAX_TEXT)));
    }
    let stages: Vec<&str> = state.stages.iter().map(|s| s.as_str()).collect();
    processing.push(("étapes", stages.join(" → ")));
    if let Some(elapsed) = state.processing_time() {
        processing.push(("durée", format!("{} ms", elapsed.num_milliseconds())));
    }
    section(&mut out, "Traitement", &processing);

    out
}

pub fn render_criteria(config: &EngineConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Critères");
    for def in &config.criteria {
        let _ = writeln!(
            out,
            "  {:<26} {}  (poids {:.1})",
            def.criterion.key(),
            def.name,
            def.weight
        );
        let _ = writeln!(out, "    {}", def.description);
    }
    out.push('\n');

    let t = &config.thresholds;
    let thresholds = [
        ("high", format!("{:.2}", t.high)),
        ("medium", format!("{:.2}", t.medium)),
        ("low", format!("{:.2}", t.low)),
        ("min_valid_analyses", config.min_valid_analyses.to_string()),
        ("policy", format!("{:?}", config.policy)),
    ];
    section(&mut out, "Seuils de confiance", &thresholds);
    out
}

pub fn render_facts(facts: &CaseFacts) -> String {
    let rows: Vec<(&str, String)> = [
        ("date_decision", &facts.decision_date),
        ("date_recours", &facts.appeal_date),
        ("demandeur", &facts.applicant),
        ("objet_recours", &facts.object),
        ("montant_conteste", &facts.amount),
        ("autorite_competente", &facts.authority),
        ("type_decision", &facts.decision_type),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_ref().map(|v| (name, truncate(v, MAX_TEXT))))
    .collect();

    let mut out = String::new();
    section(&mut out, "Faits extraits", &rows);
    out
}

fn section(out: &mut String, header: &str, rows: &[(&str, String)]) {
    if rows.is_empty() {
        return;
    }
    let _ = writeln!(out, "{header}");
    for (name, value) in rows {
        let _ = writeln!(out, "  {name:<26} {value}");
    }
    out.push('\n');
}

/// Cut `text` to `max` characters, marking the cut with `...`.
fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sacdj_core::{AnalysisSummary, Classification, CriterionVerdict, Decision, StageUpdate, Verdicts};

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("délai", 10), "délai");
        assert_eq!(truncate("éééééééé", 6), "ééé...");
    }

    #[test]
    fn card_shows_decision_and_failed_criteria() {
        let mut verdicts = Verdicts::new();
        verdicts.insert(
            Criterion::Deadline,
            CriterionVerdict::new("Respect des délais", true, "Dans les délais.", 0.92, None),
        );
        verdicts.insert(Criterion::Quality, CriterionVerdict::failed("Qualité", "timeout"));
        let state = CaseState::new("recours-17", "texte")
            .apply(StageUpdate::Verdicts(verdicts.clone()))
            .apply(StageUpdate::Decision(Decision {
                classification: Classification::Irrecevable,
                justification: "Critère de qualité non établi.".into(),
                confidence: 0.4,
                is_review_required: true,
                critical_issues: vec!["Qualité pour agir incertaine".into()],
                summary: AnalysisSummary::from_verdicts(&verdicts),
            }));

        let card = render_decision_card(&state, &ConfidenceThresholds::default());
        assert!(card.starts_with("=== recours-17 ==="));
        assert!(card.contains("IRRECEVABLE  (révision requise)"));
        assert!(card.contains("0.40 (low)"));
        assert!(card.contains("ÉCHEC  timeout"));
        assert!(card.contains("conforme  0.92"));
        assert!(card.contains("Qualité pour agir incertaine"));
        assert!(card.contains("analyse manquante: object"));
        assert!(!card.contains("Faits extraits"));
    }

    #[test]
    fn criteria_listing_shows_weights() {
        let mut config = EngineConfig::default();
        config.criteria[1].weight = 2.0;
        let listing = render_criteria(&config);
        assert!(listing.contains("deadline"));
        assert!(listing.contains("(poids 1.0)"));
        assert!(listing.contains("(poids 2.0)"));
        assert!(listing.contains("min_valid_analyses"));
    }

    #[test]
    fn facts_skip_missing_values() {
        let facts = CaseFacts {
            applicant: Some("SARL du Pont".into()),
            ..Default::default()
        };
        let rendered = render_facts(&facts);
        assert!(rendered.contains("demandeur"));
        assert!(!rendered.contains("date_decision"));
        assert!(render_facts(&CaseFacts::default()).is_empty());
    }
}

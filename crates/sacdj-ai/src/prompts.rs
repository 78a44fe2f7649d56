//! Prompt templates for the three kinds of inference call.

use sacdj_core::{CaseFacts, CriterionDefinition, Verdicts};
use serde_json::{Value, json};

// ── Extraction ──

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
Tu es un expert en analyse de documents juridiques français. \
Tu dois extraire les informations clés des recours CSPE avec une précision maximale. \
Réponds UNIQUEMENT avec un JSON valide, sans texte supplémentaire.";

pub fn extraction_prompt(excerpt: &str) -> String {
    format!(
        "Analyse ce document juridique et extrais les informations suivantes :\n\
         \n\
         DOCUMENT :\n\
         ---\n\
         {excerpt}\n\
         ---\n\
         \n\
         Extrais ces informations (utilise null si introuvable) :\n\
         \n\
         {{\n  \
           \"date_decision\": \"date de la décision contestée (format DD/MM/YYYY)\",\n  \
           \"date_recours\": \"date du recours (format DD/MM/YYYY)\",\n  \
           \"demandeur\": \"nom du demandeur\",\n  \
           \"objet_recours\": \"objet de la contestation\",\n  \
           \"montant_conteste\": \"montant contesté en euros\",\n  \
           \"autorite_competente\": \"autorité qui a pris la décision\",\n  \
           \"type_decision\": \"type de décision contestée\"\n\
         }}\n\
         \n\
         Réponds uniquement avec le JSON, sans explication."
    )
}

// ── Criterion analysis ──

pub fn criterion_system_prompt(definition: &CriterionDefinition) -> String {
    format!(
        "Tu es un expert juridique spécialisé dans l'analyse des recours CSPE. \
         Analyse le critère '{}' avec rigueur et objectivité. \
         Réponds UNIQUEMENT avec un JSON valide.",
        definition.name
    )
}

pub fn criterion_prompt(definition: &CriterionDefinition, facts: &Value, excerpt: &str) -> String {
    format!(
        "CRITÈRE À ANALYSER : {name}\n\
         \n\
         RÈGLE JURIDIQUE :\n\
         {rule}\n\
         \n\
         ENTITÉS EXTRAITES :\n\
         {facts}\n\
         \n\
         DOCUMENT (extrait) :\n\
         ---\n\
         {excerpt}\n\
         ---\n\
         \n\
         Analyse si ce critère est respecté selon les règles CSPE.\n\
         \n\
         Réponds avec ce JSON exact :\n\
         {{\n  \
           \"is_compliant\": true/false,\n  \
           \"reasoning\": \"Explication détaillée de ton analyse en 2-3 phrases\",\n  \
           \"confidence\": 0.XX,\n  \
           \"source_quote\": \"Citation exacte du document qui justifie ta décision ou null\"\n\
         }}",
        name = definition.name,
        rule = definition.description,
        facts = pretty(facts),
    )
}

// ── Final decision ──

pub const DECISION_SYSTEM_PROMPT: &str = "\
Tu es un expert juridique du Conseil d'État. \
Prends une décision finale de recevabilité basée sur l'analyse des 4 critères CSPE. \
Réponds UNIQUEMENT avec un JSON valide.";

pub fn decision_prompt(verdicts: &Verdicts, facts: Option<&CaseFacts>) -> String {
    let analyses: serde_json::Map<String, Value> = verdicts
        .iter()
        .map(|(criterion, verdict)| {
            (
                criterion.key().to_string(),
                json!({
                    "criterion_name": verdict.criterion_name,
                    "is_compliant": verdict.is_compliant,
                    "reasoning": verdict.reasoning,
                    "confidence": verdict.confidence,
                    "source_quote": verdict.source_quote,
                    "error": verdict.error,
                }),
            )
        })
        .collect();
    let facts = facts.map(CaseFacts::to_record).unwrap_or(Value::Null);

    format!(
        "ENTITÉS EXTRAITES :\n\
         {facts}\n\
         \n\
         ANALYSES DES 4 CRITÈRES CSPE :\n\
         {analyses}\n\
         \n\
         RÈGLE DE DÉCISION :\n\
         - RECEVABLE : TOUS les critères doivent être respectés\n\
         - IRRECEVABLE : AU MOINS UN critère non respecté\n\
         \n\
         Analyse et décide :\n\
         \n\
         {{\n  \
           \"final_classification\": \"RECEVABLE\" ou \"IRRECEVABLE\",\n  \
           \"final_justification\": \"Justification détaillée de la décision en 3-4 phrases\",\n  \
           \"final_confidence\": 0.XX,\n  \
           \"is_review_required\": true/false,\n  \
           \"critical_issues\": [\"liste des problèmes majeurs ou vide si aucun\"]\n\
         }}",
        facts = pretty(&facts),
        analyses = pretty(&Value::Object(analyses)),
    )
}

// ── Helpers ──

/// The first `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

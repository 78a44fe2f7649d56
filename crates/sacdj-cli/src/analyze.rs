//! Command drivers: document loading, pipeline construction, health checks.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use sacdj_ai::{MockClient, OllamaClient, Pipeline};
use sacdj_core::{CaseFacts, CaseState, EngineConfig, StageUpdate};
use tracing::{info, warn};

pub fn build_pipeline(config: EngineConfig, mock: bool) -> anyhow::Result<Pipeline> {
    if mock {
        info!("using the scripted mock model");
        return Ok(Pipeline::new(Arc::new(MockClient::canned()), config));
    }
    let client = OllamaClient::new(config.inference.clone()).context("building inference client")?;
    info!(base_url = client.base_url(), model = %config.inference.model, "using inference service");
    Ok(Pipeline::new(Arc::new(client), config))
}

pub fn read_document(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// The file stem, or the whole path when there is none.
pub fn document_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the extraction stage alone and return the facts.
pub async fn extract_only(
    pipeline: &Pipeline,
    document_id: String,
    content: String,
) -> anyhow::Result<CaseFacts> {
    let state = CaseState::new(document_id, content);
    match pipeline.extract(&state).await {
        StageUpdate::Facts(facts) => Ok(facts),
        StageUpdate::ExtractionFailed(message) => bail!(message),
        other => bail!("unexpected extraction result: {other:?}"),
    }
}

pub async fn health(client: &OllamaClient, pull: bool) -> anyhow::Result<()> {
    if !client.health_check().await {
        bail!("inference service unreachable at {}", client.base_url());
    }
    println!("  {:<26} {}", "service", client.base_url());

    let available = client
        .is_model_available()
        .await
        .context("listing installed models")?;
    if available {
        println!("  {:<26} installed", "model");
        return Ok(());
    }
    if !pull {
        warn!("model not installed; rerun with --pull to download it");
        println!("  {:<26} missing", "model");
        return Ok(());
    }
    client.ensure_model().await.context("pulling model")?;
    println!("  {:<26} pulled", "model");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_the_file_stem() {
        assert_eq!(document_id(Path::new("/tmp/recours-2024-017.txt")), "recours-2024-017");
        assert_eq!(document_id(Path::new("recours")), "recours");
    }

    #[test]
    fn pipeline_uses_the_configured_model() {
        let mut config = EngineConfig::default();
        config.inference.model = "llama3:8b".into();
        let pipeline = build_pipeline(config.clone(), false).unwrap();
        assert_eq!(pipeline.model_name(), "llama3:8b");
        assert_eq!(build_pipeline(config, true).unwrap().model_name(), "mock");
    }

    #[tokio::test]
    async fn extract_only_with_mock() {
        let pipeline = build_pipeline(EngineConfig::default(), true).unwrap();
        let facts = extract_only(&pipeline, "doc".into(), "Recours CSPE".into())
            .await
            .unwrap();
        assert!(facts.has_applicant());
    }

    #[tokio::test]
    async fn extract_only_reports_empty_document() {
        let pipeline = build_pipeline(EngineConfig::default(), true).unwrap();
        let err = extract_only(&pipeline, "doc".into(), String::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}

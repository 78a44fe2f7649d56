mod analyze;
mod display;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sacdj_ai::OllamaClient;
use sacdj_core::EngineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sacdj",
    about = "Admissibility analysis of CSPE appeals with a local language model",
    version
)]
struct Cli {
    /// Debug-level logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis on a text document
    Analyze(AnalyzeArgs),
    /// Run only the entity extraction stage
    Extract(ExtractArgs),
    /// Check the inference service and the configured model
    Health {
        /// Pull the model if it is not installed
        #[arg(long)]
        pull: bool,
    },
    /// List the configured criteria and confidence thresholds
    Criteria,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// UTF-8 text file holding the appeal
    file: PathBuf,
    /// Document identifier (defaults to the file stem)
    #[arg(long)]
    id: Option<String>,
    /// Print the final case state as JSON instead of a card
    #[arg(long)]
    json: bool,
    /// Use the scripted mock model instead of the inference service
    #[arg(long, env = "SACDJ_MOCK_LLM")]
    mock: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    file: PathBuf,
    #[arg(long, env = "SACDJ_MOCK_LLM")]
    mock: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::from_env().context("reading engine configuration")?;

    match cli.command {
        Command::Analyze(args) => {
            let pipeline = analyze::build_pipeline(config, args.mock)?;
            let content = analyze::read_document(&args.file)?;
            let id = args
                .id
                .unwrap_or_else(|| analyze::document_id(&args.file));
            let state = pipeline.run(id, content).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                display::print_decision_card(&state, &pipeline.config().thresholds);
            }
        }
        Command::Extract(args) => {
            let pipeline = analyze::build_pipeline(config, args.mock)?;
            let content = analyze::read_document(&args.file)?;
            let facts = analyze::extract_only(&pipeline, analyze::document_id(&args.file), content)
                .await?;
            display::print_facts(&facts);
        }
        Command::Health { pull } => {
            let client = OllamaClient::new(config.inference.clone())
                .context("building inference client")?;
            analyze::health(&client, pull).await?;
        }
        Command::Criteria => display::print_criteria(&config),
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

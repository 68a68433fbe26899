// Sommelier - Tiered wine identification service
// Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use sommelier::cache::IdentificationCache;
use sommelier::config::{constants, load_config};
use sommelier::identify::{EscalationController, Tier};
use sommelier::intent::IntentClassifier;
use sommelier::providers::create_providers;
use sommelier::server::{AppState, IdentifyServer};
use sommelier::usage::{UsageHandle, UsageRecorder};

#[derive(Parser)]
#[command(name = "sommelier", version, about = "Tiered wine identification service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the usage summary for one day.
    Usage {
        /// Date as YYYY-MM-DD; defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Usage { date }) => print_usage_summary(date),
        Some(Command::Serve { bind }) => serve(bind).await,
        None => serve(None).await,
    }
}

async fn serve(bind: Option<String>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }

    let providers = create_providers(&config.providers, &config.pricing)?;
    let ladder = EscalationController::bind_ladder(&config, &providers)?;

    let cache = Arc::new(IdentificationCache::new(
        config.cache.dir.clone(),
        config.cache.ttl_days,
    )?);
    let recorder = UsageRecorder::new(config.usage_dir.clone())?;
    let usage = UsageHandle::spawn(recorder.clone());

    // The intent classifier falls back to the tier1 provider's default
    // model, which is the cheapest call the ladder makes anyway.
    let intent_provider = ladder
        .iter()
        .find(|b| b.tier == Tier::Tier1)
        .map(|b| b.provider.clone());
    let classifier = Arc::new(IntentClassifier::new(
        intent_provider,
        Duration::from_secs(constants::DEFAULT_INTENT_TIMEOUT_SECS),
    ));

    let controller = Arc::new(
        EscalationController::new(ladder, config.escalation, cache, usage)
            .with_classifier(classifier),
    );

    let state = AppState {
        controller,
        recorder: Arc::new(recorder),
    };
    IdentifyServer::new(state, config.server).serve().await
}

fn print_usage_summary(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    let recorder = UsageRecorder::new(config.usage_dir)?;
    let date =
        date.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
    let summary = recorder.summary(&date)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

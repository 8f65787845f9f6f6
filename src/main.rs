use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keywind::config::{Config, Endpoint};
use keywind::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "keywind",
    version,
    about = "Resolve keyword search metrics across a fleet of batch endpoints",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve metrics for a list of keywords
    Resolve {
        /// File with one keyword per line (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// TOML config file (environment variables when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the result JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override configured endpoint base URLs (repeatable)
        #[arg(long)]
        endpoint: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Resolve {
            input,
            config,
            output,
            endpoint,
        } => {
            resolve(input, config, output, endpoint).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("keywind=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("keywind=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn resolve(
    input: Option<PathBuf>,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
    endpoint_overrides: Vec<String>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    if !endpoint_overrides.is_empty() {
        config.endpoints = endpoint_overrides.into_iter().map(Endpoint::new).collect();
    }

    config.validate()?;

    let keywords = read_keywords(input.as_deref()).await?;
    tracing::info!(
        keywords = keywords.len(),
        endpoints = config.endpoints.len(),
        "starting resolution"
    );

    let orchestrator = Orchestrator::new(&config)?;
    let results = orchestrator.resolve(&keywords).await;

    for summary in orchestrator.health_summary().await {
        tracing::info!(
            endpoint = %summary.endpoint,
            state = ?summary.state,
            requests = summary.total_requests,
            success_rate = format!("{:.2}", summary.success_rate),
            health_score = format!("{:.1}", summary.health_score),
            "endpoint health"
        );
    }

    let json = serde_json::to_string_pretty(&results)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, &json)
                .await
                .with_context(|| format!("Failed to write results to {}", path.display()))?;
            tracing::info!(path = %path.display(), resolved = results.len(), "results written");
        }
        None => println!("{json}"),
    }

    Ok(())
}

async fn read_keywords(path: Option<&Path>) -> Result<Vec<String>> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read keyword file: {}", path.display()))?,
        None => {
            use tokio::io::AsyncReadExt;
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read keywords from stdin")?;
            buffer
        }
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forecast_advisor::{
    config::{Config, LogFormat},
    Orchestrator, PipeAdvisor, SessionParams, StaticKnowledgeSource,
};

/// Run one forecast-adjustment advisory session and print the result as JSON.
#[derive(Debug, Parser)]
#[command(name = "forecast-advisor", version, about)]
struct Cli {
    /// What the adjustment should achieve
    #[arg(long)]
    intent: String,

    /// Why the human believes the forecast needs adjusting
    #[arg(long)]
    reasoning: String,

    /// Knowledge bundle (JSON); defaults to KNOWLEDGE_PATH
    #[arg(long)]
    knowledge: Option<PathBuf>,

    /// Session identifier; a random one is generated when omitted
    #[arg(long)]
    session_id: Option<String>,

    /// Iteration ceiling for this session
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Wall-clock ceiling for this session, in seconds
    #[arg(long)]
    wall_clock_secs: Option<u64>,

    /// Print per-round events to stderr
    #[arg(long)]
    stream: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Forecast advisor starting...");

    // Load knowledge bundle
    let knowledge_path = cli.knowledge.clone().unwrap_or_else(|| config.knowledge.path.clone());
    let knowledge = match StaticKnowledgeSource::from_file(&knowledge_path).await {
        Ok(k) => {
            info!(path = %knowledge_path.display(), "Knowledge bundle loaded");
            k
        }
        Err(e) => {
            error!(error = %e, path = %knowledge_path.display(), "Failed to load knowledge bundle");
            return Err(e.into());
        }
    };

    // Initialize advisor client
    let advisor = match PipeAdvisor::new(&config.advisor, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.advisor.base_url, pipe = %config.advisor.pipe, "Advisor client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize advisor client");
            return Err(e.into());
        }
    };

    // A pipe we cannot create may still exist; the session reports outages itself.
    if let Err(e) = advisor.ensure_pipe().await {
        warn!(error = %e, "Could not ensure advisor pipe exists");
    }

    let orchestrator = Orchestrator::new(
        Arc::new(advisor),
        Arc::new(knowledge),
        config.session.clone(),
        &config.request,
    );

    let mut params = SessionParams::new(cli.intent, cli.reasoning);
    params.session_id = cli.session_id;
    params.max_iterations = cli.max_iterations;
    params.wall_clock_secs = cli.wall_clock_secs;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (events, printer) = if cli.stream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => eprintln!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize round event"),
                }
            }
        });
        (Some(tx), Some(printer))
    } else {
        (None, None)
    };

    let output = orchestrator.run_with(params, events, cancel).await?;

    if let Some(printer) = printer {
        let _ = printer.await;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

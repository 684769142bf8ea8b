//! opflow - run one analysis operation from the command line
//!
//! Prints every event as a JSON line, then the outcome.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

use opflow::{AnalysisApi, Config, EventSink, OperationController, ParsedEvent};

const SLOT: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "opflow", version, about = "Run a long-running analysis operation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a job and poll its status
    Poll {
        /// Submit path, relative to OPFLOW_BASE_URL
        #[arg(long)]
        path: String,
        /// JSON request body
        #[arg(long, default_value = "{}")]
        body: String,
        /// Status path; defaults to OPFLOW_STATUS_PATH
        #[arg(long)]
        status_path: Option<String>,
    },
    /// Consume a server-sent event stream
    Sse {
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
    /// Consume a newline-delimited JSON stream
    Ndjson {
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
}

/// Writes each event to stdout as one JSON line.
struct JsonLines;

impl EventSink for JsonLines {
    fn emit(&self, event: ParsedEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}", line);
            }
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
    }
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("--body must be valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opflow=info".into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    opflow::metrics::describe_metrics();

    let api = AnalysisApi::new(config)?;
    let strategy = match &cli.command {
        Command::Poll {
            path,
            body,
            status_path,
        } => {
            let status_path = status_path
                .clone()
                .unwrap_or_else(|| api.config().status_path.clone());
            api.poll(path, &status_path, parse_body(body)?)
        }
        Command::Sse { path, body } => {
            api.sse(path, parse_body(body)?, opflow::EventVocabulary::standard())
        }
        Command::Ndjson { path, body } => api.ndjson(
            path,
            parse_body(body)?,
            opflow::framing::NdjsonRecordParser::default(),
        ),
    };
    info!(strategy = ?strategy, "Starting operation");

    let controller = OperationController::new();
    let sink: Arc<dyn EventSink> = Arc::new(JsonLines);
    let handle = controller.start(SLOT, strategy, sink);

    let outcome = tokio::select! {
        outcome = handle.completion() => outcome,
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, cancelling operation");
            controller.cancel_slot(SLOT);
            handle.completion().await
        }
    };

    println!("{}", serde_json::to_string(&outcome)?);
    info!(outcome = outcome.label(), "Operation finished");

    if outcome.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

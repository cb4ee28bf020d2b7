//! Error recovery engine - command line entry point
//!
//! Classifies errors, or replays a JSON-lines stream of errors through a
//! configured handler and prints the outcomes.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use error_recovery_engine::{
    classify_error,
    logging::{init_logging, LogConfig},
    ports::ConnectivitySignal,
    ConfigLoader, Context, ErrorHandler, HandlerConfig, Ports, RawError,
};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

/// Error recovery engine CLI
#[derive(Parser, Debug)]
#[command(name = "error-recovery")]
#[command(about = "Classify errors and run them through the recovery engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ERROR_HANDLER_LOG_JSON")]
    json_logs: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "ERROR_HANDLER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the kind an error classifies as
    Classify {
        /// Error message
        #[arg(short, long)]
        message: Option<String>,

        /// HTTP status code
        #[arg(short, long)]
        status: Option<u16>,
    },
    /// Handle every error in a JSON-lines file and print each result
    Handle {
        /// Input file, stdin when omitted
        input: Option<PathBuf>,

        /// Treat the device as offline
        #[arg(long)]
        offline: bool,
    },
    /// Handle every error in a JSON-lines file and print the statistics
    Stats {
        /// Input file, stdin when omitted
        input: Option<PathBuf>,

        /// Treat the device as offline
        #[arg(long)]
        offline: bool,

        /// Also report whether more than this many errors are recent
        #[arg(long)]
        threshold: Option<usize>,
    },
}

/// One input line: `{"message": "...", "status": 503, "context": {...}}`
#[derive(Debug, Deserialize)]
struct ErrorLine {
    #[serde(flatten)]
    error: RawError,
    #[serde(default)]
    context: Context,
}

impl Cli {
    fn initialize_logging(&self) -> anyhow::Result<()> {
        let level = if self.debug { Level::DEBUG } else { Level::INFO };
        let config = LogConfig::from_env()
            .with_level(level)
            .with_json(self.json_logs);
        init_logging(config)?;
        Ok(())
    }

    fn load_config(&self) -> anyhow::Result<HandlerConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        Ok(loader.load()?)
    }
}

fn read_lines(input: Option<&PathBuf>) -> anyhow::Result<Vec<ErrorLine>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ErrorLine>(&line) {
            Ok(parsed) => lines.push(parsed),
            Err(e) => warn!("Skipping line {}: {}", index + 1, e),
        }
    }
    Ok(lines)
}

fn build_handler(config: HandlerConfig, offline: bool) -> anyhow::Result<ErrorHandler> {
    let ports = Ports::system(config.endpoints.probe_timeout, &config.user_agent)?
        .with_connectivity(Arc::new(ConnectivitySignal::new(!offline)));
    Ok(ErrorHandler::new(config, ports)?)
}

/// Stop recovery on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling recovery");
            canceller.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.initialize_logging()?;

    match &cli.command {
        Command::Classify { message, status } => {
            let error = RawError {
                message: message.clone(),
                status: *status,
            };
            let kind = classify_error(Some(&error));
            println!("{}\t{}", kind, kind.user_message());
        }
        Command::Handle { input, offline } => {
            let handler = build_handler(cli.load_config()?, *offline)?;
            let cancel = cancel_on_ctrl_c();

            for line in read_lines(input.as_ref())? {
                let result = handler
                    .handle_error_with_cancel(line.error, line.context, cancel.clone())
                    .await;
                println!("{}", serde_json::to_string(&result)?);
            }
            info!("Retry statistics: {:?}", handler.retry_stats());
        }
        Command::Stats {
            input,
            offline,
            threshold,
        } => {
            let handler = build_handler(cli.load_config()?, *offline)?;
            let cancel = cancel_on_ctrl_c();

            for line in read_lines(input.as_ref())? {
                handler
                    .handle_error_with_cancel(line.error, line.context, cancel.clone())
                    .await;
            }

            let stats = handler.get_error_statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            if let Some(threshold) = threshold {
                println!(
                    "error rate too high (> {}): {}",
                    threshold,
                    handler.is_error_rate_too_high(*threshold)
                );
            }
        }
    }

    Ok(())
}

//! # BizzMQ CLI
//!
//! Command-line interface for operating BizzMQ queues.
//!
//! This module provides CLI commands for:
//! - Creating queues
//! - Publishing JSON payloads
//! - Consuming a queue and printing what arrives
//! - Showing the resolved configuration
//! - Recovering entries stranded by crashed consumers

use bizzmq::{
    handler_fn, BizzMq, BizzMqConfig, ConfigurationError, HandlerError, MessageOptions,
    QueueError, QueueOptions,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// CLI Structure
// ============================================================================

/// BizzMQ CLI - Redis-backed message queues
#[derive(Debug, Parser)]
#[command(name = "bizzmq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate BizzMQ message queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BIZZMQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Redis connection URL, overrides the configuration
    #[arg(long, env = "BIZZMQ_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Logging level (ignored when RUST_LOG is set)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a queue (no-op if it already exists)
    CreateQueue {
        /// Queue name
        name: String,

        /// Route messages that exhaust their retries to <name>_dlq
        #[arg(long)]
        dead_letter: bool,

        /// Redeliveries allowed before a message is dead-lettered
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Publish a JSON payload and print its message id
    Publish {
        /// Queue name
        queue: String,

        /// Payload as a JSON document
        payload: String,

        /// Informational priority stored with the message
        #[arg(short, long, default_value = "0")]
        priority: i64,
    },

    /// Consume a queue, printing each payload as one JSON line
    Consume {
        /// Queue name
        queue: String,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// Show the resolved configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "toml")]
        format: ConfigFormat,
    },

    /// Return entries stranded in a queue's pending list to the queue
    Recover {
        /// Queue name
        queue: String,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Logging { .. } => 4,
            Self::Output { .. } => 5,
            Self::Io(_) => 6,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_configuration(&cli)?;
    let mut stdout = std::io::stdout();

    if let Commands::Config { format } = &cli.command {
        let rendered = render_config(&config, format)?;
        writeln!(stdout, "{}", rendered)?;
        return Ok(());
    }

    let client = BizzMq::connect(config).await?;
    let result = execute_command(&client, cli.command, &mut stdout).await;
    client.close();
    result
}

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so that command output on stdout stays machine readable.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load configuration from files and environment, then apply CLI overrides
pub fn load_configuration(cli: &Cli) -> Result<BizzMqConfig, CliError> {
    let mut config = BizzMqConfig::load(cli.config.as_deref())?;

    if let Some(url) = &cli.redis_url {
        config.redis_url = url.clone();
        config.validate()?;
    }

    Ok(config)
}

/// Render configuration in the requested format
pub fn render_config(config: &BizzMqConfig, format: &ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)?),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute a queue command against a connected client, writing results to `out`
pub async fn execute_command<W: Write + Send>(
    client: &BizzMq,
    command: Commands,
    out: &mut W,
) -> Result<(), CliError> {
    match command {
        Commands::CreateQueue {
            name,
            dead_letter,
            max_retries,
        } => execute_create_queue_command(client, &name, dead_letter, max_retries, out).await,
        Commands::Publish {
            queue,
            payload,
            priority,
        } => execute_publish_command(client, &queue, &payload, priority, out).await,
        Commands::Consume {
            queue,
            duration_secs,
        } => {
            execute_consume_command(client, &queue, duration_secs.map(Duration::from_secs), out)
                .await
        }
        Commands::Config { format } => {
            let rendered = render_config(client.config(), &format)?;
            writeln!(out, "{}", rendered)?;
            Ok(())
        }
        Commands::Recover { queue } => execute_recover_command(client, &queue, out).await,
    }
}

async fn execute_create_queue_command<W: Write + Send>(
    client: &BizzMq,
    name: &str,
    dead_letter: bool,
    max_retries: Option<u32>,
    out: &mut W,
) -> Result<(), CliError> {
    let mut options = QueueOptions::new().with_dead_letter(dead_letter);
    if let Some(max_retries) = max_retries {
        options = options.with_max_retries(max_retries);
    }

    let created = client.create_queue(name, options).await?;
    if created {
        writeln!(out, "created {}", name)?;
    } else {
        writeln!(out, "exists {}", name)?;
    }
    Ok(())
}

async fn execute_publish_command<W: Write + Send>(
    client: &BizzMq,
    queue: &str,
    payload: &str,
    priority: i64,
    out: &mut W,
) -> Result<(), CliError> {
    let payload: Value = serde_json::from_str(payload).map_err(|e| CliError::InvalidArgument {
        arg: "payload".to_string(),
        message: e.to_string(),
    })?;

    let message_id = client
        .publish_message(queue, payload, MessageOptions::new().with_priority(priority))
        .await?;
    writeln!(out, "{}", message_id)?;
    Ok(())
}

/// Consume until Ctrl-C or until `duration` elapses, then stop the consumer
async fn execute_consume_command<W: Write + Send>(
    client: &BizzMq,
    queue: &str,
    duration: Option<Duration>,
    out: &mut W,
) -> Result<(), CliError> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Value>();
    let handler = handler_fn(move |payload| {
        let sender = sender.clone();
        async move {
            sender.send(payload)?;
            Ok::<(), HandlerError>(())
        }
    });

    let consumer = client.consume_messages(queue, Arc::new(handler)).await?;
    info!(queue = %queue, "Consuming, press Ctrl-C to stop");

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            signal = &mut interrupted => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!(queue = %queue, "Interrupted");
                break;
            }
            Some(payload) = receiver.recv() => {
                if let Err(e) = writeln!(out, "{}", serde_json::to_string(&payload)?) {
                    outcome = Err(CliError::Io(e));
                    break;
                }
            }
        }
    }

    consumer.shutdown().await?;

    // Payloads handled between the last receive and shutdown
    while let Ok(payload) = receiver.try_recv() {
        writeln!(out, "{}", serde_json::to_string(&payload)?)?;
    }

    outcome
}

async fn execute_recover_command<W: Write + Send>(
    client: &BizzMq,
    queue: &str,
    out: &mut W,
) -> Result<(), CliError> {
    let recovered = client.recover_pending(queue).await?;
    writeln!(out, "recovered {} entries", recovered)?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

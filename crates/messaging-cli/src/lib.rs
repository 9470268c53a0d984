//! # Messaging CLI
//!
//! Command-line interface for sending messages to and listening on queues
//! through the messaging service.
//!
//! This module provides CLI commands for:
//! - Sending a single message with attributes
//! - Listening on a queue and printing every delivery
//! - Showing the resolved configuration
//!
//! Provider settings come from the environment (see
//! [`MessagingConfig::from_env`]); `--region` and `--endpoint` override the
//! corresponding variables.

use clap::{Parser, Subcommand};
use messaging_service::{
    ConfigurationError, HandlerError, InboundMessage, MessageHandler, MessageReceiver,
    MessageSender, MessagingConfig, MessagingError, MessagingServiceFactory, OutboundMessage,
    ProcessingVerdict, StopHandle, ValidationError,
};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Messaging CLI - send and receive queue messages
#[derive(Debug, Parser)]
#[command(name = "messaging")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send messages to and listen on message queues")]
pub struct Cli {
    /// Logging level, or a full filter directive
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Provider region, overrides MESSAGING_SERVICE_REGION
    #[arg(long)]
    pub region: Option<String>,

    /// Provider endpoint, overrides MESSAGING_SERVICE_ENDPOINT
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send one message to a queue
    Send {
        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Message payload
        #[arg(short, long)]
        payload: String,

        /// Message attribute as key=value, may be repeated
        #[arg(short, long = "attribute", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Grouping key for ordered delivery (FIFO queues)
        #[arg(long)]
        partition_key: Option<String>,

        /// Deduplication id (FIFO queues)
        #[arg(long)]
        deduplication_id: Option<String>,
    },

    /// Listen on a queue and print every message received
    Listen {
        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Stop after this many messages (at least 1)
        #[arg(short, long)]
        max_messages: Option<NonZeroUsize>,

        /// Leave messages in the queue instead of deleting them
        #[arg(long)]
        skip: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the resolved configuration with secrets redacted
    Config {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output, one document per line
    Json,
}

/// Parse a `key=value` attribute argument
pub fn parse_attribute(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, _)) if key.trim().is_empty() => {
            Err(format!("attribute '{}' has an empty key", value))
        }
        Some((key, value)) => Ok((key.trim().to_string(), value.to_string())),
        None => Err(format!("attribute '{}' must have the form key=value", value)),
    }
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    Messaging(#[from] MessagingError),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] ValidationError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Logging initialisation failed: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Messaging(MessagingError::Configuration(_)) => 1,
            Self::Messaging(_) => 2,
            Self::InvalidMessage(_) => 3,
            Self::Output(_) => 4,
            Self::Logging { .. } => 5,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    run(cli).await
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(
        MessagingConfig::from_env()?,
        cli.region.as_deref(),
        cli.endpoint.as_deref(),
    )?;

    match cli.command {
        Commands::Send {
            queue,
            payload,
            attributes,
            partition_key,
            deduplication_id,
        } => {
            let mut builder = OutboundMessage::for_payload(payload).attributes(attributes);
            if let Some(key) = partition_key {
                builder = builder.partition_key(key);
            }
            if let Some(id) = deduplication_id {
                builder = builder.deduplication_id(id);
            }
            execute_send_command(&config, &queue, &builder.build()?).await
        }
        Commands::Listen {
            queue,
            max_messages,
            skip,
            format,
        } => {
            execute_listen_command(
                &config,
                &queue,
                max_messages.map(NonZeroUsize::get),
                skip,
                format,
            )
            .await
        }
        Commands::Config { format } => {
            println!("{}", render_config(&config, format)?);
            Ok(())
        }
    }
}

/// Initialize logging; `RUST_LOG` takes precedence over `log_level`
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn initialize_logging(log_level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
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

/// Apply command-line overrides on top of the environment configuration
pub fn resolve_config(
    mut config: MessagingConfig,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Result<MessagingConfig, ConfigurationError> {
    if let Some(region) = region {
        config.region = region.to_string();
    }
    if let Some(endpoint) = endpoint {
        config.endpoint = Some(endpoint.to_string());
    }

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn execute_send_command(
    config: &MessagingConfig,
    queue: &str,
    message: &OutboundMessage,
) -> Result<(), CliError> {
    let sender = MessagingServiceFactory::create_sender(config)?;

    let message_id = sender.send_message(queue, message).await?;
    info!(queue_name = %queue, message_id = %message_id, "Message sent");
    println!("{}", message_id);

    sender.close();
    Ok(())
}

async fn execute_listen_command(
    config: &MessagingConfig,
    queue: &str,
    max_messages: Option<usize>,
    skip: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let receiver = MessagingServiceFactory::create_receiver(config)?;
    let stop = receiver.stop_handle();

    let interrupt = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current receive call");
                stop.stop();
            }
        })
    };

    let handler = PrintingHandler::new(stop, max_messages, skip, format);
    info!(queue_name = %queue, "Listening");
    let result = receiver.subscribe(queue, &handler).await;
    interrupt.abort();

    info!(queue_name = %queue, received = handler.received(), "Stopped listening");
    result.map_err(CliError::from)
}

/// Handler that prints each delivery and stops after a message budget
pub struct PrintingHandler {
    stop: StopHandle,
    max_messages: Option<usize>,
    verdict: ProcessingVerdict,
    format: OutputFormat,
    received: AtomicUsize,
}

impl PrintingHandler {
    pub fn new(
        stop: StopHandle,
        max_messages: Option<usize>,
        skip: bool,
        format: OutputFormat,
    ) -> Self {
        Self {
            stop,
            max_messages,
            verdict: if skip {
                ProcessingVerdict::Skipped
            } else {
                ProcessingVerdict::Processed
            },
            format,
            received: AtomicUsize::new(0),
        }
    }

    /// Number of messages handled so far
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageHandler for PrintingHandler {
    async fn handle(&self, message: InboundMessage) -> Result<ProcessingVerdict, HandlerError> {
        println!("{}", render_message(&message, self.format)?);

        let received = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_messages.is_some_and(|max| received >= max) {
            self.stop.stop();
        }

        Ok(self.verdict)
    }
}

/// Format one inbound message for output
pub fn render_message(
    message: &InboundMessage,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(message),
        OutputFormat::Text => {
            let mut attributes: Vec<_> = message
                .attributes()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            attributes.sort();

            Ok(format!(
                "[{}] {} {{{}}}",
                message.id(),
                message.payload(),
                attributes.join(", ")
            ))
        }
    }
}

/// Format the configuration for output
pub fn render_config(
    config: &MessagingConfig,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(config),
        OutputFormat::Text => {
            let credentials = match &config.credentials {
                Some(credentials) => format!("{} (secret redacted)", credentials.access_key_id),
                None => "none".to_string(),
            };

            Ok([
                format!("provider:                 {}", config.provider),
                format!("region:                   {}", config.region),
                format!("endpoint:                 {}", config.resolved_endpoint()),
                format!("wait_time_seconds:        {}", config.wait_time_seconds),
                format!("max_number_of_messages:   {}", config.max_number_of_messages),
                format!("api_call_timeout_seconds: {}", config.api_call_timeout_seconds),
                format!("credentials:              {}", credentials),
            ]
            .join("\n"))
        }
    }
}

//! # SQS Courier CLI
//!
//! Command-line interface for sending, consuming and administering SQS
//! queues through the `sqs-courier` library.
//!
//! Commands:
//! - `send` / `consume` for messages
//! - `create-queue`, `delete-queue`, `purge-queue`, `list-queues` and
//!   `queue-url` for queue management
//!
//! Command output is written to stdout as JSON, logs go to stderr.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use sqs_courier::admin::GetQueueUrlInput;
use sqs_courier::message::ReceivedMessage;
use sqs_courier::options::{AdminOptions, CreateQueueOptions, ListQueuesOptions};
use sqs_courier::providers::AwsSqsTransport;
use sqs_courier::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use sqs_courier::transport::AdminTransport;
use sqs_courier::{
    Consumer, ConsumerOptions, Context, CourierConfig, Producer, ProducerOptions, QueueAdmin,
    SqsError,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// SQS Courier CLI - typed messaging over AWS SQS
#[derive(Debug, Parser)]
#[command(name = "sqs-courier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send, consume and manage AWS SQS messages")]
pub struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "SQS_COURIER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// AWS region, overrides the configuration
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom SQS endpoint, overrides the configuration
    #[arg(long, global = true)]
    pub endpoint_url: Option<String>,

    /// Log library operations at info level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a single message
    Send {
        /// URL of the target queue
        queue_url: String,

        /// Message body, sent as given
        body: String,

        /// Message attribute as key=value; repeatable
        #[arg(short, long = "attribute", value_parser = parse_key_value)]
        attributes: Vec<(String, String)>,

        /// Delivery delay in seconds
        #[arg(short, long)]
        delay: Option<u64>,

        /// Message group id (FIFO queues)
        #[arg(long)]
        group_id: Option<String>,

        /// Message deduplication id (FIFO queues)
        #[arg(long)]
        deduplication_id: Option<String>,

        /// Value of the AWSTraceHeader system attribute
        #[arg(long)]
        trace_header: Option<String>,
    },

    /// Consume messages and print each one as a JSON line
    Consume {
        /// URL of the source queue
        queue_url: String,

        /// Messages per fetch (1-10)
        #[arg(short, long)]
        max_messages: Option<i32>,

        /// Long-poll wait per fetch in seconds
        #[arg(short, long)]
        wait_time: Option<u64>,

        /// Visibility timeout in seconds
        #[arg(long)]
        visibility_timeout: Option<u64>,

        /// Pause between polling cycles in milliseconds
        #[arg(long)]
        fetch_retry_delay_ms: Option<u64>,

        /// Delete each printed message
        #[arg(long)]
        auto_delete: bool,

        /// Stop after this many messages
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Create a queue and print its URL
    CreateQueue {
        /// Queue name; FIFO queues end in `.fifo`
        name: String,

        /// Queue attribute as key=value; repeatable
        #[arg(short, long = "attribute", value_parser = parse_key_value)]
        attributes: Vec<(String, String)>,

        /// Queue tag as key=value; repeatable
        #[arg(short, long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,
    },

    /// Delete a queue
    DeleteQueue {
        queue_url: String,
    },

    /// Delete every message in a queue
    PurgeQueue {
        queue_url: String,
    },

    /// List queue URLs
    ListQueues {
        /// Only list queues whose name starts with this prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Page size (1-1000)
        #[arg(short, long)]
        max_results: Option<i32>,

        /// Token returned by a previous page
        #[arg(long)]
        next_token: Option<String>,
    },

    /// Look up the URL of a queue by name
    QueueUrl {
        name: String,

        /// Account owning the queue, when not the caller's
        #[arg(long)]
        owner_account_id: Option<String>,
    },
}

/// Parse a `key=value` argument
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{}`", raw)),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument {argument}: {message}")]
    InvalidArgument { argument: String, message: String },

    #[error("Queue operation failed: {0}")]
    Queue(#[from] SqsError),

    #[error("Consumer stopped: {0}")]
    ConsumerStopped(SqsError),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(SqsError::Configuration(_)) => 1,
            Self::Queue(SqsError::ClientInitialization { .. }) => 1,
            Self::Queue(SqsError::Validation(_))
            | Self::Queue(SqsError::EmptyMessageBody)
            | Self::Queue(SqsError::InvalidTraceHeader { .. })
            | Self::Queue(SqsError::InvalidAttributeContainer { .. }) => 4,
            Self::Queue(_) => 2,
            Self::ConsumerStopped(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Logging { .. } => 6,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse arguments, set up logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_configuration(&cli)?;
    let transport = Arc::new(AwsSqsTransport::new(config.aws.clone()));
    let runner = CommandRunner::new(transport, config, cli.debug);

    let trigger = runner.shutdown_trigger();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            trigger.trigger();
        }
    });

    let mut stdout = std::io::stdout().lock();
    runner.run(cli.command, &mut stdout).await
}

/// Initialize the tracing subscriber; logs are written to stderr
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if cli.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load the configuration file and environment, then apply flag overrides
pub fn load_configuration(cli: &Cli) -> Result<CourierConfig, CliError> {
    let mut config = CourierConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::Configuration(e.to_string()))?;

    if let Some(region) = &cli.region {
        config.aws.region = Some(region.clone());
    }
    if let Some(endpoint) = &cli.endpoint_url {
        config.aws.endpoint_url = Some(endpoint.clone());
    }
    if cli.debug {
        config.consumer.debug = true;
        config.producer.debug = true;
    }

    config
        .validate()
        .map_err(|e| CliError::Configuration(e.to_string()))?;
    Ok(config)
}

// ============================================================================
// Command Runner
// ============================================================================

/// Executes commands against a transport
pub struct CommandRunner<T> {
    transport: Arc<T>,
    config: CourierConfig,
    debug: bool,
    trigger: ShutdownTrigger,
    signal: ShutdownSignal,
}

impl<T> CommandRunner<T>
where
    T: AdminTransport + 'static,
{
    pub fn new(transport: Arc<T>, config: CourierConfig, debug: bool) -> Self {
        let (trigger, signal) = shutdown_channel();
        Self {
            transport,
            config,
            debug,
            trigger,
            signal,
        }
    }

    /// Trigger that stops a running `consume`
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Execute a command, writing its output to `out`
    pub async fn run<W: Write>(&self, command: Commands, out: &mut W) -> Result<(), CliError> {
        match command {
            Commands::Send {
                queue_url,
                body,
                attributes,
                delay,
                group_id,
                deduplication_id,
                trace_header,
            } => {
                let mut options = ProducerOptions::new();
                if !attributes.is_empty() {
                    let attributes: BTreeMap<String, String> = attributes.into_iter().collect();
                    options = options.with_attributes(&attributes);
                }
                if let Some(delay) = delay {
                    options = options.with_delay(Duration::from_secs(delay));
                }
                if let Some(group_id) = group_id {
                    options = options.with_group_id(group_id);
                }
                if let Some(id) = deduplication_id {
                    options = options.with_deduplication_id(id);
                }
                if let Some(header) = trace_header {
                    options = options.with_trace_header(header);
                }
                self.send(&queue_url, &body, options, out).await
            }
            Commands::Consume {
                queue_url,
                max_messages,
                wait_time,
                visibility_timeout,
                fetch_retry_delay_ms,
                auto_delete,
                count,
            } => {
                let mut overrides =
                    ConsumerOptions::new().with_auto_delete_on_success(auto_delete);
                if let Some(max) = max_messages {
                    if !(1..=10).contains(&max) {
                        return Err(CliError::InvalidArgument {
                            argument: "max-messages".to_string(),
                            message: "must be between 1 and 10".to_string(),
                        });
                    }
                    overrides = overrides.with_max_messages_per_fetch(max);
                }
                if let Some(wait) = wait_time {
                    overrides = overrides.with_wait_time(Duration::from_secs(wait));
                }
                if let Some(timeout) = visibility_timeout {
                    overrides = overrides.with_visibility_timeout(Duration::from_secs(timeout));
                }
                if let Some(delay) = fetch_retry_delay_ms {
                    overrides = overrides.with_fetch_retry_delay(Duration::from_millis(delay));
                }
                if count == Some(0) {
                    return Ok(());
                }
                self.consume(queue_url, overrides, count, out).await
            }
            Commands::CreateQueue {
                name,
                attributes,
                tags,
            } => {
                let options = attributes
                    .into_iter()
                    .fold(CreateQueueOptions::new(), |o, (k, v)| o.with_attribute(k, v));
                let options = tags
                    .into_iter()
                    .fold(options, |o, (k, v)| o.with_tag(k, v))
                    .with_debug(self.debug);
                let url = self.admin().create_queue(&name, &[options]).await?;
                print_json(out, &json!({ "queue_url": url }))
            }
            Commands::DeleteQueue { queue_url } => {
                self.admin()
                    .delete_queue(&queue_url, &self.admin_options())
                    .await?;
                print_json(out, &json!({ "deleted": queue_url }))
            }
            Commands::PurgeQueue { queue_url } => {
                self.admin()
                    .purge_queue(&queue_url, &self.admin_options())
                    .await?;
                print_json(out, &json!({ "purged": queue_url }))
            }
            Commands::ListQueues {
                prefix,
                max_results,
                next_token,
            } => {
                let mut options = ListQueuesOptions::new();
                if let Some(prefix) = prefix {
                    options = options.with_prefix(prefix);
                }
                if let Some(max) = max_results {
                    options = options.with_max_results(max);
                }
                if let Some(token) = next_token {
                    options = options.with_next_token(token);
                }
                let page = self.admin().list_queues(&[options]).await?;
                print_json(
                    out,
                    &json!({ "queue_urls": page.queue_urls, "next_token": page.next_token }),
                )
            }
            Commands::QueueUrl {
                name,
                owner_account_id,
            } => {
                let input = GetQueueUrlInput {
                    queue_name: name,
                    queue_owner_account_id: owner_account_id,
                };
                let url = self
                    .admin()
                    .get_queue_url(input, &self.admin_options())
                    .await?;
                print_json(out, &json!({ "queue_url": url }))
            }
        }
    }

    fn admin(&self) -> QueueAdmin {
        QueueAdmin::new(self.transport.clone())
    }

    fn admin_options(&self) -> Vec<AdminOptions> {
        if self.debug {
            vec![AdminOptions::debug()]
        } else {
            Vec::new()
        }
    }

    async fn send<W: Write>(
        &self,
        queue_url: &str,
        body: &str,
        options: ProducerOptions,
        out: &mut W,
    ) -> Result<(), CliError> {
        let producer = Producer::new(self.transport.clone());
        let receipt = producer
            .send(queue_url, body, &[self.config.producer_options(), options])
            .await?;

        print_json(
            out,
            &json!({
                "message_id": receipt.message_id,
                "md5_of_body": receipt.md5_of_body,
                "sequence_number": receipt.sequence_number,
            }),
        )
    }

    async fn consume<W: Write>(
        &self,
        queue_url: String,
        overrides: ConsumerOptions,
        count: Option<usize>,
        out: &mut W,
    ) -> Result<(), CliError> {
        let (lines, mut rendered) = mpsc::unbounded_channel::<Value>();
        let seen = Arc::new(AtomicUsize::new(0));
        let trigger = self.trigger.clone();

        let handler = move |ctx: Context<Value>| {
            let lines = lines.clone();
            let seen = Arc::clone(&seen);
            let trigger = trigger.clone();
            async move {
                lines
                    .send(render_message(&ctx.queue_url, &ctx.message))
                    .map_err(|_| anyhow::anyhow!("output closed"))?;
                let total = seen.fetch_add(1, Ordering::SeqCst) + 1;
                if count.is_some_and(|limit| total >= limit) {
                    trigger.trigger();
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let consumer = Consumer::new(self.transport.clone()).with_shutdown(self.signal.clone());
        let task = consumer.receive_simple_async::<Value, _>(
            queue_url.clone(),
            handler,
            &[self.config.consumer_options(), overrides],
        );
        info!(queue_url = %queue_url, "Consuming messages");

        // The channel closes once the polling loop has dropped the handler
        while let Some(line) = rendered.recv().await {
            print_json(out, &line)?;
        }

        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(queue_url = %queue_url, error = %e, "Consumer stopped");
                Err(CliError::ConsumerStopped(e))
            }
            Err(join) => Err(CliError::Io(std::io::Error::other(join.to_string()))),
        }
    }
}

/// JSON view of a received message
pub fn render_message(queue_url: &str, message: &ReceivedMessage<Value>) -> Value {
    json!({
        "queue_url": queue_url,
        "message_id": message.id,
        "receipt_handle": message.receipt_handle,
        "body": message.body,
        "attributes": message.attributes,
        "system_attributes": message.system_attributes,
        "md5_of_body": message.md5_of_body,
    })
}

fn print_json<W: Write>(out: &mut W, value: &Value) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

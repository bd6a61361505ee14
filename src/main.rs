//! genpipe CLI entry point.
//!
//! Provides `migrate` for preparing the message database and `run` for
//! driving one generation task end to end over an in-memory queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use genpipe::config::GenpipeConfig;
use genpipe::entities::queue::{PublishFrom, QueueEvent};
use genpipe::entities::stream::StreamResponse;
use genpipe::entities::{AppGenerateEntity, GenerateUser, InvokeFrom};
use genpipe::errors::{InvokeErrorKind, UpstreamError};
use genpipe::logging::{self, LoggingGuard};
use genpipe::moderation::DefaultModerationFactory;
use genpipe::pipeline::{GenerateTaskPipeline, PipelineDeps};
use genpipe::queue::{InMemoryQueueManager, QueueManager};
use genpipe::store::{MessageRecord, MessageStore, SqliteMessageStore};

/// Streaming generation task pipeline.
#[derive(Parser)]
#[command(name = "genpipe", version, about)]
struct Cli {
    /// Config file (defaults to `$GENPIPE_CONFIG_PATH` or `./genpipe.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the message database schema.
    Migrate {
        /// Database path (overrides config).
        #[arg(long)]
        database: Option<String>,
    },
    /// Run one generation task over the given text and print SSE frames.
    Run {
        /// Completion text to stream (reads stdin when omitted).
        #[arg(long)]
        input: Option<PathBuf>,
        /// Inject an upstream failure instead of finishing normally.
        #[arg(long, value_enum)]
        fail: Option<FailKind>,
    },
}

/// Upstream failures that `run --fail` can inject.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailKind {
    /// Rejected provider credentials.
    Auth,
    /// Exhausted hosted quota.
    Quota,
    /// Model invocation failure.
    Invoke,
    /// Parameter validation failure.
    Validation,
    /// Unclassified failure.
    Other,
}

impl FailKind {
    fn to_upstream(self) -> UpstreamError {
        match self {
            Self::Auth => UpstreamError::Authorization {
                message: "401 invalid x-api-key".to_owned(),
            },
            Self::Quota => UpstreamError::QuotaExceeded {
                message: "quota exhausted".to_owned(),
            },
            Self::Invoke => UpstreamError::Invocation {
                kind: InvokeErrorKind::ServerUnavailable,
                description: "model server unavailable".to_owned(),
            },
            Self::Validation => UpstreamError::Validation {
                message: "query is required".to_owned(),
            },
            Self::Other => UpstreamError::Other {
                description: None,
                message: String::new(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let _logging_guard = init_logging(&config)?;

    match cli.command {
        Command::Migrate { database } => handle_migrate(&config, database).await,
        Command::Run { input, fail } => handle_run(&config, input, fail).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GenpipeConfig> {
    match path {
        Some(path) => {
            let mut config = GenpipeConfig::load_from(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => GenpipeConfig::load().context("failed to load configuration"),
    }
}

fn init_logging(config: &GenpipeConfig) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logging.logs_dir {
        Some(dir) => logging::init_production(dir, &config.logging.level).map(Some),
        None => {
            logging::init_cli(&config.logging.level);
            Ok(None)
        }
    }
}

/// Apply the schema to the configured database.
async fn handle_migrate(config: &GenpipeConfig, database: Option<String>) -> anyhow::Result<()> {
    let path = database.unwrap_or_else(|| config.database.path.clone());
    SqliteMessageStore::open(&path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to migrate {path}"))?;
    println!("schema applied to {path}");
    Ok(())
}

/// Drive one task: publish the input word by word, consume the queue and
/// print each stream response as an SSE frame.
async fn handle_run(
    config: &GenpipeConfig,
    input: Option<PathBuf>,
    fail: Option<FailKind>,
) -> anyhow::Result<()> {
    let text = read_input(input.as_deref())?;

    let store = Arc::new(
        SqliteMessageStore::open(&config.database.path, config.database.max_connections)
            .await
            .context("failed to open message store")?,
    );

    let entity = AppGenerateEntity::new(config.app.clone(), InvokeFrom::ServiceApi, true);
    let queue = Arc::new(InMemoryQueueManager::with_timing(
        entity.task_id(),
        config.queue.ping_interval(),
        config.queue.listen_timeout(),
    ));
    let mut listener = queue.listen()?;

    let deps = PipelineDeps::new(Arc::clone(&store) as Arc<dyn MessageStore>)
        .with_moderation_factory(Arc::new(DefaultModerationFactory::new(
            config.moderation_settings(),
        )));
    let user = GenerateUser::Account {
        id: "cli".to_owned(),
    };
    let queue_manager: Arc<dyn QueueManager> = Arc::clone(&queue) as Arc<dyn QueueManager>;
    let mut pipeline = GenerateTaskPipeline::new(entity, queue_manager, user, true, deps);

    let message = MessageRecord::new(pipeline.task_id());
    store
        .insert(&message)
        .await
        .context("failed to create message record")?;
    info!(task_id = %pipeline.task_id(), message_id = %message.id, "task started");

    for word in text.split_inclusive(char::is_whitespace) {
        queue.publish(
            QueueEvent::TextChunk {
                text: word.to_owned(),
            },
            PublishFrom::ApplicationManager,
        )?;
    }
    match fail {
        Some(kind) => queue.publish_error(kind.to_upstream(), PublishFrom::ApplicationManager)?,
        None => queue.publish(QueueEvent::MessageEnd, PublishFrom::ApplicationManager)?,
    }

    let mut answer = String::new();
    while let Some(event) = listener.next().await {
        match event {
            QueueEvent::TextChunk { text } => {
                pipeline.append_output_token(&text);
                answer.push_str(&text);
            }
            QueueEvent::MessageReplace { text } => answer = text,
            QueueEvent::Ping => emit(pipeline.ping_stream_response().into())?,
            QueueEvent::Error(event) => {
                let err = pipeline.handle_error(&event, Some(&message)).await;
                emit(pipeline.error_to_stream_response(err).into())?;
                queue.stop_listen();
                return Ok(());
            }
            QueueEvent::Stop { stopped_by } => {
                debug!(?stopped_by, "listening stopped");
                break;
            }
            QueueEvent::MessageEnd => break,
        }
    }

    if let Some(direct) = pipeline.moderation_gate().final_output() {
        answer = direct;
    }
    let moderated = pipeline
        .handle_output_moderation_when_task_finished(&answer)
        .unwrap_or(answer);
    let final_answer = pipeline.enrich_response(&moderated);

    store
        .save_answer(message.id, &final_answer)
        .await
        .context("failed to save answer")?;
    emit(
        pipeline
            .message_end_stream_response(message.id, final_answer)
            .into(),
    )?;
    queue.stop_listen();
    info!(elapsed = ?pipeline.elapsed(), "task finished");
    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn emit(response: StreamResponse) -> anyhow::Result<()> {
    print!("{}", response.to_sse()?);
    Ok(())
}

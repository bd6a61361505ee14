//! Events flowing through a task's queue.

use serde::{Deserialize, Serialize};

use crate::errors::UpstreamError;

/// Who published an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFrom {
    /// The application runner producing model output.
    ApplicationManager,
    /// The task pipeline itself (e.g. moderation replacements).
    TaskPipeline,
}

/// Why listening stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBy {
    /// The user asked to stop generation.
    UserManual,
    /// The listen timeout elapsed.
    Timeout,
    /// Output moderation replaced the answer.
    OutputModeration,
}

/// A queued failure raised while generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueErrorEvent {
    /// The underlying failure.
    pub error: UpstreamError,
}

impl QueueErrorEvent {
    /// Wrap a failure.
    pub fn new(error: UpstreamError) -> Self {
        Self { error }
    }
}

/// One event on a task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A chunk of generated text.
    TextChunk {
        /// Chunk contents.
        text: String,
    },
    /// Replace everything streamed so far with this text.
    MessageReplace {
        /// Replacement text.
        text: String,
    },
    /// Generation failed.
    Error(QueueErrorEvent),
    /// Keep-alive.
    Ping,
    /// Listening stopped.
    Stop {
        /// Stop reason.
        stopped_by: StopBy,
    },
    /// Generation finished normally.
    MessageEnd,
}

impl QueueEvent {
    /// Whether the event ends the listen loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop { .. } | Self::MessageEnd | Self::Error(_))
    }
}

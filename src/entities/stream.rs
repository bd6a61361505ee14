//! Stream responses emitted to the client.
//!
//! Responses serialise to JSON tagged by `event` and are framed as
//! server-sent events by [`StreamResponse::to_sse`].

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::TaskId;
use crate::errors::TaskError;

/// Keep-alive response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingStreamResponse {
    /// Owning task.
    pub task_id: TaskId,
}

/// Terminal error response.
///
/// Serialises the error as `code`, `status` and `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStreamResponse {
    /// Owning task.
    pub task_id: TaskId,
    /// The classified failure.
    pub err: TaskError,
}

impl Serialize for ErrorStreamResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ErrorStreamResponse", 4)?;
        state.serialize_field("task_id", &self.task_id)?;
        state.serialize_field("code", self.err.code())?;
        state.serialize_field("status", &self.err.status())?;
        state.serialize_field("message", &self.err.public_message())?;
        state.end()
    }
}

/// Final answer response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEndStreamResponse {
    /// Owning task.
    pub task_id: TaskId,
    /// Message record id.
    pub id: Uuid,
    /// Final (moderated, enriched) answer.
    pub answer: String,
}

/// Any response the pipeline streams to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamResponse {
    /// Keep-alive.
    Ping(PingStreamResponse),
    /// Terminal failure.
    Error(ErrorStreamResponse),
    /// Terminal answer.
    MessageEnd(MessageEndStreamResponse),
}

impl StreamResponse {
    /// Frame the response as one server-sent event: `data: <json>\n\n`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialisation fails.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("data: {json}\n\n"))
    }
}

impl From<PingStreamResponse> for StreamResponse {
    fn from(value: PingStreamResponse) -> Self {
        Self::Ping(value)
    }
}

impl From<ErrorStreamResponse> for StreamResponse {
    fn from(value: ErrorStreamResponse) -> Self {
        Self::Error(value)
    }
}

impl From<MessageEndStreamResponse> for StreamResponse {
    fn from(value: MessageEndStreamResponse) -> Self {
        Self::MessageEnd(value)
    }
}

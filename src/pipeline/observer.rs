//! Structured observation of pipeline lifecycle events.
//!
//! The pipeline reports through an injected [`PipelineObserver`] rather than
//! logging directly. [`TracingObserver`] forwards every event to `tracing`.

use uuid::Uuid;

use crate::entities::TaskId;
use crate::errors::{TaskError, UpstreamError};
use crate::moderation::ModerationError;
use crate::store::StoreError;

/// Receives pipeline lifecycle events. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// The pipeline was constructed.
    fn initialized(&self, _task_id: TaskId, _moderation_enabled: bool) {}

    /// An error event was taken off the queue.
    fn error_received(&self, _task_id: TaskId, _error: &UpstreamError) {}

    /// An error was classified and is about to be returned.
    fn error_handled(&self, _task_id: TaskId, _error: &TaskError) {}

    /// A message record was marked failed.
    fn message_failed(&self, _task_id: TaskId, _message_id: Uuid, _description: &str) {}

    /// Marking a message failed did not succeed.
    fn persistence_failed(&self, _task_id: TaskId, _message_id: Uuid, _error: &StoreError) {}

    /// Moderation is configured but no handler could be built.
    fn moderation_unavailable(&self, _task_id: TaskId, _error: &ModerationError) {}

    /// Output moderation ran at task finish.
    fn moderation_applied(&self, _task_id: TaskId, _changed: bool) {}

    /// The anomaly hook fired.
    fn anomaly_detected(&self, _task_id: TaskId, _description: &str) {}
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn initialized(&self, task_id: TaskId, moderation_enabled: bool) {
        tracing::info!(%task_id, moderation_enabled, "generate task pipeline initialised");
    }

    fn error_received(&self, task_id: TaskId, error: &UpstreamError) {
        tracing::debug!(%task_id, error = %error, "handling error event");
    }

    fn error_handled(&self, task_id: TaskId, error: &TaskError) {
        tracing::error!(%task_id, code = error.code(), error = %error, "error handled");
    }

    fn message_failed(&self, task_id: TaskId, message_id: Uuid, description: &str) {
        tracing::debug!(%task_id, %message_id, description, "message marked failed");
    }

    fn persistence_failed(&self, task_id: TaskId, message_id: Uuid, error: &StoreError) {
        tracing::warn!(%task_id, %message_id, error = %error, "failed to persist message error");
    }

    fn moderation_unavailable(&self, task_id: TaskId, error: &ModerationError) {
        tracing::warn!(%task_id, error = %error, "output moderation disabled");
    }

    fn moderation_applied(&self, task_id: TaskId, changed: bool) {
        tracing::debug!(%task_id, changed, "output moderation applied");
    }

    fn anomaly_detected(&self, task_id: TaskId, description: &str) {
        tracing::warn!(%task_id, description, "anomaly detected");
    }
}

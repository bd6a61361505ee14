//! Task queue abstraction.
//!
//! The [`QueueManager`] trait is the seam between the application runner
//! (which publishes model output) and the task pipeline (which consumes it).
//! [`memory::InMemoryQueueManager`] is the in-process implementation.

pub mod memory;

pub use self::memory::{InMemoryQueueManager, QueueListener};

use crate::entities::queue::{PublishFrom, QueueErrorEvent, QueueEvent};
use crate::entities::TaskId;
use crate::errors::UpstreamError;

/// Errors from queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The task was stopped; the application runner must stop publishing.
    #[error("generate task {0} stopped")]
    TaskStopped(TaskId),

    /// The queue no longer accepts events.
    #[error("queue for task {0} is closed")]
    Closed(TaskId),

    /// The single listener was already handed out.
    #[error("queue for task {0} already has a listener")]
    AlreadyListening(TaskId),
}

/// Publishes events for one task.
///
/// Implementations must be `Send + Sync`; moderation workers publish from
/// background tasks.
pub trait QueueManager: Send + Sync {
    /// Task this queue belongs to.
    fn task_id(&self) -> TaskId;

    /// Publish an event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TaskStopped`] when the application manager
    /// publishes after the stop flag is set, and [`QueueError::Closed`]
    /// after [`QueueManager::stop_listen`].
    fn publish(&self, event: QueueEvent, from: PublishFrom) -> Result<(), QueueError>;

    /// Publish a failure as a [`QueueEvent::Error`].
    ///
    /// # Errors
    ///
    /// Same as [`QueueManager::publish`].
    fn publish_error(&self, error: UpstreamError, from: PublishFrom) -> Result<(), QueueError> {
        self.publish(QueueEvent::Error(QueueErrorEvent::new(error)), from)
    }

    /// Close the queue. Pending events are still delivered.
    fn stop_listen(&self);

    /// Ask the task to stop (e.g. user pressed "stop").
    fn set_stop_flag(&self);

    /// Whether the stop flag is set.
    fn is_stopped(&self) -> bool;
}

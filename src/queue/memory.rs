//! In-process queue backed by a tokio unbounded channel.
//!
//! One [`InMemoryQueueManager`] per task. Publishers share it behind an
//! `Arc`; the consumer takes the single [`QueueListener`] via
//! [`InMemoryQueueManager::listen`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{QueueError, QueueManager};
use crate::entities::queue::{PublishFrom, QueueEvent, StopBy};
use crate::entities::TaskId;

/// Default idle time after which the listener emits a ping.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default total listen time before the listener stops with a timeout.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(600);

/// In-memory [`QueueManager`] for a single task.
#[derive(Debug)]
pub struct InMemoryQueueManager {
    task_id: TaskId,
    tx: Mutex<Option<mpsc::UnboundedSender<QueueEvent>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueueEvent>>>,
    stopped: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    ping_interval: Duration,
    listen_timeout: Duration,
}

impl InMemoryQueueManager {
    /// Create a queue with default ping interval and listen timeout.
    pub fn new(task_id: TaskId) -> Self {
        Self::with_timing(task_id, DEFAULT_PING_INTERVAL, DEFAULT_LISTEN_TIMEOUT)
    }

    /// Create a queue with explicit listener timing.
    pub fn with_timing(task_id: TaskId, ping_interval: Duration, listen_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            task_id,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            stopped: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            ping_interval,
            listen_timeout,
        }
    }

    /// Take the listener for this queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyListening`] on the second call.
    pub fn listen(&self) -> Result<QueueListener, QueueError> {
        let rx = self
            .rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(QueueError::AlreadyListening(self.task_id))?;

        debug!(task_id = %self.task_id, "queue listener attached");
        Ok(QueueListener {
            task_id: self.task_id,
            rx,
            stopped: Arc::clone(&self.stopped),
            stop_signal: Arc::clone(&self.stop_signal),
            started_at: Instant::now(),
            ping_interval: self.ping_interval,
            listen_timeout: self.listen_timeout,
            finished: false,
        })
    }
}

impl QueueManager for InMemoryQueueManager {
    fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn publish(&self, event: QueueEvent, from: PublishFrom) -> Result<(), QueueError> {
        if from == PublishFrom::ApplicationManager && self.is_stopped() {
            return Err(QueueError::TaskStopped(self.task_id));
        }

        let guard = self
            .tx
            .lock()
            .map_err(|_| QueueError::Closed(self.task_id))?;
        let tx = guard.as_ref().ok_or(QueueError::Closed(self.task_id))?;
        trace!(task_id = %self.task_id, ?from, "publishing queue event");
        tx.send(event).map_err(|_| QueueError::Closed(self.task_id))
    }

    fn stop_listen(&self) {
        if let Ok(mut slot) = self.tx.lock() {
            slot.take();
        }
        debug!(task_id = %self.task_id, "queue closed");
    }

    fn set_stop_flag(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Stores a permit when the listener is not waiting yet.
        self.stop_signal.notify_one();
        debug!(task_id = %self.task_id, "stop flag set");
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Consumer half of an [`InMemoryQueueManager`].
///
/// Yields events in publish order, a [`QueueEvent::Ping`] after each ping
/// interval of silence, and a [`QueueEvent::Stop`] as soon as the stop flag
/// is set or the listen timeout elapses. Returns `None` once a terminal event has
/// been delivered or the queue is closed and drained.
#[derive(Debug)]
pub struct QueueListener {
    task_id: TaskId,
    rx: mpsc::UnboundedReceiver<QueueEvent>,
    stopped: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    started_at: Instant,
    ping_interval: Duration,
    listen_timeout: Duration,
    finished: bool,
}

impl QueueListener {
    /// Task this listener belongs to.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<QueueEvent> {
        if self.finished {
            return None;
        }

        let stop_signal = Arc::clone(&self.stop_signal);
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Some(self.finish(StopBy::UserManual));
            }

            let remaining = self.listen_timeout.saturating_sub(self.started_at.elapsed());
            if remaining.is_zero() {
                return Some(self.finish(StopBy::Timeout));
            }

            let ping_due = self.ping_interval <= remaining;
            let wait = self.ping_interval.min(remaining);

            let received = tokio::select! {
                biased;
                () = stop_signal.notified() => continue,
                received = tokio::time::timeout(wait, self.rx.recv()) => received,
            };

            match received {
                Ok(Some(event)) => {
                    if event.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(_) if ping_due => return Some(QueueEvent::Ping),
                Err(_) => continue,
            }
        }
    }

    fn finish(&mut self, stopped_by: StopBy) -> QueueEvent {
        self.finished = true;
        debug!(task_id = %self.task_id, ?stopped_by, "queue listener stopped");
        QueueEvent::Stop { stopped_by }
    }
}

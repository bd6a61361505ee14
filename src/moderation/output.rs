//! Streaming output moderation handler.
//!
//! Tokens are appended to a shared buffer. The first append spawns a
//! background worker that re-checks the buffer every
//! [`ModerationSettings::check_interval`] once
//! [`ModerationSettings::buffer_size`] new characters have accumulated.
//! Flagged output is replaced through a [`QueueEvent::MessageReplace`]
//! published from [`PublishFrom::TaskPipeline`]. A direct-output verdict
//! ends the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{
    ModerationAction, ModerationOutputsResult, ModerationRule, ModerationSettings,
    OutputModerationHandler, OutputModerator,
};
use crate::entities::queue::{PublishFrom, QueueEvent};
use crate::queue::QueueManager;

#[derive(Debug, Default)]
struct BufferState {
    buffer: String,
    is_final_chunk: bool,
    final_output: Option<String>,
}

struct Shared {
    tenant_id: String,
    app_id: String,
    state: Mutex<BufferState>,
    running: AtomicBool,
    moderator: Arc<dyn OutputModerator>,
    queue_manager: Arc<dyn QueueManager>,
}

impl Shared {
    fn moderate(&self, text: &str) -> Option<ModerationOutputsResult> {
        match self.moderator.moderate_outputs(text) {
            Ok(result) => Some(result),
            Err(err) => {
                error!(
                    tenant_id = %self.tenant_id,
                    app_id = %self.app_id,
                    error = %err,
                    "output moderation failed; letting output through"
                );
                None
            }
        }
    }

    fn publish_replace(&self, text: String) {
        let event = QueueEvent::MessageReplace { text };
        if let Err(err) = self.queue_manager.publish(event, PublishFrom::TaskPipeline) {
            warn!(error = %err, "failed to publish moderation replacement");
        }
    }

    fn set_final_output(&self, text: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.final_output = Some(text.to_owned());
        }
    }
}

/// Per-task output moderation handler.
pub struct OutputModeration {
    rule: ModerationRule,
    settings: ModerationSettings,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OutputModeration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputModeration")
            .field("tenant_id", &self.shared.tenant_id)
            .field("app_id", &self.shared.app_id)
            .field("rule", &self.rule.kind)
            .field("worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl OutputModeration {
    /// Create a handler. No background work starts until the first token.
    pub fn new(
        tenant_id: &str,
        app_id: &str,
        rule: ModerationRule,
        moderator: Arc<dyn OutputModerator>,
        queue_manager: Arc<dyn QueueManager>,
        settings: ModerationSettings,
    ) -> Self {
        Self {
            rule,
            settings,
            shared: Arc::new(Shared {
                tenant_id: tenant_id.to_owned(),
                app_id: app_id.to_owned(),
                state: Mutex::new(BufferState::default()),
                running: AtomicBool::new(true),
                moderator,
                queue_manager,
            }),
            worker: None,
        }
    }

    /// The rule this handler enforces.
    pub fn rule(&self) -> &ModerationRule {
        &self.rule
    }

    /// Whether the background worker has been spawned and not yet finished.
    pub fn is_worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn start_worker(&mut self) {
        if self.worker.is_some() || !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                self.worker = Some(handle.spawn(run_worker(shared, self.settings)));
                debug!(rule = %self.rule.kind, "output moderation worker started");
            }
            Err(_) => {
                warn!("no tokio runtime; streaming moderation disabled until completion");
            }
        }
    }
}

impl OutputModerationHandler for OutputModeration {
    fn append_new_token(&mut self, token: &str) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.buffer.push_str(token);
        }
        self.start_worker();
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            handle.abort();
            debug!(rule = %self.rule.kind, "output moderation worker stopped");
        }
    }

    fn moderation_completion(&mut self, completion: &str, public_event: bool) -> String {
        if let Ok(mut state) = self.shared.state.lock() {
            state.buffer = completion.to_owned();
            state.is_final_chunk = true;
        }

        let Some(result) = self.shared.moderate(completion) else {
            return completion.to_owned();
        };
        let Some(replacement) = result.replacement() else {
            return completion.to_owned();
        };

        let final_output = replacement.to_owned();
        if result.action == ModerationAction::DirectOutput {
            self.shared.set_final_output(&final_output);
        }
        if public_event {
            self.shared.publish_replace(final_output.clone());
        }
        final_output
    }

    fn final_output(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .ok()
            .and_then(|state| state.final_output.clone())
    }
}

impl Drop for OutputModeration {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, settings: ModerationSettings) {
    let mut checked_chars = 0usize;

    while shared.running.load(Ordering::SeqCst) {
        let (snapshot, is_final) = match shared.state.lock() {
            Ok(state) => (state.buffer.clone(), state.is_final_chunk),
            Err(_) => break,
        };
        let buffered_chars = snapshot.chars().count();

        let pending = buffered_chars.saturating_sub(checked_chars);
        if !is_final && pending < settings.buffer_size {
            tokio::time::sleep(settings.check_interval).await;
            continue;
        }
        checked_chars = buffered_chars;

        let verdict = shared.moderate(&snapshot);
        if let Some(result) = verdict.filter(|r| r.flagged) {
            let final_output = match result.action {
                ModerationAction::DirectOutput => {
                    shared.set_final_output(&result.preset_response);
                    result.preset_response.clone()
                }
                ModerationAction::Overridden => {
                    let tail = shared
                        .state
                        .lock()
                        .ok()
                        .and_then(|state| state.buffer.get(snapshot.len()..).map(str::to_owned))
                        .unwrap_or_default();
                    format!("{}{tail}", result.text)
                }
            };

            if shared.running.load(Ordering::SeqCst) {
                shared.publish_replace(final_output);
            }
            if result.action == ModerationAction::DirectOutput {
                break;
            }
        }

        tokio::time::sleep(settings.check_interval).await;
    }
}

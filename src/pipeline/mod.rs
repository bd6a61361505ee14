//! Generate task pipeline.
//!
//! [`GenerateTaskPipeline`] is the shared base for streaming generation
//! tasks. It records when the task started, owns the task's
//! [`ModerationGate`], converts queued errors into classified
//! [`TaskError`]s (persisting them against the message record when one is
//! given) and builds the stream responses keyed by the task id.
//!
//! Concrete task loops drive it: they consume the queue, feed tokens to
//! [`GenerateTaskPipeline::append_output_token`] and call
//! [`GenerateTaskPipeline::handle_output_moderation_when_task_finished`]
//! once the answer is complete.

pub mod classifier;
pub mod enrichment;
pub mod observer;

pub use self::observer::{PipelineObserver, TracingObserver};

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::entities::queue::QueueErrorEvent;
use crate::entities::stream::{ErrorStreamResponse, MessageEndStreamResponse, PingStreamResponse};
use crate::entities::{AppGenerateEntity, GenerateUser, TaskId};
use crate::errors::TaskError;
use crate::moderation::{
    DefaultModerationFactory, ModerationGate, ModerationHandlerFactory, ModerationRule,
};
use crate::queue::QueueManager;
use crate::store::{MessageRecord, MessageStore};

/// Collaborators injected into a pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    /// Message persistence.
    pub message_store: Arc<dyn MessageStore>,
    /// Builds the output moderation handler.
    pub moderation_factory: Arc<dyn ModerationHandlerFactory>,
    /// Lifecycle observer.
    pub observer: Arc<dyn PipelineObserver>,
}

impl PipelineDeps {
    /// Dependencies with the default moderation factory and a tracing observer.
    pub fn new(message_store: Arc<dyn MessageStore>) -> Self {
        Self {
            message_store,
            moderation_factory: Arc::new(DefaultModerationFactory::default()),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the moderation factory.
    #[must_use]
    pub fn with_moderation_factory(mut self, factory: Arc<dyn ModerationHandlerFactory>) -> Self {
        self.moderation_factory = factory;
        self
    }

    /// Replace the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl std::fmt::Debug for PipelineDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDeps").finish_non_exhaustive()
    }
}

/// Lifecycle coordinator for one streaming generation task.
pub struct GenerateTaskPipeline {
    entity: AppGenerateEntity,
    queue_manager: Arc<dyn QueueManager>,
    user: GenerateUser,
    stream: bool,
    started_at: Instant,
    moderation: ModerationGate,
    message_store: Arc<dyn MessageStore>,
    observer: Arc<dyn PipelineObserver>,
}

impl std::fmt::Debug for GenerateTaskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateTaskPipeline")
            .field("task_id", &self.entity.task_id())
            .field("stream", &self.stream)
            .field("moderation", &self.moderation)
            .finish_non_exhaustive()
    }
}

impl GenerateTaskPipeline {
    /// Create the pipeline and, if the app enables sensitive-word avoidance,
    /// its output moderation handler.
    pub fn new(
        entity: AppGenerateEntity,
        queue_manager: Arc<dyn QueueManager>,
        user: GenerateUser,
        stream: bool,
        deps: PipelineDeps,
    ) -> Self {
        let started_at = Instant::now();
        let moderation = init_output_moderation(&entity, &queue_manager, &deps);
        deps.observer.initialized(entity.task_id(), moderation.is_active());

        Self {
            entity,
            queue_manager,
            user,
            stream,
            started_at,
            moderation,
            message_store: deps.message_store,
            observer: deps.observer,
        }
    }

    /// The task id.
    pub fn task_id(&self) -> TaskId {
        self.entity.task_id()
    }

    /// The generation request.
    pub fn entity(&self) -> &AppGenerateEntity {
        &self.entity
    }

    /// The user the task generates for.
    pub fn user(&self) -> &GenerateUser {
        &self.user
    }

    /// Whether the response is streamed.
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// The task queue.
    pub fn queue_manager(&self) -> &Arc<dyn QueueManager> {
        &self.queue_manager
    }

    /// Time since the pipeline was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current moderation state.
    pub fn moderation_gate(&self) -> &ModerationGate {
        &self.moderation
    }

    /// Feed a streamed token to output moderation.
    pub fn append_output_token(&mut self, token: &str) {
        self.moderation.append_token(token);
    }

    /// Classify a queued error and, when `message` is given, mark that
    /// record failed.
    ///
    /// Never fails: persistence problems are reported to the observer and
    /// the classified error is still returned.
    pub async fn handle_error(
        &self,
        event: &QueueErrorEvent,
        message: Option<&MessageRecord>,
    ) -> TaskError {
        let task_id = self.task_id();
        self.observer.error_received(task_id, &event.error);

        let err = classifier::classify(&event.error);

        if let Some(message) = message {
            let description = Self::error_to_desc(&err);
            match self.message_store.mark_failed(message.id, &description).await {
                Ok(_) => self.observer.message_failed(task_id, message.id, &description),
                Err(store_err) => self.observer.persistence_failed(task_id, message.id, &store_err),
            }
        }

        self.observer.error_handled(task_id, &err);
        err
    }

    /// Description stored on a failed message.
    pub fn error_to_desc(err: &TaskError) -> String {
        classifier::error_to_desc(err)
    }

    /// Error stream response for this task.
    pub fn error_to_stream_response(&self, err: TaskError) -> ErrorStreamResponse {
        ErrorStreamResponse {
            task_id: self.task_id(),
            err,
        }
    }

    /// Ping stream response for this task.
    pub fn ping_stream_response(&self) -> PingStreamResponse {
        PingStreamResponse {
            task_id: self.task_id(),
        }
    }

    /// Final answer stream response for this task.
    pub fn message_end_stream_response(
        &self,
        message_id: Uuid,
        answer: String,
    ) -> MessageEndStreamResponse {
        MessageEndStreamResponse {
            task_id: self.task_id(),
            id: message_id,
            answer,
        }
    }

    /// Run the completion through output moderation and discard the handler.
    ///
    /// Returns `None` when no moderation applies: moderation is disabled or
    /// already ran for this task.
    pub fn handle_output_moderation_when_task_finished(
        &mut self,
        completion: &str,
    ) -> Option<String> {
        let moderated = self.moderation.finish(completion)?;
        self.observer
            .moderation_applied(self.task_id(), moderated != completion);
        Some(moderated)
    }

    /// Anomaly hook: a substring check over the generated output.
    pub fn detect_anomalies(&self, output: &str) -> Option<&'static str> {
        let description = enrichment::detect_anomalies(output)?;
        self.observer.anomaly_detected(self.task_id(), description);
        Some(description)
    }

    /// Append the anomaly note to `output` when the anomaly hook fires.
    pub fn enrich_response(&self, output: &str) -> String {
        if self.detect_anomalies(output).is_none() {
            return output.to_owned();
        }
        enrichment::enrich_response(output)
    }
}

fn init_output_moderation(
    entity: &AppGenerateEntity,
    queue_manager: &Arc<dyn QueueManager>,
    deps: &PipelineDeps,
) -> ModerationGate {
    let app_config = &entity.app_config;
    let Some(swa) = app_config.sensitive_word_avoidance.as_ref() else {
        return ModerationGate::Disabled;
    };

    let rule = ModerationRule {
        kind: swa.kind.clone(),
        config: swa.config.clone(),
    };
    match deps.moderation_factory.create(
        &app_config.tenant_id,
        &app_config.app_id,
        rule,
        Arc::clone(queue_manager),
    ) {
        Ok(handler) => ModerationGate::Active(handler),
        Err(err) => {
            deps.observer.moderation_unavailable(entity.task_id(), &err);
            ModerationGate::Disabled
        }
    }
}

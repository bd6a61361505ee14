//! Shared fakes for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use genpipe::entities::{
    AppConfig, AppGenerateEntity, GenerateUser, InvokeFrom, SensitiveWordAvoidance, TaskId,
};
use genpipe::moderation::{
    ModerationError, ModerationHandlerFactory, ModerationRule, OutputModerationHandler,
};
use genpipe::pipeline::{GenerateTaskPipeline, PipelineDeps, PipelineObserver};
use genpipe::queue::{InMemoryQueueManager, QueueManager};
use genpipe::store::{MessageRecord, MessageStatus, MessageStore, StoreError};

/// Store that counts `mark_failed` calls and can be told to fail them.
#[derive(Default)]
pub struct CountingStore {
    pub mark_failed_calls: AtomicUsize,
    pub descriptions: Mutex<Vec<String>>,
    pub fail: bool,
}

impl CountingStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.mark_failed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for CountingStore {
    async fn insert(&self, _record: &MessageRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        Ok(None)
    }

    async fn mark_failed(&self, id: Uuid, description: &str) -> Result<MessageRecord, StoreError> {
        self.mark_failed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::NotFound(id));
        }
        self.descriptions
            .lock()
            .expect("descriptions lock")
            .push(description.to_owned());
        let mut record = MessageRecord::new(TaskId::new());
        record.id = id;
        record.status = MessageStatus::Error;
        record.error = Some(description.to_owned());
        Ok(record)
    }

    async fn save_answer(&self, _id: Uuid, _answer: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Observer that records event names.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn push(&self, event: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(event.to_owned());
    }

    pub fn recorded(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }
}

impl PipelineObserver for RecordingObserver {
    fn initialized(&self, _task_id: TaskId, moderation_enabled: bool) {
        self.push(&format!("initialized:{moderation_enabled}"));
    }

    fn message_failed(&self, _task_id: TaskId, _message_id: Uuid, _description: &str) {
        self.push("message_failed");
    }

    fn persistence_failed(&self, _task_id: TaskId, _message_id: Uuid, _error: &StoreError) {
        self.push("persistence_failed");
    }

    fn moderation_unavailable(&self, _task_id: TaskId, _error: &ModerationError) {
        self.push("moderation_unavailable");
    }

    fn moderation_applied(&self, _task_id: TaskId, changed: bool) {
        self.push(&format!("moderation_applied:{changed}"));
    }

    fn anomaly_detected(&self, _task_id: TaskId, _description: &str) {
        self.push("anomaly_detected");
    }
}

/// Handler that replaces any completion containing `banned`.
pub struct FakeHandler {
    pub banned: String,
    pub replacement: String,
    pub tokens: Arc<Mutex<Vec<String>>>,
    pub completions: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl OutputModerationHandler for FakeHandler {
    fn append_new_token(&mut self, token: &str) {
        self.tokens
            .lock()
            .expect("tokens lock")
            .push(token.to_owned());
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn moderation_completion(&mut self, completion: &str, _public_event: bool) -> String {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if completion.contains(&self.banned) {
            self.replacement.clone()
        } else {
            completion.to_owned()
        }
    }

    fn final_output(&self) -> Option<String> {
        None
    }
}

/// Factory producing [`FakeHandler`]s and recording what it was asked for.
#[derive(Default)]
pub struct FakeFactory {
    pub created: AtomicUsize,
    pub last_rule: Mutex<Option<(String, String, ModerationRule)>>,
    pub tokens: Arc<Mutex<Vec<String>>>,
    pub completions: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
    pub reject: bool,
}

impl ModerationHandlerFactory for FakeFactory {
    fn create(
        &self,
        tenant_id: &str,
        app_id: &str,
        rule: ModerationRule,
        _queue_manager: Arc<dyn QueueManager>,
    ) -> Result<Box<dyn OutputModerationHandler>, ModerationError> {
        if self.reject {
            return Err(ModerationError::UnknownRule(rule.kind));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.last_rule.lock().expect("rule lock") =
            Some((tenant_id.to_owned(), app_id.to_owned(), rule));
        Ok(Box::new(FakeHandler {
            banned: "bad".to_owned(),
            replacement: "[redacted]".to_owned(),
            tokens: Arc::clone(&self.tokens),
            completions: Arc::clone(&self.completions),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

pub fn app_config(moderated: bool) -> AppConfig {
    AppConfig {
        tenant_id: "tenant-1".to_owned(),
        app_id: "app-1".to_owned(),
        sensitive_word_avoidance: moderated.then(|| SensitiveWordAvoidance {
            kind: "keywords".to_owned(),
            config: serde_json::json!({
                "keywords": "bad",
                "outputs_config": {"enabled": true, "preset_response": "[redacted]"}
            }),
        }),
    }
}

pub fn user() -> GenerateUser {
    GenerateUser::EndUser {
        id: "end-user-1".to_owned(),
        session_id: "session-1".to_owned(),
    }
}

pub struct Harness {
    pub pipeline: GenerateTaskPipeline,
    pub store: Arc<CountingStore>,
    pub observer: Arc<RecordingObserver>,
    pub factory: Arc<FakeFactory>,
    pub queue: Arc<InMemoryQueueManager>,
}

pub fn harness_with(moderated: bool, store: CountingStore, factory: FakeFactory) -> Harness {
    let entity = AppGenerateEntity::new(app_config(moderated), InvokeFrom::WebApp, true);
    let queue = Arc::new(InMemoryQueueManager::new(entity.task_id()));
    let store = Arc::new(store);
    let observer = Arc::new(RecordingObserver::default());
    let factory = Arc::new(factory);

    let deps = PipelineDeps::new(Arc::clone(&store) as Arc<dyn MessageStore>)
        .with_moderation_factory(Arc::clone(&factory) as Arc<dyn ModerationHandlerFactory>)
        .with_observer(Arc::clone(&observer) as Arc<dyn PipelineObserver>);
    let pipeline = GenerateTaskPipeline::new(
        entity,
        Arc::clone(&queue) as Arc<dyn QueueManager>,
        user(),
        true,
        deps,
    );

    Harness {
        pipeline,
        store,
        observer,
        factory,
        queue,
    }
}

pub fn harness(moderated: bool) -> Harness {
    harness_with(moderated, CountingStore::default(), FakeFactory::default())
}

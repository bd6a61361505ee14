//! Tests for `GenerateTaskPipeline::handle_error` and error classification.

use std::sync::Arc;

use genpipe::entities::queue::QueueErrorEvent;
use genpipe::entities::{AppGenerateEntity, InvokeFrom};
use genpipe::errors::{
    InvokeErrorKind, TaskError, UpstreamError, INTERNAL_ERROR_MESSAGE, INVALID_API_KEY_MESSAGE,
    QUOTA_EXCEEDED_MESSAGE,
};
use genpipe::pipeline::{GenerateTaskPipeline, PipelineDeps};
use genpipe::queue::{InMemoryQueueManager, QueueManager};
use genpipe::store::{MessageRecord, MessageStatus, MessageStore, SqliteMessageStore};

use crate::support::{app_config, harness, harness_with, user, CountingStore, FakeFactory};

fn event(error: UpstreamError) -> QueueErrorEvent {
    QueueErrorEvent::new(error)
}

#[tokio::test]
async fn authorization_error_is_rewritten_to_fixed_message() {
    let h = harness(false);
    let err = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Authorization {
                message: "401 from provider: key sk-live-123 rejected".to_owned(),
            }),
            None,
        )
        .await;

    assert_eq!(err, TaskError::Authorization(INVALID_API_KEY_MESSAGE.to_owned()));
    assert!(!err.public_message().contains("sk-live-123"));
}

#[tokio::test]
async fn passthrough_kinds_keep_their_text() {
    let h = harness(false);

    let invoke = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Invocation {
                kind: InvokeErrorKind::RateLimit,
                description: "rate limited".to_owned(),
            }),
            None,
        )
        .await;
    assert_eq!(
        invoke,
        TaskError::Invocation {
            kind: InvokeErrorKind::RateLimit,
            description: "rate limited".to_owned(),
        }
    );

    let validation = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Validation {
                message: "query is required".to_owned(),
            }),
            None,
        )
        .await;
    assert_eq!(validation, TaskError::Validation("query is required".to_owned()));
    assert_eq!(validation.code(), "invalid_param");
    assert_eq!(validation.status(), 400);
}

#[tokio::test]
async fn unclassified_error_becomes_generic() {
    let h = harness(false);
    let err = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Other {
                description: None,
                message: "index out of range".to_owned(),
            }),
            None,
        )
        .await;
    assert_eq!(err, TaskError::Generic("index out of range".to_owned()));
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn no_message_means_no_persistence() {
    let h = harness(false);
    let _ = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Validation {
                message: "bad".to_owned(),
            }),
            None,
        )
        .await;
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn message_is_marked_failed_once_with_description() {
    let h = harness(false);
    let message = MessageRecord::new(h.pipeline.task_id());
    let _ = h
        .pipeline
        .handle_error(
            &event(UpstreamError::QuotaExceeded {
                message: "provider said no".to_owned(),
            }),
            Some(&message),
        )
        .await;

    assert_eq!(h.store.calls(), 1);
    let descriptions = h.store.descriptions.lock().expect("descriptions lock").clone();
    assert_eq!(descriptions, vec![QUOTA_EXCEEDED_MESSAGE.to_owned()]);
    assert!(h.observer.recorded().contains(&"message_failed".to_owned()));
}

#[tokio::test]
async fn empty_description_persists_support_message() {
    let h = harness(false);
    let message = MessageRecord::new(h.pipeline.task_id());
    let err = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Other {
                description: Some(String::new()),
                message: "ignored".to_owned(),
            }),
            Some(&message),
        )
        .await;

    assert_eq!(GenerateTaskPipeline::error_to_desc(&err), INTERNAL_ERROR_MESSAGE);
    let descriptions = h.store.descriptions.lock().expect("descriptions lock").clone();
    assert_eq!(descriptions, vec![INTERNAL_ERROR_MESSAGE.to_owned()]);
}

#[tokio::test]
async fn blank_unclassified_error_persists_support_message() {
    let h = harness(false);
    let message = MessageRecord::new(h.pipeline.task_id());
    let err = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Other {
                description: None,
                message: String::new(),
            }),
            Some(&message),
        )
        .await;

    assert_eq!(err, TaskError::Generic(String::new()));
    assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
    let descriptions = h.store.descriptions.lock().expect("descriptions lock").clone();
    assert_eq!(descriptions, vec![INTERNAL_ERROR_MESSAGE.to_owned()]);
}

#[tokio::test]
async fn persistence_failure_still_returns_classified_error() {
    let h = harness_with(false, CountingStore::failing(), FakeFactory::default());
    let message = MessageRecord::new(h.pipeline.task_id());
    let err = h
        .pipeline
        .handle_error(
            &event(UpstreamError::Authorization {
                message: "nope".to_owned(),
            }),
            Some(&message),
        )
        .await;

    assert_eq!(err, TaskError::Authorization(INVALID_API_KEY_MESSAGE.to_owned()));
    assert_eq!(h.store.calls(), 1);
    let recorded = h.observer.recorded();
    assert!(recorded.contains(&"persistence_failed".to_owned()));
    assert!(!recorded.contains(&"message_failed".to_owned()));
}

#[tokio::test]
async fn sqlite_record_is_marked_error() {
    let store = Arc::new(
        SqliteMessageStore::open(":memory:", 1)
            .await
            .expect("in-memory store should open"),
    );
    let entity = AppGenerateEntity::new(app_config(false), InvokeFrom::Debugger, false);
    let queue: Arc<dyn QueueManager> = Arc::new(InMemoryQueueManager::new(entity.task_id()));
    let pipeline = GenerateTaskPipeline::new(
        entity,
        queue,
        user(),
        false,
        PipelineDeps::new(Arc::clone(&store) as Arc<dyn MessageStore>),
    );

    let message = MessageRecord::new(pipeline.task_id());
    store.insert(&message).await.expect("insert should succeed");

    let _ = pipeline
        .handle_error(
            &event(UpstreamError::Invocation {
                kind: InvokeErrorKind::Connection,
                description: "connection reset".to_owned(),
            }),
            Some(&message),
        )
        .await;

    let stored = store
        .get(message.id)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(stored.status, MessageStatus::Error);
    assert_eq!(stored.error.as_deref(), Some("connection reset"));
}

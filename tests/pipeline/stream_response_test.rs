//! Tests for stream responses built by the pipeline.

use uuid::Uuid;

use genpipe::entities::stream::StreamResponse;
use genpipe::errors::{TaskError, QUOTA_EXCEEDED_MESSAGE};
use genpipe::queue::QueueManager;

use crate::support::harness;

#[test]
fn ping_carries_task_id() {
    let h = harness(false);
    let ping = h.pipeline.ping_stream_response();
    assert_eq!(ping.task_id, h.pipeline.task_id());

    let sse = StreamResponse::from(ping).to_sse().expect("ping should serialise");
    let json: serde_json::Value = serde_json::from_str(
        sse.strip_prefix("data: ")
            .and_then(|s| s.strip_suffix("\n\n"))
            .expect("sse framing"),
    )
    .expect("valid json");
    assert_eq!(json["event"], "ping");
    assert_eq!(json["task_id"], h.pipeline.task_id().to_string());
}

#[test]
fn error_response_serialises_code_status_and_message() {
    let h = harness(false);
    let response = h
        .pipeline
        .error_to_stream_response(TaskError::QuotaExceeded("raw".to_owned()));
    assert_eq!(response.task_id, h.pipeline.task_id());

    let json = serde_json::to_value(StreamResponse::from(response)).expect("should serialise");
    assert_eq!(json["event"], "error");
    assert_eq!(json["code"], "provider_quota_exceeded");
    assert_eq!(json["status"], 400);
    assert_eq!(json["message"], QUOTA_EXCEEDED_MESSAGE);
}

#[test]
fn message_end_response_carries_answer() {
    let h = harness(false);
    let id = Uuid::new_v4();
    let response = h
        .pipeline
        .message_end_stream_response(id, "final".to_owned());
    let json = serde_json::to_value(StreamResponse::from(response)).expect("should serialise");
    assert_eq!(json["event"], "message_end");
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["answer"], "final");
}

#[test]
fn accessors_reflect_construction() {
    let h = harness(false);
    assert!(h.pipeline.is_stream());
    assert_eq!(h.pipeline.user().id(), "end-user-1");
    assert_eq!(h.pipeline.entity().app_config.app_id, "app-1");
    assert_eq!(h.pipeline.queue_manager().task_id(), h.pipeline.task_id());
    assert_eq!(h.queue.task_id(), h.pipeline.task_id());
}

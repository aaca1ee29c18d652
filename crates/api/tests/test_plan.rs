//! Integration tests for the Backend API client.

use chrono::{Duration, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use taskboard_api::{
    ApiClient, ApiError, BackendApi, ClaimStatus, CreateTaskRequest, DeviceIdentity,
    SubmitCompletionRequest, TaskStatus, DEVICE_ID_HEADER,
};
use taskboard_config::ApiConfig;

const DEVICE_ID: &str = "device_1700000000000_abc123xyz";

fn client_for(server: &MockServer) -> ApiClient {
    let config = ApiConfig {
        base_url: server.base_url(),
        request_timeout_seconds: 2,
        ..ApiConfig::default()
    };
    ApiClient::new(&config, DeviceIdentity::new(DEVICE_ID)).expect("client builds")
}

fn task_json(id: &str, reward: f64, max_claimants: u32) -> serde_json::Value {
    json!({
        "id": id,
        "owner_id": "owner-1",
        "title": "Walk the dog",
        "description": "Twice around the block",
        "reward_amount": reward,
        "max_claimants": max_claimants,
        "claim_deadline": "2030-01-01T00:00:00Z",
        "owner_deadline": "2030-01-02T00:00:00Z",
        "status": "open",
        "escrow_locked": false,
        "created_at": "2029-12-01T00:00:00Z",
        "updated_at": "2029-12-01T00:00:00Z"
    })
}

fn claim_json(id: &str, task_id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "task_id": task_id,
        "claimer_id": "claimer-1",
        "status": status,
        "created_at": "2029-12-01T00:00:00Z",
        "updated_at": "2029-12-01T00:00:00Z"
    })
}

#[tokio::test]
async fn open_tasks_sends_device_header_and_paging() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/tasks")
                .query_param("limit", "20")
                .query_param("offset", "0")
                .header(DEVICE_ID_HEADER, DEVICE_ID);
            then.status(200)
                .json_body(json!({ "tasks": [task_json("task-1", 25.5, 2)] }));
        })
        .await;

    let tasks = client_for(&server).open_tasks(20, 0).await.expect("tasks");

    mock.assert_async().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].reward_amount, 25.5);
    assert_eq!(tasks[0].max_claimants, 2);
    assert_eq!(tasks[0].status, TaskStatus::Open);
}

#[tokio::test]
async fn null_lists_decode_as_empty() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/tasks/task-1/claims");
            then.status(200).json_body(json!({ "claims": null }));
        })
        .await;

    let claims = client_for(&server)
        .claims_for_task("task-1")
        .await
        .expect("claims");
    assert!(claims.is_empty());
}

#[tokio::test]
async fn create_task_posts_numeric_fields() {
    let server = MockServer::start_async().await;
    let claim_deadline = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/tasks")
                .json_body_partial(r#"{ "reward_amount": 25.5, "max_claimants": 2 }"#);
            then.status(201).json_body(task_json("task-9", 25.5, 2));
        })
        .await;

    let request = CreateTaskRequest {
        title: "Walk the dog".into(),
        description: "Twice around the block".into(),
        reward_amount: 25.5,
        max_claimants: 2,
        claim_deadline,
        owner_deadline: claim_deadline + Duration::days(1),
    };
    let task = client_for(&server)
        .create_task(&request)
        .await
        .expect("task created");

    mock.assert_async().await;
    assert_eq!(task.id, "task-9");
}

#[tokio::test]
async fn rejected_request_surfaces_backend_message_verbatim() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/tasks/task-1/claims");
            then.status(400).json_body(json!({ "error": "claim limit reached" }));
        })
        .await;

    let error = client_for(&server)
        .claim_task("task-1")
        .await
        .expect_err("claim should be rejected");

    assert_eq!(error.to_string(), "claim limit reached");
    assert_eq!(error.status(), Some(400));
    assert!(matches!(error, ApiError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn rejected_request_without_json_body_keeps_raw_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/v1/chats/chat-1");
            then.status(502).body("upstream unavailable");
        })
        .await;

    let error = client_for(&server)
        .delete_chat("chat-1")
        .await
        .expect_err("delete should fail");
    assert_eq!(error.to_string(), "upstream unavailable");
}

#[tokio::test]
async fn unreadable_rejection_body_falls_back_to_status_reason() {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let address = listener.local_addr().expect("listener address");
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept request");
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request);
        // Promise more body than is sent, then hang up.
        stream
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 64\r\n\r\nshort")
            .expect("write response");
    });

    let config = ApiConfig {
        base_url: format!("http://{address}"),
        request_timeout_seconds: 2,
        ..ApiConfig::default()
    };
    let client = ApiClient::new(&config, DeviceIdentity::new(DEVICE_ID)).expect("client builds");

    let error = client
        .delete_chat("chat-1")
        .await
        .expect_err("delete should fail");
    server.join().expect("server thread");

    assert_eq!(error.status(), Some(503));
    assert_eq!(error.to_string(), "Service Unavailable");
}

#[tokio::test]
async fn submit_completion_posts_text_and_image() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/claims/claim-1/submit")
                .json_body(json!({ "text": "done", "image_url": "https://img.test/1.png" }));
            then.status(200)
                .json_body(claim_json("claim-1", "task-1", "pending"));
        })
        .await;

    let claim = client_for(&server)
        .submit_completion(
            "claim-1",
            &SubmitCompletionRequest {
                text: "done".into(),
                image_url: Some("https://img.test/1.png".into()),
            },
        )
        .await
        .expect("submission accepted");

    mock.assert_async().await;
    assert_eq!(claim.status, ClaimStatus::Pending);
}

#[tokio::test]
async fn approve_and_reject_ignore_response_body() {
    let server = MockServer::start_async().await;
    let approve = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/claims/claim-1/approve");
            then.status(200).json_body(json!({ "message": "claim approved" }));
        })
        .await;
    let reject = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/claims/claim-2/reject");
            then.status(200);
        })
        .await;

    let client = client_for(&server);
    client.approve_claim("claim-1").await.expect("approved");
    client.reject_claim("claim-2").await.expect("rejected");

    approve.assert_async().await;
    reject.assert_async().await;
}

#[tokio::test]
async fn get_or_create_chat_passes_claimer_query() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/tasks/task-1/chats")
                .query_param("claimer_id", "claimer-7");
            then.status(200).json_body(json!({
                "id": "chat-1",
                "task_id": "task-1",
                "participant_id": "owner-1",
                "other_participant_id": "claimer-7",
                "deleted_by_participant": false,
                "deleted_by_other": false,
                "created_at": "2029-12-01T00:00:00Z",
                "updated_at": "2029-12-01T00:00:00Z"
            }));
        })
        .await;

    let chat = client_for(&server)
        .get_or_create_chat("task-1", Some("claimer-7"))
        .await
        .expect("chat");

    mock.assert_async().await;
    assert_eq!(chat.other_participant_id, "claimer-7");
    assert!(!chat.is_deleted());
}

#[tokio::test]
async fn messages_use_requested_page() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/chats/chat-1/messages")
                .query_param("limit", "50")
                .query_param("offset", "0");
            then.status(200).json_body(json!({
                "messages": [{
                    "id": "msg-1",
                    "chat_id": "chat-1",
                    "sender_id": "owner-1",
                    "content": "hello",
                    "created_at": "2029-12-01T00:00:00Z"
                }]
            }));
        })
        .await;

    let messages = client_for(&server)
        .messages("chat-1", 50, 0)
        .await
        .expect("messages");
    assert_eq!(messages[0].content, "hello");
}

#[test]
fn invalid_base_url_is_rejected() {
    let config = ApiConfig {
        base_url: "not a url".into(),
        ..ApiConfig::default()
    };
    let error = match ApiClient::new(&config, DeviceIdentity::new(DEVICE_ID)) {
        Ok(_) => panic!("base url should be rejected"),
        Err(error) => error,
    };
    assert!(matches!(error, ApiError::InvalidBaseUrl { .. }));
}

#[test]
fn base_url_path_prefix_is_preserved() {
    let config = ApiConfig {
        base_url: "http://localhost:8080/backend/".into(),
        ..ApiConfig::default()
    };
    let client = ApiClient::new(&config, DeviceIdentity::new(DEVICE_ID)).expect("client");
    assert_eq!(client.base_url().path(), "/backend/");
}

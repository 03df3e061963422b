#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    clippy::similar_names
)]
mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};
use threadline_server::config::StatusPolicy;
use threadline_server::domain::party::Party;

#[tokio::test]
async fn test_create_conversation_starts_active_with_zero_counters() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(101);

    let conversation = app.create_conversation(requester, 202).await;

    assert_eq!(conversation["status"], "ACTIVE");
    assert_eq!(conversation["requester_id"], 101);
    assert_eq!(conversation["server_id"], 202);
    assert_eq!(conversation["requester_unread"], 0);
    assert_eq!(conversation["server_unread"], 0);
    assert_eq!(conversation["unread_count"], 0);
    assert_eq!(conversation["title"], "Order help");
}

#[tokio::test]
async fn test_create_with_initial_message_counts_for_server() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);

    let resp = app
        .post(requester, "/conversations")
        .json(&json!({ "server_id": 2, "initial_message": "Where is my order?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap();

    assert_eq!(body["server_unread"], 1);
    assert_eq!(body["last_message_preview"], "Where is my order?");

    let seen_by_server = app.fetch_conversation(server, id).await;
    assert_eq!(seen_by_server["unread_count"], 1);
}

#[tokio::test]
async fn test_order_conversation_is_created_once() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(7);
    let payload = json!({ "server_id": 8, "order_id": 9001, "initial_message": "hello" });

    let first: Value =
        app.post(requester, "/conversations").json(&payload).send().await.unwrap().json().await.unwrap();
    let second: Value =
        app.post(requester, "/conversations").json(&payload).send().await.unwrap().json().await.unwrap();

    assert_eq!(first["id"], second["id"]);
    // The repeated create does not resend the initial message.
    assert_eq!(second["server_unread"], 1);

    let resp = app
        .get(Party::server(8), "/conversations/by-order?requester_id=7&server_id=8&order_id=9001")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let found: Value = resp.json().await.unwrap();
    assert_eq!(found["id"], first["id"]);

    let resp = app
        .get(Party::server(8), "/conversations/by-order?requester_id=7&server_id=8&order_id=1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_initial_message_does_not_leave_a_conversation() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(7);
    let oversized = json!({ "server_id": 8, "order_id": 5, "initial_message": "x".repeat(5001) });

    let resp = app.post(requester, "/conversations").json(&oversized).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let listed: Value = app.get(requester, "/conversations").send().await.unwrap().json().await.unwrap();
    assert_eq!(listed["total"], 0);

    let retry = json!({ "server_id": 8, "order_id": 5, "initial_message": "Hi" });
    let created: Value = app.post(requester, "/conversations").json(&retry).send().await.unwrap().json().await.unwrap();
    assert_eq!(created["server_unread"], 1);
    assert_eq!(created["last_message_preview"], "Hi");
}

#[tokio::test]
async fn test_server_side_cannot_open_conversation() {
    let app = common::TestApp::spawn().await;

    let resp = app.post(Party::server(5), "/conversations").json(&json!({ "server_id": 6 })).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ACCESS_DENIED");
}

#[tokio::test]
async fn test_invalid_create_payload_is_rejected() {
    let app = common::TestApp::spawn().await;

    let resp = app.post(Party::requester(5), "/conversations").json(&json!({ "server_id": 0 })).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(app.url("/conversations")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let resp = app
        .client
        .get(app.url("/conversations"))
        .header("x-party-id", "0")
        .header("x-party-kind", "REQUESTER")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_strangers_cannot_read_a_conversation() {
    let app = common::TestApp::spawn().await;
    let conversation = app.create_conversation(Party::requester(1), 2).await;
    let id = conversation["id"].as_str().unwrap();

    for stranger in [Party::requester(3), Party::server(1), Party::requester(2)] {
        let resp = app.get(stranger, &format!("/conversations/{id}")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{stranger:?} should be denied");
    }

    let resp = app.get(Party::requester(1), &format!("/conversations/{}", uuid::Uuid::new_v4())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_by_unread_status_and_search() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(50);

    let quiet = app.create_conversation(requester, 50).await;
    let busy = app.create_conversation(requester, 50).await;

    let resp = app
        .put(server, &format!("/conversations/{}/status", quiet["id"].as_str().unwrap()))
        .json(&json!({ "status": "WAITING" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    app.send_text(requester, busy["id"].as_str().unwrap(), "Need a refund for the biryani").await;

    let all: Value = app.get(server, "/conversations").send().await.unwrap().json().await.unwrap();
    assert_eq!(all["total"], 2);
    // Most recent activity first.
    assert_eq!(all["items"][0]["id"], busy["id"]);

    let unread: Value = app.get(server, "/conversations?filter=unread").send().await.unwrap().json().await.unwrap();
    assert_eq!(unread["total"], 1);
    assert_eq!(unread["items"][0]["id"], busy["id"]);
    assert_eq!(unread["items"][0]["unread_count"], 1);

    let waiting: Value = app.get(server, "/conversations?status=WAITING").send().await.unwrap().json().await.unwrap();
    assert_eq!(waiting["total"], 1);
    assert_eq!(waiting["items"][0]["id"], quiet["id"]);

    let found: Value = app.get(server, "/conversations?q=REFUND").send().await.unwrap().json().await.unwrap();
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["id"], busy["id"]);

    let resp = app.get(server, "/conversations?filter=bogus").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let other: Value = app.get(Party::server(51), "/conversations").send().await.unwrap().json().await.unwrap();
    assert_eq!(other["total"], 0);
}

#[tokio::test]
async fn test_list_pagination() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    for server_id in 10..15 {
        app.create_conversation(requester, server_id).await;
    }

    let first: Value = app.get(requester, "/conversations?page=0&size=2").send().await.unwrap().json().await.unwrap();
    let last: Value = app.get(requester, "/conversations?page=2&size=2").send().await.unwrap().json().await.unwrap();

    assert_eq!(first["total"], 5);
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    assert_eq!(last["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_policy_allows_any_transition() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let conversation = app.create_conversation(requester, 2).await;
    let path = format!("/conversations/{}/status", conversation["id"].as_str().unwrap());

    for status in ["RESOLVED", "ARCHIVED", "ACTIVE"] {
        let resp = app.put(requester, &path).json(&json!({ "status": status })).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "transition to {status}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], status);
    }
}

#[tokio::test]
async fn test_strict_policy_guards_resolve_and_archive() {
    let mut config = common::get_test_config();
    config.conversations.status_policy = StatusPolicy::Strict;
    let app = common::TestApp::spawn_with_config(config).await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let conversation = app.create_conversation(requester, 2).await;
    let path = format!("/conversations/{}/status", conversation["id"].as_str().unwrap());

    let resp = app.put(requester, &path).json(&json!({ "status": "RESOLVED" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_STATUS_TRANSITION");

    let resp = app.put(server, &path).json(&json!({ "status": "RESOLVED" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.put(server, &path).json(&json!({ "status": "ARCHIVED" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert!(body["archived_at"].is_string());

    let resp = app.put(server, &path).json(&json!({ "status": "ACTIVE" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_assigned_agent_acts_for_server_side() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let agent = Party::server(77);
    let conversation = app.create_conversation(requester, 2).await;
    let id = conversation["id"].as_str().unwrap();

    let resp = app.get(agent, &format!("/conversations/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .put(requester, &format!("/conversations/{id}/agent"))
        .json(&json!({ "agent_id": 77 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp =
        app.put(server, &format!("/conversations/{id}/agent")).json(&json!({ "agent_id": 77 })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["agent_id"], 77);

    let seen = app.fetch_conversation(agent, id).await;
    assert_eq!(seen["agent_id"], 77);

    let resp =
        app.put(server, &format!("/conversations/{id}/agent")).json(&json!({ "agent_id": -1 })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_system_messages_are_server_side_only_and_count_for_both() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let conversation = app.create_conversation(requester, 2).await;
    let id = conversation["id"].as_str().unwrap();
    let path = format!("/conversations/{id}/system-messages");

    let resp = app.post(requester, &path).json(&json!({ "content": "Order shipped" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.post(server, &path).json(&json!({ "content": "Order shipped" })).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["sender_kind"], "SYSTEM");
    assert_eq!(message["sender_id"], 0);
    assert_eq!(message["is_own"], false);

    assert_eq!(app.fetch_conversation(requester, id).await["unread_count"], 1);
    assert_eq!(app.fetch_conversation(server, id).await["unread_count"], 1);
}

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    missing_debug_implementations,
    unreachable_pub,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
//! Runs against Postgres when `DATABASE_URL` is set; otherwise each test returns early.
mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use threadline_server::adapters::database::{PgStore, init_pool};
use threadline_server::adapters::store::Store;
use threadline_server::config::DatabaseConfig;
use threadline_server::domain::party::Party;
use threadline_server::error::AppError;

async fn pg_store() -> Option<(PgStore, DatabaseConfig)> {
    let url = std::env::var("DATABASE_URL").ok()?;
    common::setup_tracing();

    let config = DatabaseConfig { url: Some(url), ..DatabaseConfig::default() };
    let pool = init_pool(&config).await.expect("Failed to connect to DB. Is Postgres running?");
    threadline_server::run_migrations(&pool).await.expect("Failed to run migrations");
    Some((PgStore::new(pool), config))
}

async fn spawn_pg_app() -> Option<common::TestApp> {
    let (store, config) = pg_store().await?;
    let mut app_config = common::get_test_config();
    app_config.database = config;
    Some(common::TestApp::spawn_with_store(app_config, Arc::new(store)).await)
}

/// Ids unique to one test run, so repeated runs against the same database don't collide.
fn fresh_id() -> i64 {
    ((uuid::Uuid::new_v4().as_u128() as u64) >> 2) as i64 | 1
}

#[tokio::test]
async fn test_pg_counters_follow_send_and_read() {
    let Some(app) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let server = Party::server(fresh_id());
    let id = app.create_conversation(requester, server.id).await["id"].as_str().unwrap().to_string();

    app.send_text(requester, &id, "first").await;
    app.send_text(requester, &id, "second").await;
    app.send_text(server, &id, "reply").await;

    assert_eq!(app.fetch_conversation(server, &id).await["unread_count"], 2);
    assert_eq!(app.fetch_conversation(requester, &id).await["unread_count"], 1);

    let receipt: Value =
        app.post(server, &format!("/conversations/{id}/read")).send().await.unwrap().json().await.unwrap();
    assert_eq!(receipt["message_ids"].as_array().unwrap().len(), 2);
    assert_eq!(receipt["notifications_read"], 3);
    assert_eq!(app.fetch_conversation(server, &id).await["unread_count"], 0);
    assert_eq!(app.fetch_conversation(requester, &id).await["unread_count"], 1);
}

#[tokio::test]
async fn test_pg_order_conversation_is_unique() {
    let Some(app) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let server_id = fresh_id();
    let payload = json!({ "server_id": server_id, "order_id": 42 });

    let (first, second) = tokio::join!(
        app.post(requester, "/conversations").json(&payload).send(),
        app.post(requester, "/conversations").json(&payload).send(),
    );
    let first: Value = first.unwrap().json().await.unwrap();
    let second: Value = second.unwrap().json().await.unwrap();
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_pg_delete_and_search() {
    let Some(app) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let server = Party::server(fresh_id());
    let id = app.create_conversation(requester, server.id).await["id"].as_str().unwrap().to_string();

    app.send_text(requester, &id, "Paneer tikka please").await;
    let doomed = app.send_text(requester, &id, "paneer, no onions").await;

    let resp = app
        .delete(requester, &format!("/messages/{}", doomed["id"].as_str().unwrap()))
        .query(&[("for_everyone", "true")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.fetch_conversation(server, &id).await["unread_count"], 1);

    let hits: Value = app
        .get(server, &format!("/conversations/{id}/messages/search"))
        .query(&[("q", "PANEER")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits["total"], 1);
    assert_eq!(hits["items"][0]["content"], "Paneer tikka please");
}

#[tokio::test]
async fn test_pg_concurrent_sends_from_two_nodes_keep_exact_counters() {
    let Some(node_a) = spawn_pg_app().await else { return };
    let Some(node_b) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let server = Party::server(fresh_id());
    let id = node_a.create_conversation(requester, server.id).await["id"].as_str().unwrap().to_string();

    // Each node has its own in-process gate, so only the database serializes these.
    let mut sends = Vec::new();
    for n in 0..20 {
        let node = if n % 2 == 0 { &node_a } else { &node_b };
        let request = node
            .post(requester, &format!("/conversations/{id}/messages"))
            .json(&json!({ "content": format!("m{n}") }))
            .send();
        sends.push(request);
    }
    for response in futures::future::join_all(sends).await {
        assert_eq!(response.unwrap().status(), StatusCode::CREATED);
    }

    assert_eq!(node_a.fetch_conversation(server, &id).await["unread_count"], 20);
    assert_eq!(node_b.fetch_conversation(server, &id).await["unread_count"], 20);
    let history: Value =
        node_b.get(server, &format!("/conversations/{id}/messages/all")).send().await.unwrap().json().await.unwrap();
    assert_eq!(history.as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_pg_total_survives_pages_past_the_end() {
    let Some(app) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let server = Party::server(fresh_id());
    let id = app.create_conversation(requester, server.id).await["id"].as_str().unwrap().to_string();
    for n in 0..3 {
        app.send_text(requester, &id, &format!("m{n}")).await;
    }

    let beyond: Value = app
        .get(server, &format!("/conversations/{id}/messages"))
        .query(&[("page", "5"), ("size", "2")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(beyond["items"].as_array().unwrap().is_empty());
    assert_eq!(beyond["total"], 3);

    let conversations: Value =
        app.get(requester, "/conversations?page=9&size=1").send().await.unwrap().json().await.unwrap();
    assert_eq!(conversations["total"], 1);

    let notifications: Value =
        app.get(server, "/notifications?page=9&size=1").send().await.unwrap().json().await.unwrap();
    assert_eq!(notifications["total"], 4);
}

#[tokio::test]
async fn test_pg_deleted_message_cannot_be_edited() {
    let Some((store, _)) = pg_store().await else { return };
    let Some(app) = spawn_pg_app().await else { return };
    let requester = Party::requester(fresh_id());
    let id = app.create_conversation(requester, fresh_id()).await["id"].as_str().unwrap().to_string();
    let message = app.send_text(requester, &id, "original").await;
    let message_id: uuid::Uuid = message["id"].as_str().unwrap().parse().unwrap();

    store.soft_delete_message(message_id, false).await.unwrap();
    let edited = store.update_message_content(message_id, "resurrected", time::OffsetDateTime::now_utc()).await;
    assert!(matches!(edited, Err(AppError::NotFound("Message"))));

    // Widening a self-delete to everyone still lands.
    let (widened, _) = store.soft_delete_message(message_id, true).await.unwrap();
    assert!(widened.deleted_for_everyone);
    assert_eq!(widened.content, "original");
}

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

use futures::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;
use threadline_server::domain::party::Party;
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_subscriber_receives_new_messages() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let id = app.create_conversation(requester, 2).await["id"].as_str().unwrap().to_string();

    let mut ws = app.connect_ws(server).await;
    ws.subscribe(&id).await;

    let sent = app.send_text(requester, &id, "Is anyone there?").await;

    let frame = ws.receive_event("NEW_MESSAGE").await.expect("NEW_MESSAGE event");
    let event = &frame["event"];
    assert_eq!(event["conversation_id"], id.as_str());
    assert_eq!(event["message"]["id"], sent["id"]);
    assert_eq!(event["message"]["content"], "Is anyone there?");
    assert_eq!(event["message"]["sender_kind"], "REQUESTER");
}

#[tokio::test]
async fn test_events_arrive_in_commit_order() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let id = app.create_conversation(requester, 2).await["id"].as_str().unwrap().to_string();

    let mut ws = app.connect_ws(server).await;
    ws.subscribe(&id).await;

    let mut sends = Vec::new();
    for n in 0..10 {
        let client = app.client.clone();
        let url = app.url(&format!("/conversations/{id}/messages"));
        let sender = if n % 2 == 0 { requester } else { server };
        sends.push(tokio::spawn(async move {
            common::as_party(client.post(url), sender).json(&json!({ "content": format!("m{n}") })).send().await.unwrap()
        }));
    }
    for send in futures::future::join_all(sends).await {
        assert_eq!(send.unwrap().status(), reqwest::StatusCode::CREATED);
    }

    let mut streamed = Vec::new();
    while streamed.len() < 10 {
        let frame = ws.receive_event("NEW_MESSAGE").await.expect("all events delivered");
        streamed.push(frame["event"]["message"]["id"].as_str().unwrap().to_string());
    }

    let history: Value =
        app.get(requester, &format!("/conversations/{id}/messages/all")).send().await.unwrap().json().await.unwrap();
    let stored: Vec<String> =
        history.as_array().unwrap().iter().map(|m| m["id"].as_str().unwrap().to_string()).collect();
    assert_eq!(streamed, stored);

    let seen = app.fetch_conversation(server, &id).await;
    assert_eq!(seen["unread_count"], 5);
    assert_eq!(app.fetch_conversation(requester, &id).await["unread_count"], 5);
}

#[tokio::test]
async fn test_read_receipts_and_typing_over_the_socket() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let id = app.create_conversation(requester, 2).await["id"].as_str().unwrap().to_string();
    let sent = app.send_text(requester, &id, "ping").await;

    let mut requester_ws = app.connect_ws(requester).await;
    requester_ws.subscribe(&id).await;
    let mut server_ws = app.connect_ws(server).await;
    server_ws.subscribe(&id).await;

    server_ws.send_command(json!({ "type": "typing_start", "conversation_id": id })).await;
    let typing = requester_ws.receive_event("TYPING_START").await.expect("typing indicator");
    assert_eq!(typing["event"]["typing_indicator"]["party"]["id"], 2);
    assert_eq!(typing["event"]["typing_indicator"]["is_typing"], true);

    server_ws.send_command(json!({ "type": "mark_read", "conversation_id": id })).await;
    let ack = server_ws.receive_matching(WAIT, |f| f["type"] == "ack" && f["command"] == "mark_read").await;
    assert!(ack.is_some(), "mark_read acknowledged");

    let receipt = requester_ws.receive_event("MESSAGE_READ").await.expect("read receipt");
    assert_eq!(receipt["event"]["read_receipt"]["message_ids"][0], sent["id"]);
    assert_eq!(receipt["event"]["read_receipt"]["status"], "READ");

    assert_eq!(app.fetch_conversation(server, &id).await["unread_count"], 0);
}

#[tokio::test]
async fn test_presence_is_announced_on_subscribe_and_disconnect() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let id = app.create_conversation(requester, 2).await["id"].as_str().unwrap().to_string();

    let mut requester_ws = app.connect_ws(requester).await;
    requester_ws.subscribe(&id).await;

    let mut server_ws = app.connect_ws(server).await;
    server_ws.subscribe(&id).await;

    // The requester's own announcement is on the topic too, so match on who came online.
    let online = requester_ws
        .receive_matching(WAIT, |f| f["event"]["event_type"] == "USER_ONLINE" && f["event"]["presence"]["kind"] == "SERVER")
        .await
        .expect("online presence");
    assert_eq!(online["event"]["presence"]["id"], 2);

    server_ws.stream.close(None).await.unwrap();
    let offline = requester_ws.receive_event("USER_OFFLINE").await.expect("offline presence");
    assert_eq!(offline["event"]["presence"]["kind"], "SERVER");
}

#[tokio::test]
async fn test_notifications_are_pushed_to_the_recipient() {
    let app = common::TestApp::spawn().await;
    let requester = Party::requester(1);
    let server = Party::server(2);
    let id = app.create_conversation(requester, 2).await["id"].as_str().unwrap().to_string();

    let mut server_ws = app.connect_ws(server).await;
    // The ack proves the session is running and listening on its private channel.
    server_ws.subscribe(&id).await;

    app.send_text(requester, &id, "new order question").await;

    let frame = server_ws.receive_matching(WAIT, |f| f["type"] == "notification").await.expect("notification frame");
    assert_eq!(frame["notification"]["notification_type"], "NEW_MESSAGE");
    assert_eq!(frame["notification"]["body"], "new order question");
    assert_eq!(frame["notification"]["recipient_id"], 2);
}

#[tokio::test]
async fn test_strangers_cannot_subscribe() {
    let app = common::TestApp::spawn().await;
    let id = app.create_conversation(Party::requester(1), 2).await["id"].as_str().unwrap().to_string();

    let mut ws = app.connect_ws(Party::requester(99)).await;
    ws.send_command(json!({ "type": "subscribe", "conversation_id": id })).await;

    let frame = ws.receive_frame_timeout(WAIT).await.expect("reply frame");
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], "ACCESS_DENIED");

    // Nothing leaks from the conversation afterwards.
    app.send_text(Party::requester(1), &id, "private").await;
    let leaked = ws.receive_matching(Duration::from_millis(300), |f| f["type"] == "event").await;
    assert!(leaked.is_none());
}

#[tokio::test]
async fn test_malformed_commands_get_an_error_frame() {
    let app = common::TestApp::spawn().await;
    let mut ws = app.connect_ws(Party::requester(1)).await;

    ws.send_command(json!({ "type": "dance" })).await;
    let frame = ws.receive_frame_timeout(WAIT).await.expect("error frame");
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], "VALIDATION_ERROR");

    // The session survives a bad command.
    ws.send_command(json!({ "type": "unsubscribe", "conversation_id": uuid::Uuid::new_v4() })).await;
    let frame = ws.receive_frame_timeout(WAIT).await.expect("ack frame");
    assert_eq!(frame["type"], "ack");
    assert_eq!(frame["command"], "unsubscribe");
}

#[tokio::test]
async fn test_handshake_requires_identity() {
    let app = common::TestApp::spawn().await;

    let result = tokio_tungstenite::connect_async(app.ws_url.clone()).await;
    assert!(result.is_err(), "anonymous upgrade must be refused");

    let url = format!("{}?party_id=0&party_kind=REQUESTER", app.ws_url);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let app = common::TestApp::spawn().await;
    let mut ws = app.connect_ws(Party::requester(1)).await;
    ws.send_command(json!({ "type": "unsubscribe", "conversation_id": uuid::Uuid::new_v4() })).await;
    assert!(ws.receive_frame_timeout(WAIT).await.is_some());

    app.shutdown_tx.send(true).unwrap();

    let closed = tokio::time::timeout(WAIT, async {
        while let Some(msg) = ws.stream.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await;
    assert!(closed.unwrap_or(false), "session was not closed on shutdown");
}

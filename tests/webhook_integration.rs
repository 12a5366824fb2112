//! Integration tests for the webhook channel.
//!
//! Each test spins up an Axum server on a random port and drives the real
//! HTTP contract: URL substitution, query parameters, JSON body and token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

use mailmerge::channels::{EmailDelivery, MailEnvelope, WebhookChannel, WebhookDelivery};
use mailmerge::config::{MailerConfig, TemplateMarkers};
use mailmerge::dispatch::Dispatcher;
use mailmerge::error::DeliveryError;
use mailmerge::recipients::Recipient;
use mailmerge::template::Composer;

/// One request as seen by the server.
#[derive(Debug, Clone)]
struct Hit {
    user_id: String,
    query: HashMap<String, String>,
    body: Value,
}

type Hits = Arc<Mutex<Vec<Hit>>>;

async fn notify(
    State(hits): State<Hits>,
    Path(user_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if user_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "no such user" })),
        );
    }
    hits.lock().unwrap().push(Hit {
        user_id,
        query,
        body,
    });
    (StatusCode::OK, Json(json!({ "ok": true })))
}

/// Start an Axum server on a random port, return (base url, recorded hits).
async fn start_server() -> (String, Hits) {
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/users/{user_id}/notify", get(notify))
        .with_state(Arc::clone(&hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), hits)
}

fn channel(base: &str) -> WebhookChannel {
    WebhookChannel::new(
        format!("{base}/users/:user_id/notify"),
        Some(SecretString::from("shared-token")),
    )
    .unwrap()
}

/// Email channel that must never be used by a webhook run.
struct NoEmail;

#[async_trait::async_trait]
impl EmailDelivery for NoEmail {
    fn name(&self) -> &str {
        "no-email"
    }

    async fn send(&mut self, _: &MailEnvelope, _: &str) -> Result<(), DeliveryError> {
        panic!("webhook runs must not send email");
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[tokio::test]
async fn payload_arrives_as_query_and_json_body() {
    let (base, hits) = start_server().await;

    let mut payload = Map::new();
    payload.insert("title".into(), Value::from("Hello Ada"));
    payload.insert("days_until_expire".into(), Value::from(3));

    channel(&base).send("42", payload).await.unwrap();

    let hits = hits.lock().unwrap();
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.user_id, "42");
    assert_eq!(hit.query["title"], "Hello Ada");
    assert_eq!(hit.query["days_until_expire"], "3");
    assert_eq!(hit.query["token"], "shared-token");
    assert_eq!(hit.body["title"], "Hello Ada");
    assert_eq!(hit.body["days_until_expire"], 3);
    assert_eq!(hit.body["token"], "shared-token");
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let (base, hits) = start_server().await;

    let err = channel(&base).send("missing", Map::new()).await.unwrap_err();
    match err {
        DeliveryError::Http { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such user");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert!(hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_route_is_reported_with_status() {
    let (base, _hits) = start_server().await;
    let ch = WebhookChannel::new(
        format!("{base}/elsewhere/:user_id"),
        Some(SecretString::from("t")),
    )
    .unwrap();

    let err = ch.send("1", Map::new()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn unsigned_channel_sends_no_token() {
    let (base, hits) = start_server().await;
    let ch = WebhookChannel::new(format!("{base}/users/:user_id/notify"), None).unwrap();

    let mut payload = Map::new();
    payload.insert("title".into(), Value::from("Hi"));
    ch.send("5", payload).await.unwrap();

    let hits = hits.lock().unwrap();
    assert_eq!(hits[0].query["title"], "Hi");
    assert!(!hits[0].query.contains_key("token"));
    assert!(hits[0].body.get("token").is_none());
}

#[tokio::test]
async fn dispatcher_drives_webhook_template_end_to_end() {
    let (base, hits) = start_server().await;

    let config = MailerConfig {
        sender_first_name: "Ada".into(),
        sender_last_name: "Lovelace".into(),
        sender_email: "ada@example.com".into(),
        ..Default::default()
    };
    let template = "{---WEBHOOK---}\n{---BEGIN_BODY---}\n\
                    {\"title\": \"Hi {{first_name}}\", \"from\": \"{{sender_first_name}}\"}\n\
                    {---END_BODY---}";
    let composer = Composer::new(template, TemplateMarkers::default(), config).unwrap();

    let mut dispatcher =
        Dispatcher::new(composer, Box::new(NoEmail), Some(Box::new(channel(&base)))).unwrap();

    let list = vec![
        Recipient::from_pairs([("user_id", "7"), ("first_name", "Grace")]),
        Recipient::from_pairs([("email", "no-id@example.com"), ("first_name", "Bob")]),
        Recipient::from_pairs([("user_id", "8"), ("first_name", "Alan")]),
    ];
    let report = dispatcher.run(&list).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.skipped, 1);

    let hits = hits.lock().unwrap();
    assert_eq!(hits[0].user_id, "7");
    assert_eq!(hits[0].body["title"], "Hi Grace");
    assert_eq!(hits[0].body["from"], "Ada");
    assert_eq!(hits[1].user_id, "8");
    assert_eq!(hits[1].query["title"], "Hi Alan");
}

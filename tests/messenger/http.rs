//! HTTP admin integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

use std::sync::Arc;

use messenger_bundle::config::{RetryPolicy, RetryStrategyConfig};
use messenger_bundle::{http, Envelope, Messenger, Outcome};
use serde_json::{json, Value};

use crate::support::{async_with_failure_transport, config, SEND_EMAIL};

/// Messenger with `count` text messages parked on the failure transport.
fn messenger_with_failures(count: usize) -> Arc<Messenger> {
    let mut config = async_with_failure_transport();
    config.transports[0].retry_strategy = RetryStrategyConfig::Policy(RetryPolicy {
        max_retries: 0,
        ..Default::default()
    });
    let messenger = Messenger::builder(config)
        .handler(SEND_EMAIL, "mailer", |_| Err("mailbox full".into()))
        .assemble()
        .unwrap();

    let worker = messenger.worker(&["async"], None).unwrap();
    for i in 0..count {
        messenger
            .default_bus()
            .dispatch(Envelope::with_string_body(
                format!("m-{i}"),
                SEND_EMAIL,
                r#"{"to":"a@example.com"}"#,
            ))
            .unwrap();
        assert_eq!(worker.run_once().unwrap()[0].outcome, Outcome::RoutedToFailure);
    }
    Arc::new(messenger)
}

/// Bind to port 0 and return the actual address.
async fn start_server(messenger: Arc<Messenger>) -> String {
    let app = http::router(messenger);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_check() {
    let base = start_server(messenger_with_failures(0)).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["buses"], json!(["messenger.bus.default"]));
    assert_eq!(body["failure_transport"], "failed");
}

#[tokio::test]
async fn describe_messenger() {
    let base = start_server(messenger_with_failures(0)).await;
    let body: Value = reqwest::get(format!("{base}/messenger"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["default_bus"], "messenger.bus.default");
    assert_eq!(body["routing"][0]["message_type"], SEND_EMAIL);
    assert_eq!(body["transports"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn list_and_show_failed_messages() {
    let base = start_server(messenger_with_failures(2)).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/failed")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let listed: Value = resp.json().await.unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["message_id"], "m-0");
    assert_eq!(listed[0]["original_receiver"], "async");
    assert_eq!(listed[0]["body"]["text"], r#"{"to":"a@example.com"}"#);
    assert!(listed[0]["error"].as_str().unwrap().contains("mailbox full"));

    let limited: Value = client
        .get(format!("{base}/failed?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let id = listed[1]["id"].as_str().unwrap();
    let shown: Value = client
        .get(format!("{base}/failed/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(shown["message_id"], "m-1");

    let missing = client.get(format!("{base}/failed/999")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn retry_and_remove_failed_messages() {
    let messenger = messenger_with_failures(2);
    let base = start_server(Arc::clone(&messenger)).await;
    let client = reqwest::Client::new();

    let listed: Value = client
        .get(format!("{base}/failed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = listed[0]["id"].as_str().unwrap().to_string();
    let second = listed[1]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/failed/{first}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let retried: Value = resp.json().await.unwrap();
    assert_eq!(retried["message_id"], "m-0");
    assert_eq!(retried["original_receiver"], Value::Null);
    assert_eq!(
        messenger.transport("async").unwrap().as_listable().unwrap().all(None).unwrap().len(),
        1
    );

    let resp = client.delete(format!("{base}/failed/{second}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(messenger.failed_messages().list(None).unwrap().is_empty());

    let again = client.delete(format!("{base}/failed/{second}")).send().await.unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn failed_routes_answer_501_without_a_failure_transport() {
    let messenger = Messenger::builder(config(r#"{ "transports": { "async": "in-memory://" } }"#))
        .assemble()
        .unwrap();
    let base = start_server(Arc::new(messenger)).await;

    let resp = reqwest::get(format!("{base}/failed")).await.unwrap();
    assert_eq!(resp.status(), 501);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

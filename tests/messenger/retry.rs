//! Retry policy through the worker.

use std::sync::Arc;
use std::time::Duration;

use messenger_bundle::{Envelope, Messenger, Outcome, RetryStrategy};
use serde_json::json;

use crate::support::{async_with_failure_transport, send_email, stored, Calls, SEND_EMAIL};

fn outcome_of_next_run(messenger: &Messenger, receiver: &str) -> Outcome {
    let processed = messenger.worker(&[receiver], None).unwrap().run_once().unwrap();
    assert_eq!(processed.len(), 1, "expected exactly one message on {}", receiver);
    processed[0].outcome.clone()
}

/// Never retries.
struct NoRetry;

impl RetryStrategy for NoRetry {
    fn is_retryable(&self, _envelope: &Envelope) -> bool {
        false
    }

    fn wait_time(&self, _envelope: &Envelope) -> Duration {
        Duration::ZERO
    }
}

// ============================================================================
// Multiplier backoff
// ============================================================================

#[test]
fn default_policy_retries_three_times_with_doubling_delay() {
    let messenger = Messenger::builder(async_with_failure_transport())
        .handler(SEND_EMAIL, "mailer", |_| Err("smtp unavailable".into()))
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    for (retry_count, millis) in [(1, 1000), (2, 2000), (3, 4000)] {
        assert_eq!(
            outcome_of_next_run(&messenger, "async"),
            Outcome::Retried {
                retry_count,
                delay: Duration::from_millis(millis),
            }
        );
        let pending = stored(&messenger, "async");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count(), retry_count);
        assert_eq!(pending[0].delay_millis(), Some(millis));
        assert!(pending[0].error_details().unwrap().contains("smtp unavailable"));
    }

    assert_eq!(outcome_of_next_run(&messenger, "async"), Outcome::RoutedToFailure);
    assert!(stored(&messenger, "async").is_empty());

    let failed = stored(&messenger, "failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, "m-1");
    assert_eq!(failed[0].original_receiver(), Some("async"));
    assert!(failed[0].error_details().unwrap().contains("smtp unavailable"));
    assert_eq!(failed[0].delay_millis(), None);
}

#[test]
fn capped_policy_from_configuration() {
    let config = messenger_bundle::MessengerConfig::from_value(&json!({
        "transports": {
            "async": {
                "dsn": "in-memory://",
                "retry_strategy": { "max_retries": 5, "delay": 100, "multiplier": 3, "max_delay": 500 }
            }
        },
        "routing": { SEND_EMAIL: "async" }
    }))
    .unwrap();
    let messenger = Messenger::builder(config)
        .handler(SEND_EMAIL, "mailer", |_| Err("nope".into()))
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    let delays: Vec<u64> = (0..5)
        .map(|_| match outcome_of_next_run(&messenger, "async") {
            Outcome::Retried { delay, .. } => delay.as_millis() as u64,
            other => panic!("expected a retry, got {:?}", other),
        })
        .collect();
    assert_eq!(delays, vec![100, 300, 500, 500, 500]);

    // No failure transport: the exhausted message is dropped.
    assert_eq!(outcome_of_next_run(&messenger, "async"), Outcome::Dropped);
    assert!(stored(&messenger, "async").is_empty());
}

#[test]
fn zero_max_retries_goes_straight_to_failure() {
    let config = messenger_bundle::MessengerConfig::from_value(&json!({
        "transports": {
            "async": { "dsn": "in-memory://", "retry_strategy": { "max_retries": 0 } },
            "failed": "in-memory://"
        },
        "failure_transport": "failed",
        "routing": { SEND_EMAIL: "async" }
    }))
    .unwrap();
    let messenger = Messenger::builder(config)
        .handler(SEND_EMAIL, "mailer", |_| Err("nope".into()))
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    assert_eq!(outcome_of_next_run(&messenger, "async"), Outcome::RoutedToFailure);
}

// ============================================================================
// Retry services
// ============================================================================

#[test]
fn retry_service_replaces_the_multiplier() {
    let config = messenger_bundle::MessengerConfig::from_value(&json!({
        "transports": {
            "async": { "dsn": "in-memory://", "retry_strategy": { "service": "app.no_retry" } },
            "failed": "in-memory://"
        },
        "failure_transport": "failed",
        "routing": { SEND_EMAIL: "async" }
    }))
    .unwrap();

    let err = Messenger::builder(config.clone()).assemble().err().unwrap();
    assert!(err.to_string().contains("app.no_retry"));

    let messenger = Messenger::builder(config)
        .retry_service("app.no_retry", Arc::new(NoRetry))
        .handler(SEND_EMAIL, "mailer", |_| Err("nope".into()))
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    assert_eq!(outcome_of_next_run(&messenger, "async"), Outcome::RoutedToFailure);
}

// ============================================================================
// Partial failures
// ============================================================================

#[test]
fn successful_handlers_do_not_run_again_on_retry() {
    let audits = Calls::default();
    let attempts = Calls::default();
    let audit = audits.clone();
    let attempt = attempts.clone();

    let messenger = Messenger::builder(async_with_failure_transport())
        .handler(SEND_EMAIL, "audit", move |_| {
            audit.bump();
            Ok(())
        })
        .handler(SEND_EMAIL, "mailer", move |_| {
            attempt.bump();
            if attempt.count() == 1 {
                Err("first attempt fails".into())
            } else {
                Ok(())
            }
        })
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    assert!(matches!(
        outcome_of_next_run(&messenger, "async"),
        Outcome::Retried { retry_count: 1, .. }
    ));
    assert_eq!(outcome_of_next_run(&messenger, "async"), Outcome::Handled);
    assert_eq!(audits.count(), 1);
    assert_eq!(attempts.count(), 2);
    assert!(stored(&messenger, "failed").is_empty());
}

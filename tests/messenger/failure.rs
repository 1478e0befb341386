//! Failed message administration end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use messenger_bundle::{ConfigurationError, FailureError, Messenger, Outcome};

use crate::support::{async_with_failure_transport, config, send_email, stored, SEND_EMAIL};

/// Messenger whose mailer fails until `healthy` is set, with `count`
/// messages already parked on the failure transport.
fn with_failed_messages(count: usize) -> (Messenger, Arc<AtomicBool>) {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&healthy);
    let mut config = async_with_failure_transport();
    config.transports[0].retry_strategy = messenger_bundle::config::RetryStrategyConfig::Policy(
        messenger_bundle::config::RetryPolicy {
            max_retries: 0,
            ..Default::default()
        },
    );

    let messenger = Messenger::builder(config)
        .handler(SEND_EMAIL, "mailer", move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("mailbox full".into())
            }
        })
        .assemble()
        .unwrap();

    let worker = messenger.worker(&["async"], None).unwrap();
    for i in 0..count {
        messenger
            .default_bus()
            .dispatch(send_email(&format!("m-{}", i), "a@example.com"))
            .unwrap();
        let processed = worker.run_once().unwrap();
        assert_eq!(processed[0].outcome, Outcome::RoutedToFailure);
    }
    (messenger, healthy)
}

fn transport_id(envelope: &messenger_bundle::Envelope) -> String {
    envelope.transport_message_id().unwrap().to_string()
}

// ============================================================================
// Disabled
// ============================================================================

#[test]
fn every_operation_is_disabled_without_a_failure_transport() {
    let messenger = Messenger::builder(config(r#"{ "transports": { "async": "in-memory://" } }"#))
        .assemble()
        .unwrap();
    let failed = messenger.failed_messages();

    assert!(!failed.is_enabled());
    assert!(matches!(failed.list(None), Err(FailureError::Disabled)));
    assert!(matches!(failed.show("1"), Err(FailureError::Disabled)));
    assert!(matches!(failed.retry("1"), Err(FailureError::Disabled)));
    assert!(matches!(failed.remove("1"), Err(FailureError::Disabled)));
    assert_eq!(FailureError::Disabled.status_code(), 501);
}

#[test]
fn unknown_failure_transport_fails_assembly() {
    let err = Messenger::builder(config(
        r#"{ "transports": { "async": "in-memory://" }, "failure_transport": "failed" }"#,
    ))
    .assemble()
    .err()
    .unwrap();
    assert_eq!(
        err.as_configuration(),
        Some(&ConfigurationError::UnknownFailureTransport("failed".into()))
    );
}

// ============================================================================
// List / show / remove
// ============================================================================

#[test]
fn list_and_show_parked_messages() {
    let (messenger, _) = with_failed_messages(3);
    let failed = messenger.failed_messages();

    assert_eq!(failed.transport_name(), Some("failed"));
    let all = failed.list(None).unwrap();
    assert_eq!(
        all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
        vec!["m-0", "m-1", "m-2"]
    );
    assert_eq!(failed.list(Some(2)).unwrap().len(), 2);

    let shown = failed.show(&transport_id(&all[1])).unwrap();
    assert_eq!(shown.id, "m-1");
    assert_eq!(shown.original_receiver(), Some("async"));
    assert!(shown.error_details().unwrap().contains("mailbox full"));

    let missing = failed.show("999").unwrap_err();
    assert!(matches!(missing, FailureError::NotFound(ref id) if id == "999"));
    assert_eq!(missing.status_code(), 404);
}

#[test]
fn remove_deletes_only_the_named_message() {
    let (messenger, _) = with_failed_messages(2);
    let failed = messenger.failed_messages();
    let first = transport_id(&failed.list(None).unwrap()[0]);

    let removed = failed.remove(&first).unwrap();
    assert_eq!(removed.id, "m-0");
    assert_eq!(
        failed.list(None).unwrap().iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
        vec!["m-1".to_string()]
    );
    assert!(matches!(failed.remove(&first), Err(FailureError::NotFound(_))));
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn retry_sends_back_to_the_original_receiver() {
    let (messenger, healthy) = with_failed_messages(1);
    let failed = messenger.failed_messages();
    let id = transport_id(&failed.list(None).unwrap()[0]);

    let resent = failed.retry(&id).unwrap();
    assert_eq!(resent.id, "m-0");
    assert_eq!(resent.original_receiver(), None);
    assert_eq!(resent.error_details(), None);
    assert_eq!(resent.retry_count(), 0);
    assert!(failed.list(None).unwrap().is_empty());
    assert_eq!(stored(&messenger, "async").len(), 1);

    healthy.store(true, Ordering::SeqCst);
    let processed = messenger.worker(&["async"], None).unwrap().run_once().unwrap();
    assert_eq!(processed[0].outcome, Outcome::Handled);
    assert!(stored(&messenger, "async").is_empty());
}

#[test]
fn consuming_the_failure_transport_retries_on_the_original_receiver_name() {
    let (messenger, healthy) = with_failed_messages(1);
    healthy.store(true, Ordering::SeqCst);

    let worker = messenger.worker(&["failed"], None).unwrap();
    let processed = worker.run_once().unwrap();
    assert_eq!(processed[0].receiver, "failed");
    assert_eq!(processed[0].outcome, Outcome::Handled);
    assert!(stored(&messenger, "failed").is_empty());
}

#[test]
fn failure_transport_messages_that_fail_again_are_dropped() {
    let (messenger, _) = with_failed_messages(1);

    let processed = messenger.worker(&["failed"], None).unwrap().run_once().unwrap();
    assert_eq!(processed[0].outcome, Outcome::Dropped);
    assert!(stored(&messenger, "failed").is_empty());
    assert!(stored(&messenger, "async").is_empty());
}

#[test]
fn admin_failures_map_to_status_codes() {
    let codes: Vec<u16> = [
        FailureError::Disabled,
        FailureError::NotFound("1".into()),
        FailureError::NotListable("amqp".into()),
        FailureError::UnknownReceiver("gone".into()),
    ]
    .iter()
    .map(FailureError::status_code)
    .collect();
    assert_eq!(codes, vec![501, 404, 501, 422]);
}

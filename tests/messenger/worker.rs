//! Worker loop on a background thread.

use std::thread;
use std::time::{Duration, Instant};

use messenger_bundle::{ConfigurationError, Envelope, Messenger, Outcome, Stamp};

use crate::support::{async_with_failure_transport, config, send_email, stored, Calls, SEND_EMAIL};

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for the worker");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn spawned_worker_handles_routed_messages() {
    let calls = Calls::default();
    let handled = calls.clone();
    let messenger = Messenger::builder(async_with_failure_transport())
        .handler(SEND_EMAIL, "mailer", move |envelope| {
            let email: crate::support::SendEmail = envelope.decode()?;
            assert_eq!(email.subject, "Welcome");
            handled.bump();
            Ok(())
        })
        .assemble()
        .unwrap();

    for i in 0..3 {
        messenger
            .default_bus()
            .dispatch(send_email(&format!("m-{}", i), "a@example.com"))
            .unwrap();
    }
    assert_eq!(calls.count(), 0);

    let handle = messenger
        .worker(&["async"], None)
        .unwrap()
        .spawn(Duration::from_millis(5));
    wait_until(|| calls.count() == 3);
    let stats = handle.stop();

    assert_eq!(stats.messages_handled, 3);
    assert_eq!(stats.messages_retried, 0);
    assert!(stats.polls >= 3);
    assert!(stored(&messenger, "async").is_empty());
}

#[test]
fn spawned_worker_counts_retries_and_failures() {
    let messenger = Messenger::builder(async_with_failure_transport())
        .handler(SEND_EMAIL, "mailer", |_| Err("down".into()))
        .assemble()
        .unwrap();
    messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();

    let handle = messenger
        .worker(&["async"], None)
        .unwrap()
        .spawn(Duration::from_millis(5));
    wait_until(|| stored(&messenger, "failed").len() == 1);
    let stats = handle.stop();

    assert_eq!(stats.messages_retried, 3);
    assert_eq!(stats.messages_failed, 1);
    assert_eq!(stats.messages_handled, 0);
}

#[test]
fn receivers_are_consumed_in_the_given_order() {
    let messenger = Messenger::builder(config(
        r#"{
            "transports": { "high": "in-memory://", "low": "in-memory://" },
            "routing": { "Urgent": "high", "Routine": "low" }
        }"#,
    ))
    .handler("Urgent", "urgent", |_| Ok(()))
    .handler("Routine", "routine", |_| Ok(()))
    .assemble()
    .unwrap();

    let bus = messenger.default_bus();
    bus.dispatch(Envelope::with_string_body("r-1", "Routine", "{}")).unwrap();
    bus.dispatch(Envelope::with_string_body("u-1", "Urgent", "{}")).unwrap();

    let worker = messenger.worker(&["messenger.transport.high", "low"], None).unwrap();
    assert_eq!(worker.receivers(), vec!["high", "low"]);

    let processed = worker.run_once().unwrap();
    let order: Vec<(&str, &str)> = processed
        .iter()
        .map(|p| (p.receiver.as_str(), p.message_id.as_str()))
        .collect();
    assert_eq!(order, vec![("high", "u-1"), ("low", "r-1")]);
}

#[test]
fn redelivered_messages_are_rejected_by_the_bus() {
    let messenger = Messenger::builder(async_with_failure_transport())
        .handler(SEND_EMAIL, "mailer", |_| Ok(()))
        .assemble()
        .unwrap();

    let err = messenger
        .default_bus()
        .dispatch(send_email("m-1", "a@example.com").with(Stamp::Received {
            transport: "async".into(),
            redelivered: true,
        }))
        .unwrap_err();
    assert!(err.to_string().contains("async"));
}

fn command_and_event_buses() -> Messenger {
    Messenger::builder(config(
        r#"{
            "default_bus": "command.bus",
            "buses": {
                "command.bus": {},
                "event.bus": { "default_middleware": "allow_no_handlers" }
            },
            "transports": { "events": "in-memory://" },
            "routing": { "Unhandled": "events" }
        }"#,
    ))
    .assemble()
    .unwrap()
}

fn dispatch_unhandled_on_event_bus(messenger: &Messenger) {
    let sent = messenger
        .bus("event.bus")
        .unwrap()
        .dispatch(Envelope::with_string_body("e-1", "Unhandled", "{}"))
        .unwrap();
    assert_eq!(sent.bus_name(), Some("event.bus"));
}

#[test]
fn consumed_messages_return_to_the_bus_they_were_sent_from() {
    let messenger = command_and_event_buses();
    dispatch_unhandled_on_event_bus(&messenger);

    let worker = messenger.worker(&["events"], None).unwrap();
    let processed = worker.run_once().unwrap();
    assert_eq!(processed[0].outcome, Outcome::Handled);
    assert!(stored(&messenger, "events").is_empty());
}

#[test]
fn messages_without_a_bus_stamp_use_the_default_bus() {
    let messenger = command_and_event_buses();
    let worker = messenger.worker(&["events"], None).unwrap();

    let unstamped = Envelope::with_string_body("e-1", "Unhandled", "{}");
    assert_eq!(worker.bus_for(&unstamped).name(), "command.bus");

    let unknown = unstamped.with(Stamp::BusName("query.bus".into()));
    assert_eq!(worker.bus_for(&unknown).name(), "command.bus");
}

#[test]
fn an_explicit_bus_overrides_the_stamp() {
    let messenger = command_and_event_buses();
    dispatch_unhandled_on_event_bus(&messenger);

    let on_event_bus = messenger.worker(&["events"], Some("eventBus")).unwrap();
    let on_command_bus = messenger.worker(&["events"], Some("command.bus")).unwrap();

    // The strict command bus has no handler for it.
    assert!(matches!(
        on_command_bus.run_once().unwrap()[0].outcome,
        Outcome::Retried { retry_count: 1, .. }
    ));
    assert_eq!(on_event_bus.run_once().unwrap()[0].outcome, Outcome::Handled);
}

#[test]
fn unknown_worker_bus_is_an_invalid_value() {
    let messenger = command_and_event_buses();
    let err = messenger.worker(&["events"], Some("query.bus")).err().unwrap();
    assert!(matches!(err, ConfigurationError::InvalidValue { ref path, .. } if path == "bus"));
    let message = err.to_string();
    assert!(message.contains("query.bus") && message.contains("event.bus"));
    assert!(!message.contains("default bus"));
}

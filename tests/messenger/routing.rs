//! Routing through an assembled messenger.

use std::collections::HashMap;
use std::sync::Arc;

use messenger_bundle::serializer::NativeSerializer;
use messenger_bundle::{ConfigurationError, Envelope, InMemoryTransport, Messenger, MessengerConfig};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use crate::support::{config, send_email, stored, DOMAIN_EVENT, ORDER_PLACED, SEND_EMAIL};

fn three_transports(routing: Value) -> MessengerConfig {
    MessengerConfig::from_value(&json!({
        "transports": {
            "async": "in-memory://",
            "audit": "in-memory://",
            "fallback": "in-memory://"
        },
        "routing": routing
    }))
    .unwrap()
}

fn order_placed(id: &str) -> Envelope {
    Envelope::with_string_body(id, ORDER_PLACED, r#"{"order":"o-1"}"#).with_supertype(DOMAIN_EVENT)
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn routed_messages_are_sent_not_handled() {
    let messenger = Messenger::builder(three_transports(json!({ SEND_EMAIL: "async" })))
        .handler(SEND_EMAIL, "mailer", |_| Err("handlers must not run on dispatch".into()))
        .assemble()
        .unwrap();

    let envelope = messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();
    assert_eq!(envelope.sent_to(), vec!["async"]);
    assert_eq!(stored(&messenger, "async").len(), 1);
    assert!(stored(&messenger, "audit").is_empty());
}

#[test]
fn exact_type_and_supertypes_merge_before_wildcard() {
    let messenger = Messenger::builder(three_transports(json!({
        ORDER_PLACED: ["async"],
        DOMAIN_EVENT: ["audit", "async"],
        "*": "fallback"
    })))
    .assemble()
    .unwrap();

    let envelope = messenger.default_bus().dispatch(order_placed("m-1")).unwrap();
    assert_eq!(envelope.sent_to(), vec!["async", "audit"]);
    assert!(stored(&messenger, "fallback").is_empty());

    let other = messenger
        .default_bus()
        .dispatch(Envelope::with_string_body("m-2", "Unrouted", "{}"))
        .unwrap();
    assert_eq!(other.sent_to(), vec!["fallback"]);
}

#[test]
fn service_ids_and_sender_services_are_valid_senders() {
    let audit_log = Arc::new(InMemoryTransport::new("audit_log", Arc::new(NativeSerializer)));
    let messenger = Messenger::builder(three_transports(json!({
        SEND_EMAIL: ["messenger.transport.async", "app.audit_log"]
    })))
    .sender_service("app.audit_log", audit_log.clone())
    .assemble()
    .unwrap();

    let envelope = messenger.default_bus().dispatch(send_email("m-1", "a@example.com")).unwrap();
    assert_eq!(envelope.sent_to(), vec!["async", "app.audit_log"]);
    assert_eq!(audit_log.len(), 1);
    assert_eq!(stored(&messenger, "async").len(), 1);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn unknown_sender_names_the_route() {
    let err = Messenger::builder(three_transports(json!({ SEND_EMAIL: ["async", "amqp"] })))
        .assemble()
        .err()
        .unwrap();
    assert_eq!(
        err.as_configuration(),
        Some(&ConfigurationError::UnknownSender {
            message_type: SEND_EMAIL.into(),
            sender: "amqp".into(),
        })
    );
}

#[test]
fn known_message_types_restrict_routing_keys() {
    let routing = json!({ SEND_EMAIL: "async", "*": "fallback" });

    let messenger = Messenger::builder(three_transports(routing.clone()))
        .known_message_types([SEND_EMAIL])
        .assemble();
    assert!(messenger.is_ok());

    let err = Messenger::builder(three_transports(routing))
        .known_message_types([ORDER_PLACED])
        .assemble()
        .err()
        .unwrap();
    assert_eq!(
        err.as_configuration(),
        Some(&ConfigurationError::UnknownMessageType(SEND_EMAIL.into()))
    );
}

#[test]
fn routing_without_transports_is_rejected() {
    let err = Messenger::builder(config(r#"{ "routing": { "Ping": "async" } }"#))
        .assemble()
        .err()
        .unwrap();
    assert!(matches!(
        err.as_configuration(),
        Some(ConfigurationError::UnknownSender { sender, .. }) if sender == "async"
    ));
}

// ============================================================================
// Properties
// ============================================================================

fn sender_lists() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(vec!["async", "audit", "fallback"]), 1..4)
        .prop_map(|names| names.into_iter().map(String::from).collect())
}

proptest! {
    #[test]
    fn routing_table_survives_normalization(
        routes in prop::collection::hash_map("[A-Z][a-z]{1,8}", sender_lists(), 0..6)
    ) {
        let mut routing = Map::new();
        for (message_type, senders) in &routes {
            routing.insert(message_type.clone(), json!(senders));
        }
        let messenger = Messenger::builder(three_transports(Value::Object(routing)))
            .assemble()
            .unwrap();

        let table: HashMap<String, Vec<String>> = messenger
            .router()
            .routes()
            .iter()
            .map(|route| (route.message_type.clone(), route.senders.clone()))
            .collect();
        prop_assert_eq!(&table, &routes);

        for (message_type, senders) in &routes {
            let envelope = Envelope::new("m", message_type.clone(), Vec::new());
            let mut expected: Vec<&str> = Vec::new();
            for sender in senders {
                if !expected.contains(&sender.as_str()) {
                    expected.push(sender);
                }
            }
            prop_assert_eq!(messenger.router().sender_names(&envelope), expected);
        }
    }
}

//! Configuration validation through the public entry points.

use std::fs;

use messenger_bundle::config::{DefaultMiddleware, RetryStrategyConfig, DEFAULT_BUS_NAME};
use messenger_bundle::{ConfigurationError, Messenger, MessengerConfig};
use serde_json::json;

// ============================================================================
// Default bus rules
// ============================================================================

#[test]
fn two_buses_without_default_fail() {
    let err = MessengerConfig::from_value(&json!({
        "buses": { "command.bus": {}, "event.bus": {} }
    }))
    .unwrap_err();
    assert_eq!(err, ConfigurationError::MissingDefaultBus);
}

#[test]
fn unknown_default_bus_lists_available_buses() {
    let err = MessengerConfig::from_value(&json!({
        "default_bus": "query.bus",
        "buses": { "command.bus": {}, "event.bus": {} }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnknownDefaultBus {
            name: "query.bus".into(),
            available: vec!["command.bus".into(), "event.bus".into()],
        }
    );
    let message = err.to_string();
    assert!(message.contains("command.bus") && message.contains("event.bus"));
}

#[test]
fn single_bus_is_adopted_as_default() {
    let config = MessengerConfig::from_value(&json!({ "buses": { "command.bus": null } })).unwrap();
    assert_eq!(config.default_bus.as_deref(), Some("command.bus"));
}

#[test]
fn absent_buses_yield_the_default_bus() {
    let config = MessengerConfig::from_value(&json!({})).unwrap();
    assert_eq!(config.bus_names(), vec![DEFAULT_BUS_NAME.to_string()]);
    assert_eq!(config.default_bus.as_deref(), Some(DEFAULT_BUS_NAME));
    assert_eq!(config.buses[0].default_middleware, DefaultMiddleware::Enabled);
}

// ============================================================================
// Retry strategy
// ============================================================================

#[test]
fn retry_service_and_numbers_conflict() {
    let err = MessengerConfig::from_value(&json!({
        "transports": {
            "async": {
                "dsn": "in-memory://",
                "retry_strategy": { "service": "app.retry", "max_retries": 5 }
            }
        }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::ConflictingRetryStrategy {
            transport: "async".into()
        }
    );
    assert!(err.to_string().contains("async"));
}

#[test]
fn retry_bounds_are_enforced() {
    let err = MessengerConfig::from_value(&json!({
        "transports": {
            "async": { "dsn": "in-memory://", "retry_strategy": { "multiplier": 0.5 } }
        }
    }))
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::InvalidValue { ref path, .. }
            if path == "transports.async.retry_strategy.multiplier"
    ));

    let err = MessengerConfig::from_value(&json!({
        "transports": {
            "async": { "dsn": "in-memory://", "retry_strategy": { "delay": -1 } }
        }
    }))
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn retry_service_is_kept() {
    let config = MessengerConfig::from_value(&json!({
        "transports": {
            "async": { "dsn": "in-memory://", "retry_strategy": { "service": "app.retry" } }
        }
    }))
    .unwrap();
    assert_eq!(
        config.transports[0].retry_strategy,
        RetryStrategyConfig::Service("app.retry".into())
    );
}

// ============================================================================
// Shape errors
// ============================================================================

#[test]
fn unknown_keys_are_rejected_with_their_path() {
    let err = MessengerConfig::from_value(&json!({
        "buses": { "command.bus": { "middlewares": [] } }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnrecognizedOption {
            path: "buses.command.bus".into(),
            key: "middlewares".into(),
        }
    );
}

#[test]
fn multi_key_middleware_map_is_rejected() {
    let err = MessengerConfig::from_value(&json!({
        "buses": { "command.bus": { "middleware": [{ "a": [], "b": [] }] } }
    }))
    .unwrap_err();
    match err {
        ConfigurationError::InvalidMiddleware { bus, given } => {
            assert_eq!(bus, "command.bus");
            assert!(given.contains("\"a\""));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn transport_without_dsn() {
    let err = MessengerConfig::from_value(&json!({
        "transports": { "async": { "options": {} } }
    }))
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::MissingDsn {
            transport: "async".into()
        }
    );
}

// ============================================================================
// Sources
// ============================================================================

#[test]
fn yaml_and_json_agree() {
    let yaml = MessengerConfig::from_yaml_str(
        r#"
transports:
  async: "in-memory://"
routing:
  'App\Message\SendEmail': async
buses:
  command.bus:
    middleware:
      - app.audit: [verbose]
"#,
    )
    .unwrap();

    let json = MessengerConfig::from_json_str(
        r#"{
            "transports": { "async": "in-memory://" },
            "routing": { "App\\Message\\SendEmail": "async" },
            "buses": { "command.bus": { "middleware": [{ "app.audit": ["verbose"] }] } }
        }"#,
    )
    .unwrap();

    assert_eq!(yaml, json);
    assert_eq!(yaml.buses[0].middleware[0].id, "app.audit");
    assert_eq!(yaml.buses[0].middleware[0].arguments, vec![json!("verbose")]);
}

#[test]
fn from_path_uses_the_extension() {
    let dir = std::env::temp_dir().join(format!("messenger-config-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let json_path = dir.join("messenger.json");
    fs::write(&json_path, r#"{ "transports": { "async": "in-memory://" } }"#).unwrap();
    let yaml_path = dir.join("messenger.yaml");
    fs::write(&yaml_path, "transports:\n  async: 'in-memory://'\n").unwrap();

    let from_json = MessengerConfig::from_path(&json_path).unwrap();
    let from_yaml = MessengerConfig::from_path(&yaml_path).unwrap();
    assert_eq!(from_json, from_yaml);

    let missing = MessengerConfig::from_path(dir.join("missing.yaml")).unwrap_err();
    assert!(matches!(missing, ConfigurationError::Parse(_)));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn configs_built_in_code_are_validated_on_assembly() {
    let mut config = MessengerConfig::default();
    config.buses.push(messenger_bundle::config::BusConfig::new("event.bus"));

    let err = Messenger::builder(config).assemble().err().unwrap();
    assert_eq!(err.as_configuration(), Some(&ConfigurationError::MissingDefaultBus));
}

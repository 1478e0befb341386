//! `messenger-inspect <config.{yaml,json}> [--debug] [--validation]`
//!
//! Validates a messenger configuration file and prints the validated
//! configuration together with the middleware pipeline of every bus.
//! Routing senders, the failure transport and middleware ids must all
//! resolve; otherwise the error is printed and the exit status is non-zero.

use std::process::ExitCode;

use messenger_bundle::bus::{BusAssembler, MiddlewareRegistry};
use messenger_bundle::config::{Capabilities, MessengerConfig, ValidationPolicy};
use messenger_bundle::ConfigurationError;
use serde_json::{json, Map, Value};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut path = None;
    let mut debug = false;
    let mut validation = ValidationPolicy::disabled();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--debug" => debug = true,
            "--validation" => validation = ValidationPolicy::enabled(),
            other if path.is_none() => path = Some(other.to_string()),
            other => {
                eprintln!("unexpected argument: {}", other);
                return ExitCode::from(2);
            }
        }
    }
    let Some(path) = path else {
        eprintln!("usage: messenger-inspect <config.yaml|config.json> [--debug] [--validation]");
        return ExitCode::from(2);
    };

    match inspect(&path, debug, validation) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn inspect(
    path: &str,
    debug: bool,
    validation: ValidationPolicy,
) -> Result<Value, Box<dyn std::error::Error>> {
    let config = MessengerConfig::from_path(path)?;
    let pipelines = pipelines(&config, debug, validation)?;
    Ok(json!({
        "config": serde_json::to_value(&config)?,
        "pipelines": pipelines,
    }))
}

/// Check references and resolve the pipeline of every bus.
fn pipelines(
    config: &MessengerConfig,
    debug: bool,
    validation: ValidationPolicy,
) -> Result<Map<String, Value>, ConfigurationError> {
    config.check_references()?;

    let registry = MiddlewareRegistry::new();
    let assembler = BusAssembler::new(&registry)
        .debug(debug)
        .capabilities(Capabilities::all())
        .validation(validation);

    let mut pipelines = Map::new();
    for bus in &config.buses {
        let entries: Vec<Value> = assembler
            .resolved_pipeline(bus)?
            .into_iter()
            .map(|entry| {
                if entry.arguments.is_empty() {
                    Value::String(entry.id)
                } else {
                    let mut stage = Map::new();
                    stage.insert(entry.id, Value::Array(entry.arguments));
                    Value::Object(stage)
                }
            })
            .collect();
        pipelines.insert(bus.name.clone(), Value::Array(entries));
    }
    Ok(pipelines)
}

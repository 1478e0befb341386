//! Raw configuration tree → `MessengerConfig`.
//!
//! Accepts the shorthand forms users write by hand (a bare DSN string for a
//! transport, a single sender for a route, `{factory_id: [args]}` for
//! middleware) and rejects unknown keys with their full path.

use serde_json::{Map, Value};

use super::model::{
    BusConfig, DefaultMiddleware, MessengerConfig, MiddlewareEntry, RetryPolicy,
    RetryStrategyConfig, RoutingEntry, SerializerConfig, SymfonySerializerConfig, TransportConfig,
    DEFAULT_BUS_NAME,
};
use crate::error::ConfigurationError;

const ROOT: &str = "messenger";
const ROOT_KEYS: &[&str] = &[
    "routing",
    "serializer",
    "transports",
    "failure_transport",
    "default_bus",
    "buses",
];
const RETRY_NUMERIC_KEYS: &[&str] = &["max_retries", "delay", "multiplier", "max_delay"];

pub(crate) fn normalize(value: &Value) -> Result<MessengerConfig, ConfigurationError> {
    let empty = Map::new();
    let root = match value {
        Value::Null => &empty,
        other => object(other, ROOT)?,
    };
    check_keys(root, ROOT_KEYS, ROOT)?;

    Ok(MessengerConfig {
        routing: routing(root.get("routing"))?,
        serializer: serializer(root.get("serializer"))?,
        transports: transports(root.get("transports"))?,
        failure_transport: optional_string(root.get("failure_transport"), "failure_transport")?,
        default_bus: optional_string(root.get("default_bus"), "default_bus")?,
        buses: buses(root.get("buses"))?,
    })
}

fn routing(value: Option<&Value>) -> Result<Vec<RoutingEntry>, ConfigurationError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(v) => object(v, "routing")?,
    };

    let mut entries = Vec::with_capacity(map.len());
    for (message_type, v) in map {
        let path = format!("routing.{}", message_type);
        let senders = match v {
            Value::String(sender) => vec![sender.clone()],
            Value::Array(items) => strings(items, &format!("{}.senders", path))?,
            Value::Object(m) => {
                check_keys(m, &["senders"], &path)?;
                match m.get("senders") {
                    Some(Value::String(sender)) => vec![sender.clone()],
                    Some(Value::Array(items)) => strings(items, &format!("{}.senders", path))?,
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => {
                        return Err(invalid(
                            format!("{}.senders", path),
                            format!("expected a list of sender names, got {}", kind(other)),
                        ))
                    }
                }
            }
            other => {
                return Err(invalid(
                    path,
                    format!("expected a sender name, a list or a map, got {}", kind(other)),
                ))
            }
        };

        if senders.is_empty() {
            return Err(invalid(
                format!("{}.senders", path),
                "should have at least 1 element(s) defined",
            ));
        }
        entries.push(RoutingEntry {
            message_type: message_type.clone(),
            senders,
        });
    }
    Ok(entries)
}

fn serializer(value: Option<&Value>) -> Result<SerializerConfig, ConfigurationError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(SerializerConfig::default()),
        Some(v) => object(v, "serializer")?,
    };
    check_keys(map, &["default_serializer", "symfony_serializer"], "serializer")?;

    let mut config = SerializerConfig::default();
    if let Some(id) = optional_string(map.get("default_serializer"), "serializer.default_serializer")? {
        config.default_serializer = id;
    }

    match map.get("symfony_serializer") {
        None | Some(Value::Null) => {}
        Some(v) => {
            let path = "serializer.symfony_serializer";
            let inner = object(v, path)?;
            check_keys(inner, &["format", "context"], path)?;
            let mut symfony = SymfonySerializerConfig::default();
            if let Some(format) = optional_string(inner.get("format"), "serializer.symfony_serializer.format")? {
                symfony.format = format;
            }
            match inner.get("context") {
                None | Some(Value::Null) => {}
                Some(ctx) => {
                    symfony.context = object(ctx, "serializer.symfony_serializer.context")?.clone();
                }
            }
            config.symfony_serializer = symfony;
        }
    }
    Ok(config)
}

fn transports(value: Option<&Value>) -> Result<Vec<TransportConfig>, ConfigurationError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(v) => object(v, "transports")?,
    };

    let mut transports = Vec::with_capacity(map.len());
    for (name, v) in map {
        let path = format!("transports.{}", name);
        let transport = match v {
            Value::String(dsn) => TransportConfig::new(name.clone(), dsn.clone()),
            Value::Object(m) => {
                check_keys(m, &["dsn", "serializer", "options", "retry_strategy"], &path)?;
                let dsn = optional_string(m.get("dsn"), &format!("{}.dsn", path))?
                    .ok_or_else(|| ConfigurationError::MissingDsn {
                        transport: name.clone(),
                    })?;
                let options = match m.get("options") {
                    None | Some(Value::Null) => Map::new(),
                    Some(o) => object(o, &format!("{}.options", path))?.clone(),
                };
                TransportConfig {
                    name: name.clone(),
                    dsn,
                    serializer: optional_string(m.get("serializer"), &format!("{}.serializer", path))?,
                    options,
                    retry_strategy: retry_strategy(name, m.get("retry_strategy"))?,
                }
            }
            other => {
                return Err(invalid(
                    path,
                    format!("expected a DSN string or a map, got {}", kind(other)),
                ))
            }
        };
        transports.push(transport);
    }
    Ok(transports)
}

fn retry_strategy(
    transport: &str,
    value: Option<&Value>,
) -> Result<RetryStrategyConfig, ConfigurationError> {
    let path = format!("transports.{}.retry_strategy", transport);
    let map = match value {
        None | Some(Value::Null) => return Ok(RetryStrategyConfig::default()),
        Some(v) => object(v, &path)?,
    };

    // Conflict check comes first so it wins over any other complaint about the block.
    let service = optional_string(map.get("service"), &format!("{}.service", path))?;
    let has_numeric = RETRY_NUMERIC_KEYS
        .iter()
        .any(|key| map.get(*key).is_some_and(|v| !v.is_null()));
    if service.is_some() && has_numeric {
        return Err(ConfigurationError::ConflictingRetryStrategy {
            transport: transport.to_string(),
        });
    }

    check_keys(
        map,
        &["service", "max_retries", "delay", "multiplier", "max_delay"],
        &path,
    )?;

    if let Some(service) = service {
        return Ok(RetryStrategyConfig::Service(service));
    }

    let defaults = RetryPolicy::default();
    let max_retries = unsigned(map.get("max_retries"), &format!("{}.max_retries", path))?
        .map(|n| {
            u32::try_from(n).map_err(|_| {
                invalid(format!("{}.max_retries", path), "should be at most 4294967295")
            })
        })
        .transpose()?
        .unwrap_or(defaults.max_retries);

    Ok(RetryStrategyConfig::Policy(RetryPolicy {
        max_retries,
        delay: unsigned(map.get("delay"), &format!("{}.delay", path))?.unwrap_or(defaults.delay),
        multiplier: multiplier(map.get("multiplier"), &format!("{}.multiplier", path))?
            .unwrap_or(defaults.multiplier),
        max_delay: unsigned(map.get("max_delay"), &format!("{}.max_delay", path))?
            .unwrap_or(defaults.max_delay),
    }))
}

fn buses(value: Option<&Value>) -> Result<Vec<BusConfig>, ConfigurationError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(vec![BusConfig::new(DEFAULT_BUS_NAME)]),
        Some(v) => object(v, "buses")?,
    };

    let mut buses = Vec::with_capacity(map.len());
    for (name, v) in map {
        let path = format!("buses.{}", name);
        let mut bus = BusConfig::new(name.clone());
        let m = match v {
            Value::Null => {
                buses.push(bus);
                continue;
            }
            other => object(other, &path)?,
        };
        check_keys(m, &["default_middleware", "middleware"], &path)?;

        bus.default_middleware = match m.get("default_middleware") {
            None | Some(Value::Null) | Some(Value::Bool(true)) => DefaultMiddleware::Enabled,
            Some(Value::Bool(false)) => DefaultMiddleware::Disabled,
            Some(Value::String(s)) if s == "allow_no_handlers" => DefaultMiddleware::AllowNoHandlers,
            Some(other) => {
                return Err(invalid(
                    format!("{}.default_middleware", path),
                    format!(
                        "expected true, false or \"allow_no_handlers\", got {}",
                        other
                    ),
                ))
            }
        };
        bus.middleware = middleware_list(name, m.get("middleware"))?;
        buses.push(bus);
    }
    Ok(buses)
}

fn middleware_list(bus: &str, value: Option<&Value>) -> Result<Vec<MiddlewareEntry>, ConfigurationError> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        // A lone id or a lone map is a one-element list.
        Some(single) => vec![single],
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| middleware_entry(bus, index, item))
        .collect()
}

fn middleware_entry(bus: &str, index: usize, item: &Value) -> Result<MiddlewareEntry, ConfigurationError> {
    let path = format!("buses.{}.middleware.{}", bus, index);
    let (id, arguments) = match item {
        Value::String(id) => (id.clone(), Vec::new()),
        Value::Object(m) if m.contains_key("id") => {
            check_keys(m, &["id", "arguments"], &path)?;
            let id = optional_string(m.get("id"), &format!("{}.id", path))?.unwrap_or_default();
            (id, arguments(m.get("arguments"), &format!("{}.arguments", path))?)
        }
        Value::Object(m) if m.len() == 1 => match m.iter().next() {
            Some((id, args)) => (id.clone(), arguments(Some(args), &format!("{}.{}", path, id))?),
            None => (String::new(), Vec::new()),
        },
        Value::Object(m) if m.len() > 1 => {
            return Err(ConfigurationError::InvalidMiddleware {
                bus: bus.to_string(),
                given: item.to_string(),
            })
        }
        Value::Object(_) => (String::new(), Vec::new()),
        other => {
            return Err(invalid(
                path,
                format!("expected a middleware id or a map, got {}", kind(other)),
            ))
        }
    };

    if id.is_empty() {
        return Err(invalid(format!("{}.id", path), "cannot contain an empty value"));
    }
    Ok(MiddlewareEntry { id, arguments })
}

fn arguments(value: Option<&Value>, path: &str) -> Result<Vec<Value>, ConfigurationError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(invalid(
            path,
            format!("expected a list of arguments, got {}", kind(other)),
        )),
    }
}

// -----------------------------------------------------------------------------
// Typed accessors
// -----------------------------------------------------------------------------

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ConfigurationError> {
    value
        .as_object()
        .ok_or_else(|| invalid(path, format!("expected a map, got {}", kind(value))))
}

fn check_keys(map: &Map<String, Value>, allowed: &[&str], path: &str) -> Result<(), ConfigurationError> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ConfigurationError::UnrecognizedOption {
            path: path.to_string(),
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

fn optional_string(value: Option<&Value>, path: &str) -> Result<Option<String>, ConfigurationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(path, format!("expected a string, got {}", kind(other)))),
    }
}

fn strings(items: &[Value], path: &str) -> Result<Vec<String>, ConfigurationError> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(path, format!("expected a string, got {}", kind(other)))),
        })
        .collect()
}

fn unsigned(value: Option<&Value>, path: &str) -> Result<Option<u64>, ConfigurationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                Ok(Some(v))
            } else if n.as_i64().is_some() {
                Err(invalid(path, "should be greater than or equal to 0"))
            } else {
                Err(invalid(path, format!("expected an integer, got {}", n)))
            }
        }
        Some(other) => Err(invalid(path, format!("expected an integer, got {}", kind(other)))),
    }
}

fn multiplier(value: Option<&Value>, path: &str) -> Result<Option<f64>, ConfigurationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v >= 1.0 => Ok(Some(v)),
            _ => Err(invalid(path, "should be greater than or equal to 1")),
        },
        Some(other) => Err(invalid(path, format!("expected a number, got {}", kind(other)))),
    }
}

fn invalid(path: impl Into<String>, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        path: path.into(),
        reason: reason.into(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

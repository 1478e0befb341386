//! DSN parsing - just enough to pick a factory and read query options.

use std::collections::BTreeMap;
use std::fmt;

/// A transport connection string: `scheme://rest[?key=value&...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    raw: String,
    scheme: String,
    location: String,
    query: BTreeMap<String, String>,
}

impl Dsn {
    /// Parse a DSN. Returns `None` when there is no non-empty `scheme://` prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        let (scheme, rest) = raw.split_once("://")?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return None;
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, parse_query(query)),
            None => (rest, BTreeMap::new()),
        };

        Some(Self {
            raw: raw.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            location: location.to_string(),
            query,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Everything between `://` and `?`.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

//! Inbound webhook/callback request as seen by verifiers and parsers
//!
//! The full request is handed to both the signature check and the parser, so
//! each provider can read its signature from a header, query parameter, or
//! body field.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    /// Parsed body, `Null` for GET callbacks
    pub body: Value,
}

impl WebhookRequest {
    pub fn new(headers: HeaderMap, query: HashMap<String, String>, body: Value) -> Self {
        Self {
            headers,
            query,
            body,
        }
    }

    pub fn from_body(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Add a header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Top-level body field rendered as a string
    pub fn body_field(&self, name: &str) -> Option<String> {
        self.body.get(name).map(field_string)
    }

    /// Body field, falling back to the query string
    pub fn input(&self, name: &str) -> Option<String> {
        self.body_field(name)
            .filter(|value| !value.is_empty())
            .or_else(|| self.query_param(name).map(str::to_string))
    }
}

/// Render a JSON scalar the way providers concatenate it for signing
///
/// Booleans become `true`/`false`, null becomes the empty string.
pub fn field_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Follow a dotted path (`order.id`) through nested objects
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

//! PII sanitizing for log output
//!
//! A pure function applied uniformly at the logging boundary: email-like
//! substrings are redacted and recognized PII-bearing keys are blanked,
//! recursively across nested structures.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

/// Keys whose values are blanked regardless of content
const PII_KEYS: &[&str] = &[
    "email",
    "email_address",
    "email_addresses",
    "phone",
    "phone_number",
    "phone_numbers",
    "first_name",
    "last_name",
    "full_name",
    "primary_location",
    "address",
];

fn is_pii_key(key: &str) -> bool {
    let key = key.trim().to_lowercase();
    PII_KEYS.iter().any(|pii| *pii == key)
}

/// Redact email-like substrings in a string
pub fn sanitize_text(text: &str) -> String {
    EMAIL_RE.replace_all(text, "[REDACTED_EMAIL]").into_owned()
}

/// Sanitize a JSON value for logging
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let mut sanitized = Map::with_capacity(map.len());
            for (key, entry) in map {
                if is_pii_key(key) {
                    sanitized.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize_value(entry));
                }
            }
            Value::Object(sanitized)
        }
        other => other.clone(),
    }
}

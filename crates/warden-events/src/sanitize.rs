//! Outbound payload sanitization.
//!
//! Events serialized for the cockpit pass through [`sanitize_payload`],
//! which strips any object key that looks like a secret. The check runs
//! recursively over the whole value so nested payloads (task metadata,
//! worker rows) cannot smuggle a credential out.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Keys matching this pattern are removed before serialization.
static SENSITIVE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(secret|token|password|apikey|api_key|OS_HTTP_SECRET|_KEY$)")
        .expect("static sensitive-key pattern compiles")
});

/// Whether an object key must be stripped from outbound payloads.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Strip secret-shaped keys from a JSON value, recursively.
///
/// Arrays are sanitized element-wise; non-container values pass through
/// unchanged. The input is consumed so untouched subtrees move rather
/// than clone.
#[must_use]
pub fn sanitize_payload(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .map(|(key, inner)| (key, sanitize_payload(inner)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(sanitize_payload).collect())
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_secret_keys() {
        let sanitized = sanitize_payload(json!({
            "worker_id": "w1",
            "shared_secret": "hunter2",
            "API_KEY": "k",
            "apiKey": "k",
            "OS_HTTP_SECRET": "s",
        }));
        assert_eq!(sanitized, json!({"worker_id": "w1"}));
    }

    #[test]
    fn test_strips_key_suffix_case_insensitively() {
        let sanitized = sanitize_payload(json!({"SIGNING_KEY": "k", "monkey": "ok"}));
        // `_KEY$` matches the suffix; "monkey" has no underscore boundary.
        assert_eq!(sanitized, json!({"monkey": "ok"}));
    }

    #[test]
    fn test_recurses_into_nested_payloads() {
        let sanitized = sanitize_payload(json!({
            "task": {"metadata": {"token": "t", "title": "ok"}},
            "items": [{"password": "p", "id": 1}]
        }));
        assert_eq!(
            sanitized,
            json!({"task": {"metadata": {"title": "ok"}}, "items": [{"id": 1}]})
        );
    }

    #[test]
    fn test_non_objects_pass_through() {
        assert_eq!(sanitize_payload(json!(42)), json!(42));
        assert_eq!(sanitize_payload(json!("secret")), json!("secret"));
    }
}

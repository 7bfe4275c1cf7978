//! Request fingerprints.
//!
//! A fingerprint is the SHA-256 of the canonical JSON form of the request
//! content. Object keys are sorted at every depth, so two payloads that differ
//! only in key order share a fingerprint.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::dispatch::request::OperationKind;

/// Rebuild `value` with object keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::with_capacity(map.len());
            for (key, field) in fields {
                sorted.insert(key.clone(), canonicalize(field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Fingerprint of one request. `scope` (e.g. a user id) partitions the key
/// space when entries must not be shared.
pub fn fingerprint(
    operation: OperationKind,
    payload: &Value,
    options: &Value,
    scope: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_str().as_bytes());
    hasher.update([0u8]);
    if let Some(scope) = scope {
        hasher.update(scope.as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(canonicalize(payload).to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonicalize(options).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"code": "fn main() {}", "lang": "rust", "meta": {"x": 1, "y": [1, {"b": 2, "a": 1}]}});
        let b = json!({"meta": {"y": [1, {"a": 1, "b": 2}], "x": 1}, "lang": "rust", "code": "fn main() {}"});
        assert_eq!(
            fingerprint(OperationKind::Explain, &a, &Value::Null, None),
            fingerprint(OperationKind::Explain, &b, &Value::Null, None)
        );
    }

    #[test]
    fn test_fields_are_distinguished() {
        let payload = json!({"topic": "ownership"});
        let base = fingerprint(OperationKind::Explain, &payload, &json!({}), None);

        assert_ne!(base, fingerprint(OperationKind::Summarize, &payload, &json!({}), None));
        assert_ne!(base, fingerprint(OperationKind::Explain, &payload, &json!({"depth": 2}), None));
        assert_ne!(base, fingerprint(OperationKind::Explain, &payload, &json!({}), Some("alice")));
        assert_ne!(
            fingerprint(OperationKind::Explain, &payload, &json!({}), Some("alice")),
            fingerprint(OperationKind::Explain, &payload, &json!({}), Some("bob"))
        );
        assert_eq!(base.len(), 64);
    }
}

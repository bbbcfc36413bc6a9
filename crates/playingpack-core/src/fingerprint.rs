//! Request body normalization and content-addressed fingerprinting.
//!
//! `normalize` recursively sorts mapping keys and strips the handful of
//! fields that make two otherwise-identical requests look different
//! (`stream`, `request_id`, `timestamp`). `hash` serializes the
//! normalized form as compact JSON and takes its SHA-256 digest. Two
//! bodies that differ only in key order, or only in those three fields
//! at any nesting depth, hash identically.

use crate::error::FingerprintError;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Keys dropped from mappings at every nesting depth before hashing.
const IGNORED_KEYS: &[&str] = &["stream", "request_id", "timestamp"];

/// Recursively normalize a JSON value: sort mapping keys, drop the
/// ignored keys, and recurse into arrays and nested objects.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(k, _)| !IGNORED_KEYS.contains(&k.as_str()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k.clone(), normalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// Compute the fingerprint of a request body: normalize, serialize as
/// compact UTF-8 JSON, and take the lowercase hex SHA-256 digest.
pub fn hash(body: &Value) -> Result<String, FingerprintError> {
    let normalized = normalize(body);
    let serialized = serde_json::to_vec(&normalized)?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_body_same_hash() {
        let body = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        assert_eq!(hash(&body).unwrap(), hash(&body).unwrap());
    }

    #[test]
    fn key_order_is_insensitive() {
        let a = json!({"model": "gpt-4", "stream": true, "messages": []});
        let b = json!({"messages": [], "stream": true, "model": "gpt-4"});
        assert_eq!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn stream_request_id_timestamp_are_ignored() {
        let a = json!({"model": "gpt-4", "messages": []});
        let b = json!({
            "model": "gpt-4",
            "messages": [],
            "stream": true,
            "request_id": "abc-123",
            "timestamp": 1234567890,
        });
        assert_eq!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn ignored_keys_are_stripped_at_nested_depth() {
        let a = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let b = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi", "timestamp": 99}]
        });
        assert_eq!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn different_content_differs() {
        let a = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let b = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "bye"}]});
        assert_ne!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn digest_is_64_lowercase_hex_chars() {
        let body = json!({"model": "gpt-4"});
        let digest = hash(&body).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn normalize_sorts_keys_recursively() {
        let body = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let normalized = normalize(&body);
        let keys: Vec<&String> = normalized.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        let nested_keys: Vec<&String> = normalized["a"].as_object().unwrap().keys().collect();
        assert_eq!(nested_keys, vec!["c", "d"]);
    }

    #[test]
    fn stable_across_repeated_runs() {
        let body = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let first = hash(&body).unwrap();
        for _ in 0..10 {
            assert_eq!(hash(&body).unwrap(), first);
        }
    }
}

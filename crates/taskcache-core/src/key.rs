//! Canonical JSON + digest key function.
//!
//! Two configs are the same entry iff their canonical forms are equal.
//! Canonicalization rules:
//! - Objects: keys sorted lexicographically.
//! - Arrays: order preserved.
//! - Scalars: serde_json's default textual form (numbers, `true`/`false`,
//!   `null`).
//!
//! The canonical string is hashed with SHA-256; the hex digest is the key.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Renders `value` as a canonical string: object keys sorted, arrays in
/// order, scalars in their default `serde_json` textual form.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap(),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let rendered: Vec<String> = sorted.into_iter()
                                              .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(v)))
                                              .collect();
            format!("{{{}}}", rendered.join(","))
        }
    }
}

/// Hex-encoded SHA-256 digest of a byte string.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

/// The stable key of a config value: the digest of its canonical form.
pub fn compute_key(config: &Value) -> String {
    digest_hex(canonical_json(config).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_key_order_does_not_affect_key() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(compute_key(&a), compute_key(&b));
    }

    #[test]
    fn array_order_does_affect_key() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(compute_key(&a), compute_key(&b));
    }

    #[test]
    fn distinct_scalars_produce_distinct_keys() {
        assert_ne!(compute_key(&json!(1)), compute_key(&json!("1")));
        assert_ne!(compute_key(&json!(null)), compute_key(&json!(false)));
    }

    #[test]
    fn key_is_stable_across_calls() {
        let v = json!({"config": [1, 2, {"nested": true}]});
        assert_eq!(compute_key(&v), compute_key(&v));
    }
}

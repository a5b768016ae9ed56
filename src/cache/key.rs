//! Cache key derivation.
//!
//! A key is the lowercase hex SHA-256 of the canonical JSON form of
//! `{"model": ..., "params": ...}`. Canonical means object keys are sorted
//! at every depth and the encoding is compact, so logically equal requests
//! hash equally whatever order their maps were built in. Unlike an
//! in-process `DefaultHasher`, the digest is stable across processes, which
//! shared stores (a directory, a remote KV) rely on.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::types::InvocationRequest;

/// Hex-encoded SHA-256 digest identifying one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest length in hex characters.
    pub const LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the cache key for a request.
pub fn derive_key(request: &InvocationRequest) -> CacheKey {
    let mut material = Map::with_capacity(2);
    material.insert("model".to_owned(), Value::String(request.model.clone()));
    material.insert("params".to_owned(), request.params.clone());

    let digest = Sha256::digest(canonical_bytes(&Value::Object(material)));
    CacheKey(hex::encode(digest))
}

/// Compact JSON encoding with object keys sorted at every depth.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(k.clone()), out);
                out.push(b':');
                write_canonical(v, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

// Scalars carry no maps, so serde_json's compact Display is already canonical.
fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    out.extend_from_slice(value.to_string().as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(model: &str, params: Value) -> CacheKey {
        derive_key(&InvocationRequest::from_value(model, params))
    }

    #[test]
    fn key_is_64_hex_chars() {
        let k = key("m1", json!({"prompt": "hi"}));
        assert_eq!(k.as_str().len(), CacheKey::LEN);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_deterministic() {
        assert_eq!(
            key("m1", json!({"prompt": "hi"})),
            key("m1", json!({"prompt": "hi"}))
        );
    }

    #[test]
    fn key_differs_on_model() {
        assert_ne!(
            key("m1", json!({"prompt": "hi"})),
            key("m2", json!({"prompt": "hi"}))
        );
    }

    #[test]
    fn key_differs_on_param_value() {
        assert_ne!(
            key("m1", json!({"prompt": "hi", "temperature": 0.2})),
            key("m1", json!({"prompt": "hi", "temperature": 0.3}))
        );
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(
            key("m1", json!({"stop": ["a", "b"]})),
            key("m1", json!({"stop": ["b", "a"]}))
        );
    }

    #[test]
    fn canonical_sorts_nested_keys() {
        let mut inner_a = Map::new();
        inner_a.insert("z".into(), json!(1));
        inner_a.insert("a".into(), json!(2));
        let mut inner_b = Map::new();
        inner_b.insert("a".into(), json!(2));
        inner_b.insert("z".into(), json!(1));

        let a = canonical_bytes(&json!({"outer": [Value::Object(inner_a)]}));
        let b = canonical_bytes(&json!({"outer": [Value::Object(inner_b)]}));
        assert_eq!(a, b);
        assert_eq!(String::from_utf8(a).unwrap(), r#"{"outer":[{"a":2,"z":1}]}"#);
    }

    #[test]
    fn canonical_escapes_strings() {
        let bytes = canonical_bytes(&json!({"q\"uote": "line\nbreak"}));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"q\"uote":"line\nbreak"}"#
        );
    }
}

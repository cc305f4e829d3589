// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON encoding and fingerprint hashing.
//!
//! Mirrors the "null the self-referential field, hash the rest" trick used
//! for receipt integrity: a fingerprint here is the first 64 bits of
//! SHA-256 over a canonical encoding of `(salt, input)`, so key order never
//! affects equality of the hash.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// 16 hex digits = first 64 bits of a SHA-256 digest.
pub type Fingerprint = String;

/// Serialize `value` to JSON with map keys sorted at every level, so that two
/// structurally-equal values always produce byte-identical output regardless
/// of field declaration order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("canonical JSON values always serialize")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Compute the 16-hex-digit fingerprint of `input` salted with `salt`.
///
/// Equal fingerprints imply an identical input tree: the canonical encoding
/// removes JSON key-order ambiguity before hashing, per the data model's
/// fingerprint property.
///
/// # Errors
///
/// Returns an error only if `input` cannot be serialized to JSON at all
/// (e.g. a map with non-string keys coerced through a custom `Serialize`).
pub fn fingerprint(input: &impl Serialize, salt: &str) -> Result<Fingerprint, serde_json::Error> {
    let input_value = serde_json::to_value(input)?;
    let wrapped = serde_json::json!({ "salt": salt, "input": input_value });
    let canonical = canonical_json(&wrapped);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    Ok(digest[..8].iter().map(|b| format!("{b:02x}")).collect())
}

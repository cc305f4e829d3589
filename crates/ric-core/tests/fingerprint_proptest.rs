// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for canonical JSON fingerprinting (P2, P3).

use proptest::prelude::*;
use ric_core::fingerprint;
use serde_json::{json, Map, Value};

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::String),
    ]
}

fn arb_object(max_fields: usize) -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(("[a-z]{1,8}", arb_scalar()), 0..max_fields)
}

fn to_object(fields: Vec<(String, Value)>) -> Value {
    let mut map = Map::new();
    for (k, v) in fields {
        map.insert(k, v);
    }
    Value::Object(map)
}

proptest! {
    /// Shuffling field-insertion order never changes the fingerprint (P2: the
    /// cache key depends only on content, not on key order).
    #[test]
    fn fingerprint_is_insensitive_to_key_order(fields in arb_object(8)) {
        let forward = to_object(fields.clone());
        let mut reversed_fields = fields;
        reversed_fields.reverse();
        let backward = to_object(reversed_fields);

        let fp_forward = fingerprint(&forward, "salt").unwrap();
        let fp_backward = fingerprint(&backward, "salt").unwrap();
        prop_assert_eq!(fp_forward, fp_backward);
    }

    /// Any two distinct salts applied to the same input produce distinct
    /// fingerprints with overwhelming probability (P3).
    #[test]
    fn fingerprint_changes_with_salt(fields in arb_object(5), salt_a in "[a-z]{1,12}", salt_b in "[a-z]{1,12}") {
        prop_assume!(salt_a != salt_b);
        let input = to_object(fields);
        let fp_a = fingerprint(&input, &salt_a).unwrap();
        let fp_b = fingerprint(&input, &salt_b).unwrap();
        prop_assert_ne!(fp_a, fp_b);
    }

    /// The fingerprint is always sixteen lowercase hex digits, regardless of
    /// input shape.
    #[test]
    fn fingerprint_is_always_sixteen_hex_digits(fields in arb_object(10), salt in "[a-zA-Z0-9]{0,20}") {
        let input = to_object(fields);
        let fp = fingerprint(&input, &salt).unwrap();
        prop_assert_eq!(fp.len(), 16);
        prop_assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// Running the fingerprint twice on the same input and salt is
    /// idempotent (the JSON-strategy half of P2's determinism guarantee).
    #[test]
    fn fingerprint_is_repeatable(fields in arb_object(8), salt in "[a-z]{1,12}") {
        let input = to_object(fields);
        let first = fingerprint(&input, &salt).unwrap();
        let second = fingerprint(&input, &salt).unwrap();
        prop_assert_eq!(first, second);
    }
}

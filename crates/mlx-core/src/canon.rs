// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signature payload canonicalization.
//!
//! The canonical payload is the deterministic byte sequence a manifest's
//! signatures are computed over. It strips mutable transport details (the
//! `url` of every module) and the signature values themselves, while
//! preserving everything else — including unknown fields of any JSON
//! type — byte-for-byte and in original key order.
//!
//! This operates on parsed [`serde_json::Value`], not on the typed
//! [`crate::Manifest`], specifically so that non-string unknown fields
//! (numbers, booleans, `null`) survive untouched; round-tripping through a
//! typed struct first could normalize or drop them.

use serde_json::Value;

/// Produce the canonical signature payload for a raw manifest JSON value.
///
/// Rules:
/// - If `modules` is an object, every child object that has a `url` string
///   field has that value replaced with `""`, in place (field position and
///   every other field, including unknowns, are untouched).
/// - If `signatures` is an object, every value is replaced with `""`
///   (key order is preserved).
/// - Every other field, at any nesting level, is left exactly as-is.
/// - A manifest with no `modules` or no `signatures` field is left without
///   one; this function never adds fields.
#[must_use]
pub fn canonicalize(manifest_json: &Value) -> Value {
    let mut out = manifest_json.clone();
    let Some(root) = out.as_object_mut() else {
        return out;
    };

    if let Some(Value::Object(modules)) = root.get_mut("modules") {
        for module in modules.values_mut() {
            if let Some(module_obj) = module.as_object_mut()
                && module_obj.contains_key("url")
            {
                module_obj.insert("url".to_string(), Value::String(String::new()));
            }
        }
    }

    if let Some(Value::Object(signatures)) = root.get_mut("signatures") {
        for value in signatures.values_mut() {
            *value = Value::String(String::new());
        }
    }

    out
}

/// Serialize a canonical JSON value with no whitespace, for signing and
/// verifying.
///
/// # Errors
///
/// Returns an error only if `value` cannot be serialized at all (it always
/// can be, for values produced by [`canonicalize`]).
pub fn serialize_compact(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// Serialize a canonical JSON value with indentation, for debugging.
///
/// # Errors
///
/// Returns an error only if `value` cannot be serialized at all.
pub fn serialize_pretty(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(url: &str, sig: &str) -> Value {
        json!({
            "modules": {
                "./kotlin_kotlin.js": {
                    "url": url,
                    "sha256": "6bd40b7083b3c13107186cbf274a9c30c7d5f333b4dcaf33f9df6ec4ce5d6ab"
                }
            },
            "signatures": { "sigA": sig }
        })
    }

    #[test]
    fn scenario_1_matches_expected_compact_payload() {
        let m = sample("kotlin_kotlin.zipline", "0f91aa");
        let payload = serialize_compact(&canonicalize(&m)).unwrap();
        assert_eq!(
            payload,
            r#"{"modules":{"./kotlin_kotlin.js":{"url":"","sha256":"6bd40b7083b3c13107186cbf274a9c30c7d5f333b4dcaf33f9df6ec4ce5d6ab"}},"signatures":{"sigA":""}}"#
        );
    }

    #[test]
    fn p1_deterministic_for_identical_input() {
        let m = sample("a", "b");
        let p1 = serialize_compact(&canonicalize(&m)).unwrap();
        let p2 = serialize_compact(&canonicalize(&m)).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn p2_url_irrelevance() {
        let a = canonicalize(&sample("urlA", "sig"));
        let b = canonicalize(&sample("completely-different-url", "sig"));
        assert_eq!(
            serialize_compact(&a).unwrap(),
            serialize_compact(&b).unwrap()
        );
    }

    #[test]
    fn p3_signature_value_irrelevance() {
        let a = canonicalize(&sample("url", "sigOne"));
        let b = canonicalize(&sample("url", "sigTwo"));
        assert_eq!(
            serialize_compact(&a).unwrap(),
            serialize_compact(&b).unwrap()
        );
    }

    #[test]
    fn p4_signature_keyset_significance() {
        let a = sample("url", "sig");
        let mut b = sample("url", "sig");
        b["signatures"]["sigB"] = json!("other");
        assert_ne!(
            serialize_compact(&canonicalize(&a)).unwrap(),
            serialize_compact(&canonicalize(&b)).unwrap()
        );
    }

    #[test]
    fn p4_signature_key_order_significance() {
        let a = json!({
            "modules": {},
            "signatures": { "sigA": "1", "sigB": "2" }
        });
        let b = json!({
            "modules": {},
            "signatures": { "sigB": "2", "sigA": "1" }
        });
        assert_ne!(
            serialize_compact(&canonicalize(&a)).unwrap(),
            serialize_compact(&canonicalize(&b)).unwrap()
        );
    }

    #[test]
    fn p5_content_significance() {
        let a = sample("url", "sig");
        let mut b = sample("url", "sig");
        b["modules"]["./kotlin_kotlin.js"]["sha256"] = json!(
            "0000000000000000000000000000000000000000000000000000000000000a"
        );
        assert_ne!(
            serialize_compact(&canonicalize(&a)).unwrap(),
            serialize_compact(&canonicalize(&b)).unwrap()
        );
    }

    #[test]
    fn p6_unknown_fields_preserved_byte_verbatim() {
        let m = json!({
            "modules": {},
            "signatures": {},
            "extra_null": null,
            "extra_bool": true,
            "extra_number": 42.5,
            "extra_string": "hi",
            "extra_nested": { "a": [1, 2, { "b": null }] }
        });
        let out = canonicalize(&m);
        assert_eq!(out["extra_null"], Value::Null);
        assert_eq!(out["extra_bool"], json!(true));
        assert_eq!(out["extra_number"], json!(42.5));
        assert_eq!(out["extra_string"], json!("hi"));
        assert_eq!(out["extra_nested"], json!({ "a": [1, 2, { "b": null }] }));
    }

    #[test]
    fn missing_modules_and_signatures_are_left_missing() {
        let m = json!({ "mainModuleId": "x", "mainFunction": "main" });
        let out = canonicalize(&m);
        assert!(out.get("modules").is_none());
        assert!(out.get("signatures").is_none());
    }

    #[test]
    fn module_without_url_field_is_untouched() {
        let m = json!({
            "modules": { "m": { "sha256": "x" } }
        });
        let out = canonicalize(&m);
        assert!(out["modules"]["m"].get("url").is_none());
        assert_eq!(out["modules"]["m"]["sha256"], json!("x"));
    }

    #[test]
    fn pretty_and_compact_agree_up_to_whitespace() {
        let m = sample("u", "s");
        let canon = canonicalize(&m);
        let compact = serialize_compact(&canon).unwrap();
        let pretty = serialize_pretty(&canon).unwrap();
        let reparsed_compact: Value = serde_json::from_str(&compact).unwrap();
        let reparsed_pretty: Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(reparsed_compact, reparsed_pretty);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// A valid-looking hex sha256, the one string-ish leaf likely to
    /// participate in payload content rather than get blanked.
    fn sha_strategy() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}".prop_map(String::from)
    }

    fn module_strategy() -> impl Strategy<Value = Value> {
        (any::<String>(), sha_strategy()).prop_map(|(url, sha256)| {
            json!({ "url": url, "sha256": sha256 })
        })
    }

    fn manifest_strategy() -> impl Strategy<Value = Value> {
        (
            proptest::collection::btree_map("[a-z]{1,6}", module_strategy(), 0..4),
            proptest::collection::btree_map("[a-z]{1,4}", any::<String>(), 0..4),
        )
            .prop_map(|(modules, signatures)| {
                json!({
                    "modules": Value::Object(modules.into_iter().collect()),
                    "mainModuleId": "a",
                    "mainFunction": "main",
                    "signatures": Value::Object(signatures.into_iter().map(|(k, v)| (k, json!(v))).collect()),
                })
            })
    }

    proptest! {
        /// P1: canonicalizing the same manifest twice yields byte-identical
        /// compact payloads.
        #[test]
        fn p1_canonicalize_is_deterministic(m in manifest_strategy()) {
            let a = serialize_compact(&canonicalize(&m)).unwrap();
            let b = serialize_compact(&canonicalize(&m)).unwrap();
            prop_assert_eq!(a, b);
        }

        /// P2: replacing every module's `url` leaves the compact payload
        /// unchanged.
        #[test]
        fn p2_url_irrelevance_holds_for_arbitrary_manifests(
            m in manifest_strategy(),
            replacement in any::<String>(),
        ) {
            let before = serialize_compact(&canonicalize(&m)).unwrap();
            let mut mutated = m;
            if let Some(modules) = mutated.get_mut("modules").and_then(Value::as_object_mut) {
                for module in modules.values_mut() {
                    if let Some(obj) = module.as_object_mut() {
                        obj.insert("url".to_string(), json!(replacement));
                    }
                }
            }
            let after = serialize_compact(&canonicalize(&mutated)).unwrap();
            prop_assert_eq!(before, after);
        }

        /// P3: replacing every signature value leaves the compact payload
        /// unchanged.
        #[test]
        fn p3_signature_value_irrelevance_holds_for_arbitrary_manifests(
            m in manifest_strategy(),
            replacement in any::<String>(),
        ) {
            let before = serialize_compact(&canonicalize(&m)).unwrap();
            let mut mutated = m;
            if let Some(sigs) = mutated.get_mut("signatures").and_then(Value::as_object_mut) {
                for value in sigs.values_mut() {
                    *value = json!(replacement);
                }
            }
            let after = serialize_compact(&canonicalize(&mutated)).unwrap();
            prop_assert_eq!(before, after);
        }

        /// P6: every unknown top-level field survives canonicalization
        /// unchanged, regardless of its JSON type.
        #[test]
        fn p6_unknown_top_level_fields_round_trip(
            mut m in manifest_strategy(),
            extra_string in any::<String>(),
            extra_number in any::<i64>(),
            extra_bool in any::<bool>(),
        ) {
            let obj = m.as_object_mut().unwrap();
            obj.insert("extraString".to_string(), json!(extra_string.clone()));
            obj.insert("extraNumber".to_string(), json!(extra_number));
            obj.insert("extraBool".to_string(), json!(extra_bool));
            obj.insert("extraNull".to_string(), Value::Null);

            let out = canonicalize(&m);
            prop_assert_eq!(out["extraString"].clone(), json!(extra_string));
            prop_assert_eq!(out["extraNumber"].clone(), json!(extra_number));
            prop_assert_eq!(out["extraBool"].clone(), json!(extra_bool));
            prop_assert_eq!(out["extraNull"].clone(), Value::Null);
        }
    }
}

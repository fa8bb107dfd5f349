//! Property-based tests for value capture and the sample cache
//!
//! Core properties:
//! 1. Primitive values serialize to themselves
//! 2. Nested sequences keep structure up to the depth limit
//! 3. Self-referential containers always terminate
//! 4. Sample buffers hold min(N, capacity) newest samples in call order
//! 5. Positional and keyword calls fill the same slots

use muestreo::serializer::{ValueSerializer, MAX_DEPTH_MARKER};
use muestreo::{SampleCache, Value};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_primitives_serialize_to_themselves(
        i in any::<i64>(),
        b in any::<bool>(),
        s in ".{0,20}",
        x in -1.0e9f64..1.0e9,
    ) {
        let ser = ValueSerializer::default();
        prop_assert_eq!(ser.serialize(&Value::Int(i)), json!(i));
        prop_assert_eq!(ser.serialize(&Value::Bool(b)), json!(b));
        prop_assert_eq!(ser.serialize(&Value::str(s.clone())), json!(s));
        prop_assert_eq!(ser.serialize(&Value::Float(x)), json!(x));
        prop_assert_eq!(ser.serialize(&Value::None), json!(null));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_nesting_beyond_limit_hits_marker(depth in 0usize..25, max_depth in 0usize..12) {
        let mut value = Value::Int(7);
        for _ in 0..depth {
            value = Value::list(vec![value]);
        }

        let mut json = ValueSerializer::new(max_depth).serialize(&value);
        let mut levels = 0;
        while let serde_json::Value::Array(mut items) = json {
            prop_assert_eq!(items.len(), 1);
            json = items.remove(0);
            levels += 1;
        }

        if depth <= max_depth {
            prop_assert_eq!(levels, depth);
            prop_assert_eq!(json, json!(7));
        } else {
            prop_assert_eq!(levels, max_depth + 1);
            prop_assert_eq!(json, json!(MAX_DEPTH_MARKER));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_self_referential_dict_terminates(max_depth in 0usize..15, extra in 0i64..100) {
        let dict = Value::dict(vec![("n", Value::Int(extra))]);
        dict.insert("self", dict.clone());

        let json = ValueSerializer::new(max_depth).serialize(&dict);
        let text = json.to_string();
        prop_assert!(text.contains(MAX_DEPTH_MARKER));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_buffer_keeps_newest_in_order(calls in 0usize..130, capacity in 1usize..60) {
        let dir = TempDir::new().unwrap();
        let mut cache = SampleCache::new(dir.path().join("c.json"), capacity, 10);
        let params = names(&["x"]);

        for i in 0..calls {
            cache.record_call("m.f", &[Value::Int(i as i64)], &HashMap::new(), &params);
        }

        match cache.get("m.f") {
            None => prop_assert_eq!(calls, 0),
            Some(record) => {
                prop_assert_eq!(record.call_count, calls as u64);
                let kept: Vec<i64> = record
                    .samples(0)
                    .unwrap()
                    .iter()
                    .map(|v| v.as_i64().unwrap())
                    .collect();
                let start = calls.saturating_sub(capacity);
                let expected: Vec<i64> = (start..calls).map(|i| i as i64).collect();
                prop_assert_eq!(kept, expected);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_keyword_and_positional_share_slots(a in any::<i64>(), b in any::<i64>()) {
        let dir = TempDir::new().unwrap();
        let params = names(&["a", "b"]);

        let mut positional = SampleCache::new(dir.path().join("p.json"), 50, 10);
        positional.record_call("m.add", &[Value::Int(a), Value::Int(b)], &HashMap::new(), &params);

        let mut keyword = SampleCache::new(dir.path().join("k.json"), 50, 10);
        let mut kwargs = HashMap::new();
        kwargs.insert("b".to_string(), Value::Int(b));
        kwargs.insert("a".to_string(), Value::Int(a));
        keyword.record_call("m.add", &[], &kwargs, &params);

        prop_assert_eq!(positional.snapshot(), keyword.snapshot());
    }
}

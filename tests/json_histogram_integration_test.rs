// JSON Histogram Integration Tests
// End-to-end coverage of deserialization, key-path encoding, and the
// selectivity engine with numbered test IDs

use base64::{engine::general_purpose, Engine as _};
use rusty_stats::collation::UTF8MB4_0900_AI_CI;
use rusty_stats::histogram::{
    encode_key_path, BucketString, ExpressionNode, JsonFunction, JsonHistogram, Operator,
    Primitive, ValueType,
};
use serde_json::{json, Value};

fn b64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

fn str_comparand(s: &str) -> Primitive {
    Primitive::Str(BucketString::from_str(s, UTF8MB4_0900_AI_CI))
}

/// Catalog fixture with one bucket per interesting shape: an integer
/// singleton, a float equi-height, a single-valued string, a boolean,
/// and an untagged path used by IS NULL probes.
fn fixture() -> Value {
    json!({
        "histogram-type": "json-flex",
        "data-type": "json",
        "null-values": 0.02,
        "last-updated": "2024-03-01T12:00:00.000000Z",
        "number-of-buckets-specified": 64,
        "collation-id": UTF8MB4_0900_AI_CI,
        "sampling-rate": 1.0,
        "buckets": [
            [b64(b"objs_arr.0_num"), 0.4, 0.0, 0, 3, 4, {
                "type": "singleton",
                "buckets": [[0, 0.1], [1, 0.1]],
            }],
            [b64(b"price_num"), 0.5, 0.2, 1.0, 100.0, 50, {
                "type": "equi-height",
                "buckets": [[10.0, 0.25, 10], [50.0, 0.5, 30], [100.0, 0.25, 10]],
            }],
            [b64(b"aakey_str"), 0.131, 0.0, b64(b"bb"), b64(b"bb"), 1],
            [b64(b"active_bool"), 0.9, 0.0, false, true, 2, {
                "type": "singleton",
                "buckets": [[false, 0.3], [true, 0.7]],
            }],
            [b64(b"meta_obj.owner"), 0.6, 0.25],
        ],
    })
}

fn load() -> JsonHistogram {
    JsonHistogram::from_json(&fixture())
        .expect("fixture must deserialize")
        .with_identity("test_db", "orders", "attrs")
}

#[cfg(test)]
mod tests {
    use super::*;

    // JSONHIST-001: Canonical key-path encoding
    #[test]
    fn jsonhist_001_key_path_encoding() {
        let key = encode_key_path(
            b"$.docs[0].history.edits[5]",
            Some(ValueType::String),
            true,
        )
        .unwrap();
        assert_eq!(
            key, b"docs_arr.0_obj.history_obj.edits_arr.5_str",
            "JSONHIST-001: nested path must encode structure and type tags"
        );
        let key = encode_key_path(b"$.docs[0].datetime", Some(ValueType::Int), true).unwrap();
        assert_eq!(key, b"docs_arr.0_obj.datetime_num");
        println!("✓ JSONHIST-001: Canonical key-path encoding - PASSED");
    }

    // JSONHIST-002: Singleton hit for EQ, LT, GT
    #[test]
    fn jsonhist_002_singleton_hit() {
        let h = load();
        let f = JsonFunction::unquote("$.objs[0]");
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(1)]).unwrap();
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Int(1)]).unwrap();
        let gt = h.selectivity(&f, Operator::Gt, &[Primitive::Int(1)]).unwrap();
        assert!((eq - 0.04).abs() < 1e-12, "JSONHIST-002: EQ(1) must be 0.04");
        assert!((lt - 0.04).abs() < 1e-12, "JSONHIST-002: LT(1) must be 0.04");
        assert!((gt - 0.32).abs() < 1e-12, "JSONHIST-002: GT(1) must be 0.32");
        println!("✓ JSONHIST-002: Singleton hit - PASSED");
    }

    // JSONHIST-003: Comparand outside the bucket range
    #[test]
    fn jsonhist_003_out_of_range() {
        let h = load();
        let f = JsonFunction::unquote("$.objs[0]");
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(-1)]).unwrap();
        let gt = h.selectivity(&f, Operator::Gt, &[Primitive::Int(-1)]).unwrap();
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Int(-1)]).unwrap();
        assert_eq!(eq, 0.0, "JSONHIST-003: EQ below range must be 0");
        assert!((gt - 0.4).abs() < 1e-12, "JSONHIST-003: GT below range must be base");
        assert_eq!(lt, 0.0, "JSONHIST-003: LT below range must be 0");
        println!("✓ JSONHIST-003: Out-of-range comparand - PASSED");
    }

    // JSONHIST-004: Single-valued string bucket
    #[test]
    fn jsonhist_004_string_singleton() {
        let h = load();
        let f = JsonFunction::unquote("$.aakey");
        let hit = h.selectivity(&f, Operator::Eq, &[str_comparand("bb")]).unwrap();
        let miss = h.selectivity(&f, Operator::Eq, &[str_comparand("ccc")]).unwrap();
        assert!((hit - 0.131).abs() < 1e-12, "JSONHIST-004: EQ('bb') must be 0.131");
        assert_eq!(miss, 0.0, "JSONHIST-004: EQ('ccc') is out of range");
        println!("✓ JSONHIST-004: String singleton - PASSED");
    }

    // JSONHIST-005: BETWEEN spanning the whole bucket clips to base
    #[test]
    fn jsonhist_005_between_clips_to_base() {
        let h = load();
        let f = JsonFunction::unquote("$.objs[0]");
        let sel = h
            .selectivity(&f, Operator::Between, &[Primitive::Int(0), Primitive::Int(5)])
            .unwrap();
        assert!(
            (sel - 0.4).abs() < 1e-12,
            "JSONHIST-005: BETWEEN(0,5) covers the bucket and clips to base"
        );
        println!("✓ JSONHIST-005: BETWEEN clipping - PASSED");
    }

    // JSONHIST-006: Unknown path falls back to min_frequency * c
    #[test]
    fn jsonhist_006_missing_bucket_fallback() {
        let h = load();
        assert!((h.min_frequency - 0.131).abs() < 1e-12);
        let f = JsonFunction::unquote("$.unknown.path");
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(7)]).unwrap();
        assert!(
            (eq - 0.131 * 0.1).abs() < 1e-12,
            "JSONHIST-006: EQ fallback must be min_frequency * 0.1"
        );
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Int(7)]).unwrap();
        assert!((lt - 0.131 * 0.3).abs() < 1e-12);
        let is_null = h.selectivity(&f, Operator::IsNull, &[]).unwrap();
        assert!((is_null - 0.131 * 0.2).abs() < 1e-12);
        let not_null = h.selectivity(&f, Operator::IsNotNull, &[]).unwrap();
        assert!((not_null - 0.131 * 0.8).abs() < 1e-12);
        println!("✓ JSONHIST-006: Missing bucket fallback - PASSED");
    }

    // JSONHIST-007: Serialization round-trip preserves structure and order
    #[test]
    fn jsonhist_007_round_trip() {
        let h = JsonHistogram::from_json(&fixture()).unwrap();
        let reloaded = JsonHistogram::from_json(&h.to_json()).unwrap();
        assert_eq!(h, reloaded, "JSONHIST-007: round trip must be structural identity");
        let twice = JsonHistogram::from_json(&reloaded.to_json()).unwrap();
        assert_eq!(reloaded, twice);
        println!("✓ JSONHIST-007: Round trip - PASSED");
    }

    // JSONHIST-008: EQ and NEQ partition the base frequency
    #[test]
    fn jsonhist_008_eq_neq_partition() {
        let h = load();
        let f = JsonFunction::unquote("$.objs[0]");
        for v in [-3, 0, 1, 2, 3, 42] {
            let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(v)]).unwrap();
            let neq = h.selectivity(&f, Operator::Neq, &[Primitive::Int(v)]).unwrap();
            assert!(
                (eq + neq - 0.4).abs() < 1e-9,
                "JSONHIST-008: EQ + NEQ must equal base at {}",
                v
            );
        }
        println!("✓ JSONHIST-008: EQ/NEQ partition - PASSED");
    }

    // JSONHIST-009: IS NULL semantics per function shape
    #[test]
    fn jsonhist_009_is_null_semantics() {
        let h = load();
        // JSON_VALUE: null when the path is missing or the leaf is null
        let f = JsonFunction::value("$.meta.owner");
        let base = 0.6 * (1.0 - 0.25);
        let is_null = h.selectivity(&f, Operator::IsNull, &[]).unwrap();
        let not_null = h.selectivity(&f, Operator::IsNotNull, &[]).unwrap();
        assert!((is_null - (1.0 - base)).abs() < 1e-12);
        assert!((not_null - base).abs() < 1e-12);
        assert!(is_null + not_null <= 1.0 + 1e-12, "JSONHIST-009: sums stay within 1");

        // plain extraction: null only when the path is missing
        let f = JsonFunction::extract("$.meta.owner");
        let is_null = h.selectivity(&f, Operator::IsNull, &[]).unwrap();
        let not_null = h.selectivity(&f, Operator::IsNotNull, &[]).unwrap();
        assert!((is_null - 0.4).abs() < 1e-12);
        assert!((not_null - 0.6).abs() < 1e-12);
        println!("✓ JSONHIST-009: IS NULL semantics - PASSED");
    }

    // JSONHIST-010: LT is monotone non-decreasing, GT non-increasing
    #[test]
    fn jsonhist_010_monotone_range_estimates() {
        let h = load();
        let f = JsonFunction::unquote("$.price");
        let mut prev_lt = -1.0;
        let mut prev_gt = 2.0;
        for v in [-5.0, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 200.0] {
            let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Float(v)]).unwrap();
            let gt = h.selectivity(&f, Operator::Gt, &[Primitive::Float(v)]).unwrap();
            assert!(lt + 1e-12 >= prev_lt, "JSONHIST-010: LT must not decrease at {}", v);
            assert!(gt <= prev_gt + 1e-12, "JSONHIST-010: GT must not increase at {}", v);
            prev_lt = lt;
            prev_gt = gt;
        }
        println!("✓ JSONHIST-010: Monotone range estimates - PASSED");
    }

    // JSONHIST-011: BETWEEN identity with the LT/GT estimators
    #[test]
    fn jsonhist_011_between_identity() {
        let mut h = load();
        // full-frequency bucket keeps the raw estimate below base
        h.buckets.push(rusty_stats::histogram::KeyPathBucket {
            key_path: b"full_num".to_vec(),
            frequency: 1.0,
            null_values: 0.0,
            value_type: ValueType::Int,
            min_val: Some(Primitive::Int(0)),
            max_val: Some(Primitive::Int(9)),
            ndv: Some(10),
            sub: None,
        });
        let f = JsonFunction::unquote("$.full");
        let between = h
            .selectivity(&f, Operator::Between, &[Primitive::Int(2), Primitive::Int(7)])
            .unwrap();
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Int(2)]).unwrap();
        let gt = h.selectivity(&f, Operator::Gt, &[Primitive::Int(7)]).unwrap();
        assert!(
            (between - (1.0 - lt - gt)).abs() < 1e-12,
            "JSONHIST-011: BETWEEN must equal 1 - LT(a) - GT(b)"
        );
        println!("✓ JSONHIST-011: BETWEEN identity - PASSED");
    }

    // JSONHIST-012: IN of a single value equals EQ
    #[test]
    fn jsonhist_012_in_singleton_list() {
        let h = load();
        let f = JsonFunction::unquote("$.objs[0]");
        for v in [0, 1, 9] {
            let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(v)]).unwrap();
            let in_one = h.selectivity(&f, Operator::In, &[Primitive::Int(v)]).unwrap();
            assert_eq!(eq, in_one, "JSONHIST-012: IN([{v}]) must equal EQ({v})");
        }
        println!("✓ JSONHIST-012: IN singleton list - PASSED");
    }

    // JSONHIST-013: Empty histogram answers with the bare fallback
    #[test]
    fn jsonhist_013_empty_histogram() {
        let mut v = fixture();
        v["buckets"] = json!([]);
        let h = JsonHistogram::from_json(&v).unwrap();
        assert_eq!(h.min_frequency, 1.0, "JSONHIST-013: empty histogram min_frequency is 1");
        let f = JsonFunction::unquote("$.anything");
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(1)]).unwrap();
        assert!((eq - 0.1).abs() < 1e-12);
        let not_null = h.selectivity(&f, Operator::IsNotNull, &[]).unwrap();
        assert!((not_null - 0.8).abs() < 1e-12);
        println!("✓ JSONHIST-013: Empty histogram - PASSED");
    }

    // JSONHIST-014: Type-uncertain context degrades to the untyped estimate
    #[test]
    fn jsonhist_014_type_uncertain_context() {
        let h = load();
        // `->` on a path whose stats live under meta_obj.owner (untagged)
        let f = JsonFunction::extract("$.meta.owner");
        let base = 0.6 * (1.0 - 0.25);
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(1)]).unwrap();
        // untagged bucket has no ndv, so the equality default applies
        assert!((eq - base * 0.1).abs() < 1e-12);
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Int(1)]).unwrap();
        assert!((lt - base * 0.3).abs() < 1e-12);
        println!("✓ JSONHIST-014: Type-uncertain context - PASSED");
    }

    // JSONHIST-015: Equi-height boundary behavior at the extremes
    #[test]
    fn jsonhist_015_equi_height_boundaries() {
        let h = load();
        let f = JsonFunction::unquote("$.price");
        let base = 0.5 * (1.0 - 0.2);
        let lt_min = h.selectivity(&f, Operator::Lt, &[Primitive::Float(1.0)]).unwrap();
        assert_eq!(lt_min, 0.0, "JSONHIST-015: LT(min) must be 0");
        let gt_max = h
            .selectivity(&f, Operator::Gt, &[Primitive::Float(100.0)])
            .unwrap();
        assert!(gt_max.abs() < 1e-9, "JSONHIST-015: GT(max) must vanish");
        // integer comparand promotes against the float bucket
        let eq = h.selectivity(&f, Operator::Eq, &[Primitive::Int(25)]).unwrap();
        assert!((eq - base * 0.5 / 30.0).abs() < 1e-12);
        println!("✓ JSONHIST-015: Equi-height boundaries - PASSED");
    }

    // JSONHIST-016: NDV aggregation across typed siblings
    #[test]
    fn jsonhist_016_ndv_aggregation() {
        let mut v = fixture();
        v["buckets"]
            .as_array_mut()
            .unwrap()
            .push(json!([b64(b"objs_arr.0_str"), 0.1, 0.0, b64(b"a"), b64(b"z"), 12]));
        let h = JsonHistogram::from_json(&v).unwrap();
        let f = JsonFunction::unquote("$.objs[0]");
        assert_eq!(h.ndv(&f), Some(16), "JSONHIST-016: NDV sums the _num and _str siblings");
        assert_eq!(h.ndv(&JsonFunction::unquote("$.unknown")), None);
        println!("✓ JSONHIST-016: NDV aggregation - PASSED");
    }

    // JSONHIST-017: Every operator stays inside the unit interval
    #[test]
    fn jsonhist_017_unit_interval() {
        let h = load();
        let funcs = [
            JsonFunction::unquote("$.objs[0]"),
            JsonFunction::unquote("$.price"),
            JsonFunction::extract("$.meta.owner"),
            JsonFunction::unquote("$.missing"),
        ];
        for f in &funcs {
            let cases: Vec<(Operator, Vec<Primitive>)> = vec![
                (Operator::Eq, vec![Primitive::Int(1)]),
                (Operator::Neq, vec![Primitive::Int(1)]),
                (Operator::Le, vec![Primitive::Int(50)]),
                (Operator::Ge, vec![Primitive::Int(50)]),
                (Operator::Between, vec![Primitive::Int(0), Primitive::Int(60)]),
                (Operator::NotBetween, vec![Primitive::Int(0), Primitive::Int(60)]),
                (Operator::In, vec![Primitive::Int(1), Primitive::Int(2)]),
                (Operator::NotIn, vec![Primitive::Int(1), Primitive::Int(2)]),
                (Operator::IsNull, vec![]),
                (Operator::IsNotNull, vec![]),
            ];
            for (op, comparands) in cases {
                let sel = h.selectivity(f, op, &comparands).unwrap();
                assert!(
                    (0.0..=1.0).contains(&sel),
                    "JSONHIST-017: {:?} on {:?} left the unit interval: {}",
                    op,
                    f,
                    sel
                );
            }
        }
        println!("✓ JSONHIST-017: Unit interval - PASSED");
    }

    // JSONHIST-018: Boolean bucket estimates
    #[test]
    fn jsonhist_018_boolean_bucket() {
        let h = load();
        let f = JsonFunction::unquote("$.active");
        let eq_true = h.selectivity(&f, Operator::Eq, &[Primitive::Bool(true)]).unwrap();
        assert!((eq_true - 0.9 * 0.7).abs() < 1e-12);
        let lt = h.selectivity(&f, Operator::Lt, &[Primitive::Bool(true)]).unwrap();
        let gt = h.selectivity(&f, Operator::Gt, &[Primitive::Bool(false)]).unwrap();
        assert_eq!(lt, 0.0, "JSONHIST-018: booleans have no LT estimate");
        assert_eq!(gt, 0.0, "JSONHIST-018: booleans have no GT estimate");
        println!("✓ JSONHIST-018: Boolean bucket - PASSED");
    }

    // JSONHIST-019: Predicate tree to selectivity, end to end
    #[test]
    fn jsonhist_019_expression_tree_dispatch() {
        let h = load();
        // JSON_UNQUOTE(JSON_EXTRACT(attrs, '$.objs[0]')) = 1
        let tree = ExpressionNode::Call(
            "JSON_UNQUOTE".to_string(),
            vec![ExpressionNode::Call(
                "JSON_EXTRACT".to_string(),
                vec![
                    ExpressionNode::Column("attrs".to_string()),
                    ExpressionNode::PathLiteral(b"$.objs[0]".to_vec()),
                ],
            )],
        );
        let func = JsonFunction::from_expression(&tree).unwrap();
        let sel = h.selectivity(&func, Operator::Eq, &[Primitive::Int(1)]).unwrap();
        assert!((sel - 0.04).abs() < 1e-12, "JSONHIST-019: tree dispatch must match direct form");

        let unsupported = ExpressionNode::Call(
            "JSON_CONTAINS".to_string(),
            vec![ExpressionNode::Column("attrs".to_string())],
        );
        assert!(JsonFunction::from_expression(&unsupported).is_err());
        println!("✓ JSONHIST-019: Expression tree dispatch - PASSED");
    }
}

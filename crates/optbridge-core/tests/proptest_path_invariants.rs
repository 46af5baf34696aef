//! Property-based invariant tests for paths and deep equality.
//!
//! 1. Rendering a path in either dialect and parsing it back is lossless.
//! 2. `rewrite` agrees with parse-then-render.
//! 3. A value written with `assign` is read back by `resolve_in`.
//! 4. `assign` never disturbs unrelated top-level keys.
//! 5. `deep_equal` is reflexive and symmetric.
//! 6. The parser never panics on arbitrary input.

use optbridge_core::equal::{deep_equal, values_equal};
use optbridge_core::path::{self, Path, Segment};
use proptest::prelude::*;
use serde_json::{Map, Value};

// ── Helpers ─────────────────────────────────────────────────────────────

fn key_word() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,6}"
}

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        key_word().prop_map(Segment::Key),
        (0usize..64).prop_map(Segment::Index),
    ]
}

fn any_path() -> impl Strategy<Value = Path> {
    (key_word(), proptest::collection::vec(segment(), 0..5)).prop_map(|(root, rest)| {
        let mut segments = vec![Segment::Key(root)];
        segments.extend(rest);
        Path::from_segments(segments).expect("non-empty segment list")
    })
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::vec(("[a-z]{1,4}", inner), 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Dialects
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn host_form_parses_back(p in any_path()) {
        let reparsed = Path::parse(&p.to_host()).unwrap();
        prop_assert_eq!(reparsed, p);
    }

    #[test]
    fn source_form_parses_back(p in any_path()) {
        let reparsed = Path::parse(&p.to_source()).unwrap();
        prop_assert_eq!(reparsed, p);
    }

    #[test]
    fn rewrite_matches_host_render(p in any_path()) {
        prop_assert_eq!(path::rewrite(&p.to_source()).unwrap(), p.to_host());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3-4. Writes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn assign_then_resolve(first in any_path(), second in any_path(), a in json_value(), b in json_value()) {
        let mut root = Map::new();
        path::assign(&mut root, &first, a).unwrap();
        path::assign(&mut root, &second, b.clone()).unwrap();
        prop_assert_eq!(path::resolve_in(&root, &second), Some(&b));
    }

    #[test]
    fn assign_leaves_other_roots(p in any_path(), v in json_value(), keep in json_value()) {
        let mut root = Map::new();
        root.insert("untouched-root".to_owned(), keep.clone());
        path::assign(&mut root, &p, v).unwrap();
        prop_assert_eq!(root.get("untouched-root"), Some(&keep));
    }

    #[test]
    fn snapshot_equals_resolved(p in any_path(), v in json_value()) {
        let mut root = Map::new();
        path::assign(&mut root, &p, v).unwrap();
        let snap = path::snapshot_at(&root, &p);
        prop_assert_eq!(snap.as_ref(), path::resolve_in(&root, &p));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Equality
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn deep_equal_reflexive(v in json_value()) {
        prop_assert!(values_equal(&v, &v.clone()));
        prop_assert!(deep_equal(Some(&v), Some(&v)));
    }

    #[test]
    fn deep_equal_symmetric(a in json_value(), b in json_value()) {
        prop_assert_eq!(values_equal(&a, &b), values_equal(&b, &a));
    }

    #[test]
    fn undefined_never_equals_a_value(v in json_value()) {
        prop_assert!(!deep_equal(None, Some(&v)));
        prop_assert!(!deep_equal(Some(&v), None));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Robustness
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn parse_never_panics(input in "\\PC{0,24}") {
        let _ = Path::parse(&input);
    }

    #[test]
    fn accepted_input_round_trips(input in "[a-z0-9_.\\[\\]]{0,16}") {
        if let Ok(p) = Path::parse(&input) {
            prop_assert_eq!(Path::parse(&p.to_host()).unwrap(), p);
        }
    }
}

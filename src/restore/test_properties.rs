//! Property-based tests for the restore pipeline.
//!
//! Random trees are restored in arbitrary stream order into a journaling
//! [`MemoryStore`]; the properties check parent-before-child creation,
//! ephemeral isolation, and overwrite idempotence.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use proptest::prelude::*;

use crate::core::config::RestoreConfig;
use crate::core::paths::{ROOT, is_strict_ancestor, parent_path};
use crate::restore::engine::RestoreEngine;
use crate::snapshot::decoder::SnapshotDecoder;
use crate::store::memory::{MemoryStore, StoreOp};

#[derive(Debug, Clone)]
struct Entry {
    path: String,
    ephemeral: bool,
    data: Option<Vec<u8>>,
}

// ──────────────────── strategies ────────────────────

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c")], 1..5)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

fn arb_entry() -> impl Strategy<Value = Entry> {
    (
        arb_path(),
        prop::bool::weighted(0.2),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..8)),
    )
        .prop_map(|(path, ephemeral, data)| Entry {
            path,
            ephemeral,
            data,
        })
}

fn arb_entries() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(arb_entry(), 1..24).prop_map(|entries| {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|entry| seen.insert(entry.path.clone()))
            .collect()
    })
}

fn render(entries: &[Entry]) -> String {
    let body: Vec<String> = entries
        .iter()
        .map(|entry| {
            let value = serde_json::json!({
                "ephemeralOwner": i64::from(entry.ephemeral) * 4242,
                "data": entry.data.as_ref().map(|bytes| BASE64_STANDARD.encode(bytes)),
                "acls": [{"scheme": "world", "id": "anyone", "perms": 31}],
            });
            format!("{}: {value}", serde_json::Value::from(entry.path.as_str()))
        })
        .collect();
    format!("{{{}}}", body.join(", "))
}

fn restore(store: &mut MemoryStore, input: &str, overwrite: bool) {
    let config = RestoreConfig {
        overwrite_existing: overwrite,
        ..RestoreConfig::default()
    };
    RestoreEngine::new(&config)
        .unwrap()
        .apply(input.as_bytes(), store)
        .unwrap();
}

// ──────────────────── property tests ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The decoder yields exactly the stream's entries, in stream order.
    #[test]
    fn decoder_preserves_order(entries in arb_entries()) {
        let input = render(&entries);
        let decoded: Vec<String> = SnapshotDecoder::new(input.as_bytes())
            .map(|record| record.unwrap().path)
            .collect();
        let expected: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        prop_assert_eq!(decoded, expected);
    }

    /// No create is ever issued before the parent exists, and every
    /// persistent record ends up in the store with its own data.
    #[test]
    fn parents_exist_before_children(entries in arb_entries()) {
        let mut store = MemoryStore::new();
        restore(&mut store, &render(&entries), false);

        let mut present: HashSet<String> = HashSet::from([ROOT.to_string()]);
        for op in store.journal() {
            if let StoreOp::Create(path) = op {
                prop_assert!(present.contains(parent_path(path)), "{} before parent", path);
                present.insert(path.clone());
            }
        }
        for entry in entries.iter().filter(|e| !e.ephemeral) {
            let node = store.get(&entry.path);
            prop_assert!(node.is_some(), "{} missing", entry.path);
            prop_assert_eq!(&node.unwrap().data, &entry.data);
        }
    }

    /// An ephemeral record that no persistent record descends from causes no
    /// store call at all.
    #[test]
    fn ephemeral_leaves_are_untouched(entries in arb_entries()) {
        let mut store = MemoryStore::new();
        restore(&mut store, &render(&entries), false);

        for entry in entries.iter().filter(|e| e.ephemeral) {
            let needed = entries
                .iter()
                .any(|other| !other.ephemeral && is_strict_ancestor(&entry.path, &other.path));
            if !needed {
                prop_assert_eq!(store.touches_of(&entry.path), 0, "{} touched", entry.path);
            }
        }
    }

    /// Restoring the same stream twice with overwrite leaves the same tree.
    #[test]
    fn overwrite_restore_is_idempotent(entries in arb_entries()) {
        let input = render(&entries);
        let mut store = MemoryStore::new();
        restore(&mut store, &input, true);
        let first = store.snapshot();
        restore(&mut store, &input, true);
        prop_assert_eq!(store.snapshot(), first);
    }

    /// Every non-root path is a strict descendant of its parent.
    #[test]
    fn parent_is_strict_ancestor(path in arb_path()) {
        prop_assert!(is_strict_ancestor(parent_path(&path), &path));
        prop_assert!(!is_strict_ancestor(&path, parent_path(&path)));
    }
}

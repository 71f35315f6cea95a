//! Property-based invariant tests for reconciliation and the children rule.
//!
//! 1. Reconcile places a matching instance at every desired index.
//! 2. Positional matches are never replaced; existing instances are reused
//!    before anything new is made.
//! 3. Pulling `children` after arbitrary `parts` edits yields each live part
//!    exactly once, with `parent` pointing back, and clears `parent` on leavers.

use std::convert::Infallible;

use proptest::prelude::*;
use spark_views::{Node, Options, TREE, reconcile, reset_runtime};

// ── Strategies ────────────────────────────────────────────────────────────

/// Model ids drawn from a small range so matches are common.
fn models(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0u8..6, 0..=max_len)
}

/// Sequences of parts assignments over a pool of 6 nodes.
fn parts_history() -> impl Strategy<Value = Vec<Vec<usize>>> {
    proptest::collection::vec(proptest::collection::vec(0usize..6, 0..=8), 1..=6)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Instance {
    model: u8,
    serial: usize,
}

fn run(desired: &[u8], existing: &[Instance]) -> (Vec<Instance>, usize) {
    let mut next = existing.len();
    let mut made = 0;
    let mut target = existing.to_vec();
    reconcile(
        desired,
        existing,
        &mut target,
        |instance: &Instance, model: &u8| Ok::<_, Infallible>(instance.model == *model),
        |model: &u8| {
            next += 1;
            made += 1;
            Ok(Instance {
                model: *model,
                serial: next,
            })
        },
    )
    .unwrap();
    (target, made)
}

fn instances(models: &[u8]) -> Vec<Instance> {
    models
        .iter()
        .enumerate()
        .map(|(serial, model)| Instance {
            model: *model,
            serial,
        })
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Every desired index holds a matching instance
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reconcile_matches_every_index(existing in models(8), desired in models(8)) {
        let existing = instances(&existing);
        let (result, _) = run(&desired, &existing);

        prop_assert_eq!(result.len(), desired.len());
        for (instance, model) in result.iter().zip(&desired) {
            prop_assert_eq!(instance.model, *model);
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // 2. Minimal churn
    // ═════════════════════════════════════════════════════════════════════

    #[test]
    fn reconcile_keeps_positional_matches(existing in models(8), desired in models(8)) {
        let existing = instances(&existing);
        let (result, _) = run(&desired, &existing);

        for (index, model) in desired.iter().enumerate() {
            if let Some(current) = existing.get(index) {
                if current.model == *model {
                    prop_assert_eq!(result[index], *current);
                }
            }
        }
    }

    #[test]
    fn reconcile_reuses_before_making(existing in models(8), desired in models(8)) {
        let existing = instances(&existing);
        let (result, made) = run(&desired, &existing);

        let mut expected_made = 0;
        for (index, model) in desired.iter().enumerate() {
            let reusable = existing.iter().any(|instance| instance.model == *model);
            if reusable {
                prop_assert!(result[index].serial < existing.len());
            } else {
                prop_assert!(result[index].serial >= existing.len());
                expected_made += 1;
            }
        }
        prop_assert_eq!(made, expected_made);
    }

    #[test]
    fn reconcile_is_idempotent(desired in models(8)) {
        let existing = instances(&desired);
        let (result, made) = run(&desired, &existing);
        prop_assert_eq!(made, 0);
        prop_assert_eq!(result, existing);
    }

    // ═════════════════════════════════════════════════════════════════════
    // 3. Children invariants
    // ═════════════════════════════════════════════════════════════════════

    #[test]
    fn children_mirror_parts_without_duplicates(history in parts_history()) {
        reset_runtime();
        let parent = Node::new(TREE, Options::new()).unwrap();
        let pool: Vec<Node> = (0..6).map(|_| Node::new(TREE, Options::new()).unwrap()).collect();

        for assignment in history {
            let parts: Vec<Node> = assignment.iter().map(|index| pool[*index]).collect();
            parent.set_parts(parts.clone()).unwrap();
            let children = parent.children().unwrap();

            for (i, child) in children.iter().enumerate() {
                prop_assert!(parts.contains(child));
                prop_assert!(!children[..i].contains(child));
                prop_assert_eq!(child.parent().unwrap(), Some(parent));
            }
            for node in &pool {
                if parts.contains(node) {
                    prop_assert!(children.contains(node));
                } else {
                    prop_assert_eq!(node.parent().unwrap(), None);
                }
            }
        }
    }

    #[test]
    fn surviving_children_keep_relative_order(first in parts_history(), second in parts_history()) {
        reset_runtime();
        let parent = Node::new(TREE, Options::new()).unwrap();
        let pool: Vec<Node> = (0..6).map(|_| Node::new(TREE, Options::new()).unwrap()).collect();

        let pick = |indices: &[usize]| indices.iter().map(|index| pool[*index]).collect::<Vec<Node>>();
        parent.set_parts(pick(&first[0])).unwrap();
        let before = parent.children().unwrap();
        parent.set_parts(pick(&second[0])).unwrap();
        let after = parent.children().unwrap();

        let survivors: Vec<Node> = before.iter().copied().filter(|node| after.contains(node)).collect();
        let prefix: Vec<Node> = after.iter().copied().take(survivors.len()).collect();
        prop_assert_eq!(prefix, survivors);
    }
}

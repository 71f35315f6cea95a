//! Runtime - Reads, assignments and invalidation.
//!
//! # Coloring
//!
//! When a value changes, direct dependents are marked `DIRTY` and everything
//! downstream of them `CHECK`. A `CHECK` cell refreshes its dependencies in
//! read order before trusting its cache, and only recomputes if one of them
//! actually produced a new value. That is what lets a rule hand back the same
//! list pointer without waking anyone.
//!
//! # Eager cells
//!
//! Marking queues eager cells. The queue is flushed before the mutating call
//! returns, or, when the mutation happens inside an evaluation, as soon as the
//! outermost evaluation completes.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{HashSet, VecDeque};

use super::arena::{self, with_cell, with_cell_mut};
use super::cell::{Cell, CellFlags, CellKey, CellMode};
use super::deferred;
use super::scope::Scope;
use super::tracking;
use crate::config;
use crate::error::{Result, RuleError};
use crate::node::Node;
use crate::registry;
use crate::types::{NodeId, Value};

thread_local! {
    static EAGER_QUEUE: RefCell<VecDeque<CellKey>> = const { RefCell::new(VecDeque::new()) };
    static FLUSHING: StdCell<bool> = const { StdCell::new(false) };
}

// =============================================================================
// Public operations
// =============================================================================

/// Read `name` on `node`, recomputing if stale.
pub(crate) fn get(node: NodeId, name: &str) -> Result<Value> {
    let key = CellKey::new(node, name);
    ensure_cell(&key)?;
    let reader = tracking::record(&key);
    let value = refresh(&key);
    // Linked after refreshing so a first computation does not dirty its own reader.
    if let Some(reader) = reader {
        with_cell_mut(&key, |cell| cell.add_dependent(&reader));
    }
    flush_eager_if_idle();
    value
}

/// Assign `value`, overriding the computation.
pub(crate) fn set(node: NodeId, name: &str, value: Value) -> Result<()> {
    let key = CellKey::new(node, name);
    ensure_cell(&key)?;
    let (changed, old_value, old_dependencies) = with_cell_mut(&key, |cell| {
        let changed = !cell.value.as_ref().is_some_and(|old| old.same(&value));
        cell.flags.insert(CellFlags::OVERRIDDEN);
        cell.flags.remove(CellFlags::STALE);
        let old_value = cell.value.replace(value.clone());
        (changed, old_value, std::mem::take(&mut cell.dependencies))
    })
    .ok_or(RuleError::StaleNode { node })?;
    // Dropped outside the arena borrow: display objects may read the graph on drop.
    drop(old_value);
    unlink(&key, &old_dependencies);

    if changed {
        if let Value::Pending(pending) = &value {
            deferred::watch(key.clone(), pending.clone());
        }
        mark_dependents(&key);
    }
    flush_eager_if_idle();
    Ok(())
}

/// Drop an override and recompute from the class definition on next read.
pub(crate) fn reset(node: NodeId, name: &str) -> Result<()> {
    let key = CellKey::new(node, name);
    ensure_cell(&key)?;
    let eager = with_cell_mut(&key, |cell| {
        cell.flags.remove(CellFlags::OVERRIDDEN);
        cell.flags.insert(CellFlags::DIRTY);
        cell.flags.contains(CellFlags::EAGER)
    })
    .unwrap_or(false);
    if eager {
        enqueue(&key);
    }
    mark_dependents(&key);
    flush_eager_if_idle();
    Ok(())
}

/// Mark a computed cell stale because state it reads outside the graph changed.
pub(crate) fn touch(node: NodeId, name: &str) -> Result<()> {
    let key = CellKey::new(node, name);
    ensure_cell(&key)?;
    let overridden = with_cell_mut(&key, |cell| {
        let overridden = cell.flags.contains(CellFlags::OVERRIDDEN);
        if !overridden {
            cell.flags.insert(CellFlags::DIRTY);
        }
        overridden
    })
    .unwrap_or(true);
    if !overridden {
        mark_downstream(&key);
        flush_eager_if_idle();
    }
    Ok(())
}

/// Cached value without tracking or recomputing.
pub(crate) fn peek(node: NodeId, name: &str) -> Option<Value> {
    with_cell(&CellKey::new(node, name), |cell| cell.value.clone()).flatten()
}

pub(crate) fn mode(node: NodeId, name: &str) -> Option<CellMode> {
    with_cell(&CellKey::new(node, name), Cell::mode)
}

pub(crate) fn flags(node: NodeId, name: &str) -> Option<CellFlags> {
    with_cell(&CellKey::new(node, name), |cell| cell.flags)
}

pub(crate) fn dependencies(node: NodeId, name: &str) -> Vec<CellKey> {
    with_cell(&CellKey::new(node, name), |cell| cell.dependencies.clone()).unwrap_or_default()
}

// =============================================================================
// Evaluation
// =============================================================================

fn ensure_cell(key: &CellKey) -> Result<()> {
    let (class, exists) =
        arena::with_object(key.node, |object| (object.class, object.cells.contains_key(&key.name)))?;
    if !exists {
        let mode = if registry::is_eager(class, &key.name) {
            CellMode::Eager
        } else {
            CellMode::Lazy
        };
        arena::with_object_mut(key.node, |object| {
            object
                .cells
                .entry(key.name.clone())
                .or_insert_with(|| Cell::new(mode));
        })?;
    }
    Ok(())
}

fn refresh(key: &CellKey) -> Result<Value> {
    let (flags, value) = with_cell(key, |cell| (cell.flags, cell.value.clone()))
        .ok_or(RuleError::StaleNode { node: key.node })?;

    if flags.contains(CellFlags::EVALUATING) {
        return Err(RuleError::CyclicEvaluation {
            node: key.node,
            property: key.name.clone(),
        });
    }
    if let Some(value) = value {
        if flags.contains(CellFlags::OVERRIDDEN) || !flags.intersects(CellFlags::STALE) {
            return Ok(value);
        }
        if !flags.contains(CellFlags::DIRTY) && verify(key)? {
            with_cell_mut(key, |cell| cell.flags.remove(CellFlags::CHECK));
            return Ok(value);
        }
    }
    recompute(key)
}

/// Refresh the dependencies of a `CHECK` cell. True if none of them changed.
fn verify(key: &CellKey) -> Result<bool> {
    let dependencies = with_cell(key, |cell| cell.dependencies.clone()).unwrap_or_default();
    for dependency in dependencies {
        if with_cell(&dependency, |_| ()).is_none() {
            // Released underneath us.
            return Ok(false);
        }
        refresh(&dependency)?;
        let dirty = with_cell(key, |cell| cell.flags.contains(CellFlags::DIRTY)).unwrap_or(true);
        if dirty {
            return Ok(false);
        }
    }
    Ok(true)
}

fn recompute(key: &CellKey) -> Result<Value> {
    let limit = config::max_evaluation_depth();
    if tracking::depth() >= limit {
        return Err(RuleError::DepthExceeded {
            limit,
            property: key.name.clone(),
        });
    }

    let class = arena::with_object(key.node, |object| object.class)?;
    let (previous, old_dependencies) = with_cell_mut(key, |cell| {
        cell.flags.insert(CellFlags::EVALUATING);
        cell.flags.remove(CellFlags::STALE);
        (cell.value.clone(), std::mem::take(&mut cell.dependencies))
    })
    .ok_or(RuleError::StaleNode { node: key.node })?;
    unlink(key, &old_dependencies);

    tracing::trace!(node = %key.node, property = %key.name, "recompute");
    let rule = registry::rule_for(class, &key.name);
    let frame = tracking::enter(Some(key.clone()));
    let result = match &rule {
        Some((definer, rule)) => {
            let scope = Scope::new(Node::from_id(key.node), &key.name, *definer, previous.as_ref(), &[]);
            rule(&scope)
        }
        None => Ok(Value::Null),
    };
    let reads = frame.finish();

    let (changed, replaced) = with_cell_mut(key, |cell| {
        cell.flags.remove(CellFlags::EVALUATING);
        cell.dependencies = reads;
        match &result {
            Ok(value) => {
                let changed = !cell.value.as_ref().is_some_and(|old| old.same(value));
                (changed, cell.value.replace(value.clone()))
            }
            Err(_) => {
                // No poisoned cache: the next read retries from scratch.
                cell.flags.insert(CellFlags::DIRTY);
                (false, cell.value.take())
            }
        }
    })
    .unwrap_or((false, None));
    drop(replaced);

    if changed {
        if let Ok(Value::Pending(pending)) = &result {
            deferred::watch(key.clone(), pending.clone());
        }
        mark_dependents(key);
    }
    result
}

fn unlink(key: &CellKey, dependencies: &[CellKey]) {
    for dependency in dependencies {
        with_cell_mut(dependency, |cell| cell.remove_dependent(key));
    }
}

// =============================================================================
// Invalidation
// =============================================================================

/// `key` produced a new value: dependents are dirty, their dependents suspect.
fn mark_dependents(key: &CellKey) {
    let dependents = with_cell(key, |cell| cell.dependents.clone()).unwrap_or_default();
    propagate(dependents.into_iter().map(|dependent| (dependent, CellFlags::DIRTY)).collect());
}

/// `key` itself went stale: everything downstream is suspect.
fn mark_downstream(key: &CellKey) {
    let (eager, dependents) = with_cell(key, |cell| {
        (cell.flags.contains(CellFlags::EAGER), cell.dependents.clone())
    })
    .unwrap_or_default();
    if eager {
        enqueue(key);
    }
    propagate(dependents.into_iter().map(|dependent| (dependent, CellFlags::CHECK)).collect());
}

/// Apply `flag` to each cell and `CHECK` to everything downstream.
///
/// A cell that is already stale with a cached value has already warned its
/// dependents, so the walk stops there. Cells without a value (never computed,
/// or failed) are walked through, since a reader may have swallowed the error.
fn propagate(mut work: Vec<(CellKey, CellFlags)>) {
    let mut visited: HashSet<CellKey> = HashSet::new();
    while let Some((key, flag)) = work.pop() {
        let outcome = with_cell_mut(&key, |cell| {
            if cell.flags.contains(CellFlags::OVERRIDDEN) {
                return None;
            }
            let warned = cell.flags.intersects(CellFlags::STALE) && cell.value.is_some();
            cell.flags.insert(flag);
            Some((warned, cell.flags.contains(CellFlags::EAGER), cell.dependents.clone()))
        })
        .flatten();
        let Some((warned, eager, dependents)) = outcome else {
            continue;
        };
        if eager {
            enqueue(&key);
        }
        if !warned && visited.insert(key) {
            work.extend(dependents.into_iter().map(|dependent| (dependent, CellFlags::CHECK)));
        }
    }
}

fn enqueue(key: &CellKey) {
    EAGER_QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if !queue.contains(key) {
            queue.push_back(key.clone());
        }
    });
}

/// Clears the flushing flag even if an eager rule panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}

/// Flush the eager queue unless an evaluation is in progress; the outermost
/// evaluation flushes when it completes.
pub(crate) fn flush_eager_if_idle() {
    if tracking::is_idle() {
        flush_eager();
    }
}

/// Recompute queued eager cells until the queue is empty.
fn flush_eager() {
    if FLUSHING.with(|flushing| flushing.replace(true)) {
        return;
    }
    let _guard = FlushGuard;
    while let Some(key) = EAGER_QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
        let stale = with_cell(&key, |cell| !cell.is_fresh()).unwrap_or(false);
        if !stale {
            continue;
        }
        if let Err(error) = refresh(&key) {
            tracing::warn!(node = %key.node, property = %key.name, %error, "eager recompute failed");
        }
    }
}

// =============================================================================
// Continuations and teardown
// =============================================================================

/// Deferred value `id` of `key` settled.
pub(crate) fn settle(key: &CellKey, id: u64, outcome: Result<Value>) {
    let current = with_cell(key, |cell| {
        matches!(&cell.value, Some(Value::Pending(pending)) if pending.id() == id)
    })
    .unwrap_or(false);
    if !current {
        // Replaced or released before it settled.
        return;
    }

    match outcome {
        Ok(value) => {
            let replaced = with_cell_mut(key, |cell| cell.value.replace(value.clone()));
            drop(replaced);
            if let Value::Pending(pending) = &value {
                deferred::watch(key.clone(), pending.clone());
            }
        }
        Err(error) => {
            tracing::warn!(node = %key.node, property = %key.name, %error, "deferred value rejected");
            let replaced = with_cell_mut(key, |cell| {
                cell.flags.remove(CellFlags::OVERRIDDEN);
                cell.flags.insert(CellFlags::DIRTY);
                cell.value.take()
            });
            drop(replaced);
        }
    }
    mark_dependents(key);
    flush_eager_if_idle();
}

/// Remove every cell of a released node from the graph.
pub(crate) fn detach(object: arena::Object, node: NodeId) {
    let mut dependents = Vec::new();
    for (name, cell) in object.cells {
        let key = CellKey { node, name };
        unlink(&key, &cell.dependencies);
        dependents.extend(
            cell.dependents
                .into_iter()
                .filter(|dependent| dependent.node != node)
                .map(|dependent| (dependent, CellFlags::DIRTY)),
        );
    }
    propagate(dependents);
    EAGER_QUEUE.with(|queue| queue.borrow_mut().retain(|key| key.node != node));
}

pub(crate) fn reset_queues() {
    EAGER_QUEUE.with(|queue| queue.borrow_mut().clear());
    FLUSHING.with(|flushing| flushing.set(false));
}

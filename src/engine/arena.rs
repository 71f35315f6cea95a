//! Node Arena - Slot allocation for every live node.
//!
//! Manages the lifecycle of node slots:
//! - Generational ids so released ids never alias a reused slot
//! - Free slot pool for O(1) reuse
//! - Per-node cell table and tree bookkeeping
//!
//! Nodes never own each other. `parent`, `parts` and `children` hold ids, so a
//! cyclic parent chain is just data until someone demands `root`.

use std::cell::RefCell;
use std::collections::HashMap;

use super::cell::{Cell, CellKey};
use crate::error::{Result, RuleError};
use crate::registry::ClassId;
use crate::tree::TreeState;
use crate::types::{Name, NodeId};

// =============================================================================
// Arena State
// =============================================================================

pub(crate) struct Object {
    pub class: ClassId,
    pub cells: HashMap<Name, Cell>,
    pub tree: TreeState,
}

struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    /// Released slot indices, reused last-in first-out.
    free: Vec<u32>,
    live: usize,
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

// =============================================================================
// Allocation
// =============================================================================

/// Allocate a slot for a new node of `class`.
pub(crate) fn allocate(class: ClassId) -> NodeId {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let object = Object {
            class,
            cells: HashMap::new(),
            tree: TreeState::default(),
        };
        arena.live += 1;

        // Reuse a free slot or grow
        if let Some(index) = arena.free.pop() {
            let slot = &mut arena.slots[index as usize];
            slot.object = Some(object);
            return NodeId::new(index, slot.generation);
        }

        let index = arena.slots.len() as u32;
        arena.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        NodeId::new(index, 0)
    })
}

/// Release a slot, returning its object so the caller can unlink cells.
pub(crate) fn release(id: NodeId) -> Option<Object> {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let slot = arena.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        arena.free.push(id.index);
        arena.live -= 1;
        Some(object)
    })
}

// =============================================================================
// Access
// =============================================================================

/// Check if an id still names a live node.
pub fn is_live(id: NodeId) -> bool {
    ARENA.with(|arena| {
        arena
            .borrow()
            .slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.object.is_some())
    })
}

/// Count of live nodes.
pub fn live_count() -> usize {
    ARENA.with(|arena| arena.borrow().live)
}

pub(crate) fn with_object<R>(id: NodeId, f: impl FnOnce(&Object) -> R) -> Result<R> {
    ARENA.with(|arena| {
        let arena = arena.borrow();
        match arena.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.object.as_ref().map(f).ok_or(RuleError::StaleNode { node: id })
            }
            _ => Err(RuleError::StaleNode { node: id }),
        }
    })
}

pub(crate) fn with_object_mut<R>(id: NodeId, f: impl FnOnce(&mut Object) -> R) -> Result<R> {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        match arena.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.object.as_mut().map(f).ok_or(RuleError::StaleNode { node: id })
            }
            _ => Err(RuleError::StaleNode { node: id }),
        }
    })
}

/// Run `f` on an existing cell. None if the node or the cell is gone.
pub(crate) fn with_cell<R>(key: &CellKey, f: impl FnOnce(&Cell) -> R) -> Option<R> {
    with_object(key.node, |object| object.cells.get(&key.name).map(f))
        .ok()
        .flatten()
}

pub(crate) fn with_cell_mut<R>(key: &CellKey, f: impl FnOnce(&mut Cell) -> R) -> Option<R> {
    with_object_mut(key.node, |object| object.cells.get_mut(&key.name).map(f))
        .ok()
        .flatten()
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Drop every node and forget all slots.
pub(crate) fn reset_arena() {
    // Take the arena out first so dropped values never run while borrowed.
    let old = ARENA.with(|arena| std::mem::take(&mut *arena.borrow_mut()));
    drop(old);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::REGISTERABLE;

    #[test]
    fn test_allocate() {
        reset_arena();

        let a = allocate(REGISTERABLE);
        let b = allocate(REGISTERABLE);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(is_live(a));
        assert!(is_live(b));
        assert_eq!(live_count(), 2);
    }

    #[test]
    fn test_release_and_reuse() {
        reset_arena();

        let a = allocate(REGISTERABLE);
        let _b = allocate(REGISTERABLE);

        assert!(release(a).is_some());
        assert!(!is_live(a));
        assert!(release(a).is_none());

        // Slot is reused with a new generation
        let c = allocate(REGISTERABLE);
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(is_live(c));
        assert!(!is_live(a));
    }

    #[test]
    fn test_stale_access_fails() {
        reset_arena();

        let a = allocate(REGISTERABLE);
        release(a);
        assert_eq!(
            with_object(a, |object| object.class).unwrap_err(),
            RuleError::StaleNode { node: a }
        );
    }
}

//! Identity Projection - Display handle back to the node that owns it.
//!
//! Entries are weak on both sides: a dropped handle or a released node makes
//! its entry invisible, and the next lookup prunes it. Borrows of the map are
//! never held across calls into the graph, so registering or removing entries
//! from inside a propagation is safe.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use crate::engine;
use crate::node::Node;
use crate::types::{Handle, NodeId};

struct Entry {
    handle: Weak<dyn Any>,
    node: NodeId,
}

#[derive(Default)]
struct Projection {
    by_handle: HashMap<usize, Entry>,
    by_node: HashMap<NodeId, usize>,
}

impl Projection {
    fn remove_key(&mut self, key: usize) {
        if let Some(entry) = self.by_handle.remove(&key) {
            if self.by_node.get(&entry.node) == Some(&key) {
                self.by_node.remove(&entry.node);
            }
        }
    }
}

thread_local! {
    static PROJECTION: RefCell<Projection> = RefCell::new(Projection::default());
}

/// Map `handle` to `node`, replacing either side's previous entry.
pub(crate) fn register(handle: &Handle, node: NodeId) {
    PROJECTION.with(|projection| {
        let mut projection = projection.borrow_mut();
        let key = handle.key();
        if let Some(old) = projection.by_node.get(&node).copied() {
            if old != key {
                projection.remove_key(old);
            }
        }
        projection.remove_key(key);
        projection.by_handle.insert(
            key,
            Entry {
                handle: handle.downgrade(),
                node,
            },
        );
        projection.by_node.insert(node, key);
    });
}

/// Drop the entry for `handle`, if any.
pub(crate) fn remove_handle(handle: &Handle) {
    PROJECTION.with(|projection| projection.borrow_mut().remove_key(handle.key()));
}

/// Drop the entry of a node being released.
pub(crate) fn forget_node(node: NodeId) {
    PROJECTION.with(|projection| {
        let mut projection = projection.borrow_mut();
        if let Some(key) = projection.by_node.remove(&node) {
            projection.by_handle.remove(&key);
        }
    });
}

/// The node whose `display` is `handle`.
///
/// Used for event delegation: a handler attached to the display object finds
/// its logical node through here.
pub fn for_display(handle: &Handle) -> Option<Node> {
    let key = handle.key();
    let found = PROJECTION.with(|projection| {
        let projection = projection.borrow();
        let entry = projection.by_handle.get(&key)?;
        // An address can be reused once the original handle is gone.
        let alive = entry.handle.strong_count() > 0;
        Some((entry.node, alive))
    });

    match found {
        Some((node, true)) if engine::is_live(node) => Some(Node::from_id(node)),
        Some(_) => {
            PROJECTION.with(|projection| projection.borrow_mut().remove_key(key));
            None
        }
        None => None,
    }
}

/// Number of entries, including ones not yet pruned.
pub fn projection_len() -> usize {
    PROJECTION.with(|projection| projection.borrow().by_handle.len())
}

pub(crate) fn reset_projection() {
    let old = PROJECTION.with(|projection| std::mem::take(&mut *projection.borrow_mut()));
    drop(old);
}

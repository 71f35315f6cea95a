//! Cell - One memoized, dependency-tracked property of one node.

use crate::types::{Name, NodeId, Value};

bitflags::bitflags! {
    /// Cell state packed into one byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u8 {
        /// A direct dependency changed; recompute on next read.
        const DIRTY = 1 << 0;
        /// A transitive dependency may have changed; verify before trusting the cache.
        const CHECK = 1 << 1;
        /// Recompute as soon as the cell goes stale instead of on read.
        const EAGER = 1 << 2;
        /// Computation is on the stack.
        const EVALUATING = 1 << 3;
        /// Value was assigned; the class computation is bypassed.
        const OVERRIDDEN = 1 << 4;
    }
}

impl CellFlags {
    pub const STALE: Self = Self::DIRTY.union(Self::CHECK);
}

/// Evaluation mode of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMode {
    Lazy,
    Eager,
}

/// Address of a cell: node plus property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub node: NodeId,
    pub name: Name,
}

impl CellKey {
    pub fn new(node: NodeId, name: &str) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

pub(crate) struct Cell {
    pub flags: CellFlags,
    /// None until first evaluated.
    pub value: Option<Value>,
    /// Cells read during the last evaluation, in read order.
    pub dependencies: Vec<CellKey>,
    /// Cells whose last evaluation read this one.
    pub dependents: Vec<CellKey>,
}

impl Cell {
    pub fn new(mode: CellMode) -> Self {
        let mut flags = CellFlags::DIRTY;
        if mode == CellMode::Eager {
            flags.insert(CellFlags::EAGER);
        }
        Self {
            flags,
            value: None,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub fn mode(&self) -> CellMode {
        if self.flags.contains(CellFlags::EAGER) {
            CellMode::Eager
        } else {
            CellMode::Lazy
        }
    }

    /// Clean and holding a value.
    pub fn is_fresh(&self) -> bool {
        self.value.is_some() && !self.flags.intersects(CellFlags::STALE)
    }

    pub fn add_dependent(&mut self, reader: &CellKey) {
        if !self.dependents.contains(reader) {
            self.dependents.push(reader.clone());
        }
    }

    pub fn remove_dependent(&mut self, reader: &CellKey) {
        self.dependents.retain(|key| key != reader);
    }
}

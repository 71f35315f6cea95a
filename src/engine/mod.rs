//! Reactive Engine - Cells, dependency tracking and scheduling.
//!
//! The engine manages the core data structures:
//! - Arena: Generational node slots with a free pool
//! - Cell: One memoized property of one node
//! - Tracking: Evaluation stack recording reads as dependencies
//! - Runtime: Reads, overrides, invalidation and the eager queue
//! - Scheduler: "After the current synchronous work" continuations
//!
//! # Architecture
//!
//! Nodes are NOT objects holding their properties. A node is an id into the
//! arena, and each property is a cell keyed by `(node, name)`:
//!
//! ```text
//! (n0, "parts")    -> [n1, n2]   deps: []              dependents: [(n0, "children")]
//! (n0, "children") -> [n1, n2]   deps: [(n0, "parts"), (n0, "mirrors")]
//! (n1, "parent")   -> n0         overridden
//! ```
//!
//! Reads pull, writes push a stale mark. Nothing recomputes until someone
//! reads, except cells the class declares eager.

mod arena;
mod cell;
mod deferred;
pub(crate) mod runtime;
mod scheduler;
mod scope;
mod tracking;

pub(crate) use arena::{allocate, release as release_slot, reset_arena, with_object, with_object_mut};
pub use arena::{is_live, live_count};
pub use cell::{CellFlags, CellKey, CellMode};
pub use deferred::Pending;
pub(crate) use scheduler::reset_scheduler;
pub use scheduler::{defer, spawn, tick};
pub use scope::{Rule, Scope};
pub(crate) use tracking::reset_tracking;
pub use tracking::untracked;

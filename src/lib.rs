//! # spark-views
//!
//! Reactive properties and self-maintaining trees for Rust.
//!
//! Every property of a node is a memoized cell. Reading a property records
//! the read as a dependency of whatever is being computed; changing a value
//! marks its dependents stale. Nothing recomputes until it is read, except
//! properties a class declares eager.
//!
//! ## Architecture
//!
//! Nodes are generational ids into a thread-local arena. Classes are
//! registered at runtime and dispatched by name, so a tree can be built from
//! plain option lists:
//! ```text
//! Options{type, parent, parts, specs, ..} → construct → parts
//!     → pull children → reconcile mirrors → parent back-references
//!     → display controllers: display at construction, eager update next tick
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core types (NodeId, Value, Handle)
//! - [`engine`] - Cells, read tracking, invalidation, scheduler
//! - [`registry`] - Class registration, dispatch by type, construction
//! - [`tree`] - Parent/parts/mirrors/children and reconciliation
//! - [`display`] - Display controllers and the handle → node projection
//! - [`config`] - Runtime tunables

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod node;
pub mod registry;
pub mod tree;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::{RuntimeConfig, config, configure, reset_config};

pub use display::{for_display, projection_len};

pub use engine::{
    CellFlags, CellKey, CellMode, Pending, Rule, Scope, defer, is_live, live_count, spawn, tick,
    untracked,
};

pub use error::{Result, RuleError};

pub use node::Node;

pub use registry::{
    ClassId, ClassSpec, CollectHook, DISPLAY_CONTROLLER, Options, REGISTERABLE, TREE, TypeRef,
    class_name, is_eager, is_subclass, lookup, reset_registry,
};

pub use tree::{Slots, node_list, reconcile};

/// Drop every node, class, queued task and setting on this thread, keeping
/// the built-in classes (for testing).
pub fn reset_runtime() {
    engine::reset_scheduler();
    engine::runtime::reset_queues();
    engine::reset_tracking();
    engine::reset_arena();
    display::reset_projection();
    registry::reset_registry();
    config::reset_config();
}

//! Display Controller - Trees with an external display object.
//!
//! A display controller computes its `display` once when constructed and
//! schedules one pull of its eager `update` for the next [`tick`]. From then
//! on `update` recomputes whenever something it read changes, so the display
//! object is kept current without anyone asking for it. Every mutation made
//! in the same synchronous phase lands in that single first update.
//!
//! Subclasses override `display` to build the external object and `update`
//! to push state into it, calling `Scope::call_super` to keep the projection
//! and the children wiring.
//!
//! [`tick`]: crate::tick

mod projection;

pub use projection::{for_display, projection_len};
pub(crate) use projection::{forget_node, reset_projection};

use crate::config;
use crate::engine::{self, untracked};
use crate::error::Result;
use crate::node::Node;
use crate::registry::{ClassSpec, TREE};
use crate::types::Value;

pub(crate) fn display_controller_spec() -> ClassSpec {
    ClassSpec::new("DisplayController")
        .extends(TREE)
        .rule("model", |_| Ok(Value::Null))
        .rule("display", |_| Ok(Value::from("")))
        .rule("update", |scope| {
            if let Value::Handle(handle) = scope.get("display")? {
                projection::register(&handle, scope.node().id());
            }
            scope.get("children")
        })
        .rule("resetDisplay", |scope| {
            let node = scope.node();
            let old = untracked(|| node.get("display"))?;
            if let Value::Handle(handle) = &old {
                projection::remove_handle(handle);
            }
            node.reset("display")?;
            Ok(old)
        })
        .rule("adopt", |scope| {
            let node = scope.node();
            node.call("resetDisplay", &[])?;
            let model = scope.arg(0);
            node.set("model", model.clone())?;
            Ok(model)
        })
        .non_rules(["constructor", "resetDisplay", "adopt"])
        .own_eager_properties(["update"])
}

/// Compute `display` and schedule the first `update`.
pub(crate) fn on_construct(node: Node) -> Result<()> {
    node.get("display")?;
    if config::config().schedule_first_update {
        engine::defer(move || {
            if !node.is_live() {
                return;
            }
            if let Err(error) = node.get("update") {
                tracing::warn!(node = %node.id(), %error, "first update failed");
            }
        });
    }
    Ok(())
}

impl Node {
    pub fn display(&self) -> Result<Value> {
        self.get("display")
    }

    /// Pull `update` now instead of waiting for a tick.
    pub fn update(&self) -> Result<Value> {
        self.get("update")
    }

    /// Forget the current display object so the next read builds a new one.
    /// Returns the old display.
    pub fn reset_display(&self) -> Result<Value> {
        self.call("resetDisplay", &[])
    }

    /// Swap in a new model, rebuilding the display from scratch.
    pub fn adopt(&self, model: impl Into<Value>) -> Result<Value> {
        self.call("adopt", &[model.into()])
    }
}

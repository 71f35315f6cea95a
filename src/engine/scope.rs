//! Scope - What a rule or method sees while it runs.

use std::future::Future;
use std::rc::Rc;

use super::deferred::Pending;
use crate::error::Result;
use crate::node::Node;
use crate::registry::{self, ClassId};
use crate::types::Value;

/// A property computation or method body.
pub type Rule = Rc<dyn Fn(&Scope<'_>) -> Result<Value>>;

/// Evaluation context handed to a [`Rule`].
pub struct Scope<'a> {
    node: Node,
    name: &'a str,
    definer: ClassId,
    previous: Option<&'a Value>,
    args: &'a [Value],
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        node: Node,
        name: &'a str,
        definer: ClassId,
        previous: Option<&'a Value>,
        args: &'a [Value],
    ) -> Self {
        Self {
            node,
            name,
            definer,
            previous,
            args,
        }
    }

    /// The node being computed.
    pub fn node(&self) -> Node {
        self.node
    }

    /// The property or method being computed.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Class whose definition is running.
    pub fn definer(&self) -> ClassId {
        self.definer
    }

    /// Read another property of this node, recording the dependency.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.node.get(name)
    }

    /// Value cached before this recomputation, if any.
    pub fn previous(&self) -> Option<&Value> {
        self.previous
    }

    /// Method arguments. Empty for property rules.
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// Argument `index`, or null when missing.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Run the definition this one overrides, from the nearest ancestor of the
    /// defining class. Null if no ancestor defines it.
    pub fn call_super(&self) -> Result<Value> {
        match registry::super_definition(self.definer, self.name) {
            Some((definer, rule)) => {
                let scope = Scope::new(self.node, self.name, definer, self.previous, self.args);
                rule(&scope)
            }
            None => Ok(Value::Null),
        }
    }

    /// Produce a value that settles later.
    ///
    /// Readers see `Value::Pending` until the future completes on a later
    /// [`tick`](crate::tick); the cell then holds the outcome and dependents
    /// are invalidated.
    pub fn defer(&self, future: impl Future<Output = Result<Value>> + 'static) -> Value {
        Value::Pending(Pending::new(future))
    }
}

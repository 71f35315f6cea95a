//! Node - Handle to one object in the reactive graph.
//!
//! A `Node` is a copyable id. Properties are read with [`Node::get`], which
//! memoizes through the class's rule, and assigned with [`Node::set`], which
//! overrides the rule until [`Node::reset`].

use std::fmt;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::engine::{self, CellFlags, CellKey, CellMode, Scope, runtime, untracked};
use crate::error::{Result, RuleError};
use crate::registry::{self, ClassId, Options};
use crate::types::{NodeId, Value};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node(NodeId);

impl Node {
    pub(crate) const fn from_id(id: NodeId) -> Self {
        Self(id)
    }

    /// Construct a node of `class`, dispatching on the `type` option.
    pub fn new(class: ClassId, options: Options) -> Result<Node> {
        registry::construct(class, options)
    }

    /// Run `class`'s collect hook on `options`, then construct.
    pub fn create(class: ClassId, options: Options) -> LocalBoxFuture<'static, Result<Node>> {
        registry::create(class, options)
    }

    pub fn id(&self) -> NodeId {
        self.0
    }

    pub fn is_live(&self) -> bool {
        engine::is_live(self.0)
    }

    pub fn class(&self) -> Result<ClassId> {
        engine::with_object(self.0, |object| object.class)
    }

    /// Registered name of the node's class.
    pub fn type_name(&self) -> Result<String> {
        let class = self.class()?;
        Ok(registry::class_name(class).map(|name| name.to_string()).unwrap_or_default())
    }

    pub fn is_a(&self, class: ClassId) -> bool {
        self.class().is_ok_and(|own| registry::is_subclass(own, class))
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Read a property, recomputing it if stale.
    ///
    /// Inside a rule the read becomes a dependency of the rule's cell.
    pub fn get(&self, name: &str) -> Result<Value> {
        runtime::get(self.0, name)
    }

    /// Override a property. Dependents are invalidated if the value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        runtime::set(self.0, name, value.into())
    }

    /// Drop an override; the class rule computes the value again.
    pub fn reset(&self, name: &str) -> Result<()> {
        runtime::reset(self.0, name)
    }

    /// Cached value, without tracking or recomputing.
    pub fn peek(&self, name: &str) -> Option<Value> {
        runtime::peek(self.0, name)
    }

    /// Stale or never computed.
    pub fn is_dirty(&self, name: &str) -> bool {
        match runtime::flags(self.0, name) {
            Some(flags) => flags.intersects(CellFlags::STALE) || self.peek(name).is_none(),
            None => true,
        }
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        runtime::flags(self.0, name).is_some_and(|flags| flags.contains(CellFlags::OVERRIDDEN))
    }

    /// Whether `name` is lazy or eager. None until the cell has been touched.
    pub fn mode(&self, name: &str) -> Option<CellMode> {
        runtime::mode(self.0, name)
    }

    /// Cells read by the last computation of `name`, in read order.
    pub fn dependencies(&self, name: &str) -> Vec<CellKey> {
        runtime::dependencies(self.0, name)
    }

    /// Invoke a method, or read a rule of the same name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let class = self.class()?;
        if let Some((definer, method)) = registry::method_for(class, name) {
            let scope = Scope::new(*self, name, definer, None, args);
            return method(&scope);
        }
        if registry::rule_for(class, name).is_some() {
            return self.get(name);
        }
        Err(RuleError::UnknownMethod {
            class: registry::class_name(class).unwrap_or_else(|| "".into()),
            name: name.into(),
        })
    }

    /// Future of the settled value of `name`.
    ///
    /// Resolves at once unless the property currently holds a pending value.
    pub fn resolve(&self, name: &str) -> LocalBoxFuture<'static, Result<Value>> {
        match self.get(name) {
            Ok(Value::Pending(pending)) => pending.resolved().boxed_local(),
            other => futures::future::ready(other).boxed_local(),
        }
    }

    pub fn text(&self) -> Result<Value> {
        self.get("text")
    }

    pub fn title(&self) -> Result<Value> {
        self.get("title")
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Free the node, then every recorded child whose parent is this node.
    ///
    /// Cells that read the released node are invalidated. Releasing a node
    /// twice, or a stale id, does nothing.
    pub fn release(&self) {
        let Ok((children, spawned)) = engine::with_object(self.0, |object| {
            (object.tree.children.clone(), object.tree.spawned.clone())
        }) else {
            return;
        };
        let parent = self.peek("parent").and_then(|value| value.as_node());

        let mut owned: Vec<Node> = children
            .into_iter()
            .filter(|child| child.peek("parent").and_then(|value| value.as_node()) == Some(*self))
            .collect();
        for mirror in spawned {
            if !owned.contains(&mirror) {
                owned.push(mirror);
            }
        }

        crate::display::forget_node(self.0);
        let Some(object) = engine::release_slot(self.0) else {
            return;
        };
        tracing::debug!(node = %self.0, owned = owned.len(), "released node");
        runtime::detach(object, self.0);

        // Owned nodes go after this one so a cyclic parent chain terminates.
        for child in owned {
            child.release();
        }
        if let Some(parent) = parent.filter(Node::is_live) {
            if let Err(error) = runtime::touch(parent.0, "children") {
                tracing::warn!(node = %parent.0, %error, "failed to invalidate children");
            }
        }
        runtime::flush_eager_if_idle();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (type_name, title) = untracked(|| {
            (
                self.type_name().unwrap_or_default(),
                self.title().map(|title| title.to_string()).unwrap_or_default(),
            )
        });
        if title.is_empty() {
            write!(f, "[{type_name}]")
        } else {
            write!(f, "[{type_name} {title}]")
        }
    }
}

//! Tree - Parent/children bookkeeping over the reactive graph.
//!
//! A tree node owns an ordered list of `parts` and, when it has both a `model`
//! and a `mirrorClass`, a list of `mirrors` kept in step with
//! `model.children`. Pulling `children` merges the two, drops duplicates and
//! rewrites the `parent` of every child that joined or left.
//!
//! `parent` only changes when `children` is pulled. Any number of edits to
//! `parts` can be made before paying for one reconciliation.

mod reconcile;

pub use reconcile::{Slots, reconcile};

use crate::engine::{self, Scope, runtime, untracked};
use crate::error::{Result, RuleError};
use crate::node::Node;
use crate::registry::{self, ClassId, ClassSpec, Options, TREE};
use crate::types::Value;

/// Per-node lists maintained outside the cells.
#[derive(Debug, Default)]
pub(crate) struct TreeState {
    /// Base list behind the `parts` rule.
    pub parts: Vec<Node>,
    /// Reconciled mirror instances.
    pub mirrors: Vec<Node>,
    /// Children as of the last `children` pull.
    pub children: Vec<Node>,
    /// Mirrors this node constructed and therefore releases.
    pub spawned: Vec<Node>,
}

/// The same list value as `previous` if it holds exactly `nodes`, otherwise a
/// new one. Rules that rebuild a node list return this so unchanged results
/// keep their identity and wake nobody.
pub fn node_list(previous: Option<&Value>, nodes: &[Node]) -> Value {
    if let Some(Value::List(items)) = previous {
        let unchanged = items.len() == nodes.len()
            && items
                .iter()
                .zip(nodes)
                .all(|(item, node)| item.as_node() == Some(*node));
        if unchanged {
            return Value::List(items.clone());
        }
    }
    Value::nodes(nodes)
}

pub(crate) fn tree_spec() -> ClassSpec {
    ClassSpec::new("Tree")
        .rule("parent", |_| Ok(Value::Null))
        .rule("mirrorClass", |_| Ok(Value::Null))
        .rule("model", |_| Ok(Value::Null))
        .rule("parts", |scope| {
            let parts = engine::with_object(scope.node().id(), |object| object.tree.parts.clone())?;
            Ok(node_list(scope.previous(), &parts))
        })
        .rule("mirrors", compute_mirrors)
        .rule("children", compute_children)
        .rule("root", |scope| match scope.get("parent")?.as_node() {
            Some(parent) => parent.get("root"),
            None => Ok(Value::Node(scope.node())),
        })
}

fn mirror_class(value: &Value) -> Result<Option<ClassId>> {
    match value {
        Value::Null => Ok(None),
        Value::Class(class) => Ok(Some(*class)),
        Value::Str(name) if name.is_empty() => Ok(None),
        Value::Str(name) => registry::lookup(name)
            .map(Some)
            .ok_or_else(|| RuleError::UnregisteredType { name: name.clone() }),
        other => Err(RuleError::TypeMismatch {
            property: "mirrorClass".into(),
            expected: "class or type name",
            found: other.kind(),
        }),
    }
}

fn compute_mirrors(scope: &Scope<'_>) -> Result<Value> {
    let node = scope.node();
    let class = mirror_class(&scope.get("mirrorClass")?)?;
    let model = scope.get("model")?.as_node();
    let mut existing = engine::with_object(node.id(), |object| object.tree.mirrors.clone())?;
    existing.retain(Node::is_live);

    let (Some(class), Some(model)) = (class, model) else {
        return Ok(node_list(scope.previous(), &existing));
    };
    let desired = model.get("children")?.to_nodes("children")?;

    let mut target = existing.clone();
    let mut spawned = Vec::new();
    let result = reconcile(
        &desired,
        &existing,
        &mut target,
        |view: &Node, model: &Node| Ok::<_, RuleError>(view.get("model")?.as_node() == Some(*model)),
        |model: &Node| {
            let view = untracked(|| Node::new(class, Options::new().with("model", *model)))?;
            spawned.push(view);
            Ok::<_, RuleError>(view)
        },
    );
    let placements = match result {
        Ok(placements) => placements,
        Err(error) => {
            spawned.iter().for_each(Node::release);
            return Err(error);
        }
    };
    if placements > 0 {
        tracing::debug!(node = %node.id(), placements, created = spawned.len(), "reconciled mirrors");
    }

    engine::with_object_mut(node.id(), |object| {
        object.tree.mirrors = target.clone();
        object.tree.spawned.extend(spawned);
    })?;
    Ok(node_list(scope.previous(), &target))
}

fn compute_children(scope: &Scope<'_>) -> Result<Value> {
    let node = scope.node();
    let parts = scope.get("parts")?.to_nodes("parts")?;
    let mirrors = scope.get("mirrors")?.to_nodes("mirrors")?;
    let desired: Vec<Node> = parts.into_iter().chain(mirrors.iter().copied()).filter(Node::is_live).collect();

    let (mut recorded, spawned) = engine::with_object(node.id(), |object| {
        (object.tree.children.clone(), object.tree.spawned.clone())
    })?;

    // Leavers lose their parent unless another node has claimed them since.
    let mut left = Vec::new();
    recorded.retain(|child| {
        let keep = desired.contains(child);
        if !keep {
            left.push(*child);
        }
        keep
    });
    for child in &left {
        if !child.is_live() {
            continue;
        }
        let parent = untracked(|| child.get("parent"))?;
        if parent.as_node() == Some(node) {
            child.set("parent", Value::Null)?;
        }
    }

    for child in &desired {
        if !recorded.contains(child) {
            child.set("parent", node)?;
            recorded.push(*child);
        }
    }

    // Mirrors that no longer mirror anything are ours to free.
    let (kept, retired): (Vec<Node>, Vec<Node>) =
        spawned.into_iter().partition(|mirror| mirrors.contains(mirror));
    engine::with_object_mut(node.id(), |object| {
        object.tree.children = recorded.clone();
        object.tree.spawned = kept;
    })?;
    for mirror in retired {
        if !recorded.contains(&mirror) {
            mirror.release();
        }
    }

    Ok(node_list(scope.previous(), &recorded))
}

// =============================================================================
// Node API
// =============================================================================

impl Node {
    pub fn parent(&self) -> Result<Option<Node>> {
        Ok(self.get("parent")?.as_node())
    }

    pub fn parts(&self) -> Result<Vec<Node>> {
        self.get("parts")?.to_nodes("parts")
    }

    pub fn mirrors(&self) -> Result<Vec<Node>> {
        self.get("mirrors")?.to_nodes("mirrors")
    }

    /// Pull `children`, updating the `parent` of every child that joined or left.
    pub fn children(&self) -> Result<Vec<Node>> {
        self.get("children")?.to_nodes("children")
    }

    pub fn root(&self) -> Result<Node> {
        let root = self.get("root")?;
        root.as_node().ok_or_else(|| RuleError::TypeMismatch {
            property: "root".into(),
            expected: "node",
            found: root.kind(),
        })
    }

    pub fn model(&self) -> Result<Option<Node>> {
        Ok(self.get("model")?.as_node())
    }

    /// Edit the parts list in place.
    ///
    /// Edits the assigned list when `parts` was assigned, the base list
    /// otherwise. Either way `parts` and its readers are invalidated.
    pub fn edit_parts<R>(&self, f: impl FnOnce(&mut Vec<Node>) -> R) -> Result<R> {
        if self.is_overridden("parts") {
            let mut parts = self.peek("parts").unwrap_or_default().to_nodes("parts")?;
            let result = f(&mut parts);
            self.set("parts", Value::nodes(&parts))?;
            return Ok(result);
        }

        let mut parts = engine::with_object(self.id(), |object| object.tree.parts.clone())?;
        let result = f(&mut parts);
        engine::with_object_mut(self.id(), |object| object.tree.parts = parts)?;
        runtime::touch(self.id(), "parts")?;
        Ok(result)
    }

    pub fn set_parts(&self, parts: impl IntoIterator<Item = Node>) -> Result<()> {
        let parts: Vec<Node> = parts.into_iter().collect();
        self.edit_parts(|current| *current = parts)
    }

    pub fn push_part(&self, part: Node) -> Result<()> {
        self.edit_parts(|parts| parts.push(part))
    }

    /// Remove every occurrence of `part`. False if it was not there.
    pub fn remove_part(&self, part: Node) -> Result<bool> {
        self.edit_parts(|parts| {
            let before = parts.len();
            parts.retain(|existing| *existing != part);
            parts.len() != before
        })
    }

    /// Whether this node's class inherits the tree rules.
    pub fn is_tree(&self) -> bool {
        self.is_a(TREE)
    }
}

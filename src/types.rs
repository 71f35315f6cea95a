//! Core types for spark-views.
//!
//! These types flow through every cell: node ids, the dynamic [`Value`] a rule
//! produces, and the opaque display [`Handle`] external toolkits hand back.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::engine::Pending;
use crate::error::{Result, RuleError};
use crate::node::Node;
use crate::registry::ClassId;

/// Property name. Shared so cell keys clone cheaply.
pub type Name = Rc<str>;

// =============================================================================
// Node Id
// =============================================================================

/// Generational index of a node in the arena.
///
/// The generation changes every time a slot is reused, so an id kept after
/// `release()` never aliases the node that later takes its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// How many times the slot has been reused.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "n{}", self.index)
        } else {
            write!(f, "n{}.{}", self.index, self.generation)
        }
    }
}

// =============================================================================
// Display Handle
// =============================================================================

/// Opaque handle to an external display object (a DOM element, a terminal
/// widget, a scene-graph object...).
///
/// Handles compare by pointer identity. The identity projection only keeps a
/// weak reference, so dropping every `Handle` clone retires its entry.
#[derive(Clone)]
pub struct Handle(Rc<dyn Any>);

impl Handle {
    /// Wrap a display object.
    pub fn new<T: Any>(display: T) -> Self {
        Self(Rc::new(display))
    }

    /// Wrap a display object that is already shared elsewhere.
    pub fn from_rc<T: Any>(display: Rc<T>) -> Self {
        Self(display)
    }

    /// Borrow the display object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Shared pointer to the display object as `T`.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<dyn Any> {
        Rc::downgrade(&self.0)
    }

    /// Pointer identity.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.key())
    }
}

// =============================================================================
// Value
// =============================================================================

/// The value held by a cell.
///
/// Equality is identity-style: scalars compare by value, nodes and classes by
/// id, lists and handles by pointer, pending values by id. A rule that returns
/// the same list pointer as last time is "unchanged" even if it recomputed.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Node(Node),
    Class(ClassId),
    List(Rc<[Value]>),
    Handle(Handle),
    Pending(Pending),
}

impl Value {
    /// Build a list value.
    pub fn list<I, V>(items: I) -> Value
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a list of nodes.
    pub fn nodes(nodes: &[Node]) -> Value {
        Value::List(nodes.iter().copied().map(Value::Node).collect())
    }

    /// Identity comparison used for change detection.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Handle(a), Value::Handle(b)) => a.ptr_eq(b),
            (Value::Pending(a), Value::Pending(b)) => a.id() == b.id(),
            _ => false,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Node(_) => "node",
            Value::Class(_) => "class",
            Value::List(_) => "list",
            Value::Handle(_) => "handle",
            Value::Pending(_) => "pending",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending(_))
    }

    /// Falsy: null, false, zero, NaN and the empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_node(&self) -> Option<Node> {
        match self {
            Value::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(class) => Some(*class),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_pending(&self) -> Option<&Pending> {
        match self {
            Value::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Interpret the value of `property` as a node sequence.
    ///
    /// Null reads as empty, a single node as a one-element sequence.
    pub fn to_nodes(&self, property: &str) -> Result<Vec<Node>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::Node(node) => Ok(vec![*node]),
            Value::List(items) => items
                .iter()
                .map(|item| {
                    item.as_node().ok_or_else(|| RuleError::TypeMismatch {
                        property: property.into(),
                        expected: "node",
                        found: item.kind(),
                    })
                })
                .collect(),
            other => Err(RuleError::TypeMismatch {
                property: property.into(),
                expected: "list of nodes",
                found: other.kind(),
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Node(node) => write!(f, "Node({})", node.id()),
            Value::Class(class) => write!(f, "Class({})", class.index()),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Handle(handle) => handle.fmt(f),
            Value::Pending(pending) => write!(f, "Pending({})", pending.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Node(node) => write!(f, "{node}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl From<Node> for Value {
    fn from(value: Node) -> Self {
        Value::Node(value)
    }
}

impl From<Option<Node>> for Value {
    fn from(value: Option<Node>) -> Self {
        value.map_or(Value::Null, Value::Node)
    }
}

impl From<ClassId> for Value {
    fn from(value: ClassId) -> Self {
        Value::Class(value)
    }
}

impl From<Vec<Node>> for Value {
    fn from(value: Vec<Node>) -> Self {
        Value::nodes(&value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value.into())
    }
}

impl From<Handle> for Value {
    fn from(value: Handle) -> Self {
        Value::Handle(value)
    }
}

impl From<Pending> for Value {
    fn from(value: Pending) -> Self {
        Value::Pending(value)
    }
}

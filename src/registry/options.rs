//! Construction options.

use crate::node::Node;
use crate::registry::ClassId;
use crate::types::{Name, Value};

/// Names the class to construct.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Name(Name),
    Class(ClassId),
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::Name(name.into())
    }
}

impl From<ClassId> for TypeRef {
    fn from(class: ClassId) -> Self {
        TypeRef::Class(class)
    }
}

/// Options for `Node::new` and `Node::create`.
///
/// `type` dispatches to a registered class, `parent` attaches the new node
/// before anything else is assigned, `parts` and `specs` seed the owned
/// children. Every other entry is assigned as if by `Node::set`.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) type_ref: Option<TypeRef>,
    pub(crate) parent: Option<Node>,
    pub(crate) parts: Vec<Node>,
    pub(crate) specs: Vec<Options>,
    pub(crate) properties: Vec<(Name, Value)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch by registered name.
    #[must_use]
    pub fn type_name(mut self, name: &str) -> Self {
        self.type_ref = Some(TypeRef::Name(name.into()));
        self
    }

    /// Dispatch to a class directly.
    #[must_use]
    pub fn class(mut self, class: ClassId) -> Self {
        self.type_ref = Some(TypeRef::Class(class));
        self
    }

    #[must_use]
    pub fn parent(mut self, parent: Node) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn parts(mut self, parts: impl IntoIterator<Item = Node>) -> Self {
        self.parts.extend(parts);
        self
    }

    #[must_use]
    pub fn spec(mut self, spec: Options) -> Self {
        self.specs.push(spec);
        self
    }

    #[must_use]
    pub fn specs(mut self, specs: impl IntoIterator<Item = Options>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Set a named option, replacing an earlier one with the same name.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.properties.iter_mut().find(|(key, _)| &**key == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name.into(), value)),
        }
        self
    }

    /// Drop a named option.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.properties.retain(|(key, _)| &**key != name);
        self
    }

    pub fn type_ref(&self) -> Option<&TypeRef> {
        self.type_ref.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value)
    }

    /// Named options in assignment order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(key, value)| (&**key, value))
    }
}

//! Type Registry - Classes, their rules and dispatch by type name.
//!
//! A class is registered once with a [`ClassSpec`]. Every definition becomes
//! a rule (a memoized cell per node) unless it is listed in `non_rules` or its
//! name starts with `_`; those stay plain methods invoked with `Node::call`.
//! Eager property names accumulate down the inheritance chain, so a property
//! that is eager in a class stays eager in every subclass even if redefined.
//!
//! # Example
//!
//! ```ignore
//! let card = ClassSpec::new("Card")
//!     .extends(TREE)
//!     .rule("text", |scope| Ok(Value::from("hello")))
//!     .own_eager_properties(["summary"])
//!     .register();
//! ```

mod construct;
mod options;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

pub(crate) use construct::{construct, create};
pub use options::{Options, TypeRef};

use crate::engine::{Rule, Scope};
use crate::error::Result;
use crate::types::{Name, Value};

// =============================================================================
// Class Ids
// =============================================================================

/// Index of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Root of every class: rules `type`, `text`, `title`.
pub const REGISTERABLE: ClassId = ClassId(0);
/// Maintains `parent`, `parts`, `mirrors` and `children`.
pub const TREE: ClassId = ClassId(1);
/// A tree with a `display` handle and an eager `update`.
pub const DISPLAY_CONTROLLER: ClassId = ClassId(2);

/// Pre-processes construction options for `Node::create`.
pub type CollectHook = Rc<dyn Fn(Options) -> LocalBoxFuture<'static, Result<Options>>>;

// =============================================================================
// Registry State
// =============================================================================

struct Class {
    name: Name,
    parent: Option<ClassId>,
    rules: HashMap<Name, Rule>,
    methods: HashMap<Name, Rule>,
    /// Own plus inherited eager names.
    eager: Vec<Name>,
    collect: Option<CollectHook>,
}

struct Registry {
    classes: Vec<Class>,
    types: HashMap<Name, ClassId>,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut registry = Self {
            classes: Vec::new(),
            types: HashMap::new(),
        };
        registerable_spec().install(&mut registry);
        crate::tree::tree_spec().install(&mut registry);
        crate::display::display_controller_spec().install(&mut registry);
        registry
    }

    fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0 as usize)
    }

    /// `id` followed by its ancestors.
    fn chain(&self, id: ClassId) -> impl Iterator<Item = (ClassId, &Class)> {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let id = next?;
            let class = self.class(id)?;
            next = class.parent;
            Some((id, class))
        })
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::with_builtins());
}

fn registerable_spec() -> ClassSpec {
    ClassSpec::root("Registerable")
        .rule("type", |scope| {
            let name = class_name(scope.node().class()?).unwrap_or_else(|| "".into());
            Ok(Value::Str(name))
        })
        .rule("text", |_| Ok(Value::from("")))
        .rule("title", |scope| scope.get("text"))
}

// =============================================================================
// Registration
// =============================================================================

/// Builder describing one class.
pub struct ClassSpec {
    name: Name,
    parent: Option<ClassId>,
    definitions: Vec<(Name, Rule, bool)>,
    non_rules: Vec<Name>,
    own_eager: Vec<Name>,
    collect: Option<CollectHook>,
}

impl ClassSpec {
    /// A class extending `Registerable`.
    pub fn new(name: &str) -> Self {
        Self {
            parent: Some(REGISTERABLE),
            ..Self::root(name)
        }
    }

    fn root(name: &str) -> Self {
        Self {
            name: name.into(),
            parent: None,
            definitions: Vec::new(),
            non_rules: vec!["constructor".into()],
            own_eager: Vec::new(),
            collect: None,
        }
    }

    #[must_use]
    pub fn extends(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Define `name`. It becomes a rule unless excluded by `non_rules` or a
    /// leading underscore.
    #[must_use]
    pub fn rule(
        mut self,
        name: &str,
        rule: impl Fn(&Scope<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.definitions.push((name.into(), Rc::new(rule), false));
        self
    }

    /// Define `name` as a method, never cached.
    #[must_use]
    pub fn method(
        mut self,
        name: &str,
        method: impl Fn(&Scope<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.definitions.push((name.into(), Rc::new(method), true));
        self
    }

    /// Names that stay methods. Replaces the default `["constructor"]`.
    #[must_use]
    pub fn non_rules<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.non_rules = names.into_iter().map(Into::into).collect();
        self
    }

    /// Eager names added by this class.
    #[must_use]
    pub fn own_eager_properties<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.own_eager = names.into_iter().map(Into::into).collect();
        self
    }

    /// Hook run by `Node::create` before constructing.
    #[must_use]
    pub fn collect(
        mut self,
        hook: impl Fn(Options) -> LocalBoxFuture<'static, Result<Options>> + 'static,
    ) -> Self {
        self.collect = Some(Rc::new(hook));
        self
    }

    /// Register the class, binding its name for dispatch.
    ///
    /// Registering the same name again binds the name to the new class.
    pub fn register(self) -> ClassId {
        REGISTRY.with(|registry| self.install(&mut registry.borrow_mut()))
    }

    fn install(self, registry: &mut Registry) -> ClassId {
        let id = ClassId(registry.classes.len() as u32);

        let mut eager = self
            .parent
            .and_then(|parent| registry.class(parent))
            .map(|parent| parent.eager.clone())
            .unwrap_or_default();
        for name in self.own_eager {
            if !eager.contains(&name) {
                eager.push(name);
            }
        }

        let mut rules = HashMap::new();
        let mut methods = HashMap::new();
        for (name, definition, forced_method) in self.definitions {
            if forced_method || name.starts_with('_') || self.non_rules.contains(&name) {
                methods.insert(name, definition);
            } else {
                rules.insert(name, definition);
            }
        }

        tracing::debug!(
            class = %self.name,
            id = id.0,
            rules = rules.len(),
            methods = methods.len(),
            "registered class"
        );
        registry.types.insert(self.name.clone(), id);
        registry.classes.push(Class {
            name: self.name,
            parent: self.parent,
            rules,
            methods,
            eager,
            collect: self.collect,
        });
        id
    }
}

// =============================================================================
// Queries
// =============================================================================

pub fn class_name(class: ClassId) -> Option<Name> {
    REGISTRY.with(|registry| registry.borrow().class(class).map(|class| class.name.clone()))
}

pub fn parent_of(class: ClassId) -> Option<ClassId> {
    REGISTRY.with(|registry| registry.borrow().class(class).and_then(|class| class.parent))
}

/// Class currently bound to `name`.
pub fn lookup(name: &str) -> Option<ClassId> {
    REGISTRY.with(|registry| registry.borrow().types.get(name).copied())
}

/// Whether `class` is `ancestor` or inherits from it.
pub fn is_subclass(class: ClassId, ancestor: ClassId) -> bool {
    REGISTRY.with(|registry| registry.borrow().chain(class).any(|(id, _)| id == ancestor))
}

pub fn is_eager(class: ClassId, name: &str) -> bool {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .class(class)
            .is_some_and(|class| class.eager.iter().any(|eager| &**eager == name))
    })
}

/// Nearest definition of `name`, if it is a rule.
pub(crate) fn rule_for(class: ClassId, name: &str) -> Option<(ClassId, Rule)> {
    nearest(class, name).and_then(|(definer, rule, is_method)| (!is_method).then_some((definer, rule)))
}

/// Nearest definition of `name`, if it is a method.
pub(crate) fn method_for(class: ClassId, name: &str) -> Option<(ClassId, Rule)> {
    nearest(class, name).and_then(|(definer, method, is_method)| is_method.then_some((definer, method)))
}

fn nearest(class: ClassId, name: &str) -> Option<(ClassId, Rule, bool)> {
    REGISTRY.with(|registry| {
        registry.borrow().chain(class).find_map(|(id, class)| {
            if let Some(rule) = class.rules.get(name) {
                Some((id, rule.clone(), false))
            } else {
                class.methods.get(name).map(|method| (id, method.clone(), true))
            }
        })
    })
}

/// Definition of `name` overridden by the one in `definer`.
pub(crate) fn super_definition(definer: ClassId, name: &str) -> Option<(ClassId, Rule)> {
    let parent = parent_of(definer)?;
    nearest(parent, name).map(|(id, definition, _)| (id, definition))
}

pub(crate) fn collect_hook(class: ClassId) -> Option<CollectHook> {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .chain(class)
            .find_map(|(_, class)| class.collect.clone())
    })
}

/// Forget every registered class except the built-ins (for testing).
pub fn reset_registry() {
    let old = REGISTRY.with(|registry| registry.replace(Registry::with_builtins()));
    drop(old);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::reset_runtime;

    fn setup() {
        reset_runtime();
    }

    #[test]
    fn test_builtins_registered() {
        setup();
        assert_eq!(lookup("Registerable"), Some(REGISTERABLE));
        assert_eq!(lookup("Tree"), Some(TREE));
        assert_eq!(lookup("DisplayController"), Some(DISPLAY_CONTROLLER));
        assert!(is_subclass(DISPLAY_CONTROLLER, REGISTERABLE));
        assert!(!is_subclass(REGISTERABLE, TREE));
        assert!(is_eager(DISPLAY_CONTROLLER, "update"));
        assert!(!is_eager(TREE, "update"));
    }

    #[test]
    fn test_non_rules_and_underscore_become_methods() {
        setup();
        let class = ClassSpec::new("Widget")
            .rule("size", |_| Ok(Value::Int(3)))
            .rule("_scratch", |_| Ok(Value::Int(1)))
            .rule("grow", |scope| Ok(Value::Int(scope.arg(0).as_int().unwrap_or(0) + 1)))
            .non_rules(["constructor", "grow"])
            .register();

        assert!(rule_for(class, "size").is_some());
        assert!(rule_for(class, "_scratch").is_none());
        assert!(method_for(class, "_scratch").is_some());
        assert!(method_for(class, "grow").is_some());

        let node = Node::new(class, Options::new()).unwrap();
        assert_eq!(node.call("grow", &[Value::Int(4)]).unwrap(), Value::Int(5));
        // Methods are not cached.
        assert_eq!(node.peek("grow"), None);
    }

    #[test]
    fn test_eager_sets_accumulate() {
        setup();
        let base = ClassSpec::new("Base").own_eager_properties(["a"]).register();
        let derived = ClassSpec::new("Derived")
            .extends(base)
            .rule("a", |_| Ok(Value::Int(2)))
            .own_eager_properties(["b", "a"])
            .register();

        assert!(is_eager(derived, "a"));
        assert!(is_eager(derived, "b"));
        assert!(!is_eager(base, "b"));
    }

    #[test]
    fn test_super_definition_walks_ancestors() {
        setup();
        let base = ClassSpec::new("Base")
            .rule("label", |_| Ok(Value::from("base")))
            .register();
        let middle = ClassSpec::new("Middle").extends(base).register();
        let leaf = ClassSpec::new("Leaf")
            .extends(middle)
            .rule("label", |scope| {
                let inherited = scope.call_super()?;
                Ok(Value::from(format!("leaf+{inherited}")))
            })
            .register();

        let node = Node::new(leaf, Options::new()).unwrap();
        assert_eq!(node.get("label").unwrap(), Value::from("leaf+base"));
        assert!(super_definition(base, "label").is_none());
    }

    #[test]
    fn test_reregistering_rebinds_name() {
        setup();
        let first = ClassSpec::new("Thing").register();
        let second = ClassSpec::new("Thing").register();
        assert_ne!(first, second);
        assert_eq!(lookup("Thing"), Some(second));
        assert_eq!(class_name(first).as_deref(), Some("Thing"));
    }

    #[test]
    fn test_reset_keeps_builtins_only() {
        setup();
        ClassSpec::new("Gone").register();
        reset_registry();
        assert_eq!(lookup("Gone"), None);
        assert_eq!(lookup("Tree"), Some(TREE));
    }
}

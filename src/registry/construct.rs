//! Construction and dispatch by type.

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::{ClassId, DISPLAY_CONTROLLER, Options, TREE, TypeRef};
use crate::engine::{self, untracked};
use crate::error::{Result, RuleError};
use crate::node::Node;
use crate::registry;
use crate::types::{Name, Value};

/// Construct a node of `base`, or of the class named by the `type` option.
///
/// Runs untracked: a rule that constructs nodes does not depend on what the
/// new nodes read while they are being set up.
pub(crate) fn construct(base: ClassId, options: Options) -> Result<Node> {
    untracked(|| build(base, options))
}

/// Asynchronous counterpart of [`construct`]: runs the class's collect hook
/// on the options first.
pub(crate) fn create(base: ClassId, options: Options) -> LocalBoxFuture<'static, Result<Node>> {
    let hook = registry::collect_hook(base);
    async move {
        let options = match hook {
            Some(hook) => hook(options).await?,
            None => options,
        };
        construct(base, options)
    }
    .boxed_local()
}

fn build(base: ClassId, options: Options) -> Result<Node> {
    let mut options = normalize(options)?;
    let class = resolve(base, options.type_ref.take())?;
    if registry::is_subclass(class, TREE) {
        build_tree(class, options)
    } else {
        build_plain(class, options)
    }
}

/// Lift `type`, `parent` and `parts` given as named options.
fn normalize(mut options: Options) -> Result<Options> {
    let mut properties = Vec::with_capacity(options.properties.len());
    for (name, value) in std::mem::take(&mut options.properties) {
        match &*name {
            "type" => {
                options.type_ref = match value {
                    Value::Str(name) => Some(TypeRef::Name(name)),
                    Value::Class(class) => Some(TypeRef::Class(class)),
                    Value::Null => None,
                    other => {
                        return Err(RuleError::TypeMismatch {
                            property: name,
                            expected: "type name or class",
                            found: other.kind(),
                        });
                    }
                }
            }
            "parent" if !value.is_null() => {
                options.parent = Some(value.as_node().ok_or_else(|| RuleError::TypeMismatch {
                    property: name.clone(),
                    expected: "node",
                    found: value.kind(),
                })?);
            }
            "parts" => options.parts.extend(value.to_nodes(&name)?),
            _ => properties.push((name, value)),
        }
    }
    options.properties = properties;
    Ok(options)
}

fn resolve(base: ClassId, type_ref: Option<TypeRef>) -> Result<ClassId> {
    match type_ref {
        None => Ok(base),
        Some(TypeRef::Class(class)) => match registry::class_name(class) {
            Some(_) => Ok(class),
            None => Err(RuleError::UnregisteredType {
                name: format!("#{}", class.index()).into(),
            }),
        },
        Some(TypeRef::Name(name)) => {
            if registry::class_name(base).as_deref() == Some(&*name) {
                return Ok(base);
            }
            registry::lookup(&name).ok_or(RuleError::UnregisteredType { name })
        }
    }
}

fn build_tree(class: ClassId, mut options: Options) -> Result<Node> {
    // Only a tree reads its parts back into `children`.
    if let Some(parent) = options.parent.filter(|parent| !parent.is_tree()) {
        return Err(RuleError::TypeMismatch {
            property: "parent".into(),
            expected: "tree node",
            found: if parent.is_live() { "node" } else { "released node" },
        });
    }

    // Specs dispatch relative to the class being built.
    let mut built: Vec<Node> = Vec::with_capacity(options.specs.len());
    for spec in std::mem::take(&mut options.specs) {
        match build(class, spec) {
            Ok(node) => built.push(node),
            Err(error) => {
                built.iter().for_each(Node::release);
                return Err(error);
            }
        }
    }

    let node = Node::from_id(engine::allocate(class));
    let mut setup = || -> Result<()> {
        if let Some(parent) = options.parent {
            parent.push_part(node)?;
        }
        let parts: Vec<Node> = options.parts.iter().chain(&built).copied().collect();
        engine::with_object_mut(node.id(), |object| object.tree.parts = parts)?;
        assign(node, std::mem::take(&mut options.properties))?;
        if registry::is_subclass(class, DISPLAY_CONTROLLER) {
            crate::display::on_construct(node)?;
        }
        Ok(())
    };
    if let Err(error) = setup() {
        built.iter().for_each(Node::release);
        node.release();
        return Err(error);
    }

    tracing::debug!(node = %node.id(), class = class.index(), parts = built.len(), "constructed tree node");
    Ok(node)
}

fn build_plain(class: ClassId, options: Options) -> Result<Node> {
    if !options.specs.is_empty() {
        tracing::warn!(class = class.index(), "specs ignored for a class without parts");
    }

    let node = Node::from_id(engine::allocate(class));
    let mut properties = options.properties;
    if let Some(parent) = options.parent {
        properties.insert(0, ("parent".into(), Value::Node(parent)));
    }
    if !options.parts.is_empty() {
        properties.push(("parts".into(), Value::nodes(&options.parts)));
    }
    if let Err(error) = assign(node, properties) {
        node.release();
        return Err(error);
    }

    tracing::debug!(node = %node.id(), class = class.index(), "constructed node");
    Ok(node)
}

fn assign(node: Node, properties: Vec<(Name, Value)>) -> Result<()> {
    for (name, value) in properties {
        node.set(&name, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassSpec, REGISTERABLE};
    use crate::reset_runtime;

    fn setup() {
        reset_runtime();
    }

    #[test]
    fn test_dispatch_by_name_and_class() {
        setup();
        let sub = ClassSpec::new("SubRegisterable").register();

        let by_name = construct(REGISTERABLE, Options::new().type_name("SubRegisterable")).unwrap();
        assert_eq!(by_name.class().unwrap(), sub);

        let by_class = construct(REGISTERABLE, Options::new().class(sub)).unwrap();
        assert_eq!(by_class.class().unwrap(), sub);

        let same = construct(REGISTERABLE, Options::new().type_name("Registerable")).unwrap();
        assert_eq!(same.class().unwrap(), REGISTERABLE);
    }

    #[test]
    fn test_non_tree_parent_is_rejected() {
        setup();
        let plain = construct(REGISTERABLE, Options::new()).unwrap();
        let live = engine::live_count();

        let err = construct(TREE, Options::new().parent(plain)).unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { expected: "tree node", .. }));
        assert_eq!(engine::live_count(), live);
        assert!(plain.peek("parts").is_none());
    }

    #[test]
    fn test_type_as_named_option() {
        setup();
        let sub = ClassSpec::new("Named").register();
        let node = construct(REGISTERABLE, Options::new().with("type", "Named")).unwrap();
        assert_eq!(node.class().unwrap(), sub);
        // `type` is never assigned as a property.
        assert!(!node.is_overridden("type"));
    }

    #[test]
    fn test_unregistered_type_fails() {
        setup();
        let live = engine::live_count();
        let err = construct(REGISTERABLE, Options::new().type_name("Nope")).unwrap_err();
        assert_eq!(err, RuleError::UnregisteredType { name: "Nope".into() });
        assert_eq!(engine::live_count(), live);
    }

    #[test]
    fn test_failed_spec_releases_siblings() {
        setup();
        let live = engine::live_count();
        let err = construct(
            TREE,
            Options::new()
                .spec(Options::new().with("text", "ok"))
                .spec(Options::new().type_name("Missing")),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::UnregisteredType { .. }));
        assert_eq!(engine::live_count(), live);
    }

    #[test]
    fn test_options_assigned_like_set() {
        setup();
        let node = construct(REGISTERABLE, Options::new().with("text", "hello")).unwrap();
        assert!(node.is_overridden("text"));
        assert_eq!(node.get("title").unwrap(), Value::from("hello"));
    }

    #[test]
    fn test_create_runs_collect_hook() {
        setup();
        let collected = ClassSpec::new("Collected")
            .collect(|options| async move { Ok::<_, RuleError>(options.with("text", "collected")) }.boxed_local())
            .register();

        let node = futures::executor::block_on(create(collected, Options::new())).unwrap();
        assert_eq!(node.class().unwrap(), collected);
        assert_eq!(node.get("text").unwrap(), Value::from("collected"));
    }

    #[test]
    fn test_create_dispatches() {
        setup();
        let sub = ClassSpec::new("Later").register();
        let node = futures::executor::block_on(create(REGISTERABLE, Options::new().type_name("Later"))).unwrap();
        assert_eq!(node.class().unwrap(), sub);
    }
}

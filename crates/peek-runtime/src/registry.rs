use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::value::Value;

/// Host method implemented natively. The agent cannot see inside it, so the
/// evaluator only calls natives that the capability tables allow.
pub type NativeMethod = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>;

/// Host method implemented in the expression language itself. Its body is
/// validated before every first use in an evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDef {
    #[serde(default)]
    pub params: Vec<String>,
    pub body: String,
}

impl MethodDef {
    pub fn new(params: &[&str], body: impl Into<String>) -> Self {
        Self {
            params: params.iter().map(|param| (*param).to_owned()).collect(),
            body: body.into(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub methods: HashMap<String, MethodDef>,
    pub singleton_methods: HashMap<String, MethodDef>,
    pub natives: HashMap<String, NativeMethod>,
    pub singleton_natives: HashMap<String, NativeMethod>,
    pub constants: HashMap<String, Value>,
    pub class_variables: HashMap<String, Value>,
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn superclass(mut self, name: impl Into<String>) -> Self {
        self.superclass = Some(name.into());
        self
    }

    pub fn method(mut self, name: &str, params: &[&str], body: &str) -> Self {
        self.methods
            .insert(name.to_owned(), MethodDef::new(params, body));
        self
    }

    pub fn singleton_method(mut self, name: &str, params: &[&str], body: &str) -> Self {
        self.singleton_methods
            .insert(name.to_owned(), MethodDef::new(params, body));
        self
    }

    pub fn native<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.natives.insert(name.to_owned(), Arc::new(f));
        self
    }

    pub fn singleton_native<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.singleton_natives.insert(name.to_owned(), Arc::new(f));
        self
    }

    pub fn constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(name.to_owned(), value);
        self
    }

    pub fn class_variable(mut self, name: &str, value: Value) -> Self {
        self.class_variables.insert(name.to_owned(), value);
        self
    }
}

/// A resolved method and the class that defines it.
#[derive(Clone)]
pub enum MethodLookup<'a> {
    Interpreted { owner: &'a str, def: &'a MethodDef },
    Native { owner: &'a str, func: &'a NativeMethod },
}

impl MethodLookup<'_> {
    pub fn owner(&self) -> &str {
        match self {
            MethodLookup::Interpreted { owner, .. } | MethodLookup::Native { owner, .. } => owner,
        }
    }
}

/// Host classes, global variables and top-level constants of the paused
/// program.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassDef>,
    constants: HashMap<String, Value>,
    globals: RwLock<HashMap<String, Value>>,
}

/// Bounds superclass walks so a malformed hierarchy cannot loop.
const MAX_ANCESTRY: usize = 64;

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_class(&mut self, class: ClassDef) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn define_constant(&mut self, name: impl Into<String>, value: Value) {
        self.constants.insert(name.into(), value);
    }

    /// Globals stay writable after the registry is shared; the host program
    /// keeps running while breakpoints are evaluated.
    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        self.globals.write().insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.read().get(name).cloned()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// `name` followed by its registered superclasses.
    pub fn ancestors(&self, name: &str) -> impl Iterator<Item = &ClassDef> + '_ {
        let mut next = self.classes.get(name);
        let mut remaining = MAX_ANCESTRY;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let current = next?;
            next = current
                .superclass
                .as_deref()
                .and_then(|parent| self.classes.get(parent));
            Some(current)
        })
    }

    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor
            || self.ancestors(class).any(|def| {
                def.name == ancestor || def.superclass.as_deref() == Some(ancestor)
            })
    }

    pub fn find_method(&self, class: &str, name: &str) -> Option<MethodLookup<'_>> {
        self.ancestors(class).find_map(|def| {
            if let Some(method) = def.methods.get(name) {
                return Some(MethodLookup::Interpreted {
                    owner: &def.name,
                    def: method,
                });
            }
            def.natives.get(name).map(|func| MethodLookup::Native {
                owner: &def.name,
                func,
            })
        })
    }

    pub fn find_singleton_method(&self, class: &str, name: &str) -> Option<MethodLookup<'_>> {
        self.ancestors(class).find_map(|def| {
            if let Some(method) = def.singleton_methods.get(name) {
                return Some(MethodLookup::Interpreted {
                    owner: &def.name,
                    def: method,
                });
            }
            def.singleton_natives.get(name).map(|func| MethodLookup::Native {
                owner: &def.name,
                func,
            })
        })
    }

    /// Constant lookup: the class chain of `scope` first, then top level.
    pub fn constant(&self, scope: Option<&str>, name: &str) -> Option<Value> {
        if let Some(scope) = scope {
            if let Some(value) = self
                .ancestors(scope)
                .find_map(|def| def.constants.get(name))
            {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.constants.get(name) {
            return Some(value.clone());
        }
        self.classes
            .contains_key(name)
            .then(|| Value::class(name))
    }

    pub fn class_variable(&self, class: &str, name: &str) -> Option<Value> {
        self.ancestors(class)
            .find_map(|def| def.class_variables.get(name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.define_class(
            ClassDef::new("Shape")
                .method("kind", &[], ":shape")
                .constant("SIDES", Value::Int(0))
                .class_variable("count", Value::Int(2)),
        );
        registry.define_class(
            ClassDef::new("Square")
                .superclass("Shape")
                .method("area", &[], "@side * @side")
                .native("to_s", |_, _| Ok(Value::str("square"))),
        );
        registry
    }

    #[test]
    fn methods_resolve_through_superclasses() {
        let registry = registry();
        match registry.find_method("Square", "kind") {
            Some(MethodLookup::Interpreted { owner, def }) => {
                assert_eq!(owner, "Shape");
                assert_eq!(def.body, ":shape");
            }
            _ => panic!("expected interpreted method"),
        }
        assert!(matches!(
            registry.find_method("Square", "to_s"),
            Some(MethodLookup::Native { owner: "Square", .. })
        ));
        assert!(registry.find_method("Square", "missing").is_none());
    }

    #[test]
    fn constants_fall_back_to_top_level_and_class_names() {
        let mut registry = registry();
        registry.define_constant("VERSION", Value::str("1.0"));

        assert!(matches!(
            registry.constant(Some("Square"), "SIDES"),
            Some(Value::Int(0))
        ));
        assert!(registry.constant(Some("Square"), "VERSION").is_some());
        assert!(matches!(
            registry.constant(None, "Shape"),
            Some(Value::Class(name)) if &*name == "Shape"
        ));
        assert!(registry.constant(None, "Nope").is_none());
        assert!(registry.class_variable("Square", "count").is_some());
    }

    #[test]
    fn lookups_outlive_the_class_name() {
        let registry = registry();
        let (method, singleton) = {
            let class = String::from("Square");
            (
                registry.find_method(&class, "kind"),
                registry.find_singleton_method(&class, "kind"),
            )
        };
        assert!(matches!(method, Some(MethodLookup::Interpreted { owner: "Shape", .. })));
        assert!(singleton.is_none());
    }

    #[test]
    fn cyclic_hierarchies_terminate() {
        let mut registry = ClassRegistry::new();
        registry.define_class(ClassDef::new("A").superclass("B"));
        registry.define_class(ClassDef::new("B").superclass("A"));
        assert!(registry.find_method("A", "anything").is_none());
        assert!(registry.is_subclass_of("A", "B"));
    }
}

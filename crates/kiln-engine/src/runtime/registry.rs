//! Reflective registry of loaded modules and types
//!
//! Resolution strategies only see the program through this registry. Every
//! registration bumps an epoch that call-site guards compare against, so a
//! site linked before a module was (re)loaded re-resolves on its next call.

use super::callable::Callable;
use super::value::{types, Value};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Declared field of a type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    /// Reachable from other modules through field and accessor calls
    pub public: bool,
}

/// Runtime description of a type
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    /// Direct supertypes, by qualified name
    pub supertypes: Vec<String>,
    pub methods: Vec<Arc<Callable>>,
    pub fields: Vec<FieldInfo>,
    pub constructors: Vec<Arc<Callable>>,
    /// `getX`/`setX` calls may stand in for a field or method named `x`
    pub synthetic_accessors: bool,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            synthetic_accessors: true,
        }
    }

    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn method(mut self, method: Callable) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            public: true,
        });
        self
    }

    pub fn private_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            public: false,
        });
        self
    }

    pub fn constructor(mut self, constructor: Callable) -> Self {
        self.constructors.push(Arc::new(constructor));
        self
    }

    pub fn without_synthetic_accessors(mut self) -> Self {
        self.synthetic_accessors = false;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<Callable>> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn public_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.public && f.name == name)
    }
}

/// Functions attached to every value assignable to `target`
#[derive(Debug, Clone)]
pub struct Augmentation {
    pub target: String,
    pub functions: Vec<Arc<Callable>>,
}

/// Named augmentations applied to a target type
///
/// Names without a module prefix refer to the declaring module.
#[derive(Debug, Clone)]
pub struct Application {
    pub target: String,
    pub augmentations: Vec<String>,
}

/// Loaded module as seen by call sites
#[derive(Debug, Clone, Default)]
pub struct RuntimeModule {
    pub name: String,
    pub imports: Vec<String>,
    pub functions: Vec<Arc<Callable>>,
    /// Module state readable as static fields
    pub fields: FxHashMap<String, Value>,
    pub augmentations: Vec<Augmentation>,
    pub named_augmentations: FxHashMap<String, Vec<Arc<Callable>>>,
    pub applications: Vec<Application>,
}

impl RuntimeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn function(mut self, function: Callable) -> Self {
        self.functions.push(Arc::new(function));
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Add functions to the augmentation of `target`, creating it if needed
    pub fn augment(mut self, target: impl Into<String>, functions: Vec<Callable>) -> Self {
        let target = target.into();
        let functions = functions.into_iter().map(Arc::new);
        match self.augmentations.iter_mut().find(|a| a.target == target) {
            Some(existing) => existing.functions.extend(functions),
            None => self.augmentations.push(Augmentation {
                target,
                functions: functions.collect(),
            }),
        }
        self
    }

    pub fn named_augmentation(mut self, name: impl Into<String>, functions: Vec<Callable>) -> Self {
        self.named_augmentations
            .entry(name.into())
            .or_default()
            .extend(functions.into_iter().map(Arc::new));
        self
    }

    pub fn apply(mut self, target: impl Into<String>, augmentations: &[&str]) -> Self {
        self.applications.push(Application {
            target: target.into(),
            augmentations: augmentations.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn functions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<Callable>> + 'a {
        self.functions.iter().filter(move |f| f.name == name)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

static BUILTIN_TYPES: Lazy<Vec<Arc<TypeInfo>>> = Lazy::new(|| {
    let object = TypeInfo::new(types::OBJECT).without_synthetic_accessors();
    let number = TypeInfo::new(types::NUMBER).extends(types::OBJECT);
    let leaf = |name: &str, supertype: &str| {
        TypeInfo::new(name)
            .extends(supertype)
            .without_synthetic_accessors()
            .into_arc()
    };
    vec![
        object.into_arc(),
        number.without_synthetic_accessors().into_arc(),
        leaf(types::NULL, types::OBJECT),
        leaf(types::BOOL, types::OBJECT),
        leaf(types::INT, types::NUMBER),
        leaf(types::FLOAT, types::NUMBER),
        leaf(types::STRING, types::OBJECT),
        leaf(types::CHAR, types::OBJECT),
        leaf(types::ARRAY, types::OBJECT),
        leaf(types::TUPLE, types::OBJECT),
        leaf(types::FUNCTION, types::OBJECT),
        leaf(types::TYPE, types::OBJECT),
    ]
});

/// Shared view of loaded modules and types
pub struct Registry {
    modules: DashMap<String, Arc<RuntimeModule>>,
    types: DashMap<String, Arc<TypeInfo>>,
    epoch: AtomicU64,
}

impl Registry {
    /// Registry holding only the built-in types
    pub fn new() -> Self {
        let registry = Self {
            modules: DashMap::new(),
            types: DashMap::new(),
            epoch: AtomicU64::new(0),
        };
        for ty in BUILTIN_TYPES.iter() {
            registry.types.insert(ty.name.clone(), Arc::clone(ty));
        }
        registry
    }

    /// Register or replace a module
    pub fn register_module(&self, module: RuntimeModule) -> Arc<RuntimeModule> {
        let module = Arc::new(module);
        log::debug!("registered module {}", module.name);
        self.modules.insert(module.name.clone(), Arc::clone(&module));
        self.epoch.fetch_add(1, Ordering::AcqRel);
        module
    }

    /// Register or replace a type
    pub fn register_type(&self, ty: TypeInfo) -> Arc<TypeInfo> {
        let ty = Arc::new(ty);
        log::debug!("registered type {}", ty.name);
        self.types.insert(ty.name.clone(), Arc::clone(&ty));
        self.epoch.fetch_add(1, Ordering::AcqRel);
        ty
    }

    pub fn module(&self, name: &str) -> Option<Arc<RuntimeModule>> {
        self.modules.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_type(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.types.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Concrete type of a value
    pub fn type_of(&self, value: &Value) -> Option<Arc<TypeInfo>> {
        match value {
            Value::Object(object) => Some(Arc::clone(&object.class)),
            other => self.get_type(other.type_name()),
        }
    }

    /// Whether values of type `type_name` can be used where `target` is
    /// expected
    ///
    /// Unknown types are only assignable to themselves and to the root type.
    pub fn is_assignable(&self, type_name: &str, target: &str) -> bool {
        if type_name == target || target == types::OBJECT {
            return true;
        }
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([type_name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(ty) = self.get_type(&current) else {
                continue;
            };
            for supertype in &ty.supertypes {
                if supertype == target {
                    return true;
                }
                queue.push_back(supertype.clone());
            }
        }
        false
    }

    /// `ty` followed by its supertypes, nearest first
    pub fn linearize(&self, ty: &Arc<TypeInfo>) -> Vec<Arc<TypeInfo>> {
        let mut order = vec![Arc::clone(ty)];
        let mut seen: FxHashSet<String> = FxHashSet::default();
        seen.insert(ty.name.clone());
        let mut i = 0;
        while i < order.len() {
            let supertypes = order[i].supertypes.clone();
            for name in supertypes {
                if seen.insert(name.clone()) {
                    if let Some(found) = self.get_type(&name) {
                        order.push(found);
                    }
                }
            }
            i += 1;
        }
        order
    }

    /// Incremented by every registration
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeResult;

    fn noop(_: &[Value]) -> RuntimeResult<Value> {
        Ok(Value::Null)
    }

    #[test]
    fn test_builtin_hierarchy() {
        let registry = Registry::new();
        assert!(registry.is_assignable(types::INT, types::NUMBER));
        assert!(registry.is_assignable(types::INT, types::OBJECT));
        assert!(!registry.is_assignable(types::STRING, types::NUMBER));
        assert!(!registry.is_assignable(types::NUMBER, types::INT));
    }

    #[test]
    fn test_builtin_types_are_shared() {
        let a = Registry::new();
        let b = Registry::new();
        let ta = a.type_of(&Value::Int(1)).unwrap();
        let tb = b.type_of(&Value::Int(2)).unwrap();
        assert!(Arc::ptr_eq(&ta, &tb));
    }

    #[test]
    fn test_user_types_and_linearization() {
        let registry = Registry::new();
        registry.register_type(TypeInfo::new("demo.Shape"));
        let circle = registry.register_type(TypeInfo::new("demo.Circle").extends("demo.Shape"));
        assert!(registry.is_assignable("demo.Circle", "demo.Shape"));
        let names: Vec<_> = registry.linearize(&circle).iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["demo.Circle", "demo.Shape"]);
    }

    #[test]
    fn test_registration_bumps_epoch() {
        let registry = Registry::new();
        let before = registry.epoch();
        registry.register_module(RuntimeModule::new("demo").function(Callable::new("f", &[], noop)));
        assert!(registry.epoch() > before);
        assert_eq!(registry.module("demo").unwrap().functions_named("f").count(), 1);
    }

    #[test]
    fn test_augment_merges_same_target() {
        let module = RuntimeModule::new("demo")
            .augment(types::STRING, vec![Callable::new("shout", &["this"], noop)])
            .augment(types::STRING, vec![Callable::new("whisper", &["this"], noop)]);
        assert_eq!(module.augmentations.len(), 1);
        assert_eq!(module.augmentations[0].functions.len(), 2);
    }
}

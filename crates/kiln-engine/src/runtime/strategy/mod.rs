//! Call-site resolution strategies
//!
//! A call is resolved by asking each strategy in [`Strategy::ORDER`] for a
//! target. The first one that answers wins; a strategy that does not apply
//! to the call's kind answers nothing. Strategies only read the registry.

mod augment;
mod function;
mod method;
mod property;
mod reference;

use super::adapt::Adapter;
use super::call_site::{CallKind, InvocationDescriptor};
use super::callable::Callable;
use super::registry::{Registry, RuntimeModule, TypeInfo};
use super::value::{Object, Value};
use super::{RuntimeError, RuntimeResult};
use std::fmt;
use std::sync::Arc;

/// How a call site found its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The callee is a function value
    Reference,
    Method,
    Field,
    /// `getX`/`isX`/`setX` accessor standing in for `x`
    Property,
    /// Augmentation of the receiver's type in the calling module
    Augmentation,
    /// Named augmentation applied in the calling module
    NamedAugmentation,
    /// Named augmentation from another module, applied in the calling module
    ExternalNamedAugmentation,
    /// Augmentation visible through an import of the calling module
    ImportedAugmentation,
    Function,
    StaticField,
    Constructor,
}

impl Strategy {
    pub const ORDER: [Strategy; 11] = [
        Strategy::Reference,
        Strategy::Method,
        Strategy::Field,
        Strategy::Property,
        Strategy::Augmentation,
        Strategy::NamedAugmentation,
        Strategy::ExternalNamedAugmentation,
        Strategy::ImportedAugmentation,
        Strategy::Function,
        Strategy::StaticField,
        Strategy::Constructor,
    ];

    fn resolver(self) -> &'static dyn Resolve {
        match self {
            Strategy::Reference => &reference::ReferenceStrategy,
            Strategy::Method => &method::MethodStrategy,
            Strategy::Field => &method::FieldStrategy,
            Strategy::Property => &property::PropertyStrategy,
            Strategy::Augmentation => &augment::AugmentationStrategy(augment::Source::Local),
            Strategy::NamedAugmentation => &augment::AugmentationStrategy(augment::Source::Named),
            Strategy::ExternalNamedAugmentation => &augment::AugmentationStrategy(augment::Source::ExternalNamed),
            Strategy::ImportedAugmentation => &augment::AugmentationStrategy(augment::Source::Imported),
            Strategy::Function => &function::FunctionStrategy,
            Strategy::StaticField => &function::StaticFieldStrategy,
            Strategy::Constructor => &function::ConstructorStrategy,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Reference => "reference",
            Strategy::Method => "method",
            Strategy::Field => "field",
            Strategy::Property => "property",
            Strategy::Augmentation => "augmentation",
            Strategy::NamedAugmentation => "named augmentation",
            Strategy::ExternalNamedAugmentation => "external named augmentation",
            Strategy::ImportedAugmentation => "imported augmentation",
            Strategy::Function => "function",
            Strategy::StaticField => "static field",
            Strategy::Constructor => "constructor",
        };
        f.write_str(s)
    }
}

/// One call being resolved
pub(crate) struct Request<'a> {
    pub registry: &'a Registry,
    pub descriptor: &'a InvocationDescriptor,
    pub args: &'a [Value],
}

impl Request<'_> {
    pub fn is_method(&self) -> bool {
        matches!(self.descriptor.kind, CallKind::Method { .. })
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.args.first()
    }

    pub fn receiver_type(&self) -> Option<Arc<TypeInfo>> {
        self.registry.type_of(self.receiver()?)
    }

    pub fn caller(&self) -> Option<Arc<RuntimeModule>> {
        self.registry.module(&self.descriptor.caller_module)
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Adapter for a callable whose first `leading` parameters are not named
    /// at the call
    pub fn adapter(&self, callable: &Callable, leading: usize) -> RuntimeResult<Adapter> {
        Adapter::new(
            callable,
            leading,
            self.args.len(),
            &self.descriptor.argument_names,
            &self.descriptor.caller_module,
        )
    }

    /// Pick one callable among same-named candidates
    ///
    /// A single applicable candidate wins. Among several, the first variadic
    /// one is preferred, then the first in declaration order. With named
    /// arguments only the arity is checked.
    pub fn select<'c>(&self, candidates: impl IntoIterator<Item = &'c Arc<Callable>>) -> Option<Selected> {
        let mut considered = 0;
        let mut applicable = Vec::new();
        for candidate in candidates {
            considered += 1;
            let fits = if self.descriptor.argument_names.is_empty() {
                candidate.applicable(self.registry, self.args)
            } else {
                candidate.accepts(self.args.len())
            };
            if fits {
                applicable.push(candidate);
            }
        }
        let chosen = match applicable.len() {
            0 => return None,
            1 => applicable[0],
            _ => applicable
                .iter()
                .copied()
                .find(|c| c.varargs)
                .unwrap_or(applicable[0]),
        };
        Some(Selected {
            callable: Arc::clone(chosen),
            overloaded: considered > 1,
        })
    }
}

pub(crate) struct Selected {
    pub callable: Arc<Callable>,
    /// Other same-named candidates exist, so the choice depends on argument
    /// types
    pub overloaded: bool,
}

/// What a linked call site runs
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Invoke { callable: Arc<Callable>, adapter: Adapter },
    /// Setter whose result is replaced by the receiver
    Fluent { callable: Arc<Callable>, adapter: Adapter },
    /// Call the function value passed as first argument
    Reference { adapter: Adapter },
    ReadField(String),
    /// Write the field and return the receiver
    WriteField(String),
    Static(Value),
    /// Default constructor assigning declared fields in order
    Instantiate(Arc<TypeInfo>),
}

impl Target {
    pub fn invoke(&self, args: &[Value]) -> RuntimeResult<Value> {
        match self {
            Target::Invoke { callable, adapter } => callable.call(&adapter.apply(args)),
            Target::Fluent { callable, adapter } => {
                callable.call(&adapter.apply(args))?;
                Ok(args[0].clone())
            }
            Target::Reference { adapter } => match args.first() {
                Some(Value::Function(function)) => {
                    let mut full = function.bound.clone();
                    full.extend_from_slice(&args[1..]);
                    function.callable.call(&adapter.apply(&full))
                }
                Some(other) => Err(RuntimeError::NotCallable {
                    type_name: other.type_name().to_string(),
                }),
                None => Err(RuntimeError::NotCallable {
                    type_name: "nothing".to_string(),
                }),
            },
            Target::ReadField(name) => object_of(args)?
                .get(name)
                .ok_or_else(|| RuntimeError::failure(format!("no field {}", name))),
            Target::WriteField(name) => {
                object_of(args)?.set(name, args[1].clone());
                Ok(args[0].clone())
            }
            Target::Static(value) => Ok(value.clone()),
            Target::Instantiate(ty) => {
                let values = ty.fields.iter().map(|f| f.name.clone()).zip(args.iter().cloned());
                Ok(Value::Object(Arc::new(Object::with_fields(Arc::clone(ty), values))))
            }
        }
    }

    /// The callable behind the target, when there is one
    pub fn callable(&self) -> Option<&Arc<Callable>> {
        match self {
            Target::Invoke { callable, .. } | Target::Fluent { callable, .. } => Some(callable),
            _ => None,
        }
    }
}

fn object_of(args: &[Value]) -> RuntimeResult<&Arc<Object>> {
    args.first()
        .and_then(Value::as_object)
        .ok_or_else(|| RuntimeError::failure("field access on a non-object"))
}

/// Condition under which a cached target stays valid
#[derive(Debug, Clone)]
pub(crate) enum Guard {
    /// Only registry changes invalidate
    Always,
    /// The receiver has exactly this concrete type
    ReceiverType(Arc<TypeInfo>),
    /// The called function value wraps exactly this callable with this many
    /// bound values
    SameCallable { callable: Arc<Callable>, bound: usize },
}

impl Guard {
    pub fn holds(&self, registry: &Registry, args: &[Value]) -> bool {
        match self {
            Guard::Always => true,
            Guard::ReceiverType(expected) => match args.first() {
                Some(Value::Object(object)) => Arc::ptr_eq(&object.class, expected),
                Some(other) => registry
                    .type_of(other)
                    .map(|ty| Arc::ptr_eq(&ty, expected))
                    .unwrap_or(false),
                None => false,
            },
            Guard::SameCallable { callable, bound } => matches!(
                args.first(),
                Some(Value::Function(f)) if Arc::ptr_eq(&f.callable, callable) && f.bound.len() == *bound
            ),
        }
    }
}

/// Result of resolving one call
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub strategy: Strategy,
    pub target: Target,
    pub guard: Guard,
    /// Re-check applicability on every cache hit
    pub overloaded: bool,
}

impl Resolution {
    /// Whether the cached target can serve `args`
    pub fn serves(&self, registry: &Registry, args: &[Value]) -> bool {
        if !self.guard.holds(registry, args) {
            return false;
        }
        match self.target.callable() {
            Some(callable) if self.overloaded => callable.applicable(registry, args),
            _ => true,
        }
    }
}

/// Answer from one strategy
pub(crate) struct Found {
    pub target: Target,
    pub overloaded: bool,
}

impl Found {
    pub fn exact(target: Target) -> Self {
        Self {
            target,
            overloaded: false,
        }
    }
}

pub(crate) trait Resolve: Send + Sync {
    fn resolve(&self, request: &Request<'_>) -> RuntimeResult<Option<Found>>;
}

/// Try every strategy in order
pub(crate) fn resolve(request: &Request<'_>) -> RuntimeResult<Resolution> {
    for strategy in Strategy::ORDER {
        let Some(found) = strategy.resolver().resolve(request)? else {
            continue;
        };
        let guard = match strategy {
            Strategy::Reference => match request.args.first() {
                Some(Value::Function(function)) => Guard::SameCallable {
                    callable: Arc::clone(&function.callable),
                    bound: function.bound.len(),
                },
                _ => Guard::Always,
            },
            Strategy::Function | Strategy::StaticField | Strategy::Constructor => Guard::Always,
            _ => match request.receiver_type() {
                Some(ty) => Guard::ReceiverType(ty),
                None => Guard::Always,
            },
        };
        log::debug!(
            "{}: resolved '{}'/{} by {}",
            request.descriptor.caller_module,
            request.name(),
            request.args.len(),
            strategy
        );
        return Ok(Resolution {
            strategy,
            target: found.target,
            guard,
            overloaded: found.overloaded,
        });
    }
    Err(RuntimeError::NoSuchCallable {
        name: request.descriptor.name.clone(),
        arity: request.args.len(),
    })
}

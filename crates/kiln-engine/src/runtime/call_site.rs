//! Call sites with inline caches
//!
//! A call site moves between three states:
//!
//! - **unlinked**: nothing cached, the next call resolves
//! - **monomorphic**: one target cached behind a guard; a call the guard
//!   rejects resolves again and replaces the link
//! - **constant**: the site was flagged constant and its first result
//!   replaced the link for good
//!
//! The link is swapped as a whole under a write lock, so a concurrent call
//! sees either the old guard and target or the new ones. Resolution itself
//! runs without the lock; two threads missing at once both resolve and the
//! last swap wins.

use super::registry::Registry;
use super::strategy::{self, Request, Resolution, Strategy};
use super::value::Value;
use super::{RuntimeError, RuntimeResult};
use crate::compiler::ir::{FunctionInvocation, MethodInvocation};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `f(args)`
    Function,
    /// `receiver: m(args)`, or `receiver?: m(args)` when null-safe
    Method { null_safe: bool },
    /// Call through a local or module-state reference holding a function;
    /// the function value is the first argument
    Reference,
}

/// Static shape of a call, as emitted for each call expression
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationDescriptor {
    pub caller_module: String,
    pub name: String,
    pub kind: CallKind,
    /// Argument count including the receiver or function value
    pub arity: usize,
    /// Names of the arguments after the receiver, when passed by name
    pub argument_names: Vec<String>,
    /// All arguments were literals
    pub constant: bool,
}

impl InvocationDescriptor {
    fn new(caller_module: &str, name: &str, kind: CallKind, arity: usize) -> Self {
        Self {
            caller_module: caller_module.to_string(),
            name: name.to_string(),
            kind,
            arity,
            argument_names: Vec::new(),
            constant: false,
        }
    }

    pub fn function(caller_module: &str, name: &str, arity: usize) -> Self {
        Self::new(caller_module, name, CallKind::Function, arity)
    }

    pub fn method(caller_module: &str, name: &str, arity: usize) -> Self {
        Self::new(caller_module, name, CallKind::Method { null_safe: false }, arity)
    }

    pub fn null_safe_method(caller_module: &str, name: &str, arity: usize) -> Self {
        Self::new(caller_module, name, CallKind::Method { null_safe: true }, arity)
    }

    pub fn reference(caller_module: &str, name: &str, arity: usize) -> Self {
        Self::new(caller_module, name, CallKind::Reference, arity)
    }

    pub fn with_argument_names(mut self, names: &[&str]) -> Self {
        self.argument_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn mark_constant(mut self) -> Self {
        self.constant = true;
        self
    }

    /// Descriptor for a resolved function invocation
    ///
    /// Invocations through references pass the function value first.
    pub fn from_function_invocation(caller_module: &str, invocation: &FunctionInvocation) -> Self {
        let through_reference = invocation.on_reference || invocation.on_module_state;
        let (kind, arity) = if through_reference {
            (CallKind::Reference, invocation.arguments.len() + 1)
        } else {
            (CallKind::Function, invocation.arguments.len())
        };
        let mut descriptor = Self::new(caller_module, &invocation.name, kind, arity);
        descriptor.argument_names = invocation.argument_names();
        descriptor.constant = invocation.constant;
        descriptor
    }

    pub fn from_method_invocation(caller_module: &str, invocation: &MethodInvocation) -> Self {
        let kind = CallKind::Method {
            null_safe: invocation.null_safe,
        };
        let mut descriptor = Self::new(caller_module, &invocation.name, kind, invocation.arguments.len() + 1);
        descriptor.argument_names = invocation.argument_names();
        descriptor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSiteState {
    Unlinked,
    Monomorphic,
    Constant,
}

/// Counters of one call site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSiteStats {
    pub hits: u64,
    pub misses: u64,
    /// Links replaced by a later resolution
    pub relinks: u64,
}

enum Link {
    Unlinked,
    Monomorphic {
        resolution: Resolution,
        /// Registry epoch the resolution was computed against
        epoch: u64,
    },
    Constant(Value),
}

pub struct CallSite {
    registry: Arc<Registry>,
    descriptor: InvocationDescriptor,
    link: RwLock<Arc<Link>>,
    hits: AtomicU64,
    misses: AtomicU64,
    relinks: AtomicU64,
}

impl CallSite {
    pub fn new(registry: Arc<Registry>, descriptor: InvocationDescriptor) -> Self {
        Self {
            registry,
            descriptor,
            link: RwLock::new(Arc::new(Link::Unlinked)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            relinks: AtomicU64::new(0),
        }
    }

    pub fn descriptor(&self) -> &InvocationDescriptor {
        &self.descriptor
    }

    pub fn invoke(&self, args: &[Value]) -> RuntimeResult<Value> {
        if args.len() != self.descriptor.arity {
            return Err(RuntimeError::ArityMismatch {
                target: self.descriptor.name.clone(),
                expected: self.descriptor.arity,
                actual: args.len(),
            });
        }
        if let CallKind::Method { null_safe } = self.descriptor.kind {
            if args[0].is_null() {
                return if null_safe {
                    Ok(Value::Null)
                } else {
                    Err(RuntimeError::NullReceiver {
                        name: self.descriptor.name.clone(),
                    })
                };
            }
        }

        let link = Arc::clone(&*self.link.read());
        match &*link {
            Link::Constant(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value.clone());
            }
            Link::Monomorphic { resolution, epoch }
                if *epoch == self.registry.epoch() && resolution.serves(&self.registry, args) =>
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return resolution.target.invoke(args);
            }
            _ => {}
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.resolve_and_invoke(args)
    }

    fn resolve_and_invoke(&self, args: &[Value]) -> RuntimeResult<Value> {
        let epoch = self.registry.epoch();
        let resolution = strategy::resolve(&Request {
            registry: &self.registry,
            descriptor: &self.descriptor,
            args,
        })?;

        if self.descriptor.constant {
            let value = resolution.target.invoke(args)?;
            log::debug!(
                "{}: constant call site '{}' folded to {}",
                self.descriptor.caller_module,
                self.descriptor.name,
                value
            );
            self.install(Link::Constant(value.clone()));
            return Ok(value);
        }

        let target = resolution.target.clone();
        self.install(Link::Monomorphic { resolution, epoch });
        target.invoke(args)
    }

    fn install(&self, link: Link) {
        let mut slot = self.link.write();
        match &**slot {
            Link::Constant(_) => return,
            Link::Monomorphic { .. } => {
                self.relinks.fetch_add(1, Ordering::Relaxed);
            }
            Link::Unlinked => {}
        }
        *slot = Arc::new(link);
    }

    /// Drop a monomorphic link; constant sites keep their value
    pub fn invalidate(&self) {
        let mut slot = self.link.write();
        if matches!(&**slot, Link::Monomorphic { .. }) {
            log::debug!("call site '{}' invalidated", self.descriptor.name);
            *slot = Arc::new(Link::Unlinked);
        }
    }

    pub fn state(&self) -> CallSiteState {
        match &**self.link.read() {
            Link::Unlinked => CallSiteState::Unlinked,
            Link::Monomorphic { .. } => CallSiteState::Monomorphic,
            Link::Constant(_) => CallSiteState::Constant,
        }
    }

    /// Strategy that produced the current link
    pub fn linked_strategy(&self) -> Option<Strategy> {
        match &**self.link.read() {
            Link::Monomorphic { resolution, .. } => Some(resolution.strategy),
            _ => None,
        }
    }

    pub fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            relinks: self.relinks.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish()
    }
}

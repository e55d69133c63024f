//! Macro lookup
//!
//! The expander finds compile-time procedures through [`MacroLookup`].
//! [`MacroRegistry`] is the in-process implementation; hosts that load macros
//! from elsewhere implement the trait themselves.

use super::{MacroContext, MacroFailure, MacroOutput};
use crate::compiler::ir::Node;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Compile-time procedure invoked with the already expanded argument IR
pub type MacroProcedure =
    dyn Fn(&mut MacroContext<'_>, Vec<Node>) -> Result<MacroOutput, MacroFailure> + Send + Sync;

/// A compile-time macro
#[derive(Clone)]
pub struct MacroDef {
    pub name: String,
    /// Fixed arity, or minimum arity when `varargs` is set
    pub arity: usize,
    pub varargs: bool,
    procedure: Arc<MacroProcedure>,
}

impl MacroDef {
    pub fn new<F>(name: impl Into<String>, arity: usize, procedure: F) -> Self
    where
        F: Fn(&mut MacroContext<'_>, Vec<Node>) -> Result<MacroOutput, MacroFailure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            varargs: false,
            procedure: Arc::new(procedure),
        }
    }

    /// Macro taking at least `min_arity` arguments
    pub fn variadic<F>(name: impl Into<String>, min_arity: usize, procedure: F) -> Self
    where
        F: Fn(&mut MacroContext<'_>, Vec<Node>) -> Result<MacroOutput, MacroFailure> + Send + Sync + 'static,
    {
        Self {
            varargs: true,
            ..Self::new(name, min_arity, procedure)
        }
    }

    pub fn accepts(&self, arity: usize) -> bool {
        if self.varargs {
            arity >= self.arity
        } else {
            arity == self.arity
        }
    }

    pub fn invoke(&self, context: &mut MacroContext<'_>, arguments: Vec<Node>) -> Result<MacroOutput, MacroFailure> {
        (self.procedure)(context, arguments)
    }
}

impl fmt::Debug for MacroDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("varargs", &self.varargs)
            .finish_non_exhaustive()
    }
}

/// Source of macros for the expander
///
/// Shared across modules compiled in parallel, so implementations must be
/// thread-safe.
pub trait MacroLookup: Send + Sync {
    /// Find a macro by fully qualified name that accepts `arity` arguments
    fn find(&self, qualified_name: &str, arity: usize) -> Option<Arc<MacroDef>>;
}

/// In-process macro table keyed by qualified name
#[derive(Debug, Default)]
pub struct MacroRegistry {
    macros: FxHashMap<String, Vec<Arc<MacroDef>>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro under a qualified name; overloads by arity are kept
    pub fn register(&mut self, qualified_name: impl Into<String>, def: MacroDef) -> &mut Self {
        self.macros
            .entry(qualified_name.into())
            .or_default()
            .push(Arc::new(def));
        self
    }

    pub fn len(&self) -> usize {
        self.macros.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

impl MacroLookup for MacroRegistry {
    /// Exact fixed-arity overloads win over variadic ones
    fn find(&self, qualified_name: &str, arity: usize) -> Option<Arc<MacroDef>> {
        let overloads = self.macros.get(qualified_name)?;
        overloads
            .iter()
            .find(|m| !m.varargs && m.accepts(arity))
            .or_else(|| overloads.iter().find(|m| m.accepts(arity)))
            .cloned()
    }
}

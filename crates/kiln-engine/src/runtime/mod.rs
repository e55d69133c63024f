//! Kiln call-site runtime
//!
//! Every call in compiled code goes through a [`CallSite`]. A site starts
//! unlinked, resolves its target on the first call by trying the
//! [`strategy`] list in a fixed order, and caches the result behind a guard.
//! A guard failure re-resolves and swaps in a new link; a site flagged
//! constant is replaced by the value of its first call.
//!
//! The [`Registry`] is the reflective view of loaded modules and types that
//! strategies resolve against.

pub mod adapt;
pub mod call_site;
pub mod callable;
pub mod registry;
pub mod strategy;
pub mod value;

pub use adapt::Adapter;
pub use call_site::{CallKind, CallSite, CallSiteState, CallSiteStats, InvocationDescriptor};
pub use callable::{Callable, CallableKind, NativeBody, Param};
pub use registry::{Application, Augmentation, FieldInfo, Registry, RuntimeModule, TypeInfo};
pub use strategy::Strategy;
pub use value::{FunctionRef, Object, Value};

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Call-site failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// No strategy found a target
    #[error("no callable '{name}' accepting {arity} argument(s)")]
    NoSuchCallable { name: String, arity: usize },

    /// A named argument does not match any parameter of the target
    #[error("'{target}' has no parameter named '{argument}'")]
    UnknownArgumentName { argument: String, target: String },

    /// The same parameter named twice in one call
    #[error("'{target}' parameter '{argument}' named more than once")]
    DuplicateArgumentName { argument: String, target: String },

    /// A reference call on a value that is not a function
    #[error("value of type {type_name} is not callable")]
    NotCallable { type_name: String },

    /// A method call on null without `?:`
    #[error("method '{name}' called on null")]
    NullReceiver { name: String },

    #[error("'{target}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        target: String,
        expected: usize,
        actual: usize,
    },

    /// Failure raised by the callee itself
    #[error("{0}")]
    Failure(String),
}

impl RuntimeError {
    pub fn failure(message: impl Into<String>) -> Self {
        RuntimeError::Failure(message.into())
    }
}

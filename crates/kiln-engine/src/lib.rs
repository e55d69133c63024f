//! Kiln Language Engine
//!
//! This crate provides the Kiln compiler front end and call-site runtime:
//! - **Compiler**: IR, macro expansion, closure capture, reference resolution
//!   and optimization (`compiler` module)
//! - **Runtime**: Values, reflective registry, and self-linking call sites
//!   (`runtime` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_engine::{Compiler, FunctionBuilder, Module, Node};
//!
//! let mut module = Module::new("demo");
//! let mut main = FunctionBuilder::new(&mut module.tables, "main");
//! main.let_("a", Node::constant(21));
//! main.push(Node::ret(Node::lookup("a")));
//! module.add_function(main.build()?);
//!
//! let report = Compiler::default().compile(&mut module)?;
//! println!("{}", report.optimization);
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Compiler module: IR, compile-time passes, problems, and pipeline driver
pub mod compiler;

/// Runtime module: Values, callables, registry, and call sites
pub mod runtime;

// ============================================================================
// Re-exports from Compiler
// ============================================================================

pub use compiler::ir::{Block, BlockBuilder, Function, FunctionBuilder, Module, Node, PrettyPrint, Visitor};
pub use compiler::{
    CompileError, CompileReport, CompileResult, Compiler, CompilerOptions, MacroDef, MacroRegistry, OptLevel,
    Problem, ProblemKind, Problems,
};

// ============================================================================
// Re-exports from Runtime
// ============================================================================

pub use runtime::{
    CallSite, CallSiteState, Callable, InvocationDescriptor, Registry, RuntimeError, RuntimeModule, RuntimeResult,
    Strategy, TypeInfo, Value,
};

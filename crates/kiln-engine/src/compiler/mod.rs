//! Kiln compiler
//!
//! Compile-time passes over the tree-shaped IR of one module:
//!
//! 1. macro expansion ([`expand`])
//! 2. closure capture analysis and hoisting ([`capture`])
//! 3. reference resolution and verification ([`resolve`])
//! 4. optimization to a fixed point ([`optimize`])
//!
//! [`Compiler`] drives them in that order and turns accumulated
//! [`Problems`] into a [`CompileError`] at each phase boundary.

pub mod capture;
pub mod diagnostic;
pub mod error;
pub mod expand;
pub mod ir;
pub mod optimize;
pub mod options;
pub mod pipeline;
pub mod problems;
pub mod resolve;

pub use capture::{CaptureAnalyzer, ClosureCaptures};
pub use diagnostic::{emit_problems, Diagnostic, ErrorCode};
pub use error::{CompileError, CompileResult, Phase};
pub use expand::{MacroContext, MacroDef, MacroExpander, MacroFailure, MacroLookup, MacroOutput, MacroRegistry};
pub use ir::{IrError, Module};
pub use optimize::{OptStats, Optimizer};
pub use options::{CompilerOptions, OptLevel, OptionsError};
pub use pipeline::{CompileReport, Compiler};
pub use problems::{Problem, ProblemKind, Problems};
pub use resolve::ReferenceResolver;

//! Compilation errors

use crate::compiler::expand::MacroFailure;
use crate::compiler::ir::{IrError, Span};
use crate::compiler::problems::Problem;
use std::fmt;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Pipeline phase at which problems are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Build,
    Expansion,
    Resolution,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parse => "parse",
            Phase::Build => "IR build",
            Phase::Expansion => "macro expansion",
            Phase::Resolution => "reference resolution",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// Problems accumulated up to a phase boundary
    #[error("{module}: {} problem(s) after {phase}", problems.len())]
    Problems {
        module: String,
        phase: Phase,
        problems: Vec<Problem>,
    },

    /// A macro procedure raised; the compile-time program is broken
    #[error("macro '{name}' failed")]
    MacroFailure {
        name: String,
        #[source]
        source: MacroFailure,
    },

    /// No macro matched the name in any searched namespace
    #[error("macro '{name}' with {arity} argument(s) not found{}", position.map(|p| format!(" at {}", p)).unwrap_or_default())]
    MacroNotFound {
        name: String,
        arity: usize,
        position: Option<Span>,
    },

    /// Recursive expansion did not reach a fixed point
    #[error("expansion of macro '{name}' exceeded depth {depth}")]
    ExpansionTooDeep { name: String, depth: usize },

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl CompileError {
    /// Accumulated problems, if this is a phase-boundary failure
    pub fn problems(&self) -> &[Problem] {
        match self {
            CompileError::Problems { problems, .. } => problems,
            _ => &[],
        }
    }
}

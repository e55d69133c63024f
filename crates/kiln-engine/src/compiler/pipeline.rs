//! Compilation pipeline driver
//!
//! Runs the passes over one module in order: macro expansion, closure
//! capture analysis, reference resolution, optimization. Problems reported
//! by earlier stages (parse, IR build) and by the resolver accumulate in one
//! [`Problems`] list and abort the pipeline at the next phase boundary.

use crate::compiler::capture::CaptureAnalyzer;
use crate::compiler::error::{CompileError, CompileResult, Phase};
use crate::compiler::expand::{MacroExpander, MacroLookup, MacroRegistry};
use crate::compiler::ir::Module;
use crate::compiler::optimize::{OptStats, Optimizer};
use crate::compiler::options::{CompilerOptions, OptLevel};
use crate::compiler::problems::{ProblemKind, Problems};
use crate::compiler::resolve::ReferenceResolver;
use std::sync::Arc;

/// Summary of one successful compilation
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    /// Names of the functions created from closure literals
    pub hoisted_closures: Vec<String>,
    pub optimization: OptStats,
}

/// Compiler driver
///
/// Holds no per-module state, so one instance can compile several modules
/// from different threads.
pub struct Compiler {
    options: CompilerOptions,
    macros: Arc<dyn MacroLookup>,
}

impl Compiler {
    pub fn new(options: CompilerOptions, macros: Arc<dyn MacroLookup>) -> Self {
        Self { options, macros }
    }

    /// Compiler with default options and no macros
    pub fn with_defaults() -> Self {
        Self::new(CompilerOptions::default(), Arc::new(MacroRegistry::new()))
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile a freshly built module
    pub fn compile(&self, module: &mut Module) -> CompileResult<CompileReport> {
        self.compile_with_problems(module, Problems::new())
    }

    /// Compile a module, starting from problems reported while parsing and
    /// building it
    pub fn compile_with_problems(&self, module: &mut Module, mut problems: Problems) -> CompileResult<CompileReport> {
        let is_parse_problem = |kind: ProblemKind| {
            matches!(kind, ProblemKind::ParseError | ProblemKind::InvalidEncoding)
        };
        if problems.iter().any(|p| is_parse_problem(p.kind)) {
            return Err(Self::fail(module, Phase::Parse, &mut problems));
        }
        Self::check(module, Phase::Build, &mut problems)?;

        module.add_default_imports(&self.options.default_imports);
        module.link_tree();

        MacroExpander::new(Arc::clone(&self.macros), &self.options).expand_module(module)?;
        Self::check(module, Phase::Expansion, &mut problems)?;

        let hoisted_closures = CaptureAnalyzer::new().analyze_module(module)?;

        ReferenceResolver::new(&mut problems, &self.options).resolve_module(module)?;
        Self::check(module, Phase::Resolution, &mut problems)?;

        let optimization = match self.options.opt_level {
            OptLevel::None => OptStats::default(),
            OptLevel::Basic => Optimizer::new(&self.options).optimize_module(module)?,
        };
        module.link_tree();

        log::debug!(
            "compiled {}: {} function(s), {} hoisted closure(s)",
            module.name,
            module.all_functions().len(),
            hoisted_closures.len()
        );
        Ok(CompileReport {
            hoisted_closures,
            optimization,
        })
    }

    fn check(module: &Module, phase: Phase, problems: &mut Problems) -> CompileResult<()> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Self::fail(module, phase, problems))
        }
    }

    fn fail(module: &Module, phase: Phase, problems: &mut Problems) -> CompileError {
        log::debug!("{} problem(s) in {} after {}", problems.len(), module.name, phase);
        CompileError::Problems {
            module: module.name.clone(),
            phase,
            problems: problems.drain(),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::with_defaults()
    }
}

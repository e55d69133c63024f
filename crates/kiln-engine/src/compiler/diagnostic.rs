//! Diagnostic rendering for compile-time problems
//!
//! Wraps `codespan-reporting` so a problem list can be shown against the
//! source text it came from.

use crate::compiler::error::CompileError;
use crate::compiler::ir::Span;
use crate::compiler::problems::{Problem, ProblemKind};
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use std::path::PathBuf;
use termcolor::{ColorChoice, StandardStream, WriteColor};

/// Error code for a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// A diagnostic message with source code context
pub struct Diagnostic {
    inner: CsDiagnostic<usize>,
    code: Option<ErrorCode>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            inner: CsDiagnostic::new(severity).with_message(message),
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.inner = self.inner.with_code(code.0);
        self.code = Some(code);
        self
    }

    /// Add the main label
    pub fn with_primary_label(mut self, file_id: usize, span: Span, message: impl Into<String>) -> Self {
        let label = Label::primary(file_id, span.start..span.end).with_message(message);
        self.inner.labels.push(label);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.notes.push(format!("help: {}", help.into()));
        self
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        self.code.as_ref()
    }

    /// Underlying codespan diagnostic
    pub fn inner(&self) -> &CsDiagnostic<usize> {
        &self.inner
    }

    /// Build a diagnostic for one problem
    pub fn from_problem(problem: &Problem, file_id: usize) -> Self {
        let mut diag = Diagnostic::error(problem.kind.title())
            .with_code(ErrorCode(problem.kind.code()));
        match problem.position {
            Some(span) if !span.is_empty() => {
                diag = diag.with_primary_label(file_id, span, problem.message.clone());
            }
            Some(span) => {
                diag = diag.with_note(format!("at {}: {}", span, problem.message));
            }
            None => {
                diag = diag.with_note(problem.message.clone());
            }
        }
        if let Some(help) = help_for(problem.kind) {
            diag = diag.with_help(help);
        }
        diag
    }

    /// Emit to stderr with colors
    pub fn emit(&self, files: &SimpleFiles<String, String>) -> Result<(), codespan_reporting::files::Error> {
        let mut writer = StandardStream::stderr(ColorChoice::Auto);
        self.emit_to(&mut writer, files)
    }

    pub fn emit_to(
        &self,
        writer: &mut dyn WriteColor,
        files: &SimpleFiles<String, String>,
    ) -> Result<(), codespan_reporting::files::Error> {
        let config = term::Config::default();
        term::emit(writer, &config, files, &self.inner)
    }
}

fn help_for(kind: ProblemKind) -> Option<&'static str> {
    match kind {
        ProblemKind::AssignToConstant => Some("declare the reference with `var` to make it reassignable"),
        ProblemKind::UninitializedReferenceAccess => Some("move the declaration before its first use"),
        ProblemKind::IncompleteNamedArgumentsUsage => Some("name either every argument or none of them"),
        ProblemKind::AugmentFunctionNoArgs => Some("augmentation functions take the receiver as first parameter"),
        _ => None,
    }
}

/// Render every problem carried by a compile error
pub fn emit_problems(
    writer: &mut dyn WriteColor,
    files: &SimpleFiles<String, String>,
    file_id: usize,
    error: &CompileError,
) -> Result<(), codespan_reporting::files::Error> {
    match error {
        CompileError::Problems { problems, .. } => {
            for problem in problems {
                Diagnostic::from_problem(problem, file_id).emit_to(writer, files)?;
            }
        }
        other => {
            let mut diag = Diagnostic::error(other.to_string());
            if let Some(source) = std::error::Error::source(other) {
                diag = diag.with_note(format!("caused by: {}", source));
            }
            diag.emit_to(writer, files)?;
        }
    }
    Ok(())
}

/// Create a `SimpleFiles` holding one source file
pub fn create_files(path: impl Into<PathBuf>, source: impl Into<String>) -> (SimpleFiles<String, String>, usize) {
    let mut files = SimpleFiles::new();
    let id = files.add(path.into().display().to_string(), source.into());
    (files, id)
}

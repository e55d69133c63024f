//! Compile-time problems
//!
//! Passes never stop at the first mistake in the source. They report into a
//! shared [`Problems`] builder and the pipeline driver turns a non-empty list
//! into a single [`CompileError::Problems`](super::CompileError::Problems) at
//! the next phase boundary.

use crate::compiler::ir::Span;
use std::fmt;

/// Kind of compile-time problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    ParseError,
    AmbiguousDeclaration,
    AugmentFunctionNoArgs,
    UndeclaredReference,
    AssignToConstant,
    BreakOrContinueOutsideLoop,
    ReferenceAlreadyDeclaredInBlock,
    UninitializedReferenceAccess,
    InvalidEncoding,
    IncompleteNamedArgumentsUsage,
}

impl ProblemKind {
    /// Stable diagnostic code
    pub fn code(self) -> &'static str {
        match self {
            ProblemKind::ParseError => "K0001",
            ProblemKind::AmbiguousDeclaration => "K0002",
            ProblemKind::AugmentFunctionNoArgs => "K0003",
            ProblemKind::UndeclaredReference => "K0004",
            ProblemKind::AssignToConstant => "K0005",
            ProblemKind::BreakOrContinueOutsideLoop => "K0006",
            ProblemKind::ReferenceAlreadyDeclaredInBlock => "K0007",
            ProblemKind::UninitializedReferenceAccess => "K0008",
            ProblemKind::InvalidEncoding => "K0009",
            ProblemKind::IncompleteNamedArgumentsUsage => "K0010",
        }
    }

    /// Short description used as the diagnostic title
    pub fn title(self) -> &'static str {
        match self {
            ProblemKind::ParseError => "parse error",
            ProblemKind::AmbiguousDeclaration => "ambiguous declaration",
            ProblemKind::AugmentFunctionNoArgs => "augmentation function without arguments",
            ProblemKind::UndeclaredReference => "undeclared reference",
            ProblemKind::AssignToConstant => "assignment to a constant",
            ProblemKind::BreakOrContinueOutsideLoop => "break or continue outside of a loop",
            ProblemKind::ReferenceAlreadyDeclaredInBlock => "reference already declared in block",
            ProblemKind::UninitializedReferenceAccess => "uninitialized reference access",
            ProblemKind::InvalidEncoding => "invalid source encoding",
            ProblemKind::IncompleteNamedArgumentsUsage => "incomplete named arguments usage",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub position: Option<Span>,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(position) => write!(f, "[{}] {} at {}: {}", self.kind.code(), self.kind, position, self.message),
            None => write!(f, "[{}] {}: {}", self.kind.code(), self.kind, self.message),
        }
    }
}

/// Ordered problem accumulator shared by the passes of one compilation
#[derive(Debug, Clone, Default)]
pub struct Problems {
    problems: Vec<Problem>,
}

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem
    pub fn report(&mut self, kind: ProblemKind, position: Option<Span>, message: impl Into<String>) {
        let problem = Problem {
            kind,
            position,
            message: message.into(),
        };
        log::trace!("problem reported: {}", problem);
        self.problems.push(problem);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    /// Problems of one kind
    pub fn of_kind(&self, kind: ProblemKind) -> Vec<&Problem> {
        self.problems.iter().filter(|p| p.kind == kind).collect()
    }

    /// Take every problem, leaving the builder empty
    pub fn drain(&mut self) -> Vec<Problem> {
        std::mem::take(&mut self.problems)
    }
}

impl IntoIterator for Problems {
    type Item = Problem;
    type IntoIter = std::vec::IntoIter<Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problems_keep_report_order() {
        let mut problems = Problems::new();
        problems.report(ProblemKind::UndeclaredReference, Some(Span::at(3, 4)), "x");
        problems.report(ProblemKind::AssignToConstant, None, "y");
        let kinds: Vec<_> = problems.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![ProblemKind::UndeclaredReference, ProblemKind::AssignToConstant]
        );
        assert_eq!(problems.of_kind(ProblemKind::AssignToConstant).len(), 1);
    }

    #[test]
    fn test_codes_are_distinct() {
        let kinds = [
            ProblemKind::ParseError,
            ProblemKind::AmbiguousDeclaration,
            ProblemKind::AugmentFunctionNoArgs,
            ProblemKind::UndeclaredReference,
            ProblemKind::AssignToConstant,
            ProblemKind::BreakOrContinueOutsideLoop,
            ProblemKind::ReferenceAlreadyDeclaredInBlock,
            ProblemKind::UninitializedReferenceAccess,
            ProblemKind::InvalidEncoding,
            ProblemKind::IncompleteNamedArgumentsUsage,
        ];
        let mut codes: Vec<_> = kinds.iter().map(|k| k.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_display_includes_position() {
        let mut problems = Problems::new();
        problems.report(ProblemKind::UninitializedReferenceAccess, Some(Span::at(2, 9)), "x is read before assignment");
        let text = problems.iter().next().unwrap().to_string();
        assert_eq!(text, "[K0008] uninitialized reference access at 2:9: x is read before assignment");
    }
}

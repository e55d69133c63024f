//! Intermediate representation
//!
//! The IR is a tree: every composite element owns its children outright and
//! children point back to their owner through [`Meta::parent`]. Passes walk
//! the tree with a [`Visitor`] and rewrite it through `replace_element`.

pub mod builder;
pub mod function;
pub mod meta;
pub mod module;
pub mod node;
pub mod pretty;
pub mod refs;
pub mod visitor;

pub use builder::{BlockBuilder, FunctionBuilder};
pub use function::{Function, FunctionScope, Visibility};
pub use meta::{Meta, NodeId, Span};
pub use module::{Import, Module, StructDecl, ToplevelElements, UnionDecl};
pub use node::{
    Assignment, BinaryOperation, Block, BreakKind, ClosureReference, ClosureTarget, Collection,
    CollectionKind, Composite, ConstValue, Conditional, Constant, FunctionInvocation, Loop,
    LoopBreak, MacroInvocation, MethodInvocation, NamedArgument, Node, Noop, Operator,
    ReferenceLookup, ResolvedRef, Return, Throw, TryCatchFinally, UnaryOperation,
};
pub use pretty::PrettyPrint;
pub use refs::{LocalReference, ReferenceKind, ReferenceTable, ReferenceTables, TableId};
pub use visitor::Visitor;

use thiserror::Error;

/// Violations of the IR's structural invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    /// `replace_element` was asked to replace something it does not own
    #[error("{child} is not a direct child of {parent}")]
    NotAChild {
        /// The element asked to perform the replacement
        parent: NodeId,
        /// The element that was expected among its children
        child: NodeId,
    },

    /// A name was declared twice in the same reference table
    #[error("reference '{0}' is already declared in this table")]
    DuplicateReference(String),

    /// A table id does not belong to the module's arena
    #[error("unknown reference table {0}")]
    UnknownTable(TableId),

    /// Relinking would make a table its own ancestor
    #[error("cannot relink {0} under {1}: tables would form a cycle")]
    CyclicTableLink(TableId, TableId),
}

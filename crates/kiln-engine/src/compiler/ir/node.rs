//! IR node types
//!
//! [`Node`] is the closed set of statement and expression kinds. Each variant
//! wraps a payload struct carrying its own [`Meta`]; composite payloads own
//! their children and expose them through [`Composite`].

use super::function::Function;
use super::meta::{Meta, NodeId, Span};
use super::refs::{ReferenceKind, TableId};
use super::visitor::{self, Visitor};
use super::IrError;
use std::fmt;

// ============================================================================
// Constants and operators
// ============================================================================

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    /// Reference to a class by qualified name
    ClassRef(String),
}

impl ConstValue {
    /// Type name used in IR dumps and diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ConstValue::Null => "null",
            ConstValue::Bool(_) => "bool",
            ConstValue::Int(_) => "int",
            ConstValue::Float(_) => "float",
            ConstValue::Str(_) => "str",
            ConstValue::Char(_) => "char",
            ConstValue::ClassRef(_) => "class",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConstValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Int(i) => write!(f, "{}", i),
            ConstValue::Float(x) => write!(f, "{:?}", x),
            ConstValue::Str(s) => write!(f, "{:?}", s),
            ConstValue::Char(c) => write!(f, "{:?}", c),
            ConstValue::ClassRef(name) => write!(f, "{}.class", name),
        }
    }
}

/// Binary and unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessOrEquals,
    More,
    MoreOrEquals,
    Is,
    Isnt,
    OfType,
    And,
    Or,
    Not,
    /// `a orIfNull b`: `b` when `a` is null
    OrIfNull,
    /// `receiver: method(...)`
    MethodCall,
    /// `receiver?: method(...)`
    ElvisMethodCall,
}

impl Operator {
    /// Source-level symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Less => "<",
            Operator::LessOrEquals => "<=",
            Operator::More => ">",
            Operator::MoreOrEquals => ">=",
            Operator::Is => "is",
            Operator::Isnt => "isnt",
            Operator::OfType => "oftype",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::OrIfNull => "orIfNull",
            Operator::MethodCall => ":",
            Operator::ElvisMethodCall => "?:",
        }
    }

    /// Operators that dispatch a call and must never be evaluated at compile time
    pub fn is_call_like(self) -> bool {
        matches!(self, Operator::MethodCall | Operator::ElvisMethodCall)
    }

    /// Operators whose right operand is evaluated only on demand
    pub fn is_short_circuit(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::OrIfNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Declaration a lookup or assignment was bound to during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRef {
    pub table: TableId,
    pub index: i32,
    pub kind: ReferenceKind,
}

// ============================================================================
// Payloads
// ============================================================================

/// Ordered statements sharing one reference table
#[derive(Debug, Clone)]
pub struct Block {
    pub meta: Meta,
    pub statements: Vec<Node>,
    pub table: TableId,
}

impl Block {
    /// Create a block and adopt its statements
    pub fn new(table: TableId, statements: Vec<Node>) -> Self {
        let mut block = Self {
            meta: Meta::new(),
            statements,
            table,
        };
        block.adopt();
        block
    }

    /// Empty block over `table`
    pub fn empty(table: TableId) -> Self {
        Self::new(table, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Append a statement
    pub fn push(&mut self, mut statement: Node) {
        statement.meta_mut().parent = Some(self.meta.id);
        self.statements.push(statement);
    }

    /// Insert a statement before all others
    pub fn prepend(&mut self, mut statement: Node) {
        statement.meta_mut().parent = Some(self.meta.id);
        self.statements.insert(0, statement);
    }

    /// Whether the last statement unconditionally leaves the block
    pub fn has_return(&self) -> bool {
        matches!(self.statements.last(), Some(Node::Return(_)) | Some(Node::Throw(_)))
    }

    /// Lift the statements of a sole nested block into this one
    ///
    /// The nested block's references move into this block's table. Returns
    /// whether anything was flattened; a name clash leaves the block as is.
    pub fn flatten(&mut self, tables: &mut super::ReferenceTables) -> Result<bool, IrError> {
        let mut flattened = false;
        while let [Node::Block(inner)] = self.statements.as_slice() {
            let inner_table = inner.table;
            if inner_table != self.table {
                let clash = tables
                    .owned(inner_table)
                    .iter()
                    .any(|r| tables.get(self.table).map(|t| t.has_own(&r.name)).unwrap_or(true));
                if clash {
                    break;
                }
                tables.merge_into(inner_table, self.table)?;
            }
            let Some(Node::Block(inner)) = self.statements.pop() else {
                break;
            };
            self.statements = inner.statements;
            self.adopt();
            flattened = true;
        }
        Ok(flattened)
    }
}

/// Literal
#[derive(Debug, Clone)]
pub struct Constant {
    pub meta: Meta,
    pub value: ConstValue,
}

/// Read of a named reference
#[derive(Debug, Clone)]
pub struct ReferenceLookup {
    pub meta: Meta,
    pub name: String,
    pub resolved: Option<ResolvedRef>,
}

/// Store into a named reference
#[derive(Debug, Clone)]
pub struct Assignment {
    pub meta: Meta,
    pub name: String,
    pub value: Box<Node>,
    /// `let x = ...` / `var x = ...` rather than `x = ...`
    pub declaring: bool,
    pub resolved: Option<ResolvedRef>,
}

#[derive(Debug, Clone)]
pub struct BinaryOperation {
    pub meta: Meta,
    pub operator: Operator,
    pub left: Box<Node>,
    pub right: Box<Node>,
}

#[derive(Debug, Clone)]
pub struct UnaryOperation {
    pub meta: Meta,
    pub operator: Operator,
    pub operand: Box<Node>,
}

/// Call of a function by name
///
/// The resolution flags are filled in by the reference resolver.
#[derive(Debug, Clone)]
pub struct FunctionInvocation {
    pub meta: Meta,
    pub name: String,
    pub arguments: Vec<Node>,
    /// Trailing `(...)` calls applied to the result, as nameless invocations
    pub anonymous_calls: Vec<Node>,
    /// The name is a local reference holding a callable
    pub on_reference: bool,
    /// The name is module state holding a callable
    pub on_module_state: bool,
    /// Every argument is a literal
    pub constant: bool,
}

impl FunctionInvocation {
    /// Whether any argument is passed by name
    pub fn uses_named_arguments(&self) -> bool {
        self.arguments.iter().any(|a| matches!(a, Node::NamedArgument(_)))
    }

    /// Argument names in call order, empty for positional calls
    pub fn argument_names(&self) -> Vec<String> {
        argument_names(&self.arguments)
    }
}

/// Call of a method on a receiver
#[derive(Debug, Clone)]
pub struct MethodInvocation {
    pub meta: Meta,
    pub receiver: Box<Node>,
    pub name: String,
    pub arguments: Vec<Node>,
    pub anonymous_calls: Vec<Node>,
    /// `?:` call that yields null on a null receiver
    pub null_safe: bool,
}

impl MethodInvocation {
    pub fn uses_named_arguments(&self) -> bool {
        self.arguments.iter().any(|a| matches!(a, Node::NamedArgument(_)))
    }

    pub fn argument_names(&self) -> Vec<String> {
        argument_names(&self.arguments)
    }
}

fn argument_names(arguments: &[Node]) -> Vec<String> {
    arguments
        .iter()
        .filter_map(|a| match a {
            Node::NamedArgument(named) => Some(named.name.clone()),
            _ => None,
        })
        .collect()
}

/// Compile-time macro call, replaced during expansion
#[derive(Debug, Clone)]
pub struct MacroInvocation {
    pub meta: Meta,
    pub name: String,
    pub arguments: Vec<Node>,
}

/// `name = expression` inside an argument list
#[derive(Debug, Clone)]
pub struct NamedArgument {
    pub meta: Meta,
    pub name: String,
    pub expression: Box<Node>,
}

/// What a closure reference points at
#[derive(Debug, Clone)]
pub enum ClosureTarget {
    /// Function literal still nested in its enclosing function
    Literal(Box<Function>),
    /// Module-level function produced by capture analysis
    Hoisted(String),
}

/// Function value, partially applied to its captured names
#[derive(Debug, Clone)]
pub struct ClosureReference {
    pub meta: Meta,
    pub target: ClosureTarget,
    /// Outer names passed as the leading synthetic parameters
    pub captured: Vec<String>,
}

impl ClosureReference {
    /// Name of the target function
    pub fn function_name(&self) -> &str {
        match &self.target {
            ClosureTarget::Literal(f) => &f.name,
            ClosureTarget::Hoisted(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    List,
    Set,
    Tuple,
    Vector,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionKind::Array => "array",
            CollectionKind::List => "list",
            CollectionKind::Set => "set",
            CollectionKind::Tuple => "tuple",
            CollectionKind::Vector => "vector",
        };
        f.write_str(s)
    }
}

/// Collection literal
#[derive(Debug, Clone)]
pub struct Collection {
    pub meta: Meta,
    pub kind: CollectionKind,
    pub elements: Vec<Node>,
}

/// `if condition { ... } else ...`
#[derive(Debug, Clone)]
pub struct Conditional {
    pub meta: Meta,
    pub condition: Box<Node>,
    pub then_branch: Box<Node>,
    /// A block, or another conditional for `else if`
    pub else_branch: Option<Box<Node>>,
}

/// `while` / `for` loop
#[derive(Debug, Clone)]
pub struct Loop {
    pub meta: Meta,
    pub init: Option<Box<Node>>,
    pub condition: Box<Node>,
    pub post: Option<Box<Node>>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct LoopBreak {
    pub meta: Meta,
    pub kind: BreakKind,
}

#[derive(Debug, Clone)]
pub struct Return {
    pub meta: Meta,
    pub value: Box<Node>,
}

#[derive(Debug, Clone)]
pub struct Throw {
    pub meta: Meta,
    pub value: Box<Node>,
}

#[derive(Debug, Clone)]
pub struct TryCatchFinally {
    pub meta: Meta,
    pub try_block: Box<Node>,
    /// Name bound in the catch block's table
    pub exception_name: Option<String>,
    pub catch_block: Option<Box<Node>>,
    pub finally_block: Option<Box<Node>>,
}

/// Placeholder left where a statement was removed
#[derive(Debug, Clone)]
pub struct Noop {
    pub meta: Meta,
    pub comment: String,
}

// ============================================================================
// Node
// ============================================================================

/// Any IR statement or expression
#[derive(Debug, Clone)]
pub enum Node {
    Block(Block),
    Constant(Constant),
    ReferenceLookup(ReferenceLookup),
    Assignment(Assignment),
    BinaryOperation(BinaryOperation),
    UnaryOperation(UnaryOperation),
    FunctionInvocation(FunctionInvocation),
    MethodInvocation(MethodInvocation),
    MacroInvocation(MacroInvocation),
    NamedArgument(NamedArgument),
    ClosureReference(ClosureReference),
    Collection(Collection),
    Conditional(Conditional),
    Loop(Loop),
    LoopBreak(LoopBreak),
    Return(Return),
    Throw(Throw),
    TryCatchFinally(TryCatchFinally),
    Noop(Noop),
}

macro_rules! with_payload {
    ($node:expr, $p:ident => $body:expr) => {
        match $node {
            Node::Block($p) => $body,
            Node::Constant($p) => $body,
            Node::ReferenceLookup($p) => $body,
            Node::Assignment($p) => $body,
            Node::BinaryOperation($p) => $body,
            Node::UnaryOperation($p) => $body,
            Node::FunctionInvocation($p) => $body,
            Node::MethodInvocation($p) => $body,
            Node::MacroInvocation($p) => $body,
            Node::NamedArgument($p) => $body,
            Node::ClosureReference($p) => $body,
            Node::Collection($p) => $body,
            Node::Conditional($p) => $body,
            Node::Loop($p) => $body,
            Node::LoopBreak($p) => $body,
            Node::Return($p) => $body,
            Node::Throw($p) => $body,
            Node::TryCatchFinally($p) => $body,
            Node::Noop($p) => $body,
        }
    };
}

impl Node {
    pub fn meta(&self) -> &Meta {
        with_payload!(self, p => &p.meta)
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        with_payload!(self, p => &mut p.meta)
    }

    /// Identity of this node
    pub fn id(&self) -> NodeId {
        self.meta().id
    }

    /// Owning node, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.meta().parent
    }

    pub fn position(&self) -> Option<Span> {
        self.meta().position
    }

    /// Set the source position, builder style
    pub fn at(mut self, position: Span) -> Self {
        self.meta_mut().position = Some(position);
        self
    }

    /// Short kind name used by dumps and log output
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Block(_) => "block",
            Node::Constant(_) => "constant",
            Node::ReferenceLookup(_) => "lookup",
            Node::Assignment(_) => "assign",
            Node::BinaryOperation(_) => "binary",
            Node::UnaryOperation(_) => "unary",
            Node::FunctionInvocation(_) => "call",
            Node::MethodInvocation(_) => "method-call",
            Node::MacroInvocation(_) => "macro-call",
            Node::NamedArgument(_) => "named-arg",
            Node::ClosureReference(_) => "closure",
            Node::Collection(_) => "collection",
            Node::Conditional(_) => "if",
            Node::Loop(_) => "loop",
            Node::LoopBreak(_) => "break",
            Node::Return(_) => "return",
            Node::Throw(_) => "throw",
            Node::TryCatchFinally(_) => "try",
            Node::Noop(_) => "noop",
        }
    }

    /// Literal value, if this is a constant
    pub fn as_constant(&self) -> Option<&ConstValue> {
        match self {
            Node::Constant(c) => Some(&c.value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Node::Constant(_))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Node::Noop(_))
    }

    /// Double-dispatch to the visitor
    pub fn accept<V: Visitor + ?Sized>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_node(self)
    }

    /// Visit the direct children of this node, not the node itself
    pub fn walk<V: Visitor + ?Sized>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        if let Node::ClosureReference(closure) = self {
            return visitor::walk_closure_reference(visitor, closure);
        }
        for child in self.children_mut() {
            child.accept(visitor)?;
        }
        Ok(())
    }

    /// Set the parent link of every node below this one
    pub fn link_tree(&mut self) {
        self.adopt();
        if let Node::ClosureReference(ClosureReference {
            target: ClosureTarget::Literal(function),
            ..
        }) = self
        {
            function.link_tree();
            return;
        }
        for child in self.children_mut() {
            child.link_tree();
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::Noop(Noop {
            meta: Meta::new(),
            comment: String::new(),
        })
    }
}

// ============================================================================
// Composite protocol
// ============================================================================

/// An element owning child nodes
pub trait Composite {
    /// Identity of the element
    fn element_id(&self) -> NodeId;

    /// Direct children in evaluation order
    fn children(&self) -> Vec<&Node>;

    /// Direct children in evaluation order, mutably
    fn children_mut(&mut self) -> Vec<&mut Node>;

    /// Direct child with the given id
    fn child_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.children_mut().into_iter().find(|c| c.id() == id)
    }

    /// Point every direct child's parent link at this element
    fn adopt(&mut self) {
        let id = self.element_id();
        for child in self.children_mut() {
            child.meta_mut().parent = Some(id);
        }
    }

    /// Swap the direct child `original` for `replacement`
    ///
    /// Returns the displaced child, detached. Fails if `original` is not a
    /// direct child of this element.
    fn replace_element(&mut self, original: NodeId, replacement: Node) -> Result<Node, IrError> {
        replace_child(self, original, replacement)
    }
}

/// Swap a direct child found through [`Composite::child_mut`]
pub(crate) fn replace_child<C: Composite + ?Sized>(
    composite: &mut C,
    original: NodeId,
    mut replacement: Node,
) -> Result<Node, IrError> {
    let parent = composite.element_id();
    let slot = composite.child_mut(original).ok_or(IrError::NotAChild {
        parent,
        child: original,
    })?;
    replacement.meta_mut().parent = Some(parent);
    let mut displaced = std::mem::replace(slot, replacement);
    displaced.meta_mut().parent = None;
    Ok(displaced)
}

fn boxed<'a>(nodes: impl IntoIterator<Item = &'a Option<Box<Node>>>) -> impl Iterator<Item = &'a Node> {
    nodes.into_iter().filter_map(|n| n.as_deref())
}

impl Composite for Node {
    fn element_id(&self) -> NodeId {
        self.id()
    }

    fn children(&self) -> Vec<&Node> {
        match self {
            Node::Block(b) => b.statements.iter().collect(),
            Node::Assignment(a) => vec![&*a.value],
            Node::BinaryOperation(b) => vec![&*b.left, &*b.right],
            Node::UnaryOperation(u) => vec![&*u.operand],
            Node::FunctionInvocation(f) => f.arguments.iter().chain(&f.anonymous_calls).collect(),
            Node::MethodInvocation(m) => std::iter::once(&*m.receiver)
                .chain(&m.arguments)
                .chain(&m.anonymous_calls)
                .collect(),
            Node::MacroInvocation(m) => m.arguments.iter().collect(),
            Node::NamedArgument(n) => vec![&*n.expression],
            Node::Collection(c) => c.elements.iter().collect(),
            Node::Conditional(c) => std::iter::once(&*c.condition)
                .chain(std::iter::once(&*c.then_branch))
                .chain(boxed([&c.else_branch]))
                .collect(),
            Node::Loop(l) => boxed([&l.init])
                .chain(std::iter::once(&*l.condition))
                .chain(std::iter::once(&*l.body))
                .chain(boxed([&l.post]))
                .collect(),
            Node::Return(r) => vec![&*r.value],
            Node::Throw(t) => vec![&*t.value],
            Node::TryCatchFinally(t) => std::iter::once(&*t.try_block)
                .chain(boxed([&t.catch_block, &t.finally_block]))
                .collect(),
            Node::Constant(_)
            | Node::ReferenceLookup(_)
            | Node::ClosureReference(_)
            | Node::LoopBreak(_)
            | Node::Noop(_) => Vec::new(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        fn opt(node: &mut Option<Box<Node>>) -> Option<&mut Node> {
            node.as_deref_mut()
        }
        match self {
            Node::Block(b) => b.statements.iter_mut().collect(),
            Node::Assignment(a) => vec![&mut *a.value],
            Node::BinaryOperation(b) => vec![&mut *b.left, &mut *b.right],
            Node::UnaryOperation(u) => vec![&mut *u.operand],
            Node::FunctionInvocation(f) => f
                .arguments
                .iter_mut()
                .chain(f.anonymous_calls.iter_mut())
                .collect(),
            Node::MethodInvocation(m) => std::iter::once(&mut *m.receiver)
                .chain(m.arguments.iter_mut())
                .chain(m.anonymous_calls.iter_mut())
                .collect(),
            Node::MacroInvocation(m) => m.arguments.iter_mut().collect(),
            Node::NamedArgument(n) => vec![&mut *n.expression],
            Node::Collection(c) => c.elements.iter_mut().collect(),
            Node::Conditional(c) => std::iter::once(&mut *c.condition)
                .chain(std::iter::once(&mut *c.then_branch))
                .chain(opt(&mut c.else_branch))
                .collect(),
            Node::Loop(l) => opt(&mut l.init)
                .into_iter()
                .chain(std::iter::once(&mut *l.condition))
                .chain(std::iter::once(&mut *l.body))
                .chain(opt(&mut l.post))
                .collect(),
            Node::Return(r) => vec![&mut *r.value],
            Node::Throw(t) => vec![&mut *t.value],
            Node::TryCatchFinally(t) => std::iter::once(&mut *t.try_block)
                .chain(opt(&mut t.catch_block))
                .chain(opt(&mut t.finally_block))
                .collect(),
            Node::Constant(_)
            | Node::ReferenceLookup(_)
            | Node::ClosureReference(_)
            | Node::LoopBreak(_)
            | Node::Noop(_) => Vec::new(),
        }
    }
}

impl Composite for Block {
    fn element_id(&self) -> NodeId {
        self.meta.id
    }

    fn children(&self) -> Vec<&Node> {
        self.statements.iter().collect()
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        self.statements.iter_mut().collect()
    }
}

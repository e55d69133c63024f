//! IR construction helpers
//!
//! Node constructors adopt their children so parent links are correct from
//! the start. [`BlockBuilder`] and [`FunctionBuilder`] also declare the
//! references they introduce in the right table. Macros use the same API to
//! synthesize IR.

use super::function::{Function, FunctionScope, Visibility};
use super::meta::Meta;
use super::node::*;
use super::refs::{LocalReference, ReferenceKind, ReferenceTables, TableId};
use super::IrError;

impl From<bool> for ConstValue {
    fn from(b: bool) -> Self {
        ConstValue::Bool(b)
    }
}

impl From<i32> for ConstValue {
    fn from(i: i32) -> Self {
        ConstValue::Int(i as i64)
    }
}

impl From<i64> for ConstValue {
    fn from(i: i64) -> Self {
        ConstValue::Int(i)
    }
}

impl From<f64> for ConstValue {
    fn from(x: f64) -> Self {
        ConstValue::Float(x)
    }
}

impl From<char> for ConstValue {
    fn from(c: char) -> Self {
        ConstValue::Char(c)
    }
}

impl From<&str> for ConstValue {
    fn from(s: &str) -> Self {
        ConstValue::Str(s.to_string())
    }
}

impl From<String> for ConstValue {
    fn from(s: String) -> Self {
        ConstValue::Str(s)
    }
}

fn adopted(mut node: Node) -> Node {
    node.adopt();
    node
}

// ============================================================================
// Node constructors
// ============================================================================

impl Node {
    pub fn constant(value: impl Into<ConstValue>) -> Node {
        Node::Constant(Constant {
            meta: Meta::new(),
            value: value.into(),
        })
    }

    pub fn null() -> Node {
        Node::constant(ConstValue::Null)
    }

    pub fn lookup(name: impl Into<String>) -> Node {
        Node::ReferenceLookup(ReferenceLookup {
            meta: Meta::new(),
            name: name.into(),
            resolved: None,
        })
    }

    fn assignment(name: impl Into<String>, value: Node, declaring: bool) -> Node {
        adopted(Node::Assignment(Assignment {
            meta: Meta::new(),
            name: name.into(),
            value: Box::new(value),
            declaring,
            resolved: None,
        }))
    }

    /// Declaring assignment of a constant; the reference itself lives in a table
    pub fn let_(name: impl Into<String>, value: Node) -> Node {
        Node::assignment(name, value, true)
    }

    /// Declaring assignment of a variable
    pub fn var(name: impl Into<String>, value: Node) -> Node {
        Node::assignment(name, value, true)
    }

    /// Plain reassignment
    pub fn assign(name: impl Into<String>, value: Node) -> Node {
        Node::assignment(name, value, false)
    }

    pub fn binary(operator: Operator, left: Node, right: Node) -> Node {
        adopted(Node::BinaryOperation(BinaryOperation {
            meta: Meta::new(),
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    pub fn unary(operator: Operator, operand: Node) -> Node {
        adopted(Node::UnaryOperation(UnaryOperation {
            meta: Meta::new(),
            operator,
            operand: Box::new(operand),
        }))
    }

    pub fn not(operand: Node) -> Node {
        Node::unary(Operator::Not, operand)
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Node>) -> Node {
        adopted(Node::FunctionInvocation(FunctionInvocation {
            meta: Meta::new(),
            name: name.into(),
            arguments,
            anonymous_calls: Vec::new(),
            on_reference: false,
            on_module_state: false,
            constant: false,
        }))
    }

    /// Call followed by chained anonymous calls: `name(a)(b)(c)`
    pub fn call_chain(name: impl Into<String>, arguments: Vec<Node>, chained: Vec<Vec<Node>>) -> Node {
        let mut node = Node::call(name, arguments);
        if let Node::FunctionInvocation(call) = &mut node {
            call.anonymous_calls = chained
                .into_iter()
                .map(|args| Node::call("", args))
                .collect();
        }
        adopted(node)
    }

    pub fn method(receiver: Node, name: impl Into<String>, arguments: Vec<Node>) -> Node {
        adopted(Node::MethodInvocation(MethodInvocation {
            meta: Meta::new(),
            receiver: Box::new(receiver),
            name: name.into(),
            arguments,
            anonymous_calls: Vec::new(),
            null_safe: false,
        }))
    }

    /// `receiver?: name(...)`
    pub fn elvis_method(receiver: Node, name: impl Into<String>, arguments: Vec<Node>) -> Node {
        let mut node = Node::method(receiver, name, arguments);
        if let Node::MethodInvocation(call) = &mut node {
            call.null_safe = true;
        }
        node
    }

    pub fn macro_call(name: impl Into<String>, arguments: Vec<Node>) -> Node {
        adopted(Node::MacroInvocation(MacroInvocation {
            meta: Meta::new(),
            name: name.into(),
            arguments,
        }))
    }

    pub fn named(name: impl Into<String>, expression: Node) -> Node {
        adopted(Node::NamedArgument(NamedArgument {
            meta: Meta::new(),
            name: name.into(),
            expression: Box::new(expression),
        }))
    }

    pub fn collection(kind: CollectionKind, elements: Vec<Node>) -> Node {
        adopted(Node::Collection(Collection {
            meta: Meta::new(),
            kind,
            elements,
        }))
    }

    pub fn conditional(condition: Node, then_branch: Node, else_branch: Option<Node>) -> Node {
        adopted(Node::Conditional(Conditional {
            meta: Meta::new(),
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }))
    }

    /// `while condition { body }`
    pub fn loop_(condition: Node, body: Node) -> Node {
        adopted(Node::Loop(Loop {
            meta: Meta::new(),
            init: None,
            condition: Box::new(condition),
            post: None,
            body: Box::new(body),
        }))
    }

    pub fn break_() -> Node {
        Node::LoopBreak(LoopBreak {
            meta: Meta::new(),
            kind: BreakKind::Break,
        })
    }

    pub fn continue_() -> Node {
        Node::LoopBreak(LoopBreak {
            meta: Meta::new(),
            kind: BreakKind::Continue,
        })
    }

    pub fn ret(value: Node) -> Node {
        adopted(Node::Return(Return {
            meta: Meta::new(),
            value: Box::new(value),
        }))
    }

    pub fn throw(value: Node) -> Node {
        adopted(Node::Throw(Throw {
            meta: Meta::new(),
            value: Box::new(value),
        }))
    }

    pub fn noop(comment: impl Into<String>) -> Node {
        Node::Noop(Noop {
            meta: Meta::new(),
            comment: comment.into(),
        })
    }

    /// Reference to an already hoisted closure
    pub fn closure_ref(function: impl Into<String>, captured: Vec<String>) -> Node {
        Node::ClosureReference(ClosureReference {
            meta: Meta::new(),
            target: ClosureTarget::Hoisted(function.into()),
            captured,
        })
    }

    /// Function literal
    pub fn closure(function: Function) -> Node {
        let mut node = Node::ClosureReference(ClosureReference {
            meta: Meta::new(),
            target: ClosureTarget::Literal(Box::new(function)),
            captured: Vec::new(),
        });
        let id = node.id();
        if let Node::ClosureReference(ClosureReference {
            target: ClosureTarget::Literal(function),
            ..
        }) = &mut node
        {
            function.meta.parent = Some(id);
        }
        node
    }
}

// ============================================================================
// Block builder
// ============================================================================

/// Builds a block and declares its references
pub struct BlockBuilder<'t> {
    tables: &'t mut ReferenceTables,
    table: TableId,
    statements: Vec<Node>,
    error: Option<IrError>,
}

impl<'t> BlockBuilder<'t> {
    /// Builder for a block nested in `parent`
    pub fn new(tables: &'t mut ReferenceTables, parent: TableId) -> Self {
        let table = tables.fork(parent);
        Self::on_table(tables, table)
    }

    /// Builder for a block over an existing table
    pub fn on_table(tables: &'t mut ReferenceTables, table: TableId) -> Self {
        Self {
            tables,
            table,
            statements: Vec::new(),
            error: None,
        }
    }

    /// Builder for a block whose table has no parent yet
    pub fn detached(tables: &'t mut ReferenceTables) -> Self {
        let table = tables.detached();
        Self::on_table(tables, table)
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn tables(&mut self) -> &mut ReferenceTables {
        &mut *self.tables
    }

    fn record(&mut self, result: Result<(), IrError>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    /// Declare a reference in this block without assigning it
    pub fn declare(&mut self, name: &str, kind: ReferenceKind) -> &mut Self {
        let result = self.tables.declare(self.table, LocalReference::new(name, kind));
        self.record(result);
        self
    }

    /// `let name = value`
    pub fn let_(&mut self, name: &str, value: Node) -> &mut Self {
        self.declare(name, ReferenceKind::Constant);
        self.push(Node::let_(name, value))
    }

    /// `var name = value`
    pub fn var(&mut self, name: &str, value: Node) -> &mut Self {
        self.declare(name, ReferenceKind::Variable);
        self.push(Node::var(name, value))
    }

    /// `name = value`
    pub fn assign(&mut self, name: &str, value: Node) -> &mut Self {
        self.push(Node::assign(name, value))
    }

    pub fn push(&mut self, statement: Node) -> &mut Self {
        self.statements.push(statement);
        self
    }

    /// Build a nested block; the caller decides where it goes
    pub fn block(&mut self, build: impl FnOnce(&mut BlockBuilder<'_>)) -> Node {
        let mut nested = BlockBuilder::new(&mut *self.tables, self.table);
        build(&mut nested);
        match nested.build() {
            Ok(block) => Node::Block(block),
            Err(e) => {
                self.record(Err(e));
                Node::noop("invalid block")
            }
        }
    }

    /// `if condition { then } else { otherwise }`
    pub fn if_else(
        &mut self,
        condition: Node,
        then: impl FnOnce(&mut BlockBuilder<'_>),
        otherwise: Option<&dyn Fn(&mut BlockBuilder<'_>)>,
    ) -> Node {
        let then_branch = self.block(then);
        let else_branch = otherwise.map(|build| self.block(build));
        Node::conditional(condition, then_branch, else_branch)
    }

    /// `while condition { body }`
    pub fn while_loop(&mut self, condition: Node, body: impl FnOnce(&mut BlockBuilder<'_>)) -> Node {
        let body = self.block(body);
        Node::loop_(condition, body)
    }

    /// `for (var name = init, condition, post) { body }`
    ///
    /// The loop variable lives in a wrapping block, which is returned.
    pub fn for_loop(
        &mut self,
        name: &str,
        init: Node,
        condition: Node,
        post: Node,
        body: impl FnOnce(&mut BlockBuilder<'_>),
    ) -> Node {
        let mut outer = BlockBuilder::new(&mut *self.tables, self.table);
        outer.declare(name, ReferenceKind::Variable);
        let body = outer.block(body);
        let lp = adopted(Node::Loop(Loop {
            meta: Meta::new(),
            init: Some(Box::new(Node::var(name, init))),
            condition: Box::new(condition),
            post: Some(Box::new(post)),
            body: Box::new(body),
        }));
        outer.push(lp);
        match outer.build() {
            Ok(block) => Node::Block(block),
            Err(e) => {
                self.record(Err(e));
                Node::noop("invalid loop")
            }
        }
    }

    /// `try { body } catch (exception) { handler }`
    pub fn try_catch(
        &mut self,
        body: impl FnOnce(&mut BlockBuilder<'_>),
        exception: &str,
        handler: impl FnOnce(&mut BlockBuilder<'_>),
    ) -> Node {
        let try_block = self.block(body);
        let catch_block = self.block(|b| {
            b.declare(exception, ReferenceKind::Constant);
            handler(b);
        });
        adopted(Node::TryCatchFinally(TryCatchFinally {
            meta: Meta::new(),
            try_block: Box::new(try_block),
            exception_name: Some(exception.to_string()),
            catch_block: Some(Box::new(catch_block)),
            finally_block: None,
        }))
    }

    /// Function literal whose body table nests in this block
    pub fn closure(&mut self, parameters: &[&str], build: impl FnOnce(&mut FunctionBuilder<'_>)) -> Node {
        let mut builder = FunctionBuilder::nested(&mut *self.tables, self.table, "<closure>");
        builder.scope(FunctionScope::Closure).params(parameters);
        build(&mut builder);
        match builder.build() {
            Ok(function) => Node::closure(function),
            Err(e) => {
                self.record(Err(e));
                Node::noop("invalid closure")
            }
        }
    }

    /// Finish the block, reporting the first declaration error
    pub fn build(self) -> Result<Block, IrError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Block::new(self.table, self.statements))
    }
}

// ============================================================================
// Function builder
// ============================================================================

/// Builds a function; parameters are declared in the body table
pub struct FunctionBuilder<'t> {
    body: BlockBuilder<'t>,
    name: String,
    parameters: Vec<String>,
    varargs: bool,
    visibility: Visibility,
    scope: FunctionScope,
    decorators: Vec<Node>,
}

impl<'t> FunctionBuilder<'t> {
    /// Module-level function whose body chains to the global table
    pub fn new(tables: &'t mut ReferenceTables, name: impl Into<String>) -> Self {
        let root = tables.root();
        Self::nested(tables, root, name)
    }

    /// Function whose body chains to `parent`
    pub fn nested(tables: &'t mut ReferenceTables, parent: TableId, name: impl Into<String>) -> Self {
        Self {
            body: BlockBuilder::new(tables, parent),
            name: name.into(),
            parameters: Vec::new(),
            varargs: false,
            visibility: Visibility::Public,
            scope: FunctionScope::Module,
            decorators: Vec::new(),
        }
    }

    pub fn param(&mut self, name: &str) -> &mut Self {
        self.body.declare(name, ReferenceKind::Constant);
        self.parameters.push(name.to_string());
        self
    }

    pub fn params(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.param(name);
        }
        self
    }

    pub fn varargs(&mut self) -> &mut Self {
        self.varargs = true;
        self
    }

    pub fn local(&mut self) -> &mut Self {
        self.visibility = Visibility::Local;
        self
    }

    pub fn scope(&mut self, scope: FunctionScope) -> &mut Self {
        self.scope = scope;
        self
    }

    pub fn decorator(&mut self, decorator: Node) -> &mut Self {
        self.decorators.push(decorator);
        self
    }

    /// The body block under construction
    pub fn body(&mut self) -> &mut BlockBuilder<'t> {
        &mut self.body
    }

    pub fn let_(&mut self, name: &str, value: Node) -> &mut Self {
        self.body.let_(name, value);
        self
    }

    pub fn var(&mut self, name: &str, value: Node) -> &mut Self {
        self.body.var(name, value);
        self
    }

    pub fn assign(&mut self, name: &str, value: Node) -> &mut Self {
        self.body.assign(name, value);
        self
    }

    pub fn push(&mut self, statement: Node) -> &mut Self {
        self.body.push(statement);
        self
    }

    pub fn build(self) -> Result<Function, IrError> {
        let body = self.body.build()?;
        let mut function = Function::new(self.name, body);
        function.parameters = self.parameters;
        function.varargs = self.varargs;
        function.visibility = self.visibility;
        function.scope = self.scope;
        function.decorators = self.decorators;
        function.adopt();
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_are_declared_in_body_table() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "add");
        builder.params(&["a", "b"]);
        builder.push(Node::ret(Node::binary(
            Operator::Plus,
            Node::lookup("a"),
            Node::lookup("b"),
        )));
        let function = builder.build().unwrap();

        assert_eq!(function.arity(), 2);
        let body_table = tables.get(function.body.table).unwrap();
        assert!(body_table.has_own("a"));
        assert!(body_table.has_own("b"));
        assert_eq!(tables.parent(function.body.table), Some(tables.root()));
    }

    #[test]
    fn test_duplicate_declaration_fails_build() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "main");
        builder.param("x");
        builder.var("x", Node::constant(0));
        builder.let_("y", Node::constant(1));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, IrError::DuplicateReference(ref name) if name == "x"), "{}", err);
    }

    #[test]
    fn test_nested_block_forks_table() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "main");
        builder.var("x", Node::constant(0));
        let nested = builder.body().block(|b| {
            b.let_("y", Node::lookup("x"));
        });
        builder.push(nested);
        let function = builder.build().unwrap();

        let Node::Block(inner) = &function.body.statements[1] else {
            panic!("expected nested block");
        };
        assert_eq!(tables.parent(inner.table), Some(function.body.table));
        assert!(tables.resolve(inner.table, "x").is_some());
        assert_eq!(inner.meta.parent, Some(function.body.meta.id));
    }

    #[test]
    fn test_closure_body_chains_to_enclosing_block() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "outer");
        builder.let_("k", Node::constant(3));
        let closure = builder.body().closure(&["x"], |f| {
            f.push(Node::ret(Node::lookup("k")));
        });
        let Node::ClosureReference(ClosureReference {
            target: ClosureTarget::Literal(literal),
            ..
        }) = &closure
        else {
            panic!("expected literal closure");
        };
        assert_eq!(literal.scope, FunctionScope::Closure);
        assert_eq!(literal.meta.parent, Some(closure.id()));
        let enclosing = builder.body().table();
        let tables = builder.body().tables();
        assert_eq!(tables.parent(literal.body.table), Some(enclosing));
        assert!(tables.resolve(literal.body.table, "k").is_some());
    }

    #[test]
    fn test_call_chain_builds_anonymous_calls() {
        let node = Node::call_chain("curry", vec![Node::constant(1)], vec![vec![Node::constant(2)]]);
        let Node::FunctionInvocation(call) = &node else {
            panic!("expected invocation");
        };
        assert_eq!(call.anonymous_calls.len(), 1);
        assert_eq!(call.anonymous_calls[0].parent(), Some(node.id()));
    }
}

//! IR visitor
//!
//! Every pass is a [`Visitor`]. Each `visit_*` method has a default
//! implementation that calls the matching `walk_*` function, so an override
//! can run logic before or after the default traversal by calling `walk_*`
//! (or [`Node::walk`]) itself.
//!
//! Dispatch goes through [`Visitor::visit_node`]: [`Node::accept`] calls it,
//! and its default forwards to the kind-specific method. Overriding
//! `visit_node` gives a hook that sees every node with its variant intact,
//! which is what rewriting passes need to call `replace_element`.

use super::function::Function;
use super::module::Module;
use super::node::*;

/// IR visitor trait
pub trait Visitor {
    /// Error that aborts the traversal
    type Error;

    fn visit_module(&mut self, module: &mut Module) -> Result<(), Self::Error> {
        walk_module(self, module)
    }

    fn visit_function(&mut self, function: &mut Function) -> Result<(), Self::Error> {
        walk_function(self, function)
    }

    fn visit_node(&mut self, node: &mut Node) -> Result<(), Self::Error> {
        walk_node(self, node)
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<(), Self::Error> {
        walk_block(self, block)
    }

    fn visit_constant(&mut self, _constant: &mut Constant) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_reference_lookup(&mut self, _lookup: &mut ReferenceLookup) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) -> Result<(), Self::Error> {
        walk_assignment(self, assignment)
    }

    fn visit_binary_operation(&mut self, op: &mut BinaryOperation) -> Result<(), Self::Error> {
        walk_binary_operation(self, op)
    }

    fn visit_unary_operation(&mut self, op: &mut UnaryOperation) -> Result<(), Self::Error> {
        walk_unary_operation(self, op)
    }

    fn visit_function_invocation(&mut self, call: &mut FunctionInvocation) -> Result<(), Self::Error> {
        walk_function_invocation(self, call)
    }

    fn visit_method_invocation(&mut self, call: &mut MethodInvocation) -> Result<(), Self::Error> {
        walk_method_invocation(self, call)
    }

    fn visit_macro_invocation(&mut self, call: &mut MacroInvocation) -> Result<(), Self::Error> {
        walk_macro_invocation(self, call)
    }

    fn visit_named_argument(&mut self, arg: &mut NamedArgument) -> Result<(), Self::Error> {
        arg.expression.accept(self)
    }

    fn visit_closure_reference(&mut self, closure: &mut ClosureReference) -> Result<(), Self::Error> {
        walk_closure_reference(self, closure)
    }

    fn visit_collection(&mut self, collection: &mut Collection) -> Result<(), Self::Error> {
        walk_nodes(self, &mut collection.elements)
    }

    fn visit_conditional(&mut self, conditional: &mut Conditional) -> Result<(), Self::Error> {
        walk_conditional(self, conditional)
    }

    fn visit_loop(&mut self, lp: &mut Loop) -> Result<(), Self::Error> {
        walk_loop(self, lp)
    }

    fn visit_loop_break(&mut self, _brk: &mut LoopBreak) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_return(&mut self, ret: &mut Return) -> Result<(), Self::Error> {
        ret.value.accept(self)
    }

    fn visit_throw(&mut self, throw: &mut Throw) -> Result<(), Self::Error> {
        throw.value.accept(self)
    }

    fn visit_try_catch_finally(&mut self, tcf: &mut TryCatchFinally) -> Result<(), Self::Error> {
        walk_try_catch_finally(self, tcf)
    }

    fn visit_noop(&mut self, _noop: &mut Noop) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ============================================================================
// Walk functions
// ============================================================================

/// Visit every function of a module, then the module-level macro invocations
pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, module: &mut Module) -> Result<(), V::Error> {
    for function in module.all_functions_mut() {
        visitor.visit_function(function)?;
    }
    walk_nodes(visitor, &mut module.toplevel_macros)
}

/// Visit decorators, then the body
pub fn walk_function<V: Visitor + ?Sized>(visitor: &mut V, function: &mut Function) -> Result<(), V::Error> {
    walk_nodes(visitor, &mut function.decorators)?;
    visitor.visit_block(&mut function.body)
}

/// Dispatch a node to its kind-specific visit method
pub fn walk_node<V: Visitor + ?Sized>(visitor: &mut V, node: &mut Node) -> Result<(), V::Error> {
    match node {
        Node::Block(b) => visitor.visit_block(b),
        Node::Constant(c) => visitor.visit_constant(c),
        Node::ReferenceLookup(r) => visitor.visit_reference_lookup(r),
        Node::Assignment(a) => visitor.visit_assignment(a),
        Node::BinaryOperation(b) => visitor.visit_binary_operation(b),
        Node::UnaryOperation(u) => visitor.visit_unary_operation(u),
        Node::FunctionInvocation(f) => visitor.visit_function_invocation(f),
        Node::MethodInvocation(m) => visitor.visit_method_invocation(m),
        Node::MacroInvocation(m) => visitor.visit_macro_invocation(m),
        Node::NamedArgument(n) => visitor.visit_named_argument(n),
        Node::ClosureReference(c) => visitor.visit_closure_reference(c),
        Node::Collection(c) => visitor.visit_collection(c),
        Node::Conditional(c) => visitor.visit_conditional(c),
        Node::Loop(l) => visitor.visit_loop(l),
        Node::LoopBreak(b) => visitor.visit_loop_break(b),
        Node::Return(r) => visitor.visit_return(r),
        Node::Throw(t) => visitor.visit_throw(t),
        Node::TryCatchFinally(t) => visitor.visit_try_catch_finally(t),
        Node::Noop(n) => visitor.visit_noop(n),
    }
}

pub fn walk_nodes<V: Visitor + ?Sized>(visitor: &mut V, nodes: &mut [Node]) -> Result<(), V::Error> {
    for node in nodes {
        node.accept(visitor)?;
    }
    Ok(())
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &mut Block) -> Result<(), V::Error> {
    walk_nodes(visitor, &mut block.statements)
}

pub fn walk_assignment<V: Visitor + ?Sized>(visitor: &mut V, assignment: &mut Assignment) -> Result<(), V::Error> {
    assignment.value.accept(visitor)
}

pub fn walk_binary_operation<V: Visitor + ?Sized>(visitor: &mut V, op: &mut BinaryOperation) -> Result<(), V::Error> {
    op.left.accept(visitor)?;
    op.right.accept(visitor)
}

pub fn walk_unary_operation<V: Visitor + ?Sized>(visitor: &mut V, op: &mut UnaryOperation) -> Result<(), V::Error> {
    op.operand.accept(visitor)
}

pub fn walk_function_invocation<V: Visitor + ?Sized>(
    visitor: &mut V,
    call: &mut FunctionInvocation,
) -> Result<(), V::Error> {
    walk_nodes(visitor, &mut call.arguments)?;
    walk_nodes(visitor, &mut call.anonymous_calls)
}

pub fn walk_method_invocation<V: Visitor + ?Sized>(
    visitor: &mut V,
    call: &mut MethodInvocation,
) -> Result<(), V::Error> {
    call.receiver.accept(visitor)?;
    walk_nodes(visitor, &mut call.arguments)?;
    walk_nodes(visitor, &mut call.anonymous_calls)
}

pub fn walk_macro_invocation<V: Visitor + ?Sized>(
    visitor: &mut V,
    call: &mut MacroInvocation,
) -> Result<(), V::Error> {
    walk_nodes(visitor, &mut call.arguments)
}

/// Visit the literal function of a closure; hoisted closures have no children
pub fn walk_closure_reference<V: Visitor + ?Sized>(
    visitor: &mut V,
    closure: &mut ClosureReference,
) -> Result<(), V::Error> {
    match &mut closure.target {
        ClosureTarget::Literal(function) => visitor.visit_function(function),
        ClosureTarget::Hoisted(_) => Ok(()),
    }
}

pub fn walk_conditional<V: Visitor + ?Sized>(
    visitor: &mut V,
    conditional: &mut Conditional,
) -> Result<(), V::Error> {
    conditional.condition.accept(visitor)?;
    conditional.then_branch.accept(visitor)?;
    if let Some(otherwise) = &mut conditional.else_branch {
        otherwise.accept(visitor)?;
    }
    Ok(())
}

pub fn walk_loop<V: Visitor + ?Sized>(visitor: &mut V, lp: &mut Loop) -> Result<(), V::Error> {
    if let Some(init) = &mut lp.init {
        init.accept(visitor)?;
    }
    lp.condition.accept(visitor)?;
    lp.body.accept(visitor)?;
    if let Some(post) = &mut lp.post {
        post.accept(visitor)?;
    }
    Ok(())
}

pub fn walk_try_catch_finally<V: Visitor + ?Sized>(
    visitor: &mut V,
    tcf: &mut TryCatchFinally,
) -> Result<(), V::Error> {
    tcf.try_block.accept(visitor)?;
    if let Some(catch) = &mut tcf.catch_block {
        catch.accept(visitor)?;
    }
    if let Some(finally) = &mut tcf.finally_block {
        finally.accept(visitor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionBuilder, ReferenceTables};
    use std::convert::Infallible;

    #[derive(Default)]
    struct KindCounter {
        kinds: Vec<&'static str>,
    }

    impl Visitor for KindCounter {
        type Error = Infallible;

        fn visit_node(&mut self, node: &mut Node) -> Result<(), Infallible> {
            self.kinds.push(node.kind_name());
            walk_node(self, node)
        }
    }

    #[test]
    fn test_visits_in_evaluation_order() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "main");
        builder.let_(
            "x",
            Node::binary(Operator::Plus, Node::constant(1), Node::constant(2)),
        );
        builder.push(Node::ret(Node::lookup("x")));
        let mut function = builder.build().unwrap();

        let mut counter = KindCounter::default();
        counter.visit_function(&mut function).unwrap();
        assert_eq!(
            counter.kinds,
            vec!["assign", "binary", "constant", "constant", "return", "lookup"]
        );
    }

    /// Overrides a kind method and uses `Node::walk` to keep descending
    struct ReturnCounter {
        returns: usize,
        nodes: usize,
    }

    impl Visitor for ReturnCounter {
        type Error = Infallible;

        fn visit_node(&mut self, node: &mut Node) -> Result<(), Infallible> {
            self.nodes += 1;
            if let Node::Return(_) = node {
                self.returns += 1;
                return node.walk(self);
            }
            walk_node(self, node)
        }
    }

    #[test]
    fn test_walk_visits_only_children() {
        let mut node = Node::ret(Node::binary(
            Operator::Times,
            Node::constant(2),
            Node::constant(3),
        ));
        let mut counter = ReturnCounter { returns: 0, nodes: 0 };
        node.walk(&mut counter).unwrap();
        assert_eq!(counter.returns, 0);
        assert_eq!(counter.nodes, 3);

        node.accept(&mut counter).unwrap();
        assert_eq!(counter.returns, 1);
    }
}

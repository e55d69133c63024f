//! Closure capture analysis
//!
//! Turns every function literal into a hoisted module function. The outer
//! names a literal refers to become leading synthetic parameters, and the
//! literal itself becomes a closure reference listing those names, which
//! code generation partially applies.
//!
//! Literals are processed innermost first. A hoisted inner closure reads its
//! captured names at the point of use, so an enclosing closure captures them
//! in turn and captures propagate through any nesting depth.

use crate::compiler::ir::visitor::{
    walk_block, walk_closure_reference, walk_function, walk_function_invocation,
};
use crate::compiler::ir::{
    Assignment, Block, ClosureReference, ClosureTarget, Function, FunctionInvocation,
    FunctionScope, IrError, LocalReference, Module, Node, ReferenceKind, ReferenceLookup,
    ReferenceTables, TableId, Visitor,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Outer names a closure refers to, in first-use order
#[derive(Debug, Clone, Default)]
pub struct ClosureCaptures {
    names: Vec<String>,
    indices: FxHashMap<String, usize>,
    /// Captured names the closure assigns to
    assigned: FxHashSet<String>,
    /// The closure refers to the reference it is being assigned to
    self_referenced: bool,
}

impl ClosureCaptures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capture, ignoring repeats
    pub fn add(&mut self, name: &str) {
        if !self.indices.contains_key(name) {
            self.indices.insert(name.to_string(), self.names.len());
            self.names.push(name.to_string());
        }
    }

    pub fn mark_assigned(&mut self, name: &str) {
        if self.indices.contains_key(name) {
            self.assigned.insert(name.to_string());
        }
    }

    pub fn is_captured(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn is_assigned(&self, name: &str) -> bool {
        self.assigned.contains(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_self_referenced(&self) -> bool {
        self.self_referenced
    }
}

/// Closure capture analyzer
#[derive(Debug, Default)]
pub struct CaptureAnalyzer;

impl CaptureAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Hoist every function literal of the module
    ///
    /// Returns the names of the hoisted functions.
    pub fn analyze_module(&self, module: &mut Module) -> Result<Vec<String>, IrError> {
        log::debug!("analyzing closure captures in module {}", module.name);
        let mut tables = std::mem::take(&mut module.tables);
        let mut visitor = CaptureVisitor {
            tables: &mut tables,
            outermost: Vec::new(),
            counter: 0,
            hoisted: Vec::new(),
        };
        let mut result = Ok(());
        for function in module.all_functions_mut() {
            result = visitor.visit_function(function);
            if result.is_err() {
                break;
            }
        }
        let hoisted = std::mem::take(&mut visitor.hoisted);
        module.tables = tables;
        result?;

        let names = hoisted.iter().map(|f| f.name.clone()).collect();
        for function in hoisted {
            module.add_function(function);
        }
        Ok(names)
    }
}

/// Compute the captures of a function literal
///
/// Names declared in the literal's own tables are local, names declared in
/// the global table are module state and never captured, and undeclared
/// names are left for the reference resolver to report.
pub fn free_variables(function: &mut Function, tables: &ReferenceTables) -> ClosureCaptures {
    let mut collector = FreeVariableCollector {
        tables,
        own: FxHashSet::default(),
        stack: Vec::new(),
        self_name: function.synthetic_self_name.clone(),
        captures: ClosureCaptures::new(),
    };
    let _ = collector.visit_function(function);
    collector.captures
}

struct FreeVariableCollector<'t> {
    tables: &'t ReferenceTables,
    own: FxHashSet<TableId>,
    stack: Vec<TableId>,
    self_name: Option<String>,
    captures: ClosureCaptures,
}

impl FreeVariableCollector<'_> {
    fn read(&mut self, name: &str) {
        let Some(&current) = self.stack.last() else {
            return;
        };
        let Some(declared_in) = self.tables.declaring_table(current, name) else {
            return;
        };
        if self.own.contains(&declared_in) || declared_in == self.tables.root() {
            return;
        }
        if self.self_name.as_deref() == Some(name) {
            self.captures.self_referenced = true;
            return;
        }
        self.captures.add(name);
    }
}

impl Visitor for FreeVariableCollector<'_> {
    type Error = std::convert::Infallible;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), Self::Error> {
        self.own.insert(block.table);
        self.stack.push(block.table);
        walk_block(self, block)?;
        self.stack.pop();
        Ok(())
    }

    fn visit_reference_lookup(&mut self, lookup: &mut ReferenceLookup) -> Result<(), Self::Error> {
        self.read(&lookup.name);
        Ok(())
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) -> Result<(), Self::Error> {
        assignment.value.accept(self)?;
        if !assignment.declaring {
            self.read(&assignment.name);
            self.captures.mark_assigned(&assignment.name);
        }
        Ok(())
    }

    fn visit_function_invocation(&mut self, call: &mut FunctionInvocation) -> Result<(), Self::Error> {
        self.read(&call.name);
        walk_function_invocation(self, call)
    }

    fn visit_closure_reference(&mut self, closure: &mut ClosureReference) -> Result<(), Self::Error> {
        for name in closure.captured.clone() {
            self.read(&name);
        }
        walk_closure_reference(self, closure)
    }
}

struct CaptureVisitor<'t> {
    tables: &'t mut ReferenceTables,
    /// Names of the module-level functions being visited
    outermost: Vec<String>,
    counter: usize,
    hoisted: Vec<Function>,
}

impl CaptureVisitor<'_> {
    fn hoisted_name(&mut self) -> String {
        let owner = self.outermost.first().map(String::as_str).unwrap_or("module");
        let name = format!("__$$_{}_closure_{}", owner, self.counter);
        self.counter += 1;
        name
    }

    fn hoist(&mut self, closure: &mut ClosureReference) -> Result<(), IrError> {
        let ClosureTarget::Literal(function) = &mut closure.target else {
            return Ok(());
        };
        let captures = free_variables(function, self.tables);
        let name = self.hoisted_name();
        let body_table = function.body.table;

        for captured in captures.names().iter().rev() {
            self.tables
                .declare_if_absent(body_table, LocalReference::synthetic(captured.clone(), ReferenceKind::Constant))?;
            function.parameters.insert(0, captured.clone());
        }
        function.synthetic_parameter_count = captures.len();
        function.scope = FunctionScope::Closure;
        function.name = name.clone();

        match function.synthetic_self_name.clone() {
            Some(self_name) if captures.is_self_referenced() => {
                self.tables
                    .declare_if_absent(body_table, LocalReference::synthetic(self_name.clone(), ReferenceKind::Constant))?;
                let mut self_reference = Node::closure_ref(name.clone(), captures.names().to_vec());
                self_reference.meta_mut().position = function.meta.position;
                function.body.prepend(Node::let_(self_name, self_reference));
            }
            _ => function.synthetic_self_name = None,
        }

        let root = self.tables.root();
        self.tables.relink(body_table, root)?;
        log::trace!("hoisted closure {} capturing {:?}", name, captures.names());

        if let ClosureTarget::Literal(function) =
            std::mem::replace(&mut closure.target, ClosureTarget::Hoisted(name))
        {
            self.hoisted.push(*function);
        }
        closure.captured = captures.names().to_vec();
        Ok(())
    }
}

impl Visitor for CaptureVisitor<'_> {
    type Error = IrError;

    fn visit_function(&mut self, function: &mut Function) -> Result<(), IrError> {
        let outermost = self.outermost.is_empty();
        if outermost {
            self.outermost.push(function.name.clone());
        }
        let result = walk_function(self, function);
        if outermost {
            self.outermost.pop();
        }
        result
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) -> Result<(), IrError> {
        if let Node::ClosureReference(ClosureReference {
            target: ClosureTarget::Literal(function),
            ..
        }) = assignment.value.as_mut()
        {
            if function.synthetic_self_name.is_none() {
                function.synthetic_self_name = Some(assignment.name.clone());
            }
        }
        assignment.value.accept(self)
    }

    fn visit_closure_reference(&mut self, closure: &mut ClosureReference) -> Result<(), IrError> {
        if let ClosureTarget::Literal(function) = &mut closure.target {
            self.visit_function(function)?;
        }
        self.hoist(closure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionBuilder, Operator};

    fn closure_of(node: &Node) -> &ClosureReference {
        match node {
            Node::ClosureReference(c) => c,
            Node::Assignment(a) => closure_of(&a.value),
            Node::Return(r) => closure_of(&r.value),
            other => panic!("no closure in {}", other.kind_name()),
        }
    }

    #[test]
    fn test_captured_names_become_leading_parameters() {
        let mut module = Module::new("demo");
        module.declare_state("GLOBAL", true, Node::constant(1)).unwrap();
        let mut builder = FunctionBuilder::new(&mut module.tables, "adder");
        builder.param("base");
        let literal = builder.body().closure(&["x"], |f| {
            f.push(Node::ret(Node::binary(
                Operator::Plus,
                Node::binary(Operator::Plus, Node::lookup("base"), Node::lookup("x")),
                Node::lookup("GLOBAL"),
            )));
        });
        builder.push(Node::ret(literal));
        let function = builder.build().unwrap();
        module.add_function(function);

        let hoisted = CaptureAnalyzer::new().analyze_module(&mut module).unwrap();
        assert_eq!(hoisted, vec!["__$$_adder_closure_0"]);

        let closure = closure_of(&module.functions[0].body.statements[0]);
        assert!(matches!(&closure.target, ClosureTarget::Hoisted(n) if n == "__$$_adder_closure_0"));
        assert_eq!(closure.captured, vec!["base"]);

        let function = module.function("__$$_adder_closure_0").unwrap();
        assert_eq!(function.parameters, vec!["base", "x"]);
        assert_eq!(function.synthetic_parameter_count, 1);
        assert_eq!(function.scope, FunctionScope::Closure);
        assert_eq!(module.tables.parent(function.body.table), Some(module.tables.root()));
        let base = module.tables.resolve(function.body.table, "base").unwrap();
        assert!(base.reference.synthetic);
    }

    #[test]
    fn test_recursive_closure_gets_self_slot() {
        let mut module = Module::new("demo");
        let mut builder = FunctionBuilder::new(&mut module.tables, "main");
        let literal = builder.body().closure(&["n"], |f| {
            f.push(Node::ret(Node::call(
                "fact",
                vec![Node::binary(Operator::Minus, Node::lookup("n"), Node::constant(1))],
            )));
        });
        builder.let_("fact", literal);
        let function = builder.build().unwrap();
        module.add_function(function);

        CaptureAnalyzer::new().analyze_module(&mut module).unwrap();
        let closure = closure_of(&module.functions[0].body.statements[0]);
        assert!(closure.captured.is_empty());

        let hoisted = module.function("__$$_main_closure_0").unwrap();
        assert_eq!(hoisted.synthetic_self_name.as_deref(), Some("fact"));
        let Node::Assignment(first) = &hoisted.body.statements[0] else {
            panic!("expected self assignment");
        };
        assert_eq!(first.name, "fact");
        assert!(first.declaring);
        assert!(matches!(first.value.as_ref(), Node::ClosureReference(_)));
        let slot = module.tables.resolve(hoisted.body.table, "fact").unwrap();
        assert_eq!(slot.table, hoisted.body.table);
    }

    #[test]
    fn test_captures_propagate_through_nesting() {
        let mut module = Module::new("demo");
        let mut builder = FunctionBuilder::new(&mut module.tables, "outer");
        builder.let_("x", Node::constant(10));
        let middle = builder.body().closure(&[], |g| {
            let inner = g.body().closure(&[], |h| {
                let innermost = h.body().closure(&[], |k| {
                    k.push(Node::ret(Node::lookup("x")));
                });
                h.push(Node::ret(innermost));
            });
            g.push(Node::ret(inner));
        });
        builder.push(Node::ret(middle));
        let function = builder.build().unwrap();
        module.add_function(function);

        let hoisted = CaptureAnalyzer::new().analyze_module(&mut module).unwrap();
        assert_eq!(hoisted.len(), 3);
        for name in &hoisted {
            let f = module.function(name).unwrap();
            assert_eq!(f.synthetic_parameters(), ["x".to_string()], "{}", name);
        }
        let closure = closure_of(&module.functions[0].body.statements[1]);
        assert_eq!(closure.captured, vec!["x"]);
    }

    #[test]
    fn test_module_state_is_not_captured() {
        let mut module = Module::new("demo");
        module.declare_state("counter", false, Node::constant(0)).unwrap();
        let mut builder = FunctionBuilder::new(&mut module.tables, "main");
        let literal = builder.body().closure(&[], |f| {
            f.push(Node::ret(Node::lookup("counter")));
        });
        builder.push(Node::ret(literal));
        let function = builder.build().unwrap();
        module.add_function(function);

        CaptureAnalyzer::new().analyze_module(&mut module).unwrap();
        let closure = closure_of(&module.functions[0].body.statements[0]);
        assert!(closure.captured.is_empty());
    }

    #[test]
    fn test_free_variables_tracks_assignments() {
        let mut tables = ReferenceTables::new();
        let mut outer = FunctionBuilder::new(&mut tables, "outer");
        outer.var("total", Node::constant(0));
        let literal = outer.body().closure(&["v"], |f| {
            f.assign("total", Node::lookup("v"));
        });
        let Node::ClosureReference(ClosureReference {
            target: ClosureTarget::Literal(mut function),
            ..
        }) = literal
        else {
            panic!("expected literal");
        };
        drop(outer);
        let captures = free_variables(&mut function, &tables);
        assert_eq!(captures.names(), ["total".to_string()]);
        assert!(captures.is_assigned("total"));
        assert!(!captures.is_self_referenced());
    }
}

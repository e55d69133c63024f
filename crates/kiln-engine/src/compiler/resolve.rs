//! Reference resolution and verification
//!
//! One pass over every function of a module that:
//! - gives each local reference a slot index, parameters first,
//! - binds lookups and assignments to their declarations,
//! - classifies invocations as plain, through a local reference, or through
//!   module state,
//! - reports scoping mistakes into the shared [`Problems`] builder.
//!
//! The uninitialized-access check is block-local. An assignment in any
//! branch counts as initializing the reference for the rest of the function.

use crate::compiler::ir::visitor::{walk_block, walk_function_invocation, walk_loop, walk_method_invocation};
use crate::compiler::ir::{
    Assignment, Block, BreakKind, ClosureReference, ClosureTarget, Function, FunctionInvocation,
    IrError, Loop, LoopBreak, MethodInvocation, Module, Node, ReferenceLookup,
    ReferenceTables, ResolvedRef, Span, TableId, TryCatchFinally, Visitor,
};
use crate::compiler::options::CompilerOptions;
use crate::compiler::problems::{ProblemKind, Problems};
use rustc_hash::FxHashSet;

/// A declaration, identified by the table that owns it
type DeclKey = (TableId, String);

/// Reference resolver
pub struct ReferenceResolver<'p> {
    problems: &'p mut Problems,
    constant_call_sites: bool,
}

impl<'p> ReferenceResolver<'p> {
    pub fn new(problems: &'p mut Problems, options: &CompilerOptions) -> Self {
        Self {
            problems,
            constant_call_sites: options.constant_call_sites,
        }
    }

    /// Resolve and verify a whole module
    pub fn resolve_module(&mut self, module: &mut Module) -> Result<(), IrError> {
        log::debug!("resolving references in module {}", module.name);
        self.check_declarations(module);

        let mut tables = std::mem::take(&mut module.tables);
        let mut visitor = ResolverVisitor::new(&mut tables, &mut *self.problems, self.constant_call_sites);
        let mut result = Ok(());
        for function in module.all_functions_mut() {
            result = visitor.visit_function(function);
            if result.is_err() {
                break;
            }
        }
        module.tables = tables;
        result
    }

    /// Module-level declaration checks
    fn check_declarations(&mut self, module: &Module) {
        for (i, function) in module.functions.iter().enumerate() {
            let clash = module.functions[..i].iter().any(|other| {
                other.name == function.name
                    && other.arity() == function.arity()
                    && other.varargs == function.varargs
            });
            if clash {
                self.problems.report(
                    ProblemKind::AmbiguousDeclaration,
                    function.meta.position,
                    format!(
                        "function {} with {} parameter(s) is declared more than once",
                        function.name,
                        function.arity()
                    ),
                );
            }
        }

        let augmentations = module
            .augmentations
            .iter()
            .chain(module.named_augmentations.iter());
        for (target, functions) in augmentations {
            for function in functions.iter().filter(|f| f.parameters.is_empty()) {
                self.problems.report(
                    ProblemKind::AugmentFunctionNoArgs,
                    function.meta.position,
                    format!("augmentation {}::{} takes no receiver argument", target, function.name),
                );
            }
        }
    }
}

/// Per-function traversal state
struct FunctionFrame {
    is_module_init: bool,
    next_slot: i32,
    loops: usize,
    /// Not-yet-initialized references of the enclosing function
    saved_uninitialized: FxHashSet<DeclKey>,
}

struct ResolverVisitor<'a> {
    tables: &'a mut ReferenceTables,
    problems: &'a mut Problems,
    constant_call_sites: bool,
    functions: Vec<FunctionFrame>,
    /// Active reference tables, innermost last
    scopes: Vec<TableId>,
    /// Declarations assigned so far, one set per active block
    assigned: Vec<FxHashSet<DeclKey>>,
    uninitialized: FxHashSet<DeclKey>,
    /// Names the next block entered starts out initialized with
    pending_initialized: Vec<String>,
}

impl<'a> ResolverVisitor<'a> {
    fn new(tables: &'a mut ReferenceTables, problems: &'a mut Problems, constant_call_sites: bool) -> Self {
        Self {
            tables,
            problems,
            constant_call_sites,
            functions: Vec::new(),
            scopes: Vec::new(),
            assigned: Vec::new(),
            uninitialized: FxHashSet::default(),
            pending_initialized: Vec::new(),
        }
    }

    fn current_table(&self) -> TableId {
        self.scopes.last().copied().unwrap_or_else(|| self.tables.root())
    }

    fn in_module_init(&self) -> bool {
        self.functions.last().map(|f| f.is_module_init).unwrap_or(false)
    }

    fn is_assigned(&self, key: &DeclKey) -> bool {
        self.assigned.last().map(|s| s.contains(key)).unwrap_or(false)
    }

    fn mark_assigned(&mut self, key: DeclKey) {
        self.uninitialized.remove(&key);
        if let Some(set) = self.assigned.last_mut() {
            set.insert(key);
        }
    }

    fn next_slot(&mut self) -> i32 {
        match self.functions.last_mut() {
            Some(frame) => {
                let slot = frame.next_slot;
                frame.next_slot += 1;
                slot
            }
            None => -1,
        }
    }

    /// Give a slot to every reference of `table` that has none yet
    fn assign_slots(&mut self, table: TableId) {
        for reference in self.tables.owned(table) {
            if reference.is_module_state() || reference.has_index() {
                continue;
            }
            let slot = self.next_slot();
            if let Some(r) = self.tables.own_mut(table, &reference.name) {
                r.index = slot;
            }
        }
    }

    /// Resolve a read of `name`, reporting undeclared and uninitialized access
    fn resolve_read(&mut self, name: &str, position: Option<Span>) -> Option<ResolvedRef> {
        let table = self.current_table();
        let Some(found) = self.tables.resolve(table, name) else {
            self.problems.report(
                ProblemKind::UndeclaredReference,
                position,
                format!("{} is not declared", name),
            );
            return None;
        };
        let resolved = ResolvedRef {
            table: found.table,
            index: found.reference.index,
            kind: found.reference.kind,
        };
        if self.uninitialized.contains(&(found.table, name.to_string())) {
            self.problems.report(
                ProblemKind::UninitializedReferenceAccess,
                position,
                format!("{} is read before it is assigned", name),
            );
        }
        Some(resolved)
    }

    fn check_named_arguments(&mut self, arguments: &[Node], callee: &str, position: Option<Span>) {
        let named = arguments.iter().filter(|a| matches!(a, Node::NamedArgument(_))).count();
        if named > 0 && named < arguments.len() {
            self.problems.report(
                ProblemKind::IncompleteNamedArgumentsUsage,
                position,
                format!("call to {} mixes named and positional arguments", callee),
            );
        }
    }
}

impl Visitor for ResolverVisitor<'_> {
    type Error = IrError;

    fn visit_function(&mut self, function: &mut Function) -> Result<(), IrError> {
        self.functions.push(FunctionFrame {
            is_module_init: function.is_module_init,
            next_slot: 0,
            loops: 0,
            saved_uninitialized: std::mem::take(&mut self.uninitialized),
        });

        for decorator in &mut function.decorators {
            decorator.accept(self)?;
        }

        let body_table = function.body.table;
        for parameter in &function.parameters {
            let slot = self.next_slot();
            if let Some(reference) = self.tables.own_mut(body_table, parameter) {
                reference.index = slot;
            }
        }
        self.pending_initialized = function.parameters.clone();
        let result = self.visit_block(&mut function.body);

        if let Some(frame) = self.functions.pop() {
            self.uninitialized = frame.saved_uninitialized;
        }
        result
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        let table = block.table;
        self.scopes.push(table);
        let mut assigned = self.assigned.last().cloned().unwrap_or_default();
        for name in std::mem::take(&mut self.pending_initialized) {
            assigned.insert((table, name));
        }
        self.assigned.push(assigned);

        self.assign_slots(table);
        for reference in self.tables.owned(table) {
            let key = (table, reference.name.clone());
            if !reference.is_module_state() && !reference.synthetic && !self.is_assigned(&key) {
                self.uninitialized.insert(key);
            }
        }

        let result = walk_block(self, block);
        self.assigned.pop();
        self.scopes.pop();
        self.uninitialized.retain(|(t, _)| *t != table);
        result
    }

    fn visit_reference_lookup(&mut self, lookup: &mut ReferenceLookup) -> Result<(), IrError> {
        lookup.resolved = self.resolve_read(&lookup.name, lookup.meta.position);
        Ok(())
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) -> Result<(), IrError> {
        assignment.value.accept(self)?;

        let table = self.current_table();
        let Some(found) = self.tables.resolve(table, &assignment.name) else {
            self.problems.report(
                ProblemKind::UndeclaredReference,
                assignment.meta.position,
                format!("{} is not declared", assignment.name),
            );
            return Ok(());
        };
        let reference = found.reference.clone();
        let key = (found.table, assignment.name.clone());

        if assignment.declaring && !reference.synthetic && self.is_assigned(&key) {
            self.problems.report(
                ProblemKind::ReferenceAlreadyDeclaredInBlock,
                assignment.meta.position,
                format!("{} is already declared in this block", assignment.name),
            );
        } else if reference.is_constant()
            && (self.is_assigned(&key) || (reference.is_module_state() && !self.in_module_init()))
        {
            self.problems.report(
                ProblemKind::AssignToConstant,
                assignment.meta.position,
                format!("{} is a constant and cannot be reassigned", assignment.name),
            );
        }

        assignment.resolved = Some(ResolvedRef {
            table: key.0,
            index: reference.index,
            kind: reference.kind,
        });
        self.mark_assigned(key);
        Ok(())
    }

    fn visit_function_invocation(&mut self, call: &mut FunctionInvocation) -> Result<(), IrError> {
        walk_function_invocation(self, call)?;
        self.check_named_arguments(&call.arguments, &call.name, call.meta.position);
        if call.name.is_empty() {
            return Ok(());
        }

        let table = self.current_table();
        let found = self
            .tables
            .resolve(table, &call.name)
            .map(|r| (r.table, r.reference.kind));
        match found {
            Some((declared_in, kind)) => {
                call.on_module_state = kind.is_module_state();
                call.on_reference = !call.on_module_state;
                if self.uninitialized.contains(&(declared_in, call.name.clone())) {
                    self.problems.report(
                        ProblemKind::UninitializedReferenceAccess,
                        call.meta.position,
                        format!("{} is called before it is assigned", call.name),
                    );
                }
            }
            None => {
                call.on_reference = false;
                call.on_module_state = false;
            }
        }

        call.constant = self.constant_call_sites
            && !call.on_reference
            && !call.on_module_state
            && !call.arguments.is_empty()
            && call.arguments.iter().all(Node::is_constant);
        Ok(())
    }

    fn visit_method_invocation(&mut self, call: &mut MethodInvocation) -> Result<(), IrError> {
        walk_method_invocation(self, call)?;
        self.check_named_arguments(&call.arguments, &call.name, call.meta.position);
        Ok(())
    }

    fn visit_closure_reference(&mut self, closure: &mut ClosureReference) -> Result<(), IrError> {
        for name in closure.captured.clone() {
            self.resolve_read(&name, closure.meta.position);
        }
        if let ClosureTarget::Literal(function) = &mut closure.target {
            let scopes = std::mem::take(&mut self.scopes);
            let assigned = std::mem::take(&mut self.assigned);
            let result = self.visit_function(function);
            self.scopes = scopes;
            self.assigned = assigned;
            result?;
        }
        Ok(())
    }

    fn visit_loop(&mut self, lp: &mut Loop) -> Result<(), IrError> {
        if let Some(frame) = self.functions.last_mut() {
            frame.loops += 1;
        }
        let result = walk_loop(self, lp);
        if let Some(frame) = self.functions.last_mut() {
            frame.loops -= 1;
        }
        result
    }

    fn visit_loop_break(&mut self, brk: &mut LoopBreak) -> Result<(), IrError> {
        let in_loop = self.functions.last().map(|f| f.loops > 0).unwrap_or(false);
        if !in_loop {
            let keyword = match brk.kind {
                BreakKind::Break => "break",
                BreakKind::Continue => "continue",
            };
            self.problems.report(
                ProblemKind::BreakOrContinueOutsideLoop,
                brk.meta.position,
                format!("{} outside of a loop", keyword),
            );
        }
        Ok(())
    }

    fn visit_try_catch_finally(&mut self, tcf: &mut TryCatchFinally) -> Result<(), IrError> {
        tcf.try_block.accept(self)?;
        if let Some(catch) = &mut tcf.catch_block {
            if let Some(exception) = &tcf.exception_name {
                self.pending_initialized = vec![exception.clone()];
            }
            catch.accept(self)?;
            self.pending_initialized.clear();
        }
        if let Some(finally) = &mut tcf.finally_block {
            finally.accept(self)?;
        }
        Ok(())
    }
}

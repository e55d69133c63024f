//! Unused-reference pruning and block cleanup

use super::{rewrite_children, OptStats};
use crate::compiler::ir::visitor::{walk_assignment, walk_block, walk_closure_reference, walk_function_invocation};
use crate::compiler::ir::{
    Assignment, Block, ClosureReference, Composite, Function, FunctionInvocation, IrError, Node,
    ReferenceLookup, ReferenceTables, TableId, Visitor,
};
use rustc_hash::FxHashSet;
use std::convert::Infallible;

type DeclKey = (TableId, String);

/// Replace literal assignments to never-read locals with no-ops
pub(super) fn prune_unused(
    function: &mut Function,
    tables: &ReferenceTables,
    stats: &mut OptStats,
) -> Result<(), IrError> {
    let mut reads = ReadCollector {
        tables,
        scopes: Vec::new(),
        reads: FxHashSet::default(),
    };
    let _ = reads.visit_function(function);

    let mut pruner = Pruner {
        tables,
        scopes: Vec::new(),
        reads: reads.reads,
        pruned: 0,
    };
    pruner.visit_function(function)?;
    stats.pruned += pruner.pruned;
    Ok(())
}

/// Splice nested blocks into `block`
///
/// A nested block moves up when it is the only statement and its references
/// do not clash, or when it declares nothing. Declarations beside other
/// statements stay nested. Returns the number of blocks inlined.
pub(super) fn inline_blocks(block: &mut Block, tables: &mut ReferenceTables) -> Result<usize, IrError> {
    let mut inlined = 0;
    let mut i = 0;
    while i < block.statements.len() {
        let Node::Block(inner) = &block.statements[i] else {
            i += 1;
            continue;
        };
        let inner_table = inner.table;
        let sole = block.statements.len() == 1;
        if inner_table != block.table && !sole && !tables.owned(inner_table).is_empty() {
            i += 1;
            continue;
        }
        if inner_table != block.table {
            let target = tables.get(block.table)?;
            let clash = tables
                .owned(inner_table)
                .iter()
                .any(|r| target.has_own(&r.name));
            if clash {
                i += 1;
                continue;
            }
            tables.merge_into(inner_table, block.table)?;
        }
        let Node::Block(mut inner) = block.statements.remove(i) else {
            continue;
        };
        let mut retarget = Retarget {
            from: inner_table,
            to: block.table,
        };
        let _ = walk_block(&mut retarget, &mut inner);
        let spliced = inner.statements.len();
        for (offset, mut statement) in inner.statements.into_iter().enumerate() {
            statement.meta_mut().parent = Some(block.meta.id);
            block.statements.insert(i + offset, statement);
        }
        i += spliced;
        inlined += 1;
    }
    if inlined > 0 {
        log::trace!("inlined {} nested block(s) into {}", inlined, block.table);
    }
    Ok(inlined)
}

/// Drop no-ops and empty blocks from a statement list
pub(super) fn drop_noops(block: &mut Block) -> usize {
    let before = block.statements.len();
    block.statements.retain(|statement| match statement {
        Node::Noop(_) => false,
        Node::Block(inner) => !inner.is_empty(),
        _ => true,
    });
    before - block.statements.len()
}

// ============================================================================
// Visitors
// ============================================================================

/// Declarations read anywhere in a function
struct ReadCollector<'t> {
    tables: &'t ReferenceTables,
    scopes: Vec<TableId>,
    reads: FxHashSet<DeclKey>,
}

impl ReadCollector<'_> {
    fn read(&mut self, name: &str) {
        let current = self.scopes.last().copied().unwrap_or_else(|| self.tables.root());
        if let Some(table) = self.tables.declaring_table(current, name) {
            self.reads.insert((table, name.to_string()));
        }
    }
}

impl Visitor for ReadCollector<'_> {
    type Error = Infallible;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), Infallible> {
        self.scopes.push(block.table);
        walk_block(self, block)?;
        self.scopes.pop();
        Ok(())
    }

    fn visit_reference_lookup(&mut self, lookup: &mut ReferenceLookup) -> Result<(), Infallible> {
        self.read(&lookup.name);
        Ok(())
    }

    fn visit_function_invocation(&mut self, call: &mut FunctionInvocation) -> Result<(), Infallible> {
        if !call.name.is_empty() {
            self.read(&call.name);
        }
        walk_function_invocation(self, call)
    }

    fn visit_closure_reference(&mut self, closure: &mut ClosureReference) -> Result<(), Infallible> {
        for name in &closure.captured {
            self.read(name);
        }
        walk_closure_reference(self, closure)
    }
}

struct Pruner<'t> {
    tables: &'t ReferenceTables,
    scopes: Vec<TableId>,
    reads: FxHashSet<DeclKey>,
    pruned: usize,
}

impl Pruner<'_> {
    fn is_unused_literal_store(&self, assignment: &Assignment) -> bool {
        if !assignment.value.is_constant() {
            return false;
        }
        let current = self.scopes.last().copied().unwrap_or_else(|| self.tables.root());
        let Some(found) = self.tables.resolve(current, &assignment.name) else {
            return false;
        };
        found.table != self.tables.root()
            && !found.reference.is_module_state()
            && !self.reads.contains(&(found.table, assignment.name.clone()))
    }
}

impl Visitor for Pruner<'_> {
    type Error = IrError;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        self.scopes.push(block.table);
        walk_block(self, block)?;
        let pruned = rewrite_children(block, |statement| match statement {
            Node::Assignment(a) if self.is_unused_literal_store(a) => {
                log::trace!("pruned unused store to {}", a.name);
                Some(Node::noop(format!("unused {}", a.name)))
            }
            _ => None,
        })?;
        self.pruned += pruned;
        self.scopes.pop();
        Ok(())
    }
}

/// Point resolved declarations of one table at another
struct Retarget {
    from: TableId,
    to: TableId,
}

impl Visitor for Retarget {
    type Error = Infallible;

    fn visit_reference_lookup(&mut self, lookup: &mut ReferenceLookup) -> Result<(), Infallible> {
        if let Some(resolved) = &mut lookup.resolved {
            if resolved.table == self.from {
                resolved.table = self.to;
            }
        }
        Ok(())
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) -> Result<(), Infallible> {
        if let Some(resolved) = &mut assignment.resolved {
            if resolved.table == self.from {
                resolved.table = self.to;
            }
        }
        walk_assignment(self, assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionBuilder, LocalReference, ReferenceKind};

    #[test]
    fn test_unread_literal_stores_are_pruned() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "main");
        builder.let_("a", Node::constant(21));
        builder.let_("b", Node::constant(0));
        builder.let_("c", Node::call("compute", vec![]));
        builder.push(Node::ret(Node::lookup("a")));
        let mut function = builder.build().unwrap();

        let mut stats = OptStats::default();
        prune_unused(&mut function, &tables, &mut stats).unwrap();
        assert_eq!(stats.pruned, 1);
        let statements = &function.body.statements;
        assert!(matches!(statements[0], Node::Assignment(_)));
        assert!(statements[1].is_noop());
        assert!(matches!(statements[2], Node::Assignment(_)));
    }

    #[test]
    fn test_captured_names_count_as_reads() {
        let mut tables = ReferenceTables::new();
        let mut builder = FunctionBuilder::new(&mut tables, "main");
        builder.let_("k", Node::constant(3));
        builder.push(Node::ret(Node::closure_ref("__$$_main_closure_0", vec!["k".into()])));
        let mut function = builder.build().unwrap();

        let mut stats = OptStats::default();
        prune_unused(&mut function, &tables, &mut stats).unwrap();
        assert_eq!(stats.pruned, 0);
    }

    #[test]
    fn test_inline_keeps_shadowing_declarations_nested() {
        let mut tables = ReferenceTables::new();
        let root = tables.root();
        let outer = tables.fork(root);
        let shadow = tables.fork(outer);
        let free = tables.fork(outer);
        for (table, name) in [(root, "x"), (shadow, "x")] {
            tables.declare(table, LocalReference::new(name, ReferenceKind::Variable)).unwrap();
        }
        let mut block = Block::new(
            outer,
            vec![
                Node::Block(Block::new(shadow, vec![Node::var("x", Node::constant(1))])),
                Node::Block(Block::new(free, vec![Node::call("f", vec![])])),
                Node::call("println", vec![Node::lookup("x")]),
            ],
        );

        assert_eq!(inline_blocks(&mut block, &mut tables).unwrap(), 1);
        assert_eq!(block.statements.len(), 3);
        assert!(matches!(block.statements[0], Node::Block(_)));
        assert!(!tables.get(outer).unwrap().has_own("x"));
        assert_eq!(tables.declaring_table(outer, "x"), Some(root));
        assert_eq!(block.statements[1].parent(), Some(block.meta.id));
    }

    #[test]
    fn test_sole_nested_block_is_lifted() {
        let mut tables = ReferenceTables::new();
        let outer = tables.fork(tables.root());
        let inner = tables.fork(outer);
        tables.declare(inner, LocalReference::new("y", ReferenceKind::Variable)).unwrap();
        let mut block = Block::new(
            outer,
            vec![Node::Block(Block::new(
                inner,
                vec![Node::var("y", Node::constant(2)), Node::call("f", vec![])],
            ))],
        );

        assert_eq!(inline_blocks(&mut block, &mut tables).unwrap(), 1);
        assert_eq!(block.statements.len(), 2);
        assert!(tables.get(outer).unwrap().has_own("y"));
        assert_eq!(block.statements[1].parent(), Some(block.meta.id));
    }

    #[test]
    fn test_drop_noops_and_empty_blocks() {
        let mut block = Block::new(
            TableId(0),
            vec![
                Node::noop("gone"),
                Node::Block(Block::empty(TableId(0))),
                Node::ret(Node::null()),
            ],
        );
        assert_eq!(drop_noops(&mut block), 2);
        assert_eq!(block.statements.len(), 1);
    }
}

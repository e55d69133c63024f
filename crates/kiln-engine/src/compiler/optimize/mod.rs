//! IR optimizer
//!
//! Local rewrites applied bottom-up, one sweep at a time, until a sweep
//! changes nothing. Every rewrite either replaces a node through
//! `replace_element` or turns a statement into a no-op, so a sweep never has
//! to undo an earlier one and a second run over optimized IR is a no-op.

mod branches;
mod constant_fold;
mod prune;
mod returns;

use crate::compiler::ir::visitor::{walk_block, walk_node};
use crate::compiler::ir::{Block, Composite, Function, IrError, Module, Node, ReferenceTables, Visitor};
use crate::compiler::options::{CompilerOptions, OptLevel};
use std::fmt;

/// Upper bound on sweeps per function
const MAX_SWEEPS: usize = 64;

/// Counts of applied rewrites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptStats {
    pub folded: usize,
    pub short_circuited: usize,
    pub dead_branches: usize,
    pub unreachable: usize,
    pub returns_pushed_down: usize,
    pub returns_pushed_up: usize,
    pub pruned: usize,
    pub inlined_blocks: usize,
    pub removed_noops: usize,
    pub sweeps: usize,
}

impl OptStats {
    /// Total number of rewrites
    pub fn rewrites(&self) -> usize {
        self.folded
            + self.short_circuited
            + self.dead_branches
            + self.unreachable
            + self.returns_pushed_down
            + self.returns_pushed_up
            + self.pruned
            + self.inlined_blocks
            + self.removed_noops
    }

    fn absorb(&mut self, other: &OptStats) {
        self.folded += other.folded;
        self.short_circuited += other.short_circuited;
        self.dead_branches += other.dead_branches;
        self.unreachable += other.unreachable;
        self.returns_pushed_down += other.returns_pushed_down;
        self.returns_pushed_up += other.returns_pushed_up;
        self.pruned += other.pruned;
        self.inlined_blocks += other.inlined_blocks;
        self.removed_noops += other.removed_noops;
        self.sweeps += other.sweeps;
    }
}

impl fmt::Display for OptStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rewrite(s) in {} sweep(s): {} folded, {} short-circuited, {} dead branch(es), \
             {} unreachable, {} pushed down, {} pushed up, {} pruned",
            self.rewrites(),
            self.sweeps,
            self.folded,
            self.short_circuited,
            self.dead_branches,
            self.unreachable,
            self.returns_pushed_down,
            self.returns_pushed_up,
            self.pruned
        )
    }
}

/// Optimizer
#[derive(Debug, Clone)]
pub struct Optimizer {
    level: OptLevel,
}

impl Optimizer {
    pub fn new(options: &CompilerOptions) -> Self {
        Self {
            level: options.opt_level,
        }
    }

    /// Optimize every function of a module
    pub fn optimize_module(&self, module: &mut Module) -> Result<OptStats, IrError> {
        let mut stats = OptStats::default();
        if self.level == OptLevel::None {
            return Ok(stats);
        }
        let mut tables = std::mem::take(&mut module.tables);
        let mut result = Ok(());
        for function in module.all_functions_mut() {
            match optimize_function(function, &mut tables) {
                Ok(function_stats) => stats.absorb(&function_stats),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        module.tables = tables;
        result?;
        log::debug!("optimized module {}: {}", module.name, stats);
        Ok(stats)
    }
}

/// Sweep one function until it stops changing
pub fn optimize_function(function: &mut Function, tables: &mut ReferenceTables) -> Result<OptStats, IrError> {
    let mut stats = OptStats::default();
    for _ in 0..MAX_SWEEPS {
        let before = stats.rewrites();
        sweep(function, tables, &mut stats)?;
        stats.sweeps += 1;
        if stats.rewrites() == before {
            return Ok(stats);
        }
    }
    log::debug!("optimizer stopped after {} sweeps on {}", MAX_SWEEPS, function.name);
    Ok(stats)
}

fn sweep(function: &mut Function, tables: &mut ReferenceTables, stats: &mut OptStats) -> Result<(), IrError> {
    let mut simplifier = Simplifier { stats: &mut *stats };
    simplifier.visit_function(function)?;

    let mut statements = StatementRewriter { stats: &mut *stats };
    statements.visit_function(function)?;

    prune::prune_unused(function, tables, stats)?;

    let mut cleanup = Cleanup {
        tables: &mut *tables,
        stats: &mut *stats,
    };
    cleanup.visit_function(function)
}

/// Replace the direct children of `parent` for which `rewrite` yields a node
///
/// `rewrite` may move parts out of the child it inspects; the child is
/// displaced right after.
pub(crate) fn rewrite_children<C: Composite + ?Sized>(
    parent: &mut C,
    mut rewrite: impl FnMut(&mut Node) -> Option<Node>,
) -> Result<usize, IrError> {
    let mut replacements = Vec::new();
    for child in parent.children_mut() {
        if let Some(mut replacement) = rewrite(child) {
            if replacement.position().is_none() {
                replacement.meta_mut().position = child.position();
            }
            replacements.push((child.id(), replacement));
        }
    }
    let count = replacements.len();
    for (id, replacement) in replacements {
        parent.replace_element(id, replacement)?;
    }
    Ok(count)
}

// ============================================================================
// Expression rewrites
// ============================================================================

/// Folding, short-circuit simplification and dead-branch elimination
struct Simplifier<'s> {
    stats: &'s mut OptStats,
}

impl Simplifier<'_> {
    fn rewrite(&mut self, child: &mut Node) -> Option<Node> {
        if let Some(folded) = constant_fold::fold(child) {
            self.stats.folded += 1;
            return Some(folded);
        }
        if let Some(reduced) = constant_fold::short_circuit(child) {
            self.stats.short_circuited += 1;
            return Some(reduced);
        }
        if let Some(taken) = branches::dead_branch(child) {
            self.stats.dead_branches += 1;
            return Some(taken);
        }
        None
    }
}

impl Visitor for Simplifier<'_> {
    type Error = IrError;

    fn visit_node(&mut self, node: &mut Node) -> Result<(), IrError> {
        if let Node::Block(_) = node {
            return walk_node(self, node);
        }
        node.walk(self)?;
        rewrite_children(node, |child| self.rewrite(child))?;
        Ok(())
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        walk_block(self, block)?;
        rewrite_children(block, |child| self.rewrite(child))?;
        Ok(())
    }
}

// ============================================================================
// Statement rewrites
// ============================================================================

/// Unreachable-statement removal and return push-down/push-up
struct StatementRewriter<'s> {
    stats: &'s mut OptStats,
}

impl Visitor for StatementRewriter<'_> {
    type Error = IrError;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        walk_block(self, block)?;
        self.stats.unreachable += branches::remove_unreachable(block)?;
        self.stats.returns_pushed_down += returns::push_down(block)?;
        self.stats.returns_pushed_up += returns::push_up(block)?;
        Ok(())
    }
}

// ============================================================================
// Cleanup
// ============================================================================

/// Drops no-ops and empty blocks and inlines unconditional nested blocks
struct Cleanup<'s> {
    tables: &'s mut ReferenceTables,
    stats: &'s mut OptStats,
}

impl Visitor for Cleanup<'_> {
    type Error = IrError;

    fn visit_block(&mut self, block: &mut Block) -> Result<(), IrError> {
        walk_block(self, block)?;
        self.stats.inlined_blocks += prune::inline_blocks(block, self.tables)?;
        self.stats.removed_noops += prune::drop_noops(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionBuilder, Operator, PrettyPrint};

    fn optimize(module: &mut Module) -> OptStats {
        Optimizer::new(&CompilerOptions::default())
            .optimize_module(module)
            .unwrap()
    }

    fn single_function(build: impl FnOnce(&mut FunctionBuilder<'_>)) -> Module {
        let mut module = Module::new("demo");
        let mut builder = FunctionBuilder::new(&mut module.tables, "main");
        build(&mut builder);
        let function = builder.build().unwrap();
        module.add_function(function);
        module
    }

    #[test]
    fn test_nested_arithmetic_folds_to_literal() {
        let mut module = single_function(|f| {
            f.push(Node::ret(Node::binary(
                Operator::Plus,
                Node::binary(Operator::Times, Node::constant(320), Node::constant(42)),
                Node::constant(14),
            )));
        });
        let stats = optimize(&mut module);
        assert_eq!(stats.folded, 2);
        assert_eq!(
            module.functions[0].body.pretty_print(),
            "block\n  return\n    const 13454\n"
        );
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut module = single_function(|f| {
            f.var("x", Node::constant(0));
            let branch = f.body().if_else(
                Node::binary(Operator::Less, Node::constant(1), Node::constant(2)),
                |b| {
                    b.assign("x", Node::constant(1));
                },
                None,
            );
            f.push(branch);
            f.push(Node::ret(Node::lookup("x")));
            f.push(Node::call("println", vec![Node::constant("never")]));
        });
        let first = optimize(&mut module);
        assert!(first.rewrites() > 0);
        let dump = module.pretty_print();
        let second = optimize(&mut module);
        assert_eq!(second.rewrites(), 0);
        assert_eq!(second.sweeps, module.all_functions().len());
        assert_eq!(module.pretty_print(), dump);
    }

    #[test]
    fn test_opt_level_none_leaves_module_alone() {
        let mut module = single_function(|f| {
            f.push(Node::ret(Node::binary(Operator::Plus, Node::constant(1), Node::constant(2))));
        });
        let options = CompilerOptions {
            opt_level: OptLevel::None,
            ..CompilerOptions::default()
        };
        let stats = Optimizer::new(&options).optimize_module(&mut module).unwrap();
        assert_eq!(stats, OptStats::default());
        assert!(matches!(module.functions[0].body.statements[0], Node::Return(_)));
    }

    #[test]
    fn test_call_like_operators_are_kept() {
        let mut module = single_function(|f| {
            f.push(Node::ret(Node::binary(
                Operator::MethodCall,
                Node::constant("abc"),
                Node::constant(1),
            )));
        });
        let stats = optimize(&mut module);
        assert_eq!(stats.folded, 0);
    }
}

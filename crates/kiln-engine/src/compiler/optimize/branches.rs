//! Dead-branch elimination and unreachable-statement removal

use crate::compiler::ir::{Block, BreakKind, Composite, ConstValue, IrError, Node};

/// The taken branch of a conditional whose condition is a literal boolean
pub(super) fn dead_branch(node: &mut Node) -> Option<Node> {
    let Node::Conditional(conditional) = node else {
        return None;
    };
    let taken = conditional.condition.as_constant().and_then(ConstValue::as_bool)?;
    let replacement = if taken {
        std::mem::take(&mut *conditional.then_branch)
    } else {
        match conditional.else_branch.take() {
            Some(otherwise) => *otherwise,
            None => Node::noop("dead branch"),
        }
    };
    log::trace!("removed dead branch, kept {}", replacement.kind_name());
    Some(replacement)
}

/// Turn every statement after one that always leaves the block into a no-op
///
/// Returns the number of statements removed.
pub(super) fn remove_unreachable(block: &mut Block) -> Result<usize, IrError> {
    let Some(exit) = block.statements.iter().position(always_exits) else {
        return Ok(0);
    };
    let dead: Vec<_> = block.statements[exit + 1..]
        .iter()
        .filter(|s| !s.is_noop())
        .map(Node::id)
        .collect();
    for id in &dead {
        block.replace_element(*id, Node::noop("unreachable"))?;
    }
    Ok(dead.len())
}

/// Whether control never continues past `node`
fn always_exits(node: &Node) -> bool {
    match node {
        Node::Return(_) | Node::Throw(_) => true,
        Node::Block(block) => block.statements.iter().any(always_exits),
        Node::Conditional(conditional) => {
            always_exits(&conditional.then_branch)
                && conditional.else_branch.as_deref().map(always_exits).unwrap_or(false)
        }
        Node::Loop(lp) => {
            lp.condition.as_constant() == Some(&ConstValue::Bool(true)) && !breaks_out(&lp.body)
        }
        _ => false,
    }
}

/// Whether a `break` in `node` leaves the loop whose body it is
fn breaks_out(node: &Node) -> bool {
    match node {
        Node::LoopBreak(brk) => brk.kind == BreakKind::Break,
        Node::Loop(_) | Node::ClosureReference(_) => false,
        other => other.children().into_iter().any(breaks_out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::TableId;

    #[test]
    fn test_false_condition_without_else_becomes_noop() {
        let mut node = Node::conditional(
            Node::constant(false),
            Node::Block(Block::empty(TableId(0))),
            None,
        );
        assert!(dead_branch(&mut node).unwrap().is_noop());
    }

    #[test]
    fn test_non_literal_condition_is_kept() {
        let mut node = Node::conditional(
            Node::lookup("flag"),
            Node::Block(Block::empty(TableId(0))),
            None,
        );
        assert!(dead_branch(&mut node).is_none());
    }

    #[test]
    fn test_statements_after_return_are_removed() {
        let mut block = Block::new(
            TableId(0),
            vec![
                Node::call("first", vec![]),
                Node::ret(Node::constant(1)),
                Node::call("never", vec![]),
                Node::noop(""),
                Node::call("again", vec![]),
            ],
        );
        assert_eq!(remove_unreachable(&mut block).unwrap(), 2);
        assert!(block.statements[2].is_noop());
        assert!(block.statements[4].is_noop());
        assert_eq!(remove_unreachable(&mut block).unwrap(), 0);
    }

    #[test]
    fn test_infinite_loop_without_break_terminates_block() {
        let endless = Node::loop_(
            Node::constant(true),
            Node::Block(Block::new(TableId(0), vec![Node::call("tick", vec![])])),
        );
        assert!(always_exits(&endless));

        let exits = Node::loop_(
            Node::constant(true),
            Node::Block(Block::new(TableId(0), vec![Node::break_()])),
        );
        assert!(!always_exits(&exits));

        let nested_break = Node::loop_(
            Node::constant(true),
            Node::Block(Block::new(
                TableId(0),
                vec![Node::loop_(Node::lookup("c"), Node::break_())],
            )),
        );
        assert!(always_exits(&nested_break));
    }

    #[test]
    fn test_conditional_exits_only_when_both_branches_do() {
        let both = Node::conditional(
            Node::lookup("c"),
            Node::ret(Node::constant(1)),
            Some(Node::throw(Node::constant("e"))),
        );
        assert!(always_exits(&both));
        let one = Node::conditional(Node::lookup("c"), Node::ret(Node::constant(1)), None);
        assert!(!always_exits(&one));
    }
}

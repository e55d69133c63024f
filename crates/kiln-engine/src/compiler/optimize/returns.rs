//! Return push-down and push-up

use super::rewrite_children;
use crate::compiler::ir::{
    Assignment, Block, Composite, ConstValue, IrError, Node, ReferenceKind, TableId,
};

/// `return { ...; x }` becomes `{ ...; return x }`
pub(super) fn push_down(block: &mut Block) -> Result<usize, IrError> {
    rewrite_children(block, |child| {
        let Node::Return(ret) = child else {
            return None;
        };
        let Node::Block(inner) = ret.value.as_mut() else {
            return None;
        };
        if !matches!(inner.statements.last(), Some(Node::ReferenceLookup(_))) {
            return None;
        }
        let mut statements = std::mem::take(&mut inner.statements);
        let lookup = statements.pop()?;
        statements.push(Node::ret(lookup));
        log::trace!("pushed return down into block over {}", inner.table);
        Some(Node::Block(Block::new(inner.table, statements)))
    })
}

/// `x = <literal>; ...; return x` returns the literal directly
///
/// Only local variables qualify, and only when no conditional, loop or
/// try block between the assignment and the return may assign them.
pub(super) fn push_up(block: &mut Block) -> Result<usize, IrError> {
    let mut rewrites = Vec::new();
    for (i, statement) in block.statements.iter().enumerate() {
        let Node::Return(ret) = statement else {
            continue;
        };
        let Node::ReferenceLookup(lookup) = ret.value.as_ref() else {
            continue;
        };
        let Some(resolved) = lookup.resolved else {
            continue;
        };
        if resolved.kind != ReferenceKind::Variable {
            continue;
        }
        if let Search::Found(value) = last_assignment(&block.statements[..i], &lookup.name, resolved.table) {
            rewrites.push((i, lookup.meta.id, value));
        }
    }

    let count = rewrites.len();
    for (i, lookup_id, value) in rewrites {
        log::trace!("pushed {} up into return", value);
        block.statements[i].replace_element(lookup_id, Node::constant(value))?;
    }
    Ok(count)
}

enum Search {
    Found(ConstValue),
    Blocked,
    NotFound,
}

fn targets(assignment: &Assignment, name: &str, table: TableId) -> bool {
    assignment.name == name && assignment.resolved.map(|r| r.table == table).unwrap_or(true)
}

fn last_assignment(statements: &[Node], name: &str, table: TableId) -> Search {
    for statement in statements.iter().rev() {
        match statement {
            Node::Assignment(assignment) if targets(assignment, name, table) => {
                return match assignment.value.as_constant() {
                    Some(value) => Search::Found(value.clone()),
                    None => Search::Blocked,
                };
            }
            Node::Block(inner) => match last_assignment(&inner.statements, name, table) {
                Search::NotFound => continue,
                found => return found,
            },
            other if assigns(other, name, table) => return Search::Blocked,
            _ => {}
        }
    }
    Search::NotFound
}

/// Whether `node` contains an assignment to the reference
fn assigns(node: &Node, name: &str, table: TableId) -> bool {
    match node {
        Node::Assignment(assignment) if targets(assignment, name, table) => true,
        Node::ClosureReference(_) => false,
        other => other.children().into_iter().any(|c| assigns(c, name, table)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{ReferenceLookup, ResolvedRef};

    const T: TableId = TableId(1);

    fn resolved(kind: ReferenceKind) -> Option<ResolvedRef> {
        Some(ResolvedRef { table: T, index: 0, kind })
    }

    fn lookup(name: &str, kind: ReferenceKind) -> Node {
        let mut node = Node::lookup(name);
        if let Node::ReferenceLookup(ReferenceLookup { resolved: r, .. }) = &mut node {
            *r = resolved(kind);
        }
        node
    }

    fn assign(name: &str, value: Node, declaring: bool) -> Node {
        let mut node = if declaring { Node::var(name, value) } else { Node::assign(name, value) };
        if let Node::Assignment(a) = &mut node {
            a.resolved = resolved(ReferenceKind::Variable);
        }
        node
    }

    fn returned_constant(block: &Block) -> Option<ConstValue> {
        match block.statements.last()? {
            Node::Return(ret) => ret.value.as_constant().cloned(),
            _ => None,
        }
    }

    #[test]
    fn test_push_up_through_unconditional_block() {
        let mut block = Block::new(
            T,
            vec![
                assign("x", Node::constant(0), true),
                Node::Block(Block::new(TableId(2), vec![assign("x", Node::constant(1), false)])),
                Node::ret(lookup("x", ReferenceKind::Variable)),
            ],
        );
        assert_eq!(push_up(&mut block).unwrap(), 1);
        assert_eq!(returned_constant(&block), Some(ConstValue::Int(1)));
    }

    #[test]
    fn test_conditional_assignment_blocks_push_up() {
        let mut block = Block::new(
            T,
            vec![
                assign("x", Node::constant(0), true),
                Node::conditional(Node::lookup("c"), assign("x", Node::constant(1), false), None),
                Node::ret(lookup("x", ReferenceKind::Variable)),
            ],
        );
        assert_eq!(push_up(&mut block).unwrap(), 0);
    }

    #[test]
    fn test_constants_and_module_state_are_not_pushed() {
        let mut block = Block::new(
            T,
            vec![
                assign("x", Node::constant(0), true),
                Node::ret(lookup("x", ReferenceKind::ModuleVariable)),
            ],
        );
        assert_eq!(push_up(&mut block).unwrap(), 0);

        let mut block = Block::new(
            T,
            vec![
                assign("a", Node::constant(21), true),
                Node::ret(lookup("a", ReferenceKind::Constant)),
            ],
        );
        assert_eq!(push_up(&mut block).unwrap(), 0);
    }

    #[test]
    fn test_push_down_moves_return_inside_block() {
        let mut block = Block::new(
            T,
            vec![Node::ret(Node::Block(Block::new(
                TableId(2),
                vec![Node::call("work", vec![]), Node::lookup("result")],
            )))],
        );
        assert_eq!(push_down(&mut block).unwrap(), 1);
        let Node::Block(inner) = &block.statements[0] else {
            panic!("expected block");
        };
        assert_eq!(inner.table, TableId(2));
        assert!(matches!(inner.statements[1], Node::Return(_)));
        assert_eq!(push_down(&mut block).unwrap(), 0);
    }
}

//! Constant folding and short-circuit simplification

use crate::compiler::ir::{ConstValue, Node, Operator};
use std::cmp::Ordering;

/// Literal result of an operation whose operands are all literals
pub(super) fn fold(node: &mut Node) -> Option<Node> {
    let value = match node {
        Node::BinaryOperation(op) if !op.operator.is_call_like() && !op.operator.is_short_circuit() => {
            let left = op.left.as_constant()?;
            let right = op.right.as_constant()?;
            eval_binary(op.operator, left, right)?
        }
        Node::UnaryOperation(op) => eval_unary(op.operator, op.operand.as_constant()?)?,
        _ => return None,
    };
    log::trace!("folded {} into {}", node.kind_name(), value);
    Some(Node::constant(value))
}

/// `and`, `or` and `orIfNull` with a literal left operand
///
/// The right operand is moved out of `node` when it is the result.
pub(super) fn short_circuit(node: &mut Node) -> Option<Node> {
    let Node::BinaryOperation(op) = node else {
        return None;
    };
    let left = op.left.as_constant()?;
    let keep_left = match (op.operator, left) {
        (Operator::And, ConstValue::Bool(b)) => !*b,
        (Operator::Or, ConstValue::Bool(b)) => *b,
        (Operator::OrIfNull, value) => !value.is_null(),
        _ => return None,
    };
    let taken = if keep_left {
        std::mem::take(&mut *op.left)
    } else {
        std::mem::take(&mut *op.right)
    };
    log::trace!("short-circuited {}", op.operator);
    Some(taken)
}

/// Evaluate a binary operator on literals
///
/// `None` when the operation cannot be computed at compile time: overflow,
/// division by zero, or operand types the operator does not accept.
pub(super) fn eval_binary(operator: Operator, left: &ConstValue, right: &ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    match operator {
        Operator::Plus => match (left, right) {
            (Str(_), _) | (_, Str(_)) => Some(Str(format!("{}{}", text(left), text(right)))),
            (Int(a), Int(b)) => a.checked_add(*b).map(Int),
            _ => float_op(left, right, |a, b| a + b),
        },
        Operator::Minus => match (left, right) {
            (Int(a), Int(b)) => a.checked_sub(*b).map(Int),
            _ => float_op(left, right, |a, b| a - b),
        },
        Operator::Times => match (left, right) {
            (Int(a), Int(b)) => a.checked_mul(*b).map(Int),
            _ => float_op(left, right, |a, b| a * b),
        },
        Operator::Divide => match (left, right) {
            (Int(a), Int(b)) => a.checked_div(*b).map(Int),
            _ if as_float(right) == Some(0.0) => None,
            _ => float_op(left, right, |a, b| a / b),
        },
        Operator::Modulo => match (left, right) {
            (Int(a), Int(b)) => a.checked_rem(*b).map(Int),
            _ => None,
        },
        Operator::Equals => Some(Bool(literal_eq(left, right))),
        Operator::NotEquals => Some(Bool(!literal_eq(left, right))),
        Operator::Less => compare(left, right).map(|o| Bool(o == Ordering::Less)),
        Operator::LessOrEquals => compare(left, right).map(|o| Bool(o != Ordering::Greater)),
        Operator::More => compare(left, right).map(|o| Bool(o == Ordering::Greater)),
        Operator::MoreOrEquals => compare(left, right).map(|o| Bool(o != Ordering::Less)),
        Operator::Is | Operator::Isnt => {
            // Identity is only known for values without heap identity
            let same = match (left, right) {
                (Null, Null) => true,
                (Null, _) | (_, Null) => false,
                (Bool(a), Bool(b)) => a == b,
                _ => return None,
            };
            Some(Bool(if operator == Operator::Is { same } else { !same }))
        }
        _ => None,
    }
}

/// Evaluate a unary operator on a literal
pub(super) fn eval_unary(operator: Operator, operand: &ConstValue) -> Option<ConstValue> {
    match (operator, operand) {
        (Operator::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (Operator::Minus, ConstValue::Int(i)) => i.checked_neg().map(ConstValue::Int),
        (Operator::Minus, ConstValue::Float(x)) => Some(ConstValue::Float(-x)),
        _ => None,
    }
}

fn text(value: &ConstValue) -> String {
    match value {
        ConstValue::Str(s) => s.clone(),
        ConstValue::Char(c) => c.to_string(),
        other => other.to_string(),
    }
}

fn as_float(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Int(i) => Some(*i as f64),
        ConstValue::Float(x) => Some(*x),
        _ => None,
    }
}

/// Arithmetic with at least one float operand
fn float_op(left: &ConstValue, right: &ConstValue, op: impl Fn(f64, f64) -> f64) -> Option<ConstValue> {
    if !matches!(left, ConstValue::Float(_)) && !matches!(right, ConstValue::Float(_)) {
        return None;
    }
    let result = op(as_float(left)?, as_float(right)?);
    result.is_finite().then_some(ConstValue::Float(result))
}

fn literal_eq(left: &ConstValue, right: &ConstValue) -> bool {
    match (as_float(left), as_float(right)) {
        (Some(a), Some(b)) if left.type_name() != right.type_name() => a == b,
        _ => left == right,
    }
}

fn compare(left: &ConstValue, right: &ConstValue) -> Option<Ordering> {
    match (left, right) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Some(a.cmp(b)),
        (ConstValue::Str(a), ConstValue::Str(b)) => Some(a.cmp(b)),
        (ConstValue::Char(a), ConstValue::Char(b)) => Some(a.cmp(b)),
        _ => as_float(left)?.partial_cmp(&as_float(right)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> ConstValue {
        ConstValue::Int(i)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval_binary(Operator::Times, &int(320), &int(42)), Some(int(13440)));
        assert_eq!(eval_binary(Operator::Modulo, &int(7), &int(3)), Some(int(1)));
        assert_eq!(eval_binary(Operator::Divide, &int(7), &int(2)), Some(int(3)));
    }

    #[test]
    fn test_failures_leave_operation_unfolded() {
        assert_eq!(eval_binary(Operator::Divide, &int(1), &int(0)), None);
        assert_eq!(eval_binary(Operator::Plus, &int(i64::MAX), &int(1)), None);
        assert_eq!(eval_binary(Operator::Minus, &ConstValue::Bool(true), &int(1)), None);
        assert_eq!(eval_binary(Operator::Divide, &ConstValue::Float(1.0), &int(0)), None);
        assert_eq!(eval_unary(Operator::Minus, &int(i64::MIN)), None);
    }

    #[test]
    fn test_mixed_numbers_promote_to_float() {
        assert_eq!(
            eval_binary(Operator::Plus, &int(1), &ConstValue::Float(0.5)),
            Some(ConstValue::Float(1.5))
        );
        assert_eq!(
            eval_binary(Operator::Equals, &int(2), &ConstValue::Float(2.0)),
            Some(ConstValue::Bool(true))
        );
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval_binary(Operator::Plus, &ConstValue::Str("n=".into()), &int(3)),
            Some(ConstValue::Str("n=3".into()))
        );
        assert_eq!(
            eval_binary(Operator::Plus, &ConstValue::Char('a'), &ConstValue::Str("b".into())),
            Some(ConstValue::Str("ab".into()))
        );
    }

    #[test]
    fn test_comparisons_and_identity() {
        assert_eq!(eval_binary(Operator::Less, &int(1), &int(2)), Some(ConstValue::Bool(true)));
        assert_eq!(
            eval_binary(Operator::MoreOrEquals, &ConstValue::Str("a".into()), &ConstValue::Str("b".into())),
            Some(ConstValue::Bool(false))
        );
        assert_eq!(
            eval_binary(Operator::Isnt, &ConstValue::Null, &int(1)),
            Some(ConstValue::Bool(true))
        );
        assert_eq!(eval_binary(Operator::Is, &int(1), &int(1)), None);
    }

    #[test]
    fn test_short_circuit_keeps_unevaluated_operand() {
        let mut node = Node::binary(Operator::And, Node::constant(true), Node::lookup("x"));
        let reduced = short_circuit(&mut node).unwrap();
        assert!(matches!(reduced, Node::ReferenceLookup(ref l) if l.name == "x"));

        let mut node = Node::binary(Operator::Or, Node::constant(true), Node::lookup("x"));
        assert_eq!(short_circuit(&mut node).unwrap().as_constant(), Some(&ConstValue::Bool(true)));

        let mut node = Node::binary(Operator::OrIfNull, Node::null(), Node::constant(4));
        assert_eq!(short_circuit(&mut node).unwrap().as_constant(), Some(&int(4)));

        let mut node = Node::binary(Operator::And, Node::lookup("y"), Node::constant(true));
        assert!(short_circuit(&mut node).is_none());
    }

    #[test]
    fn test_fold_skips_short_circuit_operators() {
        let mut node = Node::binary(Operator::And, Node::constant(true), Node::constant(false));
        assert!(fold(&mut node).is_none());
        let mut node = Node::not(Node::constant(false));
        assert_eq!(fold(&mut node).unwrap().as_constant(), Some(&ConstValue::Bool(true)));
    }
}

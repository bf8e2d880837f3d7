//! Expression AST and the recursive evaluator.

use crate::value::{Tuple, Value};
use marrow_common::{MarrowError, Result};
use std::cmp::Ordering;

/// Binary operators over values.
///
/// Comparisons and logical operators produce integer 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

/// An expression tree evaluated against one tuple.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference, resolved by name against the input columns.
    Identifier(String),
    /// Integer literal.
    Number(i64),
    /// String literal.
    String(String),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Convenience constructor for binary expressions.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Column reference.
    pub fn ident(name: &str) -> Self {
        Expr::Identifier(name.to_string())
    }
}

/// Evaluates an expression against a tuple with the given column names.
pub fn evaluate(expr: &Expr, tuple: &Tuple, columns: &[String]) -> Result<Value> {
    match expr {
        Expr::Identifier(name) => {
            let index = columns
                .iter()
                .position(|column| column == name)
                .ok_or_else(|| MarrowError::ColumnNotFound(name.clone()))?;
            tuple.get(index).cloned().ok_or_else(|| {
                MarrowError::ExecutionError(format!("column index out of bounds: {}", name))
            })
        }
        Expr::Number(n) => Ok(Value::Int(*n)),
        Expr::String(s) => Ok(Value::Str(s.clone())),
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, tuple, columns)?;
            let rhs = evaluate(right, tuple, columns)?;
            apply_binary(*op, lhs, rhs)
        }
    }
}

/// Evaluates a predicate expression: non-zero integers are true, strings
/// are true.
pub fn evaluate_predicate(expr: &Expr, tuple: &Tuple, columns: &[String]) -> Result<bool> {
    Ok(evaluate(expr, tuple, columns)?.is_truthy())
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::*;

    match op {
        Add => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            // Mixed addition concatenates, coercing integers to text.
            _ => Ok(Value::Str(lhs.to_text() + &rhs.to_text())),
        },
        Sub => Ok(Value::Int(lhs.as_int()? - rhs.as_int()?)),
        Mul => Ok(Value::Int(lhs.as_int()? * rhs.as_int()?)),
        Div => {
            let divisor = rhs.as_int()?;
            if divisor == 0 {
                return Err(MarrowError::ExecutionError("division by zero".to_string()));
            }
            Ok(Value::Int(lhs.as_int()? / divisor))
        }
        Eq => Ok(bool_value(compare(&lhs, &rhs) == Some(Ordering::Equal))),
        Ne => Ok(bool_value(compare(&lhs, &rhs) != Some(Ordering::Equal))),
        Lt => Ok(bool_value(compare(&lhs, &rhs) == Some(Ordering::Less))),
        Gt => Ok(bool_value(compare(&lhs, &rhs) == Some(Ordering::Greater))),
        Le => Ok(bool_value(matches!(
            compare(&lhs, &rhs),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ))),
        Ge => Ok(bool_value(matches!(
            compare(&lhs, &rhs),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ))),
        And => Ok(bool_value(lhs.as_int()? != 0 && rhs.as_int()? != 0)),
        Or => Ok(bool_value(lhs.as_int()? != 0 || rhs.as_int()? != 0)),
    }
}

/// Compares two values of the same kind; mixed kinds do not compare.
fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(if b { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr) -> Value {
        evaluate(expr, &vec![], &[]).unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval(&Expr::Number(5)), Value::Int(5));
        assert_eq!(
            eval(&Expr::String("x".to_string())),
            Value::Str("x".to_string())
        );
    }

    #[test]
    fn test_identifier_resolution() {
        let tuple = vec![Value::Int(1), Value::Str("ann".to_string())];
        let columns = vec!["id".to_string(), "name".to_string()];

        assert_eq!(
            evaluate(&Expr::ident("name"), &tuple, &columns).unwrap(),
            Value::Str("ann".to_string())
        );
        assert!(matches!(
            evaluate(&Expr::ident("missing"), &tuple, &columns).unwrap_err(),
            MarrowError::ColumnNotFound(_)
        ));
    }

    #[test]
    fn test_arithmetic() {
        let expr = Expr::binary(BinaryOp::Add, Expr::Number(2), Expr::Number(3));
        assert_eq!(eval(&expr), Value::Int(5));

        let expr = Expr::binary(BinaryOp::Sub, Expr::Number(2), Expr::Number(3));
        assert_eq!(eval(&expr), Value::Int(-1));

        let expr = Expr::binary(BinaryOp::Mul, Expr::Number(4), Expr::Number(3));
        assert_eq!(eval(&expr), Value::Int(12));

        let expr = Expr::binary(BinaryOp::Div, Expr::Number(9), Expr::Number(2));
        assert_eq!(eval(&expr), Value::Int(4));
    }

    #[test]
    fn test_division_by_zero() {
        let expr = Expr::binary(BinaryOp::Div, Expr::Number(1), Expr::Number(0));
        assert!(matches!(
            evaluate(&expr, &vec![], &[]).unwrap_err(),
            MarrowError::ExecutionError(_)
        ));
    }

    #[test]
    fn test_string_concatenation() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::String("id-".to_string()),
            Expr::Number(7),
        );
        assert_eq!(eval(&expr), Value::Str("id-7".to_string()));
    }

    #[test]
    fn test_comparisons_yield_zero_one() {
        let lt = Expr::binary(BinaryOp::Lt, Expr::Number(1), Expr::Number(2));
        assert_eq!(eval(&lt), Value::Int(1));

        let gt = Expr::binary(BinaryOp::Gt, Expr::Number(1), Expr::Number(2));
        assert_eq!(eval(&gt), Value::Int(0));

        let le = Expr::binary(BinaryOp::Le, Expr::Number(2), Expr::Number(2));
        assert_eq!(eval(&le), Value::Int(1));

        let ge = Expr::binary(BinaryOp::Ge, Expr::Number(1), Expr::Number(2));
        assert_eq!(eval(&ge), Value::Int(0));

        let eq = Expr::binary(
            BinaryOp::Eq,
            Expr::String("a".to_string()),
            Expr::String("a".to_string()),
        );
        assert_eq!(eval(&eq), Value::Int(1));

        let ne = Expr::binary(
            BinaryOp::Ne,
            Expr::String("a".to_string()),
            Expr::String("b".to_string()),
        );
        assert_eq!(eval(&ne), Value::Int(1));
    }

    #[test]
    fn test_mixed_kind_comparison() {
        let eq = Expr::binary(BinaryOp::Eq, Expr::Number(1), Expr::String("1".to_string()));
        assert_eq!(eval(&eq), Value::Int(0));

        let ne = Expr::binary(BinaryOp::Ne, Expr::Number(1), Expr::String("1".to_string()));
        assert_eq!(eval(&ne), Value::Int(1));
    }

    #[test]
    fn test_logical_operators() {
        let and = Expr::binary(BinaryOp::And, Expr::Number(1), Expr::Number(0));
        assert_eq!(eval(&and), Value::Int(0));

        let or = Expr::binary(BinaryOp::Or, Expr::Number(1), Expr::Number(0));
        assert_eq!(eval(&or), Value::Int(1));
    }

    #[test]
    fn test_predicate_truthiness() {
        let tuple = vec![Value::Int(30)];
        let columns = vec!["age".to_string()];
        let predicate = Expr::binary(BinaryOp::Gt, Expr::ident("age"), Expr::Number(18));

        assert!(evaluate_predicate(&predicate, &tuple, &columns).unwrap());

        let strict = Expr::binary(BinaryOp::Gt, Expr::ident("age"), Expr::Number(40));
        assert!(!evaluate_predicate(&strict, &tuple, &columns).unwrap());
    }
}

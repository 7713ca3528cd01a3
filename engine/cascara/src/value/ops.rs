use super::serialize::concat_text;
use super::{inspect_value, SassString, Value};
use crate::error::{CompileError, CompileResult, Span};

/// SassScript binary operators. `and`/`or` short-circuit in the evaluator
/// and never reach the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Div,
    Rem,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Div,
    Not,
}

fn undefined_operation(op: &str, left: &Value, right: &Value, span: Span) -> CompileError {
    CompileError::runtime(
        format!(
            "Undefined operation \"{} {op} {}\".",
            inspect_value(left),
            inspect_value(right)
        ),
        span,
    )
}

fn incompatible_units(left: &Value, right: &Value, span: Span) -> CompileError {
    CompileError::runtime(
        format!(
            "Incompatible units: {} and {}.",
            inspect_value(left),
            inspect_value(right)
        ),
        span,
    )
}

fn reject_calculation(op: &str, left: &Value, right: &Value, span: Span) -> CompileResult<()> {
    if matches!(left, Value::Calculation(_)) || matches!(right, Value::Calculation(_)) {
        Err(undefined_operation(op, left, right, span))
    } else {
        Ok(())
    }
}

/// The operator dispatch matrix of the value algebra. `/` is handled by the
/// evaluator so division can carry the slash-deprecation bookkeeping; the
/// non-numeric fallback lives in [`slash_fallback`].
pub fn binary_operation(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    span: Span,
) -> CompileResult<Value> {
    match op {
        BinaryOp::Plus => add(left, right, span),
        BinaryOp::Minus => subtract(left, right, span),
        BinaryOp::Times => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a.multiply(b))),
            _ => Err(undefined_operation("*", left, right, span)),
        },
        BinaryOp::Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => a
                .modulo(b)
                .map(Value::Number)
                .ok_or_else(|| incompatible_units(left, right, span)),
            _ => Err(undefined_operation("%", left, right, span)),
        },
        BinaryOp::Eq => Ok(Value::bool(left == right)),
        BinaryOp::Neq => Ok(Value::bool(left != right)),
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            compare(op, left, right, span)
        }
        BinaryOp::Div | BinaryOp::And | BinaryOp::Or => {
            unreachable!("handled by the evaluator")
        }
    }
}

fn add(left: &Value, right: &Value, span: Span) -> CompileResult<Value> {
    if let (Value::Number(a), Value::Number(b)) = (left, right) {
        return a
            .add(b)
            .map(Value::Number)
            .ok_or_else(|| incompatible_units(left, right, span));
    }
    // A string left operand concatenates with anything, calculations
    // included; only the residual stringify-both rule rejects them.
    if let Value::String(string) = left {
        let mut text = string.text.clone();
        text.push_str(&concat_text(right)?);
        return Ok(Value::String(SassString {
            text,
            quoted: string.quoted,
        }));
    }
    reject_calculation("+", left, right, span)?;
    // Neither side drives a numeric rule: stringify both, unquoted.
    let mut text = concat_text(left)?;
    text.push_str(&concat_text(right)?);
    Ok(Value::unquoted_string(text))
}

fn subtract(left: &Value, right: &Value, span: Span) -> CompileResult<Value> {
    if let (Value::Number(a), Value::Number(b)) = (left, right) {
        return a
            .subtract(b)
            .map(Value::Number)
            .ok_or_else(|| incompatible_units(left, right, span));
    }
    reject_calculation("-", left, right, span)?;
    let mut text = concat_text(left)?;
    text.push('-');
    text.push_str(&concat_text(right)?);
    Ok(Value::unquoted_string(text))
}

/// The non-numeric fallback of `/`: `"L/R"`, unquoted.
pub fn slash_fallback(left: &Value, right: &Value) -> CompileResult<Value> {
    let mut text = concat_text(left)?;
    text.push('/');
    text.push_str(&concat_text(right)?);
    Ok(Value::unquoted_string(text))
}

fn compare(op: BinaryOp, left: &Value, right: &Value, span: Span) -> CompileResult<Value> {
    let symbol = match op {
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        _ => unreachable!(),
    };
    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return Err(undefined_operation(symbol, left, right, span));
    };
    let ordering = a
        .compare(b)
        .ok_or_else(|| incompatible_units(left, right, span))?;
    use std::cmp::Ordering;
    Ok(Value::bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Lte => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Gte => ordering != Ordering::Less,
        _ => unreachable!(),
    }))
}

pub fn unary_operation(op: UnaryOp, operand: &Value, span: Span) -> CompileResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::bool(!operand.is_truthy())),
        UnaryOp::Minus => match operand {
            Value::Number(number) => Ok(Value::Number(number.negate())),
            Value::Calculation(_) => Err(CompileError::runtime(
                format!("Undefined operation \"-{}\".", inspect_value(operand)),
                span,
            )),
            other => Ok(Value::unquoted_string(format!("-{}", concat_text(other)?))),
        },
        UnaryOp::Plus => match operand {
            Value::Number(number) => Ok(Value::Number(number.clone())),
            Value::Calculation(_) => Err(CompileError::runtime(
                format!("Undefined operation \"+{}\".", inspect_value(operand)),
                span,
            )),
            other => Ok(Value::unquoted_string(format!("+{}", concat_text(other)?))),
        },
        UnaryOp::Div => Ok(Value::unquoted_string(format!(
            "/{}",
            concat_text(operand)?
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::Number;
    use super::*;

    fn op(op: BinaryOp, left: Value, right: Value) -> CompileResult<Value> {
        binary_operation(op, &left, &right, Span::default())
    }

    #[test]
    fn string_concatenation_keeps_left_quoting() {
        let quoted = op(
            BinaryOp::Plus,
            Value::quoted_string("a"),
            Value::unquoted_string("b"),
        )
        .expect("concat");
        let Value::String(string) = quoted else {
            panic!("expected string");
        };
        assert_eq!(string.text, "ab");
        assert!(string.quoted);

        let unquoted = op(
            BinaryOp::Plus,
            Value::unquoted_string("a"),
            Value::quoted_string("b"),
        )
        .expect("concat");
        let Value::String(string) = unquoted else {
            panic!("expected string");
        };
        assert!(!string.quoted);
    }

    #[test]
    fn arithmetic_on_calculations_is_undefined() {
        use super::super::{Calculation, CalculationArg};
        let calc = Value::Calculation(Calculation::new(
            "calc",
            vec![CalculationArg::Text("var(--x)".into())],
        ));
        assert!(op(BinaryOp::Plus, calc.clone(), Value::Number(Number::new(1.0))).is_err());
        assert!(op(BinaryOp::Minus, Value::Number(Number::new(1.0)), calc).is_err());
    }

    #[test]
    fn string_left_operands_concatenate_even_with_calculations() {
        use super::super::{Calculation, CalculationArg};
        let calc = Value::Calculation(Calculation::new(
            "calc",
            vec![CalculationArg::Text("var(--x)".into())],
        ));
        let joined = op(BinaryOp::Plus, Value::quoted_string("w"), calc).expect("concat");
        let Value::String(string) = joined else {
            panic!("expected string");
        };
        assert_eq!(string.text, "wcalc(var(--x))");
        assert!(string.quoted);
    }

    #[test]
    fn multiplication_requires_numbers() {
        let err = op(
            BinaryOp::Times,
            Value::unquoted_string("a"),
            Value::Number(Number::new(2.0)),
        )
        .expect_err("undefined");
        assert!(err.to_string().contains("Undefined operation"));
    }

    #[test]
    fn comparisons_need_compatible_units() {
        let ok = op(
            BinaryOp::Lt,
            Value::Number(Number::with_unit(1.0, "cm")),
            Value::Number(Number::with_unit(1.0, "in")),
        )
        .expect("comparable");
        assert_eq!(ok, Value::TRUE);

        assert!(op(
            BinaryOp::Lt,
            Value::Number(Number::with_unit(1.0, "s")),
            Value::Number(Number::with_unit(1.0, "px")),
        )
        .is_err());
    }

    #[test]
    fn minus_on_non_numbers_is_lexical() {
        let joined = op(
            BinaryOp::Minus,
            Value::unquoted_string("sans"),
            Value::unquoted_string("serif"),
        )
        .expect("lexical");
        assert_eq!(joined, Value::unquoted_string("sans-serif"));
    }
}

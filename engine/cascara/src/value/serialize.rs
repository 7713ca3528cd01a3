use std::fmt::Write;

use super::{Calculation, CalculationArg, Color, ListSeparator, Number, SassString, Value};
use crate::error::{CompileError, CompileResult, Span};

/// Write a value the way it appears in css output. Fails for values that
/// have no css representation (maps, function references, bare null).
pub fn write_value(value: &Value, out: &mut String, compressed: bool) -> CompileResult<()> {
    match value {
        Value::Null => Err(no_css_value(value)),
        Value::Bool(true) => {
            out.push_str("true");
            Ok(())
        }
        Value::Bool(false) => {
            out.push_str("false");
            Ok(())
        }
        Value::Number(number) => write_number(number, out, compressed),
        Value::Color(color) => {
            write_color(color, out, compressed);
            Ok(())
        }
        Value::String(string) => {
            write_string(string, out);
            Ok(())
        }
        Value::List(list) => {
            if list.elements.is_empty() && !list.bracketed {
                return Err(no_css_value(value));
            }
            write_elements(
                &list.elements,
                list.separator,
                list.bracketed,
                out,
                compressed,
            )
        }
        Value::ArgList(args) => {
            write_elements(&args.elements, args.separator, false, out, compressed)
        }
        Value::Map(_) | Value::Function(_) | Value::Mixin(_) => Err(no_css_value(value)),
        Value::Calculation(calculation) => {
            write_calculation(calculation, out, compressed);
            Ok(())
        }
    }
}

fn no_css_value(value: &Value) -> CompileError {
    CompileError::runtime(
        format!("{} isn't a valid CSS value.", inspect_value(value)),
        Span::default(),
    )
}

/// Write a value for error messages, `@debug` and `meta.inspect`: lossless,
/// never fails.
pub fn inspect_value(value: &Value) -> String {
    let mut out = String::new();
    inspect_into(value, &mut out);
    out
}

fn inspect_into(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => inspect_number(number, out),
        Value::Color(color) => write_color(color, out, false),
        Value::String(string) => write_string(string, out),
        Value::List(list) => {
            if list.elements.is_empty() && !list.bracketed {
                out.push_str("()");
                return;
            }
            let (open, close) = if list.bracketed { ("[", "]") } else { ("", "") };
            out.push_str(open);
            if list.elements.len() == 1 && list.separator == ListSeparator::Comma {
                inspect_into(&list.elements[0], out);
                out.push(',');
            } else {
                for (index, element) in list.elements.iter().enumerate() {
                    if index > 0 {
                        out.push_str(separator_text(list.separator, false));
                    }
                    let needs_parens = matches!(
                        element,
                        Value::List(inner)
                            if !inner.bracketed
                                && inner.separator == ListSeparator::Comma
                                && !inner.elements.is_empty()
                    );
                    if needs_parens {
                        out.push('(');
                        inspect_into(element, out);
                        out.push(')');
                    } else {
                        inspect_into(element, out);
                    }
                }
            }
            out.push_str(close);
        }
        Value::ArgList(args) => {
            inspect_into(
                &Value::List(super::List::new(args.elements.clone(), args.separator)),
                out,
            );
        }
        Value::Map(map) => {
            out.push('(');
            for (index, (key, entry)) in map.entries().iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                inspect_into(key, out);
                out.push_str(": ");
                inspect_into(entry, out);
            }
            out.push(')');
        }
        Value::Calculation(calculation) => write_calculation(calculation, out, false),
        Value::Function(callable) => {
            let _ = write!(out, "get-function(\"{}\")", callable.name());
        }
        Value::Mixin(callable) => {
            let _ = write!(out, "get-mixin(\"{}\")", callable.name());
        }
    }
}

fn separator_text(separator: ListSeparator, compressed: bool) -> &'static str {
    match (separator, compressed) {
        (ListSeparator::Comma, false) => ", ",
        (ListSeparator::Comma, true) => ",",
        (ListSeparator::Slash, false) => " / ",
        (ListSeparator::Slash, true) => "/",
        _ => " ",
    }
}

fn write_elements(
    elements: &[Value],
    separator: ListSeparator,
    bracketed: bool,
    out: &mut String,
    compressed: bool,
) -> CompileResult<()> {
    if bracketed {
        out.push('[');
    }
    let mut first = true;
    for element in elements {
        // Null elements disappear from css output.
        if matches!(element, Value::Null) {
            continue;
        }
        if !first {
            out.push_str(separator_text(separator, compressed));
        }
        first = false;
        write_value(element, out, compressed)?;
    }
    if bracketed {
        out.push(']');
    }
    Ok(())
}

/// Inspect rendering never fails: compound units print symbolically.
fn inspect_number(number: &Number, out: &mut String) {
    if let Some((numerator, denominator)) = number.as_slash() {
        inspect_number(numerator, out);
        out.push('/');
        inspect_number(denominator, out);
        return;
    }
    number.write_value(out, false);
    out.push_str(&number.unit_string());
}

fn write_number(number: &Number, out: &mut String, compressed: bool) -> CompileResult<()> {
    if let Some((numerator, denominator)) = number.as_slash() {
        write_number(numerator, out, compressed)?;
        out.push('/');
        return write_number(denominator, out, compressed);
    }
    if number.numerator_units.len() > 1 || !number.denominator_units.is_empty() {
        return Err(CompileError::runtime(
            format!(
                "{}{} isn't a valid CSS value.",
                number.value,
                number.unit_string()
            ),
            Span::default(),
        ));
    }
    number.write_value(out, compressed);
    out.push_str(&number.unit_string());
    Ok(())
}

fn write_color(color: &Color, out: &mut String, compressed: bool) {
    let (red, green, blue) = color.rounded_channels();
    let alpha = color.alpha();
    if alpha >= 1.0 {
        let foldable =
            red >> 4 == red & 0xf && green >> 4 == green & 0xf && blue >> 4 == blue & 0xf;
        if compressed && foldable {
            let _ = write!(out, "#{:x}{:x}{:x}", red & 0xf, green & 0xf, blue & 0xf);
        } else {
            let _ = write!(out, "#{red:02x}{green:02x}{blue:02x}");
        }
    } else {
        let mut alpha_text = String::new();
        Number::new(alpha).write_value(&mut alpha_text, compressed);
        if compressed {
            let _ = write!(out, "rgba({red},{green},{blue},{alpha_text})");
        } else {
            let _ = write!(out, "rgba({red}, {green}, {blue}, {alpha_text})");
        }
    }
}

fn write_string(string: &SassString, out: &mut String) {
    if !string.quoted {
        out.push_str(&string.text);
        return;
    }
    let quote = if string.text.contains('"') && !string.text.contains('\'') {
        '\''
    } else {
        '"'
    };
    out.push(quote);
    for ch in string.text.chars() {
        if ch == quote || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push(quote);
}

fn write_calculation(calculation: &Calculation, out: &mut String, compressed: bool) {
    out.push_str(&calculation.name);
    out.push('(');
    for (index, arg) in calculation.args.iter().enumerate() {
        if index > 0 {
            out.push_str(if compressed { "," } else { ", " });
        }
        write_calculation_arg(arg, out, compressed, false);
    }
    out.push(')');
}

fn write_calculation_arg(
    arg: &CalculationArg,
    out: &mut String,
    compressed: bool,
    parenthesize: bool,
) {
    match arg {
        CalculationArg::Number(number) => {
            let _ = write_number(number, out, compressed);
        }
        CalculationArg::Text(text) => out.push_str(text),
        CalculationArg::Operation { op, lhs, rhs } => {
            if parenthesize {
                out.push('(');
            }
            let nested = |side: &CalculationArg| {
                matches!(side, CalculationArg::Operation { op: inner, .. }
                    if matches!(inner, super::CalcOp::Plus | super::CalcOp::Minus)
                        && matches!(op, super::CalcOp::Times | super::CalcOp::Div))
            };
            write_calculation_arg(lhs, out, compressed, nested(lhs));
            let _ = write!(out, " {} ", op.symbol());
            write_calculation_arg(rhs, out, compressed, nested(rhs));
            if parenthesize {
                out.push(')');
            }
        }
        CalculationArg::Calculation(inner) => write_calculation(inner, out, compressed),
    }
}

/// Serialize for string concatenation: unquoted, null disappears.
pub(crate) fn concat_text(value: &Value) -> CompileResult<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(string) => Ok(string.text.clone()),
        other => {
            let mut out = String::new();
            write_value(other, &mut out, false)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::List;
    use super::*;

    fn css(value: &Value) -> String {
        let mut out = String::new();
        write_value(value, &mut out, false).expect("css value");
        out
    }

    #[test]
    fn numbers_trim_trailing_zeros() {
        assert_eq!(css(&Value::Number(Number::new(1.5))), "1.5");
        assert_eq!(css(&Value::Number(Number::with_unit(96.0, "px"))), "96px");
    }

    #[test]
    fn compressed_numbers_drop_leading_zero() {
        let mut out = String::new();
        Number::new(0.5).write_value(&mut out, true);
        assert_eq!(out, ".5");
    }

    #[test]
    fn colors_fold_to_short_hex_only_when_compressed() {
        let color = Value::Color(Color::rgb(255.0, 0.0, 0.0, 1.0));
        assert_eq!(css(&color), "#ff0000");
        let mut out = String::new();
        write_value(&color, &mut out, true).expect("css value");
        assert_eq!(out, "#f00");
    }

    #[test]
    fn null_elements_disappear_from_css_lists() {
        let list = Value::List(List::new(
            vec![
                Value::Number(Number::with_unit(1.0, "px")),
                Value::Null,
                Value::Number(Number::with_unit(2.0, "px")),
            ],
            ListSeparator::Space,
        ));
        assert_eq!(css(&list), "1px 2px");
    }

    #[test]
    fn inspect_is_lossless_for_maps_and_quotes() {
        let mut map = super::super::SassMap::new();
        map.insert(Value::quoted_string("a"), Value::Number(Number::new(1.0)));
        assert_eq!(inspect_value(&Value::Map(map)), "(\"a\": 1)");
        assert_eq!(inspect_value(&Value::Null), "null");
    }
}

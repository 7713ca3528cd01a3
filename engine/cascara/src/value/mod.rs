mod calculation;
mod color;
mod number;
mod ops;
mod serialize;

use std::hash::{Hash, Hasher};

pub use calculation::{CalcOp, Calculation, CalculationArg};
pub use color::Color;
pub use number::{fuzzy_equals, Number, EPSILON};
pub use ops::{binary_operation, slash_fallback, unary_operation, BinaryOp, UnaryOp};
pub use serialize::{inspect_value, write_value};

use crate::error::{CompileError, CompileResult, Span};
use crate::module::Callable;

/// A SassScript string. Quoted and unquoted strings with the same text are
/// the same value; quoting only affects serialization.
#[derive(Clone, Debug)]
pub struct SassString {
    pub text: String,
    pub quoted: bool,
}

impl SassString {
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    /// An unquoted string whose content is a css function call that
    /// shadowed built-ins must treat as numeric: `calc(...)`, `var(...)`,
    /// `env(...)`, `min(...)`, `max(...)`, `clamp(...)`.
    pub fn is_special_number(&self) -> bool {
        if self.quoted {
            return false;
        }
        let lower = self.text.to_ascii_lowercase();
        ["calc(", "var(", "env(", "min(", "max(", "clamp("]
            .iter()
            .any(|prefix| lower.starts_with(prefix))
    }
}

/// Separator of a SassScript list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ListSeparator {
    Space,
    Comma,
    Slash,
    /// Lists of fewer than two elements that were never written with an
    /// explicit separator.
    #[default]
    Undecided,
}

impl ListSeparator {
    pub fn name(self) -> &'static str {
        match self {
            ListSeparator::Space => "space",
            ListSeparator::Comma => "comma",
            ListSeparator::Slash => "slash",
            ListSeparator::Undecided => "auto",
        }
    }
}

#[derive(Clone, Debug)]
pub struct List {
    pub elements: Vec<Value>,
    pub separator: ListSeparator,
    pub bracketed: bool,
}

impl List {
    pub fn new(elements: Vec<Value>, separator: ListSeparator) -> Self {
        Self {
            elements,
            separator,
            bracketed: false,
        }
    }

    pub fn bracketed(elements: Vec<Value>, separator: ListSeparator) -> Self {
        Self {
            elements,
            separator,
            bracketed: true,
        }
    }
}

/// An insertion-ordered mapping with value-equality keys.
#[derive(Clone, Debug, Default)]
pub struct SassMap {
    entries: Vec<(Value, Value)>,
}

impl SassMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        let mut map = Self::new();
        for (key, value) in entries {
            map.insert(key, value);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// Insert preserving first-insertion order; an existing key is updated
    /// in place.
    pub fn insert(&mut self, key: Value, value: Value) {
        for (candidate, slot) in self.entries.iter_mut() {
            if *candidate == key {
                *slot = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(candidate, _)| candidate == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(Value, Value)> {
        self.entries
    }
}

/// A list plus a trailing keyword map, produced by rest-argument passing.
#[derive(Clone, Debug)]
pub struct ArgList {
    pub elements: Vec<Value>,
    pub separator: ListSeparator,
    pub keywords: Vec<(String, Value)>,
}

impl ArgList {
    pub fn new(
        elements: Vec<Value>,
        separator: ListSeparator,
        keywords: Vec<(String, Value)>,
    ) -> Self {
        Self {
            elements,
            separator,
            keywords,
        }
    }
}

/// The SassScript value model, a closed sum.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Color(Color),
    String(SassString),
    List(List),
    Map(SassMap),
    Calculation(Calculation),
    Function(Callable),
    Mixin(Callable),
    ArgList(ArgList),
}

impl Value {
    pub const TRUE: Value = Value::Bool(true);
    pub const FALSE: Value = Value::Bool(false);

    pub fn bool(value: bool) -> Value {
        Value::Bool(value)
    }

    pub fn unquoted_string(text: impl Into<String>) -> Value {
        Value::String(SassString::unquoted(text))
    }

    pub fn quoted_string(text: impl Into<String>) -> Value {
        Value::String(SassString::quoted(text))
    }

    pub fn empty_list() -> Value {
        Value::List(List::new(Vec::new(), ListSeparator::Undecided))
    }

    /// Only `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Color(_) => "color",
            Value::String(_) => "string",
            Value::List(_) | Value::ArgList(_) => "list",
            Value::Map(_) => "map",
            Value::Calculation(_) => "calculation",
            Value::Function(_) => "function",
            Value::Mixin(_) => "mixin",
        }
    }

    /// Any value is usable as a list: lists are themselves, maps become a
    /// comma list of `key value` pairs, everything else a single element.
    pub fn as_vec(&self) -> Vec<Value> {
        match self {
            Value::List(list) => list.elements.clone(),
            Value::ArgList(args) => args.elements.clone(),
            Value::Map(map) => map
                .entries()
                .iter()
                .map(|(key, value)| {
                    Value::List(List::new(
                        vec![key.clone(), value.clone()],
                        ListSeparator::Space,
                    ))
                })
                .collect(),
            other => vec![other.clone()],
        }
    }

    pub fn separator(&self) -> ListSeparator {
        match self {
            Value::List(list) => list.separator,
            Value::ArgList(args) => args.separator,
            Value::Map(_) => ListSeparator::Comma,
            _ => ListSeparator::Undecided,
        }
    }

    pub fn list_length(&self) -> usize {
        match self {
            Value::List(list) => list.elements.len(),
            Value::ArgList(args) => args.elements.len(),
            Value::Map(map) => map.len(),
            _ => 1,
        }
    }

    /// Convert a 1-based, possibly negative sass index into a 0-based
    /// index into this value viewed as a list. `warn` receives the
    /// deprecation message when the index carries units.
    pub fn sass_index_to_list_index(
        &self,
        index: &Value,
        name: Option<&str>,
        span: Span,
        warn: impl FnOnce(String),
    ) -> CompileResult<usize> {
        let number = index.assert_number(name, span)?;
        if !number.is_unitless() {
            warn(format!(
                "${}: Passing a number with unit {} is deprecated.",
                name.unwrap_or("n"),
                number.unit_string()
            ));
        }
        let value = number.as_int().ok_or_else(|| {
            argument_error(
                format!("{} is not an int.", inspect_value(index)),
                name,
                span,
            )
        })?;
        let length = self.list_length() as i64;
        if value == 0 {
            return Err(argument_error("List index may not be 0.", name, span));
        }
        if value.abs() > length {
            return Err(argument_error(
                format!("Invalid index {value} for a list with {length} elements."),
                name,
                span,
            ));
        }
        Ok(if value < 0 {
            (length + value) as usize
        } else {
            (value - 1) as usize
        })
    }

    pub fn assert_number(&self, name: Option<&str>, span: Span) -> CompileResult<&Number> {
        match self {
            Value::Number(number) => Ok(number),
            other => Err(not_a(other, "number", name, span)),
        }
    }

    pub fn assert_string(&self, name: Option<&str>, span: Span) -> CompileResult<&SassString> {
        match self {
            Value::String(string) => Ok(string),
            other => Err(not_a(other, "string", name, span)),
        }
    }

    pub fn assert_color(&self, name: Option<&str>, span: Span) -> CompileResult<&Color> {
        match self {
            Value::Color(color) => Ok(color),
            other => Err(not_a(other, "color", name, span)),
        }
    }

    pub fn assert_bool(&self, name: Option<&str>, span: Span) -> CompileResult<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(not_a(other, "bool", name, span)),
        }
    }

    /// The empty list is the empty map.
    pub fn assert_map(&self, name: Option<&str>, span: Span) -> CompileResult<SassMap> {
        match self {
            Value::Map(map) => Ok(map.clone()),
            Value::List(list) if list.elements.is_empty() => Ok(SassMap::new()),
            other => Err(not_a(other, "map", name, span)),
        }
    }

    pub fn assert_function(&self, name: Option<&str>, span: Span) -> CompileResult<&Callable> {
        match self {
            Value::Function(callable) => Ok(callable),
            other => Err(not_a(other, "function reference", name, span)),
        }
    }

    pub fn assert_mixin(&self, name: Option<&str>, span: Span) -> CompileResult<&Callable> {
        match self {
            Value::Mixin(callable) => Ok(callable),
            other => Err(not_a(other, "mixin reference", name, span)),
        }
    }

    /// Coerce to a selector: a string, a comma list whose elements are
    /// strings or space lists of strings, or a space list of strings.
    pub fn assert_selector(&self, name: Option<&str>, span: Span) -> CompileResult<String> {
        let fail = || {
            argument_error(
                format!("{} is not a valid selector.", inspect_value(self)),
                name,
                span,
            )
        };
        match self {
            Value::String(string) => Ok(string.text.clone()),
            Value::List(list) if !list.elements.is_empty() => {
                let complex = |value: &Value| -> Option<String> {
                    match value {
                        Value::String(string) => Some(string.text.clone()),
                        Value::List(inner)
                            if inner.separator == ListSeparator::Space
                                && !inner.elements.is_empty() =>
                        {
                            let mut parts = Vec::with_capacity(inner.elements.len());
                            for element in &inner.elements {
                                match element {
                                    Value::String(string) => parts.push(string.text.clone()),
                                    _ => return None,
                                }
                            }
                            Some(parts.join(" "))
                        }
                        _ => None,
                    }
                };
                match list.separator {
                    ListSeparator::Comma => {
                        let mut parts = Vec::with_capacity(list.elements.len());
                        for element in &list.elements {
                            parts.push(complex(element).ok_or_else(fail)?);
                        }
                        Ok(parts.join(", "))
                    }
                    ListSeparator::Space => {
                        let mut parts = Vec::with_capacity(list.elements.len());
                        for element in &list.elements {
                            match element {
                                Value::String(string) => parts.push(string.text.clone()),
                                _ => return Err(fail()),
                            }
                        }
                        Ok(parts.join(" "))
                    }
                    _ => Err(fail()),
                }
            }
            _ => Err(fail()),
        }
    }
}

fn not_a(value: &Value, kind: &str, name: Option<&str>, span: Span) -> CompileError {
    argument_error(
        format!("{} is not a {kind}.", inspect_value(value)),
        name,
        span,
    )
}

pub(crate) fn argument_error(
    message: impl Into<String>,
    name: Option<&str>,
    span: Span,
) -> CompileError {
    let message = message.into();
    match name {
        Some(name) => CompileError::runtime(format!("${name}: {message}"), span),
        None => CompileError::runtime(message, span),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::String(a), Value::String(b)) => a.text == b.text,
            (Value::Calculation(a), Value::Calculation(b)) => a == b,
            (Value::Function(a), Value::Function(b)) | (Value::Mixin(a), Value::Mixin(b)) => {
                a == b
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.entries()
                        .iter()
                        .all(|(key, value)| b.get(key) == Some(value))
            }
            // The empty list and the empty map are the same value.
            (Value::Map(map), Value::List(list)) | (Value::List(list), Value::Map(map)) => {
                map.is_empty() && list.elements.is_empty() && !list.bracketed
            }
            (Value::List(a), Value::List(b)) => {
                a.bracketed == b.bracketed
                    && (a.elements.len() < 2 || a.separator == b.separator)
                    && a.elements == b.elements
            }
            (Value::ArgList(a), Value::ArgList(b)) => a.elements == b.elements,
            (Value::ArgList(args), Value::List(list))
            | (Value::List(list), Value::ArgList(args)) => args.elements == list.elements,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(value) => value.hash(state),
            Value::Number(number) => number.hash(state),
            Value::Color(color) => color.hash(state),
            Value::String(string) => string.text.hash(state),
            Value::Calculation(calculation) => calculation.hash(state),
            Value::Function(callable) | Value::Mixin(callable) => callable.hash(state),
            Value::Map(map) => {
                if map.is_empty() {
                    // Must collide with the empty list.
                    3u8.hash(state);
                    return;
                }
                // Map equality is order-independent; combine entry hashes
                // with an order-independent fold.
                let mut combined: u64 = 0;
                for entry in map.entries() {
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    entry.hash(&mut hasher);
                    combined ^= hasher.finish();
                }
                combined.hash(state);
            }
            Value::List(list) => {
                if list.elements.is_empty() && !list.bracketed {
                    3u8.hash(state);
                    return;
                }
                list.bracketed.hash(state);
                if list.elements.len() >= 2 {
                    list.separator.hash(state);
                }
                list.elements.hash(state);
            }
            Value::ArgList(args) => args.elements.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_and_empty_map_are_the_same_value() {
        assert_eq!(Value::empty_list(), Value::Map(SassMap::new()));
        assert_eq!(
            Value::empty_list()
                .assert_map(None, Span::default())
                .expect("coerces")
                .len(),
            0
        );
    }

    #[test]
    fn converted_numbers_work_as_map_keys() {
        let mut map = SassMap::new();
        map.insert(
            Value::Number(Number::with_unit(96.0, "px")),
            Value::Bool(true),
        );
        let hit = map.get(&Value::Number(Number::with_unit(1.0, "in")));
        assert_eq!(hit, Some(&Value::Bool(true)));
    }

    #[test]
    fn sass_indices_wrap_and_reject_out_of_range() {
        let list = Value::List(List::new(
            vec![Value::Bool(true), Value::Null, Value::Bool(false)],
            ListSeparator::Comma,
        ));
        let index = |value: f64| {
            list.sass_index_to_list_index(
                &Value::Number(Number::new(value)),
                None,
                Span::default(),
                |_| {},
            )
        };
        assert_eq!(index(1.0).expect("first"), 0);
        assert_eq!(index(3.0).expect("last"), 2);
        assert_eq!(index(-3.0).expect("negative wraps"), 0);
        assert_eq!(index(-1.0).expect("negative end"), 2);
        assert!(index(0.0).is_err());
        assert!(index(4.0).is_err());
        assert!(index(-4.0).is_err());
    }

    #[test]
    fn quoting_does_not_affect_string_equality() {
        assert_eq!(
            Value::quoted_string("stylish"),
            Value::unquoted_string("stylish")
        );
    }

    #[test]
    fn map_equality_ignores_insertion_order() {
        let ab = SassMap::from_entries(vec![
            (Value::quoted_string("a"), Value::Bool(true)),
            (Value::quoted_string("b"), Value::Bool(false)),
        ]);
        let ba = SassMap::from_entries(vec![
            (Value::quoted_string("b"), Value::Bool(false)),
            (Value::quoted_string("a"), Value::Bool(true)),
        ]);
        assert_eq!(Value::Map(ab), Value::Map(ba));
    }
}

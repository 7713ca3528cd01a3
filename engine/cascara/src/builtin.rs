use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::css::CssNode;
use crate::error::{CompileError, CompileResult, Span};
use crate::evaluate::{EvaluatedArgs, Evaluator, LoadKind, LocalBoxFuture};
use crate::logger::Deprecation;
use crate::module::{Callable, CallableKind, Configuration, Module};
use crate::value::{
    argument_error, inspect_value, Color, List, ListSeparator, Number, SassMap, SassString, Value,
};

/// Build the `sass:` modules and the module holding the global function
/// set. One instance of each per compilation.
pub(crate) fn build_modules() -> (
    HashMap<&'static str, Rc<RefCell<Module>>>,
    Rc<RefCell<Module>>,
) {
    let mut modules = HashMap::new();
    modules.insert("meta", meta_module());
    modules.insert("math", math_module());
    modules.insert("list", list_module());
    modules.insert("map", map_module());
    modules.insert("string", string_module());
    modules.insert("color", color_module());
    (modules, global_module())
}

fn function(module: &mut Module, name: &str, handler: crate::module::BuiltinFn) {
    module
        .functions
        .insert(name.to_string(), Callable::new(name, CallableKind::Builtin(handler)));
}

fn mixin(module: &mut Module, name: &str, handler: crate::module::BuiltinMixinFn) {
    module
        .mixins
        .insert(name.to_string(), Callable::new(name, CallableKind::BuiltinMixin(handler)));
}

fn meta_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "inspect", fn_inspect);
    function(&mut module, "type-of", fn_type_of);
    function(&mut module, "call", fn_call);
    function(&mut module, "get-function", fn_get_function);
    function(&mut module, "keywords", fn_keywords);
    mixin(&mut module, "load-css", mixin_load_css);
    Rc::new(RefCell::new(module))
}

fn math_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    module.variables.insert(
        "pi".to_string(),
        Value::Number(Number::new(std::f64::consts::PI)),
    );
    module.variables.insert(
        "e".to_string(),
        Value::Number(Number::new(std::f64::consts::E)),
    );
    function(&mut module, "div", fn_div);
    function(&mut module, "percentage", fn_percentage);
    function(&mut module, "round", fn_round);
    function(&mut module, "ceil", fn_ceil);
    function(&mut module, "floor", fn_floor);
    function(&mut module, "abs", fn_abs);
    function(&mut module, "min", fn_min);
    function(&mut module, "max", fn_max);
    function(&mut module, "unit", fn_unit);
    function(&mut module, "is-unitless", fn_unitless);
    function(&mut module, "compatible", fn_comparable);
    Rc::new(RefCell::new(module))
}

fn list_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "length", fn_length);
    function(&mut module, "nth", fn_nth);
    function(&mut module, "set-nth", fn_set_nth);
    function(&mut module, "join", fn_join);
    function(&mut module, "append", fn_append);
    function(&mut module, "index", fn_index);
    function(&mut module, "separator", fn_separator);
    Rc::new(RefCell::new(module))
}

fn map_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "get", fn_map_get);
    function(&mut module, "merge", fn_map_merge);
    function(&mut module, "remove", fn_map_remove);
    function(&mut module, "keys", fn_map_keys);
    function(&mut module, "values", fn_map_values);
    function(&mut module, "has-key", fn_map_has_key);
    Rc::new(RefCell::new(module))
}

fn string_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "quote", fn_quote);
    function(&mut module, "unquote", fn_unquote);
    function(&mut module, "length", fn_str_length);
    function(&mut module, "index", fn_str_index);
    function(&mut module, "insert", fn_str_insert);
    function(&mut module, "slice", fn_str_slice);
    function(&mut module, "to-upper-case", fn_to_upper);
    function(&mut module, "to-lower-case", fn_to_lower);
    Rc::new(RefCell::new(module))
}

fn color_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "red", fn_red);
    function(&mut module, "green", fn_green);
    function(&mut module, "blue", fn_blue);
    function(&mut module, "alpha", fn_alpha);
    function(&mut module, "hue", fn_hue);
    function(&mut module, "saturation", fn_saturation);
    function(&mut module, "lightness", fn_lightness);
    function(&mut module, "whiteness", fn_whiteness);
    function(&mut module, "blackness", fn_blackness);
    function(&mut module, "mix", fn_mix);
    Rc::new(RefCell::new(module))
}

/// The function set reachable without any `@use`, the css-compatible names
/// plus the legacy prefixed aliases.
fn global_module() -> Rc<RefCell<Module>> {
    let mut module = Module::default();
    function(&mut module, "rgb", fn_rgb);
    function(&mut module, "rgba", fn_rgba);
    function(&mut module, "hsl", fn_hsl);
    function(&mut module, "hsla", fn_hsl);
    function(&mut module, "hwb", fn_hwb);
    function(&mut module, "red", fn_red);
    function(&mut module, "green", fn_green);
    function(&mut module, "blue", fn_blue);
    function(&mut module, "alpha", fn_alpha);
    function(&mut module, "opacity", fn_alpha);
    function(&mut module, "hue", fn_hue);
    function(&mut module, "saturation", fn_saturation);
    function(&mut module, "lightness", fn_lightness);
    function(&mut module, "mix", fn_mix);
    function(&mut module, "percentage", fn_percentage);
    function(&mut module, "round", fn_round);
    function(&mut module, "ceil", fn_ceil);
    function(&mut module, "floor", fn_floor);
    function(&mut module, "abs", fn_abs);
    function(&mut module, "unit", fn_unit);
    function(&mut module, "unitless", fn_unitless);
    function(&mut module, "comparable", fn_comparable);
    function(&mut module, "length", fn_length);
    function(&mut module, "nth", fn_nth);
    function(&mut module, "set-nth", fn_set_nth);
    function(&mut module, "join", fn_join);
    function(&mut module, "append", fn_append);
    function(&mut module, "index", fn_index);
    function(&mut module, "list-separator", fn_separator);
    function(&mut module, "map-get", fn_map_get);
    function(&mut module, "map-merge", fn_map_merge);
    function(&mut module, "map-remove", fn_map_remove);
    function(&mut module, "map-keys", fn_map_keys);
    function(&mut module, "map-values", fn_map_values);
    function(&mut module, "map-has-key", fn_map_has_key);
    function(&mut module, "quote", fn_quote);
    function(&mut module, "unquote", fn_unquote);
    function(&mut module, "str-length", fn_str_length);
    function(&mut module, "str-index", fn_str_index);
    function(&mut module, "str-insert", fn_str_insert);
    function(&mut module, "str-slice", fn_str_slice);
    function(&mut module, "to-upper-case", fn_to_upper);
    function(&mut module, "to-lower-case", fn_to_lower);
    function(&mut module, "inspect", fn_inspect);
    function(&mut module, "type-of", fn_type_of);
    function(&mut module, "call", fn_call);
    function(&mut module, "get-function", fn_get_function);
    function(&mut module, "keywords", fn_keywords);
    Rc::new(RefCell::new(module))
}

// Argument helpers.

fn arg<'a>(args: &'a EvaluatedArgs, index: usize, name: &str) -> CompileResult<&'a Value> {
    args.positional
        .get(index)
        .or_else(|| args.named_value(name))
        .ok_or_else(|| {
            CompileError::runtime(format!("Missing argument ${name}."), args.span)
        })
}

fn opt_arg<'a>(args: &'a EvaluatedArgs, index: usize, name: &str) -> Option<&'a Value> {
    args.positional.get(index).or_else(|| args.named_value(name))
}

fn exactly(args: &EvaluatedArgs, count: usize) -> CompileResult<()> {
    if args.positional.len() > count {
        return Err(CompileError::runtime(
            format!(
                "Only {count} argument{} allowed, but {} were passed.",
                if count == 1 { "" } else { "s" },
                args.positional.len()
            ),
            args.span,
        ));
    }
    Ok(())
}

// sass:meta

fn fn_inspect(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let value = arg(&args, 0, "value")?;
    Ok(Value::unquoted_string(inspect_value(value)))
}

fn fn_type_of(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let value = arg(&args, 0, "value")?;
    Ok(Value::unquoted_string(value.kind_name()))
}

/// `call()` is dispatched inside the evaluator so the inner invocation can
/// suspend at resolver boundaries; this table entry only reserves the name.
fn fn_call(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    Err(CompileError::runtime(
        "call() may only be invoked directly.",
        args.span,
    ))
}

fn fn_get_function(evaluator: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let name = arg(&args, 0, "name")?.assert_string(Some("name"), args.span)?;
    if name.text == "call" {
        return Err(argument_error(
            "call() isn't allowed in get-function().",
            Some("name"),
            args.span,
        ));
    }
    let module = opt_arg(&args, 2, "module");
    let namespace = match module {
        Some(value) => Some(value.assert_string(Some("module"), args.span)?.text.clone()),
        None => None,
    };
    let callable = evaluator
        .find_function(namespace.as_deref(), &name.text)
        .ok_or_else(|| {
            CompileError::runtime(format!("Function not found: {}", name.text), args.span)
        })?;
    Ok(Value::Function(callable))
}

fn fn_keywords(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let value = arg(&args, 0, "args")?;
    let Value::ArgList(list) = value else {
        return Err(argument_error(
            format!("{} is not an argument list.", inspect_value(value)),
            Some("args"),
            args.span,
        ));
    };
    let mut map = SassMap::new();
    for (name, value) in &list.keywords {
        map.insert(Value::unquoted_string(name.clone()), value.clone());
    }
    Ok(Value::Map(map))
}

/// `meta.load-css($url, $with: null)`: load a module through the regular
/// loader (one evaluation per canonical identifier) and splice its css at
/// the include position. Returns a future because the load can suspend at
/// resolver boundaries.
fn mixin_load_css<'a>(
    evaluator: &'a mut Evaluator,
    args: EvaluatedArgs,
    sink: &'a mut Vec<CssNode>,
) -> LocalBoxFuture<'a, CompileResult<()>> {
    Box::pin(async move {
        let url = arg(&args, 0, "url")?
            .assert_string(Some("url"), args.span)?
            .text
            .clone();
        let config = match opt_arg(&args, 1, "with") {
            None | Some(Value::Null) => Configuration::empty(),
            Some(value) => {
                let map = value.assert_map(Some("with"), args.span)?;
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map.into_entries() {
                    let Value::String(name) = &key else {
                        return Err(argument_error(
                            format!("{} is not a string.", inspect_value(&key)),
                            Some("with"),
                            args.span,
                        ));
                    };
                    entries.push((name.text.clone(), value, args.span));
                }
                Configuration::new(entries)
            }
        };
        let module = evaluator
            .load_module(&url, args.span, config, LoadKind::LoadCss)
            .await?;
        let css = module.borrow().css.clone();
        sink.extend(css);
        Ok(())
    })
}

// sass:math

fn fn_div(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let left = arg(&args, 0, "number1")?.assert_number(Some("number1"), args.span)?;
    let right = arg(&args, 1, "number2")?.assert_number(Some("number2"), args.span)?;
    Ok(Value::Number(left.divide(right)))
}

fn fn_percentage(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let number = arg(&args, 0, "number")?.assert_number(Some("number"), args.span)?;
    if !number.is_unitless() {
        return Err(argument_error(
            format!("Expected {} to have no units.", inspect_value(arg(&args, 0, "number")?)),
            Some("number"),
            args.span,
        ));
    }
    Ok(Value::Number(Number::with_unit(number.value * 100.0, "%")))
}

fn rounding(
    args: &EvaluatedArgs,
    round: impl Fn(f64) -> f64,
) -> CompileResult<Value> {
    let number = arg(args, 0, "number")?.assert_number(Some("number"), args.span)?;
    Ok(Value::Number(Number::with_units(
        round(number.value),
        number.numerator_units.clone(),
        number.denominator_units.clone(),
    )))
}

fn fn_round(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    rounding(&args, f64::round)
}

fn fn_ceil(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    rounding(&args, f64::ceil)
}

fn fn_floor(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    rounding(&args, f64::floor)
}

fn fn_abs(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    rounding(&args, f64::abs)
}

fn extremum(args: &EvaluatedArgs, want_less: bool) -> CompileResult<Value> {
    if args.positional.is_empty() {
        return Err(CompileError::runtime(
            "At least one argument must be passed.",
            args.span,
        ));
    }
    let mut best: Option<Number> = None;
    for value in &args.positional {
        let number = value.assert_number(None, args.span)?;
        match &best {
            None => best = Some(number.clone()),
            Some(current) => {
                let ordering = number.compare(current).ok_or_else(|| {
                    CompileError::runtime(
                        format!(
                            "Incompatible units: {} and {}.",
                            current.unit_string(),
                            number.unit_string()
                        ),
                        args.span,
                    )
                })?;
                let better = if want_less {
                    ordering == std::cmp::Ordering::Less
                } else {
                    ordering == std::cmp::Ordering::Greater
                };
                if better {
                    best = Some(number.clone());
                }
            }
        }
    }
    Ok(Value::Number(best.expect("nonempty checked above")))
}

fn fn_min(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    extremum(&args, true)
}

fn fn_max(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    extremum(&args, false)
}

fn fn_unit(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let number = arg(&args, 0, "number")?.assert_number(Some("number"), args.span)?;
    Ok(Value::quoted_string(number.unit_string()))
}

fn fn_unitless(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let number = arg(&args, 0, "number")?.assert_number(Some("number"), args.span)?;
    Ok(Value::bool(number.is_unitless()))
}

fn fn_comparable(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let left = arg(&args, 0, "number1")?.assert_number(Some("number1"), args.span)?;
    let right = arg(&args, 1, "number2")?.assert_number(Some("number2"), args.span)?;
    Ok(Value::bool(left.is_comparable_to(right)))
}

// sass:list

fn fn_length(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let value = arg(&args, 0, "list")?;
    Ok(Value::Number(Number::new(value.list_length() as f64)))
}

fn list_index(
    evaluator: &mut Evaluator,
    args: &EvaluatedArgs,
    value: &Value,
    index: &Value,
) -> CompileResult<usize> {
    let sink = evaluator.sink().clone();
    value.sass_index_to_list_index(index, Some("n"), args.span, move |message| {
        sink.deprecation(Deprecation::FunctionUnits, &message);
    })
}

fn fn_nth(evaluator: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let value = arg(&args, 0, "list")?.clone();
    let index = arg(&args, 1, "n")?.clone();
    let zero_based = list_index(evaluator, &args, &value, &index)?;
    Ok(value.as_vec().swap_remove(zero_based))
}

fn fn_set_nth(evaluator: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 3)?;
    let value = arg(&args, 0, "list")?.clone();
    let index = arg(&args, 1, "n")?.clone();
    let replacement = arg(&args, 2, "value")?.clone();
    let zero_based = list_index(evaluator, &args, &value, &index)?;
    let mut elements = value.as_vec();
    elements[zero_based] = replacement;
    Ok(Value::List(List {
        elements,
        separator: match value.separator() {
            ListSeparator::Undecided => ListSeparator::Space,
            separator => separator,
        },
        bracketed: matches!(&value, Value::List(list) if list.bracketed),
    }))
}

fn separator_by_name(value: &Value, span: Span) -> CompileResult<Option<ListSeparator>> {
    let name = value.assert_string(Some("separator"), span)?;
    match name.text.as_str() {
        "comma" => Ok(Some(ListSeparator::Comma)),
        "space" => Ok(Some(ListSeparator::Space)),
        "slash" => Ok(Some(ListSeparator::Slash)),
        "auto" => Ok(None),
        _ => Err(argument_error(
            "Must be \"space\", \"comma\", \"slash\", or \"auto\".",
            Some("separator"),
            span,
        )),
    }
}

fn fn_join(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 3)?;
    let first = arg(&args, 0, "list1")?;
    let second = arg(&args, 1, "list2")?;
    let separator = match opt_arg(&args, 2, "separator") {
        Some(value) => separator_by_name(value, args.span)?,
        None => None,
    };
    let separator = separator.unwrap_or_else(|| match first.separator() {
        ListSeparator::Undecided => match second.separator() {
            ListSeparator::Undecided => ListSeparator::Space,
            separator => separator,
        },
        separator => separator,
    });
    let mut elements = first.as_vec();
    elements.extend(second.as_vec());
    Ok(Value::List(List {
        elements,
        separator,
        bracketed: matches!(first, Value::List(list) if list.bracketed),
    }))
}

fn fn_append(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 3)?;
    let first = arg(&args, 0, "list")?;
    let value = arg(&args, 1, "val")?.clone();
    let separator = match opt_arg(&args, 2, "separator") {
        Some(choice) => separator_by_name(choice, args.span)?,
        None => None,
    };
    let separator = separator.unwrap_or_else(|| match first.separator() {
        ListSeparator::Undecided => ListSeparator::Space,
        separator => separator,
    });
    let mut elements = first.as_vec();
    elements.push(value);
    Ok(Value::List(List {
        elements,
        separator,
        bracketed: matches!(first, Value::List(list) if list.bracketed),
    }))
}

fn fn_index(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let list = arg(&args, 0, "list")?;
    let value = arg(&args, 1, "value")?;
    let position = list.as_vec().iter().position(|element| element == value);
    Ok(match position {
        Some(index) => Value::Number(Number::new((index + 1) as f64)),
        None => Value::Null,
    })
}

fn fn_separator(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let value = arg(&args, 0, "list")?;
    Ok(Value::unquoted_string(value.separator().name()))
}

// sass:map

fn fn_map_get(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let map = arg(&args, 0, "map")?.assert_map(Some("map"), args.span)?;
    let key = arg(&args, 1, "key")?;
    Ok(map.get(key).cloned().unwrap_or(Value::Null))
}

fn fn_map_merge(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let mut merged = arg(&args, 0, "map1")?.assert_map(Some("map1"), args.span)?;
    let addition = arg(&args, 1, "map2")?.assert_map(Some("map2"), args.span)?;
    for (key, value) in addition.into_entries() {
        merged.insert(key, value);
    }
    Ok(Value::Map(merged))
}

fn fn_map_remove(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let mut map = arg(&args, 0, "map")?.assert_map(Some("map"), args.span)?;
    for key in &args.positional[1.min(args.positional.len())..] {
        map.remove(key);
    }
    Ok(Value::Map(map))
}

fn fn_map_keys(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let map = arg(&args, 0, "map")?.assert_map(Some("map"), args.span)?;
    Ok(Value::List(List::new(
        map.entries().iter().map(|(key, _)| key.clone()).collect(),
        ListSeparator::Comma,
    )))
}

fn fn_map_values(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let map = arg(&args, 0, "map")?.assert_map(Some("map"), args.span)?;
    Ok(Value::List(List::new(
        map.entries().iter().map(|(_, value)| value.clone()).collect(),
        ListSeparator::Comma,
    )))
}

fn fn_map_has_key(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let map = arg(&args, 0, "map")?.assert_map(Some("map"), args.span)?;
    let key = arg(&args, 1, "key")?;
    Ok(Value::bool(map.get(key).is_some()))
}

// sass:string

fn fn_quote(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    Ok(Value::quoted_string(string.text.clone()))
}

fn fn_unquote(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    Ok(Value::unquoted_string(string.text.clone()))
}

fn fn_str_length(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    Ok(Value::Number(Number::new(string.text.chars().count() as f64)))
}

fn fn_str_index(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 2)?;
    let haystack = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    let needle = arg(&args, 1, "substring")?.assert_string(Some("substring"), args.span)?;
    Ok(match haystack.text.find(&needle.text) {
        Some(byte_index) => {
            let char_index = haystack.text[..byte_index].chars().count() + 1;
            Value::Number(Number::new(char_index as f64))
        }
        None => Value::Null,
    })
}

fn string_index(text: &str, index: &Number, span: Span, for_insert: bool) -> CompileResult<usize> {
    let length = text.chars().count() as i64;
    let value = index.as_int().ok_or_else(|| {
        argument_error(format!("{} is not an int.", index.value), Some("index"), span)
    })?;
    Ok(if value == 0 {
        0
    } else if value > 0 {
        ((value - 1).min(length)) as usize
    } else {
        let offset = length + value + i64::from(for_insert);
        offset.max(0) as usize
    })
}

fn fn_str_insert(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 3)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    let insert = arg(&args, 1, "insert")?.assert_string(Some("insert"), args.span)?;
    let index = arg(&args, 2, "index")?.assert_number(Some("index"), args.span)?;
    let position = string_index(&string.text, index, args.span, true)?;
    let mut text: Vec<char> = string.text.chars().collect();
    let insert_chars: Vec<char> = insert.text.chars().collect();
    let position = position.min(text.len());
    text.splice(position..position, insert_chars);
    Ok(Value::String(SassString {
        text: text.into_iter().collect(),
        quoted: string.quoted,
    }))
}

fn fn_str_slice(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    let start = arg(&args, 1, "start-at")?.assert_number(Some("start-at"), args.span)?;
    let chars: Vec<char> = string.text.chars().collect();
    let start_index = string_index(&string.text, start, args.span, false)?;
    let end_index = match opt_arg(&args, 2, "end-at") {
        Some(value) => {
            let end = value.assert_number(Some("end-at"), args.span)?;
            let resolved = string_index(&string.text, end, args.span, false)?;
            (resolved + 1).min(chars.len())
        }
        None => chars.len(),
    };
    let text: String = if start_index < end_index {
        chars[start_index..end_index].iter().collect()
    } else {
        String::new()
    };
    Ok(Value::String(SassString {
        text,
        quoted: string.quoted,
    }))
}

fn fn_to_upper(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    Ok(Value::String(SassString {
        text: string.text.to_uppercase(),
        quoted: string.quoted,
    }))
}

fn fn_to_lower(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    exactly(&args, 1)?;
    let string = arg(&args, 0, "string")?.assert_string(Some("string"), args.span)?;
    Ok(Value::String(SassString {
        text: string.text.to_lowercase(),
        quoted: string.quoted,
    }))
}

// sass:color and the css color constructors.

fn channel(value: &Value, name: &str, span: Span, scale: f64) -> CompileResult<f64> {
    let number = value.assert_number(Some(name), span)?;
    if number.numerator_units.iter().any(|unit| unit == "%") {
        Ok(number.value * scale / 100.0)
    } else {
        Ok(number.value)
    }
}

fn fn_rgb(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let red = channel(arg(&args, 0, "red")?, "red", args.span, 255.0)?;
    let green = channel(arg(&args, 1, "green")?, "green", args.span, 255.0)?;
    let blue = channel(arg(&args, 2, "blue")?, "blue", args.span, 255.0)?;
    let alpha = match opt_arg(&args, 3, "alpha") {
        Some(value) => channel(value, "alpha", args.span, 1.0)?,
        None => 1.0,
    };
    Ok(Value::Color(Color::rgb(red, green, blue, alpha)))
}

fn fn_rgba(evaluator: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    // rgba($color, $alpha) overload.
    if args.positional.len() == 2 {
        if let Value::Color(color) = &args.positional[0] {
            let alpha = channel(&args.positional[1], "alpha", args.span, 1.0)?;
            return Ok(Value::Color(Color::rgb(
                color.red(),
                color.green(),
                color.blue(),
                alpha,
            )));
        }
    }
    fn_rgb(evaluator, args)
}

fn fn_hsl(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let hue = arg(&args, 0, "hue")?.assert_number(Some("hue"), args.span)?.value;
    let saturation = arg(&args, 1, "saturation")?
        .assert_number(Some("saturation"), args.span)?
        .value;
    let lightness = arg(&args, 2, "lightness")?
        .assert_number(Some("lightness"), args.span)?
        .value;
    let alpha = match opt_arg(&args, 3, "alpha") {
        Some(value) => channel(value, "alpha", args.span, 1.0)?,
        None => 1.0,
    };
    Ok(Value::Color(Color::hsl(hue, saturation, lightness, alpha)))
}

fn fn_hwb(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let hue = arg(&args, 0, "hue")?.assert_number(Some("hue"), args.span)?.value;
    let whiteness = arg(&args, 1, "whiteness")?
        .assert_number(Some("whiteness"), args.span)?
        .value;
    let blackness = arg(&args, 2, "blackness")?
        .assert_number(Some("blackness"), args.span)?
        .value;
    let alpha = match opt_arg(&args, 3, "alpha") {
        Some(value) => channel(value, "alpha", args.span, 1.0)?,
        None => 1.0,
    };
    Ok(Value::Color(Color::hwb(hue, whiteness, blackness, alpha)))
}

fn color_channel(
    args: &EvaluatedArgs,
    read: impl Fn(&Color) -> f64,
    unit: Option<&str>,
) -> CompileResult<Value> {
    let color = arg(args, 0, "color")?.assert_color(Some("color"), args.span)?;
    let value = read(color);
    Ok(Value::Number(match unit {
        Some(unit) => Number::with_unit(value, unit),
        None => Number::new(value),
    }))
}

fn fn_red(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, |color| color.red().round(), None)
}

fn fn_green(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, |color| color.green().round(), None)
}

fn fn_blue(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, |color| color.blue().round(), None)
}

fn fn_alpha(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::alpha, None)
}

fn fn_hue(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::hue, Some("deg"))
}

fn fn_saturation(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::saturation, Some("%"))
}

fn fn_lightness(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::lightness, Some("%"))
}

fn fn_whiteness(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::whiteness, Some("%"))
}

fn fn_blackness(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    color_channel(&args, Color::blackness, Some("%"))
}

fn fn_mix(_: &mut Evaluator, args: EvaluatedArgs) -> CompileResult<Value> {
    let first = arg(&args, 0, "color1")?.assert_color(Some("color1"), args.span)?;
    let second = arg(&args, 1, "color2")?.assert_color(Some("color2"), args.span)?;
    let weight = match opt_arg(&args, 2, "weight") {
        Some(value) => channel(value, "weight", args.span, 1.0)?,
        None => 0.5,
    }
    .clamp(0.0, 1.0);

    // The reference implementation weighs by both the requested ratio and
    // the relative opacity.
    let normalized = weight * 2.0 - 1.0;
    let alpha_distance = first.alpha() - second.alpha();
    let combined = if normalized * alpha_distance == -1.0 {
        normalized
    } else {
        (normalized + alpha_distance) / (1.0 + normalized * alpha_distance)
    };
    let first_weight = (combined + 1.0) / 2.0;
    let second_weight = 1.0 - first_weight;
    Ok(Value::Color(Color::rgb(
        first.red() * first_weight + second.red() * second_weight,
        first.green() * first_weight + second.green() * second_weight,
        first.blue() * first_weight + second.blue() * second_weight,
        first.alpha() * weight + second.alpha() * (1.0 - weight),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_modules_expose_their_members() {
        let (modules, globals) = build_modules();
        assert!(modules["meta"].borrow().mixins.contains_key("load-css"));
        assert!(modules["math"].borrow().functions.contains_key("div"));
        assert!(modules["math"].borrow().variables.contains_key("pi"));
        assert!(globals.borrow().functions.contains_key("rgb"));
        assert!(globals.borrow().functions.contains_key("map-get"));
    }
}

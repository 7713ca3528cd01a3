use cascara::value::{List, ListSeparator, Number, SassMap, Value};
use cascara::{compile_string, Options, Span};

fn compile(source: &str) -> String {
    compile_string(source, &Options::default()).expect("compile")
}

#[test]
fn the_empty_list_is_the_empty_map_everywhere() {
    // As a value.
    assert_eq!(Value::empty_list(), Value::Map(SassMap::new()));
    // As a map assertion target.
    assert!(Value::empty_list().assert_map(None, Span::default()).is_ok());
    // As an operand of length().
    let css = compile(
        "@use \"sass:map\";\n\
         a { b: length(()); c: inspect(map.get((), x)); d: length(map.remove((x: 1), x)); }",
    );
    assert_eq!(css, "a {\n  b: 0;\n  c: null;\n  d: 0;\n}\n");
}

#[test]
fn sass_index_zero_is_an_error() {
    let err = compile_string("a { b: nth((x, y), 0); }", &Options::default())
        .expect_err("index zero");
    assert!(err.to_string().contains("List index may not be 0"));
}

#[test]
fn negative_sass_indices_count_from_the_end() {
    let css = compile("a { b: nth((x, y, z), -3); c: nth((x, y, z), 3); }");
    assert_eq!(css, "a {\n  b: x;\n  c: z;\n}\n");
}

#[test]
fn out_of_range_sass_indices_are_errors() {
    for index in ["4", "-4"] {
        let err = compile_string(
            &format!("a {{ b: nth((x, y, z), {index}); }}"),
            &Options::default(),
        )
        .expect_err("out of range");
        assert!(err.to_string().contains("Invalid index"));
    }
}

#[test]
fn converted_numbers_are_interchangeable_map_keys() {
    // (1px * 1) == 1px as a key.
    let css = compile(
        "@use \"sass:map\";\n\
         $m: map.merge((), (1px * 1: hit));\n\
         a { b: map.get($m, 1px); }",
    );
    assert_eq!(css, "a {\n  b: hit;\n}\n");
}

#[test]
fn maps_iterate_as_lists_of_pairs() {
    let css = compile("a { b: nth((x: 1, y: 2), 1); c: length((x: 1, y: 2)); }");
    assert_eq!(css, "a {\n  b: x 1;\n  c: 2;\n}\n");
}

#[test]
fn operator_table_edges() {
    let css = compile(
        "a {\n\
         plus: a + b;\n\
         quoted: \"a\" + b;\n\
         minus: sans - serif;\n\
         slash: a / b;\n\
         eq: 1px == 96px / 96;\n\
         rel: 1in > 2px;\n\
         negate: not null;\n\
         }",
    );
    assert_eq!(
        css,
        "a {\n  plus: ab;\n  quoted: \"ab\";\n  minus: sans-serif;\n  slash: a/b;\n  \
         eq: true;\n  rel: true;\n  negate: true;\n}\n"
    );
}

#[test]
fn string_concatenation_wins_over_the_calculation_rejection() {
    let css = compile("a { b: \"w\" + calc(1px + var(--g)); }");
    assert_eq!(css, "a {\n  b: \"wcalc(1px + var(--g))\";\n}\n");

    let err = compile_string("a { b: calc(1px + var(--g)) + 1; }", &Options::default())
        .expect_err("calculation left of + is undefined");
    assert!(err.to_string().contains("Undefined operation"));
}

#[test]
fn slash_on_non_numbers_is_lexical_even_for_calculations() {
    let css = compile("a { b: calc(var(--g)) / 2; }");
    assert_eq!(css, "a {\n  b: calc(var(--g))/2;\n}\n");
}

#[test]
fn modulo_carries_the_left_unit() {
    let css = compile("a { b: 7px % 4; c: 125% % 50%; }");
    assert_eq!(css, "a {\n  b: 3px;\n  c: 25%;\n}\n");
}

#[test]
fn string_functions_respect_quoting() {
    let css = compile(
        "@use \"sass:string\";\n\
         a {\n\
         q: string.quote(word);\n\
         u: string.unquote(\"word\");\n\
         l: string.length(\"héllo\");\n\
         s: string.slice(\"compile\", 1, 3);\n\
         up: string.to-upper-case(\"abc\");\n\
         }",
    );
    assert_eq!(
        css,
        "a {\n  q: \"word\";\n  u: word;\n  l: 5;\n  s: \"com\";\n  up: \"ABC\";\n}\n"
    );
}

#[test]
fn rest_arguments_produce_argument_lists() {
    let css = compile(
        "@use \"sass:meta\";\n\
         @function tally($args...) {\n\
         @return length($args) + length(meta.keywords($args));\n\
         }\n\
         a { b: tally(1, 2, $x: 3); }",
    );
    assert_eq!(css, "a {\n  b: 3;\n}\n");
}

#[test]
fn units_cancel_through_arithmetic() {
    let css = compile("a { b: (10px * 3) / 5px; c: 1in + 48px; }");
    assert_eq!(css, "a {\n  b: 6;\n  c: 1.5in;\n}\n");
}

#[test]
fn colors_preserve_their_construction_model() {
    let css = compile(
        "@use \"sass:color\";\n\
         $c: hsl(120, 50%, 50%);\n\
         a { h: color.hue($c); s: color.saturation($c); out: rgb(255, 0, 0); }",
    );
    assert_eq!(css, "a {\n  h: 120deg;\n  s: 50%;\n  out: #ff0000;\n}\n");
}

#[test]
fn selector_coercion_accepts_the_three_shapes() {
    let string = Value::quoted_string("a b");
    assert_eq!(
        string.assert_selector(None, Span::default()).expect("string"),
        "a b"
    );

    let space = Value::List(List::new(
        vec![Value::unquoted_string("a"), Value::unquoted_string("b")],
        ListSeparator::Space,
    ));
    assert_eq!(
        space.assert_selector(None, Span::default()).expect("space list"),
        "a b"
    );

    let comma = Value::List(List::new(
        vec![
            Value::unquoted_string("a"),
            Value::List(List::new(
                vec![Value::unquoted_string("b"), Value::unquoted_string("c")],
                ListSeparator::Space,
            )),
        ],
        ListSeparator::Comma,
    ));
    assert_eq!(
        comma.assert_selector(None, Span::default()).expect("comma list"),
        "a, b c"
    );

    assert!(Value::Number(Number::new(1.0))
        .assert_selector(None, Span::default())
        .is_err());
}

#[test]
fn assertions_name_the_offending_argument() {
    let err = Value::quoted_string("nope")
        .assert_number(Some("weight"), Span::default())
        .expect_err("not a number");
    let message = err.to_string();
    assert!(message.contains("$weight"));
    assert!(message.contains("is not a number"));
}

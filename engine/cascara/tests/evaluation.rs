use cascara::{compile_string, Options, OutputStyle};

fn compile(source: &str) -> String {
    compile_string(source, &Options::default()).expect("compile")
}

#[test]
fn nested_rules_flatten_with_descendant_combinators() {
    let css = compile("a { b { c: d; } &:hover { e: f; } }");
    assert_eq!(css, "a b {\n  c: d;\n}\n\na:hover {\n  e: f;\n}\n");
}

#[test]
fn comma_selectors_cross_on_both_sides() {
    let css = compile("a, b { c, d { e: f; } }");
    assert_eq!(css, "a c, b c, a d, b d {\n  e: f;\n}\n");
}

#[test]
fn at_rules_hoist_around_their_rule() {
    let css = compile("a { @media screen { b: c; } }");
    assert_eq!(css, "@media screen {\n  a {\n    b: c;\n  }\n}\n");
}

#[test]
fn mixins_take_arguments_defaults_and_content() {
    let css = compile(
        "@mixin frame($width, $color: silver) {\n\
         border: $width $color;\n\
         @content;\n\
         }\n\
         a { @include frame(1px) { inset: 0; } }",
    );
    assert_eq!(css, "a {\n  border: 1px silver;\n  inset: 0;\n}\n");
}

#[test]
fn functions_return_through_control_flow() {
    let css = compile(
        "@function pick($n) {\n\
         @if $n > 3 { @return big; } @else { @return small; }\n\
         }\n\
         a { b: pick(5); c: pick(1); }",
    );
    assert_eq!(css, "a {\n  b: big;\n  c: small;\n}\n");
}

#[test]
fn each_and_for_iterate_with_scoped_bindings() {
    let css = compile(
        "@each $name, $size in (small: 1px, large: 2px) {\n\
         .#{$name} { width: $size; }\n\
         }\n\
         @for $i from 1 through 2 { .col-#{$i} { order: $i; } }",
    );
    assert_eq!(
        css,
        ".small {\n  width: 1px;\n}\n\n.large {\n  width: 2px;\n}\n\n\
         .col-1 {\n  order: 1;\n}\n\n.col-2 {\n  order: 2;\n}\n"
    );
}

#[test]
fn interpolation_reaches_selectors_properties_and_strings() {
    let css = compile(
        "$side: left;\n\
         .#{$side}-box { margin-#{$side}: 2px; content: \"on the #{$side}\"; }",
    );
    assert_eq!(
        css,
        ".left-box {\n  margin-left: 2px;\n  content: \"on the left\";\n}\n"
    );
}

#[test]
fn literal_slash_round_trips_and_division_warns_only_when_computed() {
    let css = compile("a { font: 10px/8px; }");
    assert_eq!(css, "a {\n  font: 10px/8px;\n}\n");

    let css = compile("@use \"sass:math\";\na { b: math.div(10px, 8px); }");
    assert_eq!(css, "a {\n  b: 1.25;\n}\n");
}

#[test]
fn calc_reduces_when_its_arguments_resolve() {
    let css = compile("a { b: calc(1px + 2px); c: calc(100% - var(--gap)); }");
    assert_eq!(css, "a {\n  b: 3px;\n  c: calc(100% - var(--gap));\n}\n");
}

#[test]
fn null_declarations_are_omitted() {
    let css = compile("a { b: null; c: if(false, 1, null); d: kept; }");
    assert_eq!(css, "a {\n  d: kept;\n}\n");
}

#[test]
fn extend_rewrites_matching_selectors() {
    let css = compile(".error { color: red; }\n.fatal { @extend .error; }");
    assert!(css.starts_with(".error, .fatal {\n  color: red;\n}\n"));
}

#[test]
fn unknown_functions_pass_through_as_css() {
    let css = compile("a { filter: blur(2px); b: var(--x); }");
    assert_eq!(css, "a {\n  filter: blur(2px);\n  b: var(--x);\n}\n");
}

#[test]
fn compressed_style_minifies_structure_and_values() {
    let options = Options {
        style: OutputStyle::Compressed,
        ..Options::default()
    };
    let css = compile_string(
        "a, b { c: 0.5px; d: #ff0000; }\ne { f: g; }",
        &options,
    )
    .expect("compile");
    assert_eq!(css, "a,b{c:.5px;d:#f00}e{f:g}");
}

#[test]
fn indented_syntax_compiles_like_scss() {
    let options = Options {
        syntax: cascara::Syntax::Indented,
        ..Options::default()
    };
    let css = compile_string("$gap: 2px\na\n  b: $gap\n  c\n    d: e", &options)
        .expect("compile");
    assert_eq!(css, "a {\n  b: 2px;\n}\n\na c {\n  d: e;\n}\n");
}

#[test]
fn host_functions_are_callable_from_sassscript() {
    use cascara::value::{Number, Value};
    use cascara::Span;

    let mut options = Options::default();
    options.functions.insert(
        "double".to_string(),
        std::sync::Arc::new(|args: &[Value]| {
            let number = args[0].assert_number(Some("n"), Span::default())?;
            Ok(Value::Number(Number::with_units(
                number.value * 2.0,
                number.numerator_units.clone(),
                number.denominator_units.clone(),
            )))
        }),
    );
    let css = compile_string("a { b: double(21px); }", &options).expect("compile");
    assert_eq!(css, "a {\n  b: 42px;\n}\n");
}

#[test]
fn error_rules_abort_with_the_formatted_message() {
    let err = compile_string("a { @error \"boom\"; }", &Options::default())
        .expect_err("explicit error");
    let message = err.to_string();
    assert!(message.contains("boom"));
    assert!(message.contains("Error:"));
}

#[test]
fn runtime_errors_carry_an_excerpt_and_location() {
    let err = compile_string("a {\n  b: $missing;\n}", &Options::default())
        .expect_err("undefined variable");
    let message = err.to_string();
    assert!(message.contains("Undefined variable"));
    assert!(message.contains("b: $missing"));
    assert!(message.contains('^'));
}

#[test]
fn warnings_and_debug_flow_through_the_logger() {
    use cascara::Logger;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture {
        warnings: Mutex<Vec<String>>,
        debugs: Mutex<Vec<String>>,
    }

    impl Logger for Capture {
        fn warn(&self, message: &str, _deprecation: Option<cascara::Deprecation>) {
            self.warnings.lock().expect("lock").push(message.to_string());
        }

        fn debug(&self, message: &str) {
            self.debugs.lock().expect("lock").push(message.to_string());
        }
    }

    let capture = Arc::new(Capture::default());
    let options = Options {
        logger: capture.clone(),
        ..Options::default()
    };
    let css = compile_string(
        "@warn \"heads up\";\n@debug (a: 1);\na { b: c; }",
        &options,
    )
    .expect("compile");
    assert_eq!(css, "a {\n  b: c;\n}\n");
    assert_eq!(
        capture.warnings.lock().expect("lock").as_slice(),
        ["heads up".to_string()]
    );
    assert_eq!(
        capture.debugs.lock().expect("lock").as_slice(),
        ["(a: 1)".to_string()]
    );
}

#[test]
fn silenced_deprecations_never_reach_the_logger() {
    use cascara::{Deprecation, Logger};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Logger for Capture {
        fn warn(&self, message: &str, _deprecation: Option<Deprecation>) {
            self.0.lock().expect("lock").push(message.to_string());
        }

        fn debug(&self, _message: &str) {}
    }

    let capture = Arc::new(Capture::default());
    let options = Options {
        logger: capture.clone(),
        silence_deprecations: [Deprecation::SlashDiv].into_iter().collect(),
        ..Options::default()
    };
    // A computed division triggers the slash-div deprecation.
    let css = compile_string("$n: 10;\na { b: $n / 4; }", &options).expect("compile");
    assert_eq!(css, "a {\n  b: 2.5;\n}\n");
    assert!(capture.0.lock().expect("lock").is_empty());
}

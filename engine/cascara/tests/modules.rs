use std::sync::Arc;

use cascara::{compile_string, CompileError, InMemoryImporter, Options};

fn importer(entries: &[(&str, &str)]) -> Arc<InMemoryImporter> {
    let mut importer = InMemoryImporter::new("mem");
    for (name, contents) in entries {
        importer.insert(*name, *contents);
    }
    Arc::new(importer)
}

fn options(entries: &[(&str, &str)]) -> Options {
    Options {
        importers: vec![importer(entries)],
        ..Options::default()
    }
}

#[test]
fn use_binds_members_under_the_stem_namespace() {
    let options = options(&[(
        "theme",
        "$accent: teal;\n@function shade() { @return darken; }\na { outline: $accent; }",
    )]);
    let css = compile_string(
        "@use \"theme\";\nb { color: theme.$accent; kind: theme.shade(); }",
        &options,
    )
    .expect("compile");
    assert_eq!(
        css,
        "a {\n  outline: teal;\n}\n\nb {\n  color: teal;\n  kind: darken;\n}\n"
    );
}

#[test]
fn use_with_overrides_defaults_before_evaluation() {
    let options = options(&[(
        "theme",
        "$accent: blue !default;\n$muted: gray !default;\na { color: $accent; fill: $muted; }",
    )]);
    let css = compile_string("@use \"theme\" with ($accent: red);", &options).expect("compile");
    assert_eq!(css, "a {\n  color: red;\n  fill: gray;\n}\n");
}

#[test]
fn configuring_a_non_default_variable_is_an_error() {
    let options = options(&[("theme", "$accent: blue;\na { color: $accent; }")]);
    let err =
        compile_string("@use \"theme\" with ($accent: red);", &options).expect_err("not default");
    assert!(err.to_string().contains("was not declared with !default"));
}

#[test]
fn configuring_an_already_loaded_module_is_an_error() {
    let options = options(&[("theme", "$accent: blue !default;")]);
    let err = compile_string(
        "@use \"theme\";\n@use \"theme\" as t with ($accent: red);",
        &options,
    )
    .expect_err("already loaded");
    assert!(err.to_string().contains("already loaded"));
}

#[test]
fn use_cycles_are_errors() {
    let options = options(&[("a", "@use \"b\";"), ("b", "@use \"a\";")]);
    let err = compile_string("@use \"a\";", &options).expect_err("cycle");
    assert!(matches!(err, CompileError::Cycle { .. }));
}

#[test]
fn import_cycles_merge_what_exists_so_far() {
    let options = options(&[
        ("a", "@import \"b\";\nx { y: a; }"),
        ("b", "@import \"a\";\nz { w: b; }"),
    ]);
    let css = compile_string("@import \"a\";", &options).expect("tolerated cycle");
    assert_eq!(css.matches("x {").count(), 1);
    assert_eq!(css.matches("z {").count(), 1);
}

#[test]
fn import_merges_members_into_the_current_scope() {
    let options = options(&[("vars", "$gap: 4px;\n@mixin pad() { padding: $gap; }")]);
    let css = compile_string(
        "@import \"vars\";\na { @include pad(); margin: $gap; }",
        &options,
    )
    .expect("compile");
    assert_eq!(css, "a {\n  padding: 4px;\n  margin: 4px;\n}\n");
}

#[test]
fn forward_reexports_with_prefix_and_filters() {
    let options = options(&[
        ("leaf", "$color: teal !default;\n$secret: 1;\n@mixin pad() { padding: 2px; }"),
        ("mid", "@forward \"leaf\" as base-* show $base-color, base-pad;"),
    ]);
    let css = compile_string(
        "@use \"mid\";\na { color: mid.$base-color; @include mid.base-pad(); }",
        &options,
    )
    .expect("compile");
    assert_eq!(css, "a {\n  color: teal;\n  padding: 2px;\n}\n");

    let err = compile_string("@use \"mid\";\na { b: mid.$base-secret; }", &options)
        .expect_err("hidden by show");
    assert!(err.to_string().contains("Undefined variable"));
}

#[test]
fn forward_routes_configuration_to_the_leaf() {
    let options = options(&[
        ("leaf", "$color: teal !default;\na { color: $color; }"),
        ("mid", "@forward \"leaf\";"),
    ]);
    let css =
        compile_string("@use \"mid\" with ($color: red);", &options).expect("compile");
    assert_eq!(css, "a {\n  color: red;\n}\n");
}

#[test]
fn use_as_star_merges_into_the_root() {
    let options = options(&[("globals", "$gap: 2px;")]);
    let css = compile_string("@use \"globals\" as *;\na { gap: $gap; }", &options)
        .expect("compile");
    assert_eq!(css, "a {\n  gap: 2px;\n}\n");
}

#[test]
fn duplicate_namespaces_are_errors() {
    let options = options(&[("theme", "$a: 1;"), ("lib/theme", "$b: 2;")]);
    let err = compile_string("@use \"theme\";\n@use \"lib/theme\";", &options)
        .expect_err("namespace collision");
    assert!(err
        .to_string()
        .contains("There's already a module with namespace"));
}

#[test]
fn global_assignments_cannot_declare_new_variables() {
    let err = compile_string("a { $fresh: 1 !global; }", &Options::default())
        .expect_err("undeclared global");
    assert!(err.to_string().contains("can't declare new variables"));

    let css = compile_string(
        "$known: 1;\na { $known: 2 !global; }\nb { c: $known; }",
        &Options::default(),
    )
    .expect("compile");
    assert_eq!(css, "b {\n  c: 2;\n}\n");
}

#[test]
fn module_variables_reassign_during_their_own_evaluation() {
    let options = options(&[("counter", "$n: 1;\n$n: $n + 1;\na { n: $n; }")]);
    let css = compile_string("@use \"counter\";", &options).expect("compile");
    assert_eq!(css, "a {\n  n: 2;\n}\n");
}

#[test]
fn dependency_css_precedes_dependent_css() {
    let options = options(&[
        ("base", "base { b: c; }"),
        ("mid", "@use \"base\";\nmid { m: n; }"),
    ]);
    let css = compile_string("@use \"mid\";\nentry { e: f; }", &options).expect("compile");
    let base = css.find("base {").expect("base rule");
    let mid = css.find("mid {").expect("mid rule");
    let entry = css.find("entry {").expect("entry rule");
    assert!(base < mid && mid < entry);
}

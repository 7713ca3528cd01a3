use cascara::{compile_string, Options, OutputStyle};

const UNICODE: &str = "a {b: \u{1f46d}}";

#[test]
fn expanded_output_gains_a_charset_directive() {
    let css = compile_string(UNICODE, &Options::default()).expect("compile");
    assert!(css.starts_with("@charset \"UTF-8\";\n"));
    assert!(css.contains('\u{1f46d}'));
}

#[test]
fn compressed_output_gains_a_bom() {
    let options = Options {
        style: OutputStyle::Compressed,
        ..Options::default()
    };
    let css = compile_string(UNICODE, &options).expect("compile");
    assert!(css.starts_with('\u{feff}'));
}

#[test]
fn charset_false_suppresses_both_prefixes() {
    let options = Options {
        charset: false,
        ..Options::default()
    };
    let css = compile_string(UNICODE, &options).expect("compile");
    assert!(css.starts_with("a {"));

    let options = Options {
        charset: false,
        style: OutputStyle::Compressed,
        ..Options::default()
    };
    let css = compile_string(UNICODE, &options).expect("compile");
    assert!(!css.starts_with('\u{feff}'));
    assert!(css.starts_with("a{"));
}

#[test]
fn ascii_output_never_gains_a_prefix() {
    let css = compile_string("a {b: c}", &Options::default()).expect("compile");
    assert_eq!(css, "a {\n  b: c;\n}\n");
}

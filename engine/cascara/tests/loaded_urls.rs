use std::collections::HashSet;
use std::fs;

use cascara::{compile_string_to_result, compile_to_result, Options, SourceUrl};

fn write(dir: &std::path::Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

#[test]
fn every_load_mechanism_records_its_canonical_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "mercury.scss",
        "@use \"sass:meta\";\n@include meta.load-css(\"venus\");",
    );
    write(dir.path(), "_venus.scss", "@use \"earth\";");
    write(dir.path(), "_earth.scss", "@import \"mars\";");
    write(dir.path(), "_mars.scss", "@forward \"jupiter\";");
    write(dir.path(), "_jupiter.scss", "a {b: c}");

    let result = compile_to_result(dir.path().join("mercury.scss"), &Options::default())
        .expect("compile");

    let expected: HashSet<String> = [
        "mercury.scss",
        "_venus.scss",
        "_earth.scss",
        "_mars.scss",
        "_jupiter.scss",
    ]
    .iter()
    .map(|name| {
        SourceUrl::from_file_path(&dir.path().join(name))
            .expect("canonical url")
            .as_str()
            .to_string()
    })
    .collect();
    let observed: HashSet<String> = result
        .loaded_urls
        .iter()
        .map(|url| url.as_str().to_string())
        .collect();
    assert_eq!(observed, expected);
    assert_eq!(result.loaded_urls.len(), 5, "loaded_urls must not repeat");
}

#[test]
fn the_entrypoint_is_recorded_first_when_identified() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "entry.scss", "@use \"dep\";");
    write(dir.path(), "_dep.scss", "a {b: c}");

    let result =
        compile_to_result(dir.path().join("entry.scss"), &Options::default()).expect("compile");
    let entry = SourceUrl::from_file_path(&dir.path().join("entry.scss")).expect("url");
    assert_eq!(result.loaded_urls.first(), Some(&entry));
    assert_eq!(result.loaded_urls.len(), 2);
}

#[test]
fn string_entrypoints_appear_only_with_an_identifier() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "_dep.scss", "a {b: c}");

    let options = Options {
        load_paths: vec![dir.path().to_path_buf()],
        ..Options::default()
    };
    let result = compile_string_to_result("@use \"dep\";", &options).expect("compile");
    assert_eq!(result.loaded_urls.len(), 1, "only the dependency");

    let options = Options {
        load_paths: vec![dir.path().to_path_buf()],
        url: Some(SourceUrl::parse("u:entry").expect("url")),
        ..Options::default()
    };
    let result = compile_string_to_result("@use \"dep\";", &options).expect("compile");
    assert_eq!(result.loaded_urls.len(), 2);
    assert_eq!(result.loaded_urls[0].as_str(), "u:entry");
}

#[test]
fn builtin_modules_never_appear() {
    let result = compile_string_to_result(
        "@use \"sass:math\";\na {b: math.$pi}",
        &Options::default(),
    )
    .expect("compile");
    assert!(result.loaded_urls.is_empty());
}

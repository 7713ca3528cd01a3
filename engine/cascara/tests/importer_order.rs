use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cascara::{
    compile, compile_string, CompileResult, FilesystemImporter, Importer, Options, SourceUrl,
    StylesheetSource, Syntax,
};

fn write(dir: &std::path::Path, name: &str, contents: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write fixture");
}

#[test]
fn earlier_importers_take_precedence() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "first/other.scss", "a {b: from-first}");
    write(dir.path(), "second/other.scss", "a {b: from-second}");
    write(dir.path(), "test.scss", "@use \"other\";");

    let options = Options {
        importers: vec![
            Arc::new(FilesystemImporter::new(dir.path().join("first"))),
            Arc::new(FilesystemImporter::new(dir.path().join("second"))),
        ],
        ..Options::default()
    };
    let css = compile(dir.path().join("test.scss"), &options).expect("compile");
    assert_eq!(css, "a {\n  b: from-first;\n}\n");
}

#[test]
fn relative_resolution_beats_every_importer() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "subdir/other.scss", "a {b: from-load-path}");
    write(dir.path(), "other.scss", "a {b: from-relative}");
    write(dir.path(), "test.scss", "@use \"other\";");

    let options = Options {
        importers: vec![Arc::new(FilesystemImporter::new(dir.path().join("subdir")))],
        ..Options::default()
    };
    let css = compile(dir.path().join("test.scss"), &options).expect("compile");
    assert_eq!(css, "a {\n  b: from-relative;\n}\n");
}

#[test]
fn load_paths_are_consulted_after_importers() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "from-path/other.scss", "a {b: from-load-path}");
    write(dir.path(), "from-importer/other.scss", "a {b: from-importer}");

    let options = Options {
        importers: vec![Arc::new(FilesystemImporter::new(
            dir.path().join("from-importer"),
        ))],
        load_paths: vec![dir.path().join("from-path")],
        ..Options::default()
    };
    let css = compile_string("@use \"other\";", &options).expect("compile");
    assert_eq!(css, "a {\n  b: from-importer;\n}\n");

    let options = Options {
        load_paths: vec![dir.path().join("from-path")],
        ..Options::default()
    };
    let css = compile_string("@use \"other\";", &options).expect("compile");
    assert_eq!(css, "a {\n  b: from-load-path;\n}\n");
}

/// Claims one scheme, counting every canonicalize and load.
struct SchemeImporter {
    scheme: String,
    contents: String,
    canonicalized: AtomicUsize,
    loaded: AtomicUsize,
}

impl SchemeImporter {
    fn new(scheme: &str, contents: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            contents: contents.to_string(),
            canonicalized: AtomicUsize::new(0),
            loaded: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl Importer for SchemeImporter {
    async fn canonicalize(
        &self,
        reference: &str,
        _from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>> {
        let Some(rest) = reference.strip_prefix(&format!("{}:", self.scheme)) else {
            return Ok(None);
        };
        self.canonicalized.fetch_add(1, Ordering::SeqCst);
        SourceUrl::parse(&format!("{}:{rest}", self.scheme)).map(Some)
    }

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>> {
        if url.scheme() != self.scheme {
            return Ok(None);
        }
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(Some(StylesheetSource {
            url: url.clone(),
            contents: self.contents.clone(),
            syntax: Syntax::Scss,
        }))
    }
}

#[test]
fn absolute_references_hand_off_between_importers() {
    let first = Arc::new(SchemeImporter::new("first", "a {from: first}"));
    let second = Arc::new(SchemeImporter::new("second", "@use \"first:other\";"));
    let options = Options {
        importers: vec![first.clone(), second.clone()],
        ..Options::default()
    };

    let css = compile_string("@use \"second:other\";", &options).expect("compile");
    assert_eq!(css, "a {\n  from: first;\n}\n");
    // The `first:` reference written inside the second importer's module
    // skips that module's own resolver entirely.
    assert_eq!(first.loaded.load(Ordering::SeqCst), 1);
    assert_eq!(second.loaded.load(Ordering::SeqCst), 1);
}

#[test]
fn unclaimed_references_are_reported() {
    let err = compile_string("@use \"missing\";", &Options::default()).expect_err("no resolver");
    assert!(err
        .to_string()
        .contains("Can't find stylesheet to import."));
}

#[test]
fn ambiguous_candidates_are_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "lib/other.scss", "a {b: plain}");
    write(dir.path(), "lib/_other.scss", "a {b: partial}");

    let options = Options {
        load_paths: vec![dir.path().join("lib")],
        ..Options::default()
    };
    let err = compile_string("@use \"other\";", &options).expect_err("ambiguous");
    assert!(err.to_string().contains("It's not clear which file to import"));
}

#[test]
fn partials_resolve_from_their_stem() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "lib/_theme.scss", "a {b: c}");
    write(dir.path(), "lib/pkg/_index.scss", "d {e: f}");

    let options = Options {
        load_paths: vec![dir.path().join("lib")],
        ..Options::default()
    };
    let css = compile_string("@use \"theme\";\n@use \"pkg\";", &options).expect("compile");
    assert_eq!(css, "a {\n  b: c;\n}\n\nd {\n  e: f;\n}\n");
}

#[test]
fn package_urls_rewrite_to_their_base() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "vendor/pkg/helpers.scss", "a {b: from-package}");

    let base = SourceUrl::from_file_path(&dir.path().join("vendor/pkg")).expect("base url");
    let options = Options {
        package_config: [("pkg".to_string(), base)].into_iter().collect(),
        ..Options::default()
    };
    let css = compile_string("@use \"package:pkg/helpers\";", &options).expect("compile");
    assert_eq!(css, "a {\n  b: from-package;\n}\n");
}

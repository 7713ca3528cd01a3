use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use cascara::{
    compile_string, compile_string_async, CompileResult, Importer, Options, SourceUrl,
    StylesheetSource, Syntax,
};

/// Suspends exactly once, waking immediately; gives a resolver a real
/// suspension point without depending on any executor's clock.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Serves one stylesheet, counts how often it is fetched, and suspends at
/// every load so concurrent compilations can interleave mid-resolution.
struct CountingImporter {
    contents: String,
    loads: AtomicUsize,
}

impl CountingImporter {
    fn new(contents: &str) -> Self {
        Self {
            contents: contents.to_string(),
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl Importer for CountingImporter {
    async fn canonicalize(
        &self,
        reference: &str,
        _from: Option<&SourceUrl>,
    ) -> CompileResult<Option<SourceUrl>> {
        if reference == "other.scss" {
            SourceUrl::parse("mem:other.scss").map(Some)
        } else {
            Ok(None)
        }
    }

    async fn load(&self, url: &SourceUrl) -> CompileResult<Option<StylesheetSource>> {
        YieldOnce(false).await;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Some(StylesheetSource {
            url: url.clone(),
            contents: self.contents.clone(),
            syntax: Syntax::Scss,
        }))
    }
}

const ENTRY: &str = "@use \"sass:meta\";\n\
    @include meta.load-css(\"other.scss\");\n\
    @include meta.load-css(\"other.scss\");";

#[test]
fn repeated_load_css_evaluates_the_module_once() {
    let importer = Arc::new(CountingImporter::new("/**/"));
    let options = Options {
        importers: vec![importer.clone()],
        ..Options::default()
    };
    let css = compile_string(ENTRY, &options).expect("compile");
    // Both includes splice the comment; the module loads once.
    assert_eq!(css.matches("/**/").count(), 2);
    assert_eq!(importer.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_compilations_each_load_exactly_once() {
    let importer = Arc::new(CountingImporter::new("/**/"));
    let options = Options {
        importers: vec![importer.clone()],
        ..Options::default()
    };
    // The importer suspends inside every load, so the two compilations
    // genuinely interleave mid-resolution; each installs its in-progress
    // slot before that suspension and coalesces its own second load-css.
    let (first, second) = tokio::join!(
        compile_string_async(ENTRY, &options),
        compile_string_async(ENTRY, &options),
    );
    let first = first.expect("first compilation");
    let second = second.expect("second compilation");
    assert_eq!(first, second);
    assert_eq!(first.matches("/**/").count(), 2);
    // One load per compilation: the module caches are per-compilation.
    assert_eq!(importer.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn a_used_module_is_fetched_once_even_when_imported_too() {
    let importer = Arc::new(CountingImporter::new("a {b: c}"));
    let options = Options {
        importers: vec![importer.clone()],
        ..Options::default()
    };
    let css = compile_string(
        "@use \"other.scss\";\n@import \"other.scss\";",
        &options,
    )
    .expect("compile");
    assert_eq!(importer.loads.load(Ordering::SeqCst), 1);
    assert_eq!(css.matches("a {").count(), 2);
}

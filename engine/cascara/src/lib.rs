/* Copyright (c) 2026 Olle Mårtensson. This Source Code Form is subject to the terms of the Eclipse Public License, v. 2.0. */
//! Cascara: a Sass compiler.
//!
//! This crate compiles stylesheets written in the scss, indented, or plain
//! css surface syntaxes into css, with the module system (`@use`,
//! `@forward`, configuration), the legacy `@import` path, a prioritized
//! importer chain for cross-stylesheet references, and the SassScript value
//! algebra.
//!
//! # Examples
//! ```
//! use cascara::{compile_string, Options};
//!
//! let css = compile_string("a { b: 1px + 2px; }", &Options::default()).expect("compile");
//! assert_eq!(css, "a {\n  b: 3px;\n}\n");
//! ```

mod ast;
mod builtin;
mod css;
mod error;
mod evaluate;
mod importer;
mod loader;
mod logger;
mod module;
mod options;
mod parse;
mod uri;
pub mod value;

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

pub use error::{CompileError, CompileResult, Span, TraceFrame};
pub use importer::{
    FilesystemImporter, Importer, InMemoryImporter, PackageImporter, StylesheetSource,
};
pub use logger::{Deprecation, Logger, NullLogger, StdLogger};
pub use module::Callable;
pub use options::{HostFunction, Options, OutputStyle, Syntax};
pub use uri::SourceUrl;
pub use value::Value;

use crate::css::{apply_charset, write_stylesheet};
use crate::evaluate::{apply_extensions, CompileContext, Evaluator};
use crate::importer::ImporterChain;
use crate::loader::ModuleRegistry;
use crate::logger::WarningSink;
use crate::module::{Configuration, Module};
use crate::parse::parse_stylesheet;

/// The outcome of a compilation: the css text and the ordered set of
/// canonical identifiers that were loaded. The entrypoint appears iff it
/// had an identifier (always for path entrypoints, only with the `url`
/// option for string entrypoints).
#[derive(Clone, Debug)]
pub struct CompilationResult {
    pub css: String,
    pub loaded_urls: Vec<SourceUrl>,
}

/// Compile the stylesheet at a filesystem path.
///
/// The synchronous entry points drive the same pipeline as the async ones
/// on the calling thread; they are meant for synchronous resolvers, which
/// never suspend.
pub fn compile(path: impl AsRef<Path>, options: &Options) -> CompileResult<String> {
    block_on(compile_async(path, options))
}

/// Compile the stylesheet at a filesystem path, reporting `loaded_urls`.
pub fn compile_to_result(
    path: impl AsRef<Path>,
    options: &Options,
) -> CompileResult<CompilationResult> {
    block_on(compile_to_result_async(path, options))
}

/// Compile an in-memory stylesheet.
pub fn compile_string(source: &str, options: &Options) -> CompileResult<String> {
    block_on(compile_string_async(source, options))
}

/// Compile an in-memory stylesheet, reporting `loaded_urls`.
pub fn compile_string_to_result(
    source: &str,
    options: &Options,
) -> CompileResult<CompilationResult> {
    block_on(compile_string_to_result_async(source, options))
}

/// Async variant of [`compile`]. Suspends only inside resolver calls;
/// within one compilation the module cache's in-progress slot still
/// guarantees at-most-once evaluation per canonical identifier across
/// those suspensions.
pub async fn compile_async(
    path: impl AsRef<Path>,
    options: &Options,
) -> CompileResult<String> {
    compile_to_result_async(path, options)
        .await
        .map(|result| result.css)
}

/// Async variant of [`compile_to_result`].
pub async fn compile_to_result_async(
    path: impl AsRef<Path>,
    options: &Options,
) -> CompileResult<CompilationResult> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let url = SourceUrl::from_file_path(path)?;
    let syntax = match path.extension().and_then(|ext| ext.to_str()) {
        Some("sass") => Syntax::Indented,
        Some("css") => Syntax::Css,
        _ => Syntax::Scss,
    };
    run(&contents, syntax, Some(url), options).await
}

/// Async variant of [`compile_string`].
pub async fn compile_string_async(source: &str, options: &Options) -> CompileResult<String> {
    compile_string_to_result_async(source, options)
        .await
        .map(|result| result.css)
}

/// Async variant of [`compile_string_to_result`].
pub async fn compile_string_to_result_async(
    source: &str,
    options: &Options,
) -> CompileResult<CompilationResult> {
    run(source, options.syntax, options.url.clone(), options).await
}

/// Drive a compilation future on the calling thread. Compilations suspend
/// only when a resolver does; with synchronous resolvers the loop finishes
/// on the first poll.
pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    use std::task::{Context, Poll, Waker};

    let mut future = std::pin::pin!(future);
    let mut context = Context::from_waker(Waker::noop());
    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(output) => return output,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}

/// One-shot compilation: build the per-compilation context, evaluate the
/// entry module, assemble dependency css in completion order, and apply the
/// extension rewrites and charset policy.
async fn run(
    source: &str,
    syntax: Syntax,
    url: Option<SourceUrl>,
    options: &Options,
) -> CompileResult<CompilationResult> {
    let (builtin_modules, global_functions) = builtin::build_modules();
    let ctx = Rc::new(CompileContext {
        chain: ImporterChain::from_options(options),
        sink: WarningSink::new(
            std::sync::Arc::clone(&options.logger),
            options.silence_deprecations.clone(),
        ),
        style: options.style,
        host_functions: options.functions.clone(),
        builtin_modules,
        global_functions,
    });
    let registry = Rc::new(RefCell::new(ModuleRegistry::new()));

    {
        let mut registry = registry.borrow_mut();
        registry.sources.insert(url.as_ref(), source);
        if let Some(url) = &url {
            registry.record_loaded(url);
        }
    }

    let result = evaluate_entry(&ctx, &registry, source, syntax, url.clone(), options).await;
    match result {
        Ok(()) => {}
        Err(err) => {
            let err = err.with_url(url.as_ref());
            let registry = registry.borrow();
            return Err(finalize_error(err, &registry));
        }
    }

    let registry_ref = registry.borrow();
    let mut nodes = registry_ref.collect_css();
    let extensions = registry_ref.collect_extensions();
    apply_extensions(&mut nodes, &extensions);
    let css = write_stylesheet(&nodes, options.style);
    let css = apply_charset(css, options.style, options.charset);
    Ok(CompilationResult {
        css,
        loaded_urls: registry_ref.loaded_urls(),
    })
}

async fn evaluate_entry(
    ctx: &Rc<CompileContext>,
    registry: &Rc<RefCell<ModuleRegistry>>,
    source: &str,
    syntax: Syntax,
    url: Option<SourceUrl>,
    _options: &Options,
) -> CompileResult<()> {
    let sheet = parse_stylesheet(source, syntax)?;
    let cell = Rc::new(RefCell::new(Module::new(url.clone())));
    let index = match &url {
        Some(url) => registry.borrow_mut().begin(url, Rc::clone(&cell)),
        None => registry.borrow_mut().add_module(Rc::clone(&cell)),
    };
    let mut evaluator = Evaluator::new(
        Rc::clone(ctx),
        Rc::clone(registry),
        Rc::clone(&cell),
        url.clone(),
        Configuration::empty(),
    );
    evaluator.evaluate_module(&sheet).await?;
    match &url {
        Some(url) => registry.borrow_mut().complete(url, index, true),
        None => registry.borrow_mut().push_emit(index),
    }
    Ok(())
}

/// Fold the caret excerpt and sass trace into the user-visible message of
/// parse and runtime errors; the remaining kinds already state their
/// condition.
fn finalize_error(err: CompileError, registry: &ModuleRegistry) -> CompileError {
    match err {
        CompileError::Parse { .. } | CompileError::Runtime { .. } => {
            let rendered = registry.sources.render(&err);
            match err {
                CompileError::Parse { span, url, .. } => CompileError::Parse {
                    message: rendered,
                    span,
                    url,
                },
                CompileError::Runtime {
                    span, url, trace, ..
                } => CompileError::Runtime {
                    message: rendered,
                    span,
                    url,
                    trace,
                },
                _ => unreachable!("outer match narrowed the variant"),
            }
        }
        other => other,
    }
}

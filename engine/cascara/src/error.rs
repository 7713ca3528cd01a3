use std::collections::HashMap;
use std::fmt::Write;

use thiserror::Error;

use crate::uri::SourceUrl;

/// Result alias used across the crate.
pub type CompileResult<T> = Result<T, CompileError>;

/// A byte range into the source text of one stylesheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One frame of the sass call stack, innermost first when attached to an
/// error.
#[derive(Clone, Debug)]
pub struct TraceFrame {
    pub name: String,
    pub url: Option<SourceUrl>,
    pub span: Span,
}

/// Error variants surfaced by the compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{message}")]
    Parse {
        message: String,
        span: Span,
        url: Option<SourceUrl>,
    },
    #[error("{message}")]
    Runtime {
        message: String,
        span: Span,
        url: Option<SourceUrl>,
        trace: Vec<TraceFrame>,
    },
    #[error("Can't find stylesheet to import.")]
    UnresolvedImport {
        reference: String,
        span: Span,
        url: Option<SourceUrl>,
    },
    #[error("The importer canonicalized {url} but could not load it.")]
    CanonicalizedButNotLoaded {
        url: SourceUrl,
        span: Span,
        from: Option<SourceUrl>,
    },
    #[error("Module loop: {url} is already being loaded.")]
    Cycle {
        url: SourceUrl,
        span: Span,
        from: Option<SourceUrl>,
    },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        CompileError::Parse {
            message: message.into(),
            span,
            url: None,
        }
    }

    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        CompileError::Runtime {
            message: message.into(),
            span,
            url: None,
            trace: Vec::new(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Parse { span, .. }
            | CompileError::Runtime { span, .. }
            | CompileError::UnresolvedImport { span, .. }
            | CompileError::CanonicalizedButNotLoaded { span, .. }
            | CompileError::Cycle { span, .. } => Some(*span),
            CompileError::InvalidUrl(_) | CompileError::Io(_) => None,
        }
    }

    pub fn url(&self) -> Option<&SourceUrl> {
        match self {
            CompileError::Parse { url, .. } | CompileError::Runtime { url, .. } => url.as_ref(),
            CompileError::UnresolvedImport { url, .. } => url.as_ref(),
            CompileError::CanonicalizedButNotLoaded { from, .. }
            | CompileError::Cycle { from, .. } => from.as_ref(),
            CompileError::InvalidUrl(_) | CompileError::Io(_) => None,
        }
    }

    /// Attach the stylesheet the error was raised in, unless an inner frame
    /// already claimed it.
    pub(crate) fn with_url(mut self, source: Option<&SourceUrl>) -> Self {
        let slot = match &mut self {
            CompileError::Parse { url, .. } | CompileError::Runtime { url, .. } => url,
            CompileError::UnresolvedImport { url, .. } => url,
            CompileError::CanonicalizedButNotLoaded { from, .. }
            | CompileError::Cycle { from, .. } => from,
            CompileError::InvalidUrl(_) | CompileError::Io(_) => return self,
        };
        if slot.is_none() {
            *slot = source.cloned();
        }
        self
    }

    /// Record a mixin/function frame on a runtime error as it unwinds.
    pub(crate) fn push_frame(mut self, frame: TraceFrame) -> Self {
        if let CompileError::Runtime { trace, .. } = &mut self {
            trace.push(frame);
        }
        self
    }
}

/// The source text of every stylesheet touched by one compilation, kept so
/// errors can excerpt the offending line. The entrypoint of a string
/// compilation without a `url` is stored under the empty key.
#[derive(Debug, Default)]
pub struct SourceCatalog {
    entries: HashMap<String, String>,
}

impl SourceCatalog {
    pub fn insert(&mut self, url: Option<&SourceUrl>, contents: &str) {
        let key = url.map(|u| u.as_str().to_string()).unwrap_or_default();
        self.entries.entry(key).or_insert_with(|| contents.to_string());
    }

    fn get(&self, url: Option<&SourceUrl>) -> Option<&str> {
        let key = url.map(SourceUrl::as_str).unwrap_or("");
        self.entries.get(key).map(String::as_str)
    }

    /// Render an error the way it is shown to end users: the message, a
    /// caret-highlighted excerpt of the offending line, and the sass call
    /// stack from innermost to outermost frame.
    pub fn render(&self, err: &CompileError) -> String {
        let mut out = String::new();
        write!(out, "Error: {err}").expect("string writer");
        let (span, url) = (err.span(), err.url());
        if let (Some(span), Some(source)) = (span, self.get(url)) {
            let (line, column) = line_and_column(source, span.start);
            let text = source.lines().nth(line - 1).unwrap_or("");
            let gutter = line.to_string();
            let pad = " ".repeat(gutter.len());
            let caret_len = span
                .end
                .saturating_sub(span.start)
                .clamp(1, text.len().saturating_sub(column - 1).max(1));
            write!(
                out,
                "\n{pad} |\n{gutter} | {text}\n{pad} | {caret:>offset$}",
                caret = "^".repeat(caret_len),
                offset = column - 1 + caret_len,
            )
            .expect("string writer");
            write!(
                out,
                "\n{pad} |\n  {} {line}:{column}  root stylesheet",
                url.map(SourceUrl::as_str).unwrap_or("-"),
            )
            .expect("string writer");
        }
        if let CompileError::Runtime { trace, .. } = err {
            for frame in trace {
                let location = match (&frame.url, self.get(frame.url.as_ref())) {
                    (Some(url), Some(source)) => {
                        let (line, column) = line_and_column(source, frame.span.start);
                        format!("{} {line}:{column}", url.as_str())
                    }
                    _ => "-".to_string(),
                };
                write!(out, "\n  {location}  {}", frame.name).expect("string writer");
            }
        }
        out
    }
}

fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut column = 1;
    for ch in source[..offset].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column_counts_from_one() {
        assert_eq!(line_and_column("a {\n  b: c;\n}", 0), (1, 1));
        assert_eq!(line_and_column("a {\n  b: c;\n}", 6), (2, 3));
    }

    #[test]
    fn render_excerpts_the_offending_line() {
        let mut catalog = SourceCatalog::default();
        catalog.insert(None, "a {\n  b: $missing;\n}");
        let err = CompileError::runtime("Undefined variable.", Span::new(9, 17));
        let rendered = catalog.render(&err);
        assert!(rendered.starts_with("Error: Undefined variable."));
        assert!(rendered.contains("2 |   b: $missing;"));
        assert!(rendered.contains("^"));
    }
}

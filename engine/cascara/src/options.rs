use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CompileResult;
use crate::importer::Importer;
use crate::logger::{Deprecation, Logger, StdLogger};
use crate::uri::SourceUrl;
use crate::value::Value;

/// The surface syntax of a stylesheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Syntax {
    #[default]
    Scss,
    Indented,
    Css,
}

/// How the resulting CSS is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

/// A function implemented by the embedding application, callable from
/// SassScript by name. Receives the evaluated positional arguments.
pub type HostFunction = dyn Fn(&[Value]) -> CompileResult<Value> + Send + Sync;

/// Options accepted by every compilation entry point.
#[derive(Clone)]
pub struct Options {
    /// User resolvers, consulted in declaration order after the relative
    /// resolver and before `load_paths`.
    pub importers: Vec<Arc<dyn Importer + Send + Sync>>,
    /// Base directories, each wrapped as a filesystem importer and consulted
    /// after all importers.
    pub load_paths: Vec<PathBuf>,
    /// Package name to base identifier, for `package:` URLs.
    pub package_config: HashMap<String, SourceUrl>,
    /// The resolver associated with a string entrypoint; relative references
    /// in the entrypoint resolve through it first.
    pub importer: Option<Arc<dyn Importer + Send + Sync>>,
    /// The identifier of a string entrypoint. When supplied it is recorded in
    /// `loaded_urls`.
    pub url: Option<SourceUrl>,
    /// Surface syntax of a string entrypoint.
    pub syntax: Syntax,
    pub style: OutputStyle,
    /// Whether to emit `@charset`/BOM prefixes for non-ASCII output.
    pub charset: bool,
    /// Deprecation tags that never reach the logger.
    pub silence_deprecations: HashSet<Deprecation>,
    /// Application-defined SassScript functions by name.
    pub functions: HashMap<String, Arc<HostFunction>>,
    /// Sink for warnings and debug messages.
    pub logger: Arc<dyn Logger>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            importers: Vec::new(),
            load_paths: Vec::new(),
            package_config: HashMap::new(),
            importer: None,
            url: None,
            syntax: Syntax::default(),
            style: OutputStyle::default(),
            charset: true,
            silence_deprecations: HashSet::new(),
            functions: HashMap::new(),
            logger: Arc::new(StdLogger),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("importers", &self.importers.len())
            .field("load_paths", &self.load_paths)
            .field("package_config", &self.package_config)
            .field("importer", &self.importer.is_some())
            .field("url", &self.url)
            .field("syntax", &self.syntax)
            .field("style", &self.style)
            .field("charset", &self.charset)
            .field("silence_deprecations", &self.silence_deprecations)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Deprecated behaviors that warn through the logger instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Deprecation {
    /// `/` as division outside `math.div` and `calc()`.
    SlashDiv,
    /// Unit-carrying numbers where an integer index is expected.
    FunctionUnits,
    /// `@import`, superseded by the module system.
    Import,
}

impl Deprecation {
    pub fn id(self) -> &'static str {
        match self {
            Deprecation::SlashDiv => "slash-div",
            Deprecation::FunctionUnits => "function-units",
            Deprecation::Import => "import",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "slash-div" => Some(Deprecation::SlashDiv),
            "function-units" => Some(Deprecation::FunctionUnits),
            "import" => Some(Deprecation::Import),
            _ => None,
        }
    }
}

impl fmt::Display for Deprecation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Sink for the warnings and debug messages a compilation produces.
///
/// `@warn`, `@debug` and deprecation notices dispatch here and the
/// compilation continues; they are never errors.
pub trait Logger: Send + Sync {
    fn warn(&self, message: &str, deprecation: Option<Deprecation>);
    fn debug(&self, message: &str);
}

/// Logger that writes to standard error.
#[derive(Debug, Default)]
pub struct StdLogger;

impl Logger for StdLogger {
    fn warn(&self, message: &str, deprecation: Option<Deprecation>) {
        match deprecation {
            Some(tag) => eprintln!("DEPRECATION WARNING [{tag}]: {message}"),
            None => eprintln!("WARNING: {message}"),
        }
    }

    fn debug(&self, message: &str) {
        eprintln!("DEBUG: {message}");
    }
}

/// Logger that swallows everything.
#[derive(Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn warn(&self, _message: &str, _deprecation: Option<Deprecation>) {}

    fn debug(&self, _message: &str) {}
}

/// The per-compilation warning dispatcher. One instance is created for each
/// compilation and threaded through the evaluator, so concurrent
/// compilations never share warning state.
#[derive(Clone)]
pub(crate) struct WarningSink {
    logger: Arc<dyn Logger>,
    silenced: HashSet<Deprecation>,
}

impl WarningSink {
    pub(crate) fn new(logger: Arc<dyn Logger>, silenced: HashSet<Deprecation>) -> Self {
        Self { logger, silenced }
    }

    pub(crate) fn warn(&self, message: &str) {
        self.logger.warn(message, None);
    }

    pub(crate) fn deprecation(&self, tag: Deprecation, message: &str) {
        if self.silenced.contains(&tag) {
            tracing::trace!(deprecation = tag.id(), "silenced deprecation warning");
            return;
        }
        self.logger.warn(message, Some(tag));
    }

    pub(crate) fn debug(&self, message: &str) {
        self.logger.debug(message);
    }
}

impl fmt::Debug for WarningSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarningSink")
            .field("silenced", &self.silenced)
            .finish()
    }
}

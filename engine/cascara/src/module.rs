use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::CallableDecl;
use crate::css::CssNode;
use crate::error::Span;
use crate::evaluate::Captures;
use crate::options::HostFunction;
use crate::uri::SourceUrl;
use crate::value::Value;

/// A built-in SassScript function.
pub type BuiltinFn = fn(
    &mut crate::evaluate::Evaluator,
    crate::evaluate::EvaluatedArgs,
) -> crate::error::CompileResult<Value>;

/// A built-in mixin. The sink receives css nodes spliced at the include
/// position. Returns a future because `meta.load-css` re-enters the module
/// loader, which can suspend at resolver boundaries.
pub type BuiltinMixinFn = for<'a> fn(
    &'a mut crate::evaluate::Evaluator,
    crate::evaluate::EvaluatedArgs,
    &'a mut Vec<CssNode>,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = crate::error::CompileResult<()>> + 'a>,
>;

/// A `@mixin` or `@function` declared in a stylesheet, closed over the
/// scopes visible at its declaration site.
pub struct UserCallable {
    pub declaration: Rc<CallableDecl>,
    pub captures: Captures,
    pub url: Option<SourceUrl>,
}

#[derive(Clone)]
pub enum CallableKind {
    UserFunction(Rc<UserCallable>),
    UserMixin(Rc<UserCallable>),
    Builtin(BuiltinFn),
    BuiltinMixin(BuiltinMixinFn),
    Host(Arc<HostFunction>),
}

/// A reference to a callable, either user-defined or built-in. Two
/// references are the same value iff they name the same underlying
/// callable.
#[derive(Clone)]
pub struct Callable {
    name: String,
    kind: CallableKind,
}

impl Callable {
    pub fn new(name: impl Into<String>, kind: CallableKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CallableKind {
        &self.kind
    }

    pub fn is_mixin(&self) -> bool {
        matches!(
            self.kind,
            CallableKind::UserMixin(_) | CallableKind::BuiltinMixin(_)
        )
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.kind, &other.kind) {
            (CallableKind::UserFunction(a), CallableKind::UserFunction(b))
            | (CallableKind::UserMixin(a), CallableKind::UserMixin(b)) => Rc::ptr_eq(a, b),
            (CallableKind::Builtin(a), CallableKind::Builtin(b)) => *a == *b,
            (CallableKind::BuiltinMixin(a), CallableKind::BuiltinMixin(b)) => *a == *b,
            (CallableKind::Host(a), CallableKind::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Callable {}

impl Hash for Callable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            CallableKind::UserFunction(_) => "function",
            CallableKind::UserMixin(_) => "mixin",
            CallableKind::Builtin(_) => "built-in function",
            CallableKind::BuiltinMixin(_) => "built-in mixin",
            CallableKind::Host(_) => "host function",
        };
        write!(f, "Callable({kind} {})", self.name)
    }
}

/// One `@extend` recorded while evaluating a module.
#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
    pub target: String,
    pub extender: String,
    pub optional: bool,
}

/// The result of evaluating one canonical source: a namespace of members,
/// the css it produced, and its extensions. Never mutated once evaluation
/// completes.
#[derive(Debug, Default)]
pub struct Module {
    pub url: Option<SourceUrl>,
    pub variables: HashMap<String, Value>,
    pub mixins: HashMap<String, Callable>,
    pub functions: HashMap<String, Callable>,
    /// Variable names declared with `!default`, the configurable surface.
    pub defaulted: HashSet<String>,
    pub extensions: Vec<Extension>,
    pub css: Vec<CssNode>,
}

impl Module {
    pub fn new(url: Option<SourceUrl>) -> Self {
        Self {
            url,
            ..Default::default()
        }
    }

    /// Copy this module's members into a forwarding module, applying the
    /// `show`/`hide` filters and prefix of the `@forward` rule.
    pub fn forward_into(
        &self,
        target: &mut Module,
        prefix: Option<&str>,
        show: Option<&[String]>,
        hide: Option<&[String]>,
    ) {
        let renamed = |name: &str| match prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        };
        // The show/hide lists name members as the forwarding module spells
        // them, prefix included.
        for (name, value) in &self.variables {
            let forwarded = renamed(name);
            if member_visible(show, hide, &forwarded, true) {
                if self.defaulted.contains(name) {
                    target.defaulted.insert(forwarded.clone());
                }
                target.variables.insert(forwarded, value.clone());
            }
        }
        for (name, mixin) in &self.mixins {
            let forwarded = renamed(name);
            if member_visible(show, hide, &forwarded, false) {
                target.mixins.insert(forwarded, mixin.clone());
            }
        }
        for (name, function) in &self.functions {
            let forwarded = renamed(name);
            if member_visible(show, hide, &forwarded, false) {
                target.functions.insert(forwarded, function.clone());
            }
        }
    }
}

/// Whether a member passes a `show`/`hide` list. Variables appear in the
/// lists with their `$` sigil, mixins and functions bare.
fn member_visible(
    show: Option<&[String]>,
    hide: Option<&[String]>,
    name: &str,
    is_variable: bool,
) -> bool {
    let matches = |entry: &String| {
        if is_variable {
            entry.strip_prefix('$') == Some(name)
        } else {
            entry == name
        }
    };
    if let Some(show) = show {
        return show.iter().any(matches);
    }
    if let Some(hide) = hide {
        return !hide.iter().any(matches);
    }
    true
}

/// One `with (...)` binding, shared between a `@use` site and the modules a
/// `@forward` chain carries it through so consumption is visible at the
/// original site.
#[derive(Debug)]
pub struct ConfiguredValue {
    pub value: Value,
    pub span: Span,
    used: Cell<bool>,
}

/// The `with (...)` clause of a `@use` or `@forward`, applied to `!default`
/// declarations of the loaded module. Consumed exactly once per entry.
#[derive(Debug, Default)]
pub struct Configuration {
    entries: HashMap<String, Rc<ConfiguredValue>>,
}

impl Configuration {
    pub fn empty() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn new(values: Vec<(String, Value, Span)>) -> Rc<Self> {
        let mut entries = HashMap::new();
        for (name, value, span) in values {
            entries.insert(
                name,
                Rc::new(ConfiguredValue {
                    value,
                    span,
                    used: Cell::new(false),
                }),
            );
        }
        Rc::new(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured value for a `!default` declaration, marking the entry
    /// consumed.
    pub fn take(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(|entry| {
            entry.used.set(true);
            entry.value.clone()
        })
    }

    /// An entry no `!default` declaration consumed, the error case of
    /// configuring an unconfigurable variable.
    pub fn first_unused(&self) -> Option<(String, Span)> {
        let mut unused: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.used.get())
            .collect();
        unused.sort_by(|a, b| a.0.cmp(b.0));
        unused
            .first()
            .map(|(name, entry)| ((*name).clone(), entry.span))
    }

    /// The configuration a `@forward` passes down: the incoming entries,
    /// plus the forward's own `with` bindings for names the incoming
    /// configuration does not already pin. A non-guarded forward binding
    /// (no `!default` in the clause) always wins.
    pub fn forward(&self, with: Vec<(String, Value, Span, bool)>) -> Rc<Configuration> {
        let mut entries = self.entries.clone();
        for (name, value, span, guarded) in with {
            if guarded && entries.contains_key(&name) {
                continue;
            }
            entries.insert(
                name,
                Rc::new(ConfiguredValue {
                    value,
                    span,
                    used: Cell::new(false),
                }),
            );
        }
        Rc::new(Configuration { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_lists_distinguish_variables_from_callables() {
        let show = vec!["$color".to_string(), "shade".to_string()];
        assert!(member_visible(Some(&show), None, "color", true));
        assert!(!member_visible(Some(&show), None, "color", false));
        assert!(member_visible(Some(&show), None, "shade", false));
        assert!(!member_visible(Some(&show), None, "other", true));
    }

    #[test]
    fn hide_lists_are_the_complement() {
        let hide = vec!["$color".to_string()];
        assert!(!member_visible(None, Some(&hide), "color", true));
        assert!(member_visible(None, Some(&hide), "other", true));
    }

    #[test]
    fn configuration_tracks_consumption_through_forwards() {
        let config = Configuration::new(vec![(
            "accent".to_string(),
            Value::TRUE,
            Span::default(),
        )]);
        let forwarded = config.forward(Vec::new());
        assert_eq!(forwarded.take("accent"), Some(Value::TRUE));
        // The original @use site sees the entry as consumed.
        assert!(config.first_unused().is_none());
    }

    #[test]
    fn guarded_forward_bindings_lose_to_the_outer_configuration() {
        let outer = Configuration::new(vec![(
            "accent".to_string(),
            Value::TRUE,
            Span::default(),
        )]);
        let inner = outer.forward(vec![(
            "accent".to_string(),
            Value::FALSE,
            Span::default(),
            true,
        )]);
        assert_eq!(inner.take("accent"), Some(Value::TRUE));
    }
}

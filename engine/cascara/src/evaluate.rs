use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{
    ArgumentInvocation, CallableDecl, ConfigEntry, Expr, ImportTarget, InterpPart, Interpolation,
    Statement, Stylesheet, UseNamespace,
};
use crate::css::{CssItem, CssNode};
use crate::error::{CompileError, CompileResult, Span, TraceFrame};
use crate::importer::{ImporterChain, ImporterId, StylesheetSource};
use crate::loader::{ModuleRegistry, ModuleSlot};
use crate::logger::{Deprecation, WarningSink};
use crate::module::{
    Callable, CallableKind, Configuration, Extension, Module, UserCallable,
};
use crate::options::{HostFunction, OutputStyle};
use crate::parse::parse_stylesheet;
use crate::uri::SourceUrl;
use crate::value::{
    argument_error, binary_operation, inspect_value, slash_fallback, unary_operation,
    write_value, ArgList, BinaryOp, CalcOp, Calculation, CalculationArg, Color, List,
    ListSeparator, Number, SassMap, Value,
};

/// Boxed non-Send future, the shape the recursive evaluation methods
/// return. Compilations run on one thread; values hold `Rc`s, so the
/// futures are deliberately not `Send`.
pub(crate) type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Everything one compilation shares between module evaluations.
pub(crate) struct CompileContext {
    pub(crate) chain: ImporterChain,
    pub(crate) sink: WarningSink,
    pub(crate) style: OutputStyle,
    pub(crate) host_functions: HashMap<String, Arc<HostFunction>>,
    pub(crate) builtin_modules: HashMap<&'static str, Rc<RefCell<Module>>>,
    pub(crate) global_functions: Rc<RefCell<Module>>,
}

/// One lexical scope of local variables, mixins and functions.
#[derive(Clone, Default)]
pub(crate) struct Scope {
    variables: HashMap<String, Value>,
    mixins: HashMap<String, Callable>,
    functions: HashMap<String, Callable>,
}

/// The environment a callable closes over at its declaration site.
#[derive(Clone)]
pub struct Captures {
    module: Rc<RefCell<Module>>,
    scopes: Vec<Scope>,
    namespaces: HashMap<String, Rc<RefCell<Module>>>,
    globals: Vec<Rc<RefCell<Module>>>,
    url: Option<SourceUrl>,
}

/// The content block of an `@include ... { ... }`.
pub(crate) struct ContentBlock {
    body: Vec<Statement>,
    captures: Captures,
    content: Option<Rc<ContentBlock>>,
}

/// Arguments already reduced to values, as built-ins receive them.
pub struct EvaluatedArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
    pub span: Span,
}

impl EvaluatedArgs {
    pub fn named_value(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }
}

/// Why a module load was requested; legacy `@import` tolerates cycles and
/// `meta.load-css` keeps the loaded css out of the global emit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoadKind {
    Use,
    Forward,
    LoadCss,
}

enum Flow {
    Normal,
    Return(Value),
}

/// Where css lands while statements evaluate: nodes append rules and
/// at-rules, items the declarations of the enclosing style rule.
struct Out<'a> {
    nodes: &'a mut Vec<CssNode>,
    items: Option<&'a mut Vec<CssItem>>,
    selector: Option<String>,
}

/// Walks a parsed stylesheet, building one module. Evaluation is async but
/// suspends only inside resolver calls; everything else runs to completion
/// when polled.
pub struct Evaluator {
    ctx: Rc<CompileContext>,
    registry: Rc<RefCell<ModuleRegistry>>,
    module: Rc<RefCell<Module>>,
    scopes: Vec<Scope>,
    namespaces: HashMap<String, Rc<RefCell<Module>>>,
    globals: Vec<Rc<RefCell<Module>>>,
    url: Option<SourceUrl>,
    config: Rc<Configuration>,
    content: Option<Rc<ContentBlock>>,
    in_function: bool,
}

impl Evaluator {
    pub(crate) fn new(
        ctx: Rc<CompileContext>,
        registry: Rc<RefCell<ModuleRegistry>>,
        module: Rc<RefCell<Module>>,
        url: Option<SourceUrl>,
        config: Rc<Configuration>,
    ) -> Self {
        Self {
            ctx,
            registry,
            module,
            scopes: Vec::new(),
            namespaces: HashMap::new(),
            globals: Vec::new(),
            url,
            config,
            content: None,
            in_function: false,
        }
    }

    /// Evaluate a stylesheet into its module cell. The css lands in the
    /// cell only when evaluation completes.
    pub(crate) async fn evaluate_module(&mut self, sheet: &Stylesheet) -> CompileResult<()> {
        let mut nodes = Vec::new();
        let flow = {
            let mut out = Out {
                nodes: &mut nodes,
                items: None,
                selector: None,
            };
            self.eval_statements(&sheet.statements, &mut out)
                .await
                .map_err(|err| err.with_url(self.url.as_ref()))?
        };
        if let Flow::Return(_) = flow {
            return Err(CompileError::runtime(
                "@return is only allowed within functions.",
                Span::default(),
            ));
        }
        self.module.borrow_mut().css.extend(nodes);
        Ok(())
    }

    fn captures(&self) -> Captures {
        Captures {
            module: Rc::clone(&self.module),
            scopes: self.scopes.clone(),
            namespaces: self.namespaces.clone(),
            globals: self.globals.clone(),
            url: self.url.clone(),
        }
    }

    fn from_captures(&self, captures: &Captures) -> Evaluator {
        Evaluator {
            ctx: Rc::clone(&self.ctx),
            registry: Rc::clone(&self.registry),
            module: Rc::clone(&captures.module),
            scopes: captures.scopes.clone(),
            namespaces: captures.namespaces.clone(),
            globals: captures.globals.clone(),
            url: captures.url.clone(),
            config: Configuration::empty(),
            content: None,
            in_function: false,
        }
    }

    // Statements.

    async fn eval_statements<'b>(
        &mut self,
        statements: &[Statement],
        out: &mut Out<'b>,
    ) -> CompileResult<Flow> {
        for statement in statements {
            if let Flow::Return(value) = self.eval_statement(statement, out).await? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_statement<'a, 'b>(
        &'a mut self,
        statement: &'a Statement,
        out: &'a mut Out<'b>,
    ) -> LocalBoxFuture<'a, CompileResult<Flow>> {
        Box::pin(async move {
            match statement {
                Statement::RuleSet {
                    selector,
                    body,
                    span,
                } => {
                    self.eval_rule_set(selector, body, *span, out).await?;
                    Ok(Flow::Normal)
                }
                Statement::Declaration {
                    name,
                    value,
                    children,
                    span,
                } => {
                    self.eval_declaration(name, value.as_ref(), children.as_deref(), *span, out)
                        .await?;
                    Ok(Flow::Normal)
                }
                Statement::VariableDecl {
                    name,
                    value,
                    default,
                    global,
                    span,
                } => {
                    self.eval_variable_declaration(name, value, *default, *global, *span)
                        .await?;
                    Ok(Flow::Normal)
                }
                Statement::Use {
                    url,
                    namespace,
                    config,
                    span,
                } => {
                    self.eval_use(url, namespace, config, *span).await?;
                    Ok(Flow::Normal)
                }
                Statement::Forward {
                    url,
                    prefix,
                    show,
                    hide,
                    config,
                    span,
                } => {
                    self.eval_forward(
                        url,
                        prefix.as_deref(),
                        show.as_deref(),
                        hide.as_deref(),
                        config,
                        *span,
                    )
                    .await?;
                    Ok(Flow::Normal)
                }
                Statement::Import { targets, span } => {
                    self.eval_import(targets, *span, out).await?;
                    Ok(Flow::Normal)
                }
                Statement::MixinDecl(decl) => {
                    let callable = self.make_callable(decl, true);
                    self.define_mixin(decl.name.clone(), callable);
                    Ok(Flow::Normal)
                }
                Statement::FunctionDecl(decl) => {
                    let callable = self.make_callable(decl, false);
                    self.define_function(decl.name.clone(), callable);
                    Ok(Flow::Normal)
                }
                Statement::Include {
                    namespace,
                    name,
                    arguments,
                    content,
                    span,
                } => {
                    self.eval_include(
                        namespace.as_deref(),
                        name,
                        arguments,
                        content.as_deref(),
                        *span,
                        out,
                    )
                    .await?;
                    Ok(Flow::Normal)
                }
                Statement::Content { span } => {
                    self.eval_content(*span, out).await?;
                    Ok(Flow::Normal)
                }
                Statement::Return { value, span } => {
                    if !self.in_function {
                        return Err(CompileError::runtime(
                            "@return is only allowed within functions.",
                            *span,
                        ));
                    }
                    let value = self.eval_expr(value).await?;
                    Ok(Flow::Return(value))
                }
                Statement::If {
                    clauses, otherwise, ..
                } => {
                    for (condition, body) in clauses {
                        if self.eval_expr(condition).await?.is_truthy() {
                            return self.eval_scoped(body, out).await;
                        }
                    }
                    if let Some(body) = otherwise {
                        return self.eval_scoped(body, out).await;
                    }
                    Ok(Flow::Normal)
                }
                Statement::Each {
                    bindings,
                    list,
                    body,
                    ..
                } => {
                    let values = self.eval_expr(list).await?;
                    for element in values.as_vec() {
                        self.scopes.push(Scope::default());
                        if bindings.len() == 1 {
                            self.define_variable(bindings[0].clone(), element);
                        } else {
                            let parts = element.as_vec();
                            for (index, binding) in bindings.iter().enumerate() {
                                let part = parts.get(index).cloned().unwrap_or(Value::Null);
                                self.define_variable(binding.clone(), part);
                            }
                        }
                        let flow = self.eval_statements(body, out).await;
                        self.scopes.pop();
                        if let Flow::Return(value) = flow? {
                            return Ok(Flow::Return(value));
                        }
                    }
                    Ok(Flow::Normal)
                }
                Statement::For {
                    variable,
                    from,
                    to,
                    inclusive,
                    body,
                    span,
                } => {
                    self.eval_for(variable, from, to, *inclusive, body, *span, out)
                        .await
                }
                Statement::While {
                    condition, body, ..
                } => {
                    while self.eval_expr(condition).await?.is_truthy() {
                        if let Flow::Return(value) = self.eval_scoped(body, out).await? {
                            return Ok(Flow::Return(value));
                        }
                    }
                    Ok(Flow::Normal)
                }
                Statement::ErrorRule { value, span } => {
                    let value = self.eval_expr(value).await?;
                    let message = match &value {
                        Value::String(string) => string.text.clone(),
                        other => inspect_value(other),
                    };
                    Err(CompileError::runtime(message, *span))
                }
                Statement::WarnRule { value, span: _ } => {
                    let value = self.eval_expr(value).await?;
                    let message = match &value {
                        Value::String(string) => string.text.clone(),
                        other => inspect_value(other),
                    };
                    self.ctx.sink.warn(&message);
                    Ok(Flow::Normal)
                }
                Statement::DebugRule { value, span: _ } => {
                    let value = self.eval_expr(value).await?;
                    self.ctx.sink.debug(&inspect_value(&value));
                    Ok(Flow::Normal)
                }
                Statement::Extend {
                    selector,
                    optional,
                    span,
                } => {
                    let Some(extender) = out.selector.clone() else {
                        return Err(CompileError::runtime(
                            "@extend may only be used within style rules.",
                            *span,
                        ));
                    };
                    let target = self.resolve_interpolation(selector).await?;
                    self.module.borrow_mut().extensions.push(Extension {
                        target,
                        extender,
                        optional: *optional,
                    });
                    Ok(Flow::Normal)
                }
                Statement::AtRule {
                    name,
                    params,
                    body,
                    span,
                } => {
                    self.eval_at_rule(name, params, body.as_deref(), *span, out)
                        .await?;
                    Ok(Flow::Normal)
                }
                Statement::LoudComment { text, .. } => {
                    let resolved = self.resolve_interpolation(text).await?;
                    match (&mut out.items, &out.selector) {
                        (Some(items), _) => items.push(CssItem::Comment(resolved)),
                        _ => out.nodes.push(CssNode::Comment(resolved)),
                    }
                    Ok(Flow::Normal)
                }
            }
        })
    }

    async fn eval_scoped<'b>(
        &mut self,
        body: &[Statement],
        out: &mut Out<'b>,
    ) -> CompileResult<Flow> {
        self.scopes.push(Scope::default());
        let flow = self.eval_statements(body, out).await;
        self.scopes.pop();
        flow
    }

    async fn eval_for<'b>(
        &mut self,
        variable: &str,
        from: &Expr,
        to: &Expr,
        inclusive: bool,
        body: &[Statement],
        span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<Flow> {
        let from_value = self.eval_expr(from).await?;
        let to_value = self.eval_expr(to).await?;
        let from_number = from_value.assert_number(None, span)?;
        let to_number = to_value.assert_number(None, span)?;
        let start = from_number.as_int().ok_or_else(|| {
            CompileError::runtime(
                format!("{} is not an int.", inspect_value(&from_value)),
                span,
            )
        })?;
        let end = to_number.as_int().ok_or_else(|| {
            CompileError::runtime(format!("{} is not an int.", inspect_value(&to_value)), span)
        })?;
        let unit = from_number.numerator_units.first().cloned();
        let mut current = start;
        loop {
            let done = if start <= end {
                if inclusive {
                    current > end
                } else {
                    current >= end
                }
            } else if inclusive {
                current < end
            } else {
                current <= end
            };
            if done {
                break;
            }
            self.scopes.push(Scope::default());
            let number = match &unit {
                Some(unit) => Number::with_unit(current as f64, unit.clone()),
                None => Number::new(current as f64),
            };
            self.define_variable(variable.to_string(), Value::Number(number));
            let flow = self.eval_statements(body, out).await;
            self.scopes.pop();
            if let Flow::Return(value) = flow? {
                return Ok(Flow::Return(value));
            }
            current += if start <= end { 1 } else { -1 };
        }
        Ok(Flow::Normal)
    }

    async fn eval_rule_set<'b>(
        &mut self,
        selector: &Interpolation,
        body: &[Statement],
        span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<()> {
        if self.in_function {
            return Err(CompileError::runtime(
                "Style rules aren't allowed within functions.",
                span,
            ));
        }
        let written = self.resolve_interpolation(selector).await?;
        let resolved = resolve_selector(&written, out.selector.as_deref(), span)?;
        let mut items = Vec::new();
        let mut nodes = Vec::new();
        {
            let mut child = Out {
                nodes: &mut nodes,
                items: Some(&mut items),
                selector: Some(resolved.clone()),
            };
            self.scopes.push(Scope::default());
            let flow = self.eval_statements(body, &mut child).await;
            self.scopes.pop();
            flow?;
        }
        out.nodes.push(CssNode::Rule {
            selector: resolved,
            items,
        });
        out.nodes.extend(nodes);
        Ok(())
    }

    fn eval_declaration<'a, 'b>(
        &'a mut self,
        name: &'a Interpolation,
        value: Option<&'a Expr>,
        children: Option<&'a [Statement]>,
        span: Span,
        out: &'a mut Out<'b>,
    ) -> LocalBoxFuture<'a, CompileResult<()>> {
        Box::pin(async move {
            let name = self.resolve_interpolation(name).await?;
            if out.items.is_none() {
                return Err(CompileError::runtime(
                    "Declarations may only be used within style rules.",
                    span,
                ));
            }
            if let Some(value) = value {
                let value = self.eval_expr(value).await?;
                let omitted = matches!(&value, Value::Null)
                    || matches!(&value, Value::String(s) if !s.quoted && s.text.is_empty());
                if !omitted {
                    let mut text = String::new();
                    write_value(
                        &value,
                        &mut text,
                        self.ctx.style == OutputStyle::Compressed,
                    )
                    .map_err(|err| match err {
                        CompileError::Runtime { message, trace, .. } => CompileError::Runtime {
                            message,
                            span,
                            url: None,
                            trace,
                        },
                        other => other,
                    })?;
                    if let Some(items) = &mut out.items {
                        items.push(CssItem::Declaration {
                            name: name.clone(),
                            value: text,
                        });
                    }
                }
            }
            if let Some(children) = children {
                // Nested properties flatten onto the surrounding name.
                for child in children {
                    match child {
                        Statement::Declaration {
                            name: child_name,
                            value,
                            children,
                            span,
                        } => {
                            let suffix = self.resolve_interpolation(child_name).await?;
                            let combined =
                                Interpolation::literal(format!("{name}-{suffix}"), *span);
                            self.eval_declaration(
                                &combined,
                                value.as_ref(),
                                children.as_deref(),
                                *span,
                                out,
                            )
                            .await?;
                        }
                        Statement::LoudComment { .. } => {
                            self.eval_statement(child, out).await?;
                        }
                        other => {
                            let span = statement_span(other);
                            return Err(CompileError::runtime(
                                "Expected a declaration inside a nested property block.",
                                span,
                            ));
                        }
                    }
                }
            }
            Ok(())
        })
    }

    async fn eval_variable_declaration(
        &mut self,
        name: &str,
        value: &Expr,
        default: bool,
        global: bool,
        span: Span,
    ) -> CompileResult<()> {
        if global && !self.scopes.is_empty() {
            let exists = self.module.borrow().variables.contains_key(name);
            if !exists {
                return Err(CompileError::runtime(
                    format!("${name}: !global assignments can't declare new variables."),
                    span,
                ));
            }
            if default {
                let current = self.module.borrow().variables.get(name).cloned();
                if !matches!(current, None | Some(Value::Null)) {
                    return Ok(());
                }
            }
            let value = self.eval_expr(value).await?;
            self.module
                .borrow_mut()
                .variables
                .insert(name.to_string(), value);
            return Ok(());
        }

        if default {
            if self.scopes.is_empty() {
                // Configuration overrides the default before the default
                // takes effect.
                self.module.borrow_mut().defaulted.insert(name.to_string());
                if let Some(configured) = self.config.take(name) {
                    self.module
                        .borrow_mut()
                        .variables
                        .insert(name.to_string(), configured);
                    return Ok(());
                }
                let current = self.module.borrow().variables.get(name).cloned();
                if matches!(current, None | Some(Value::Null)) {
                    let value = self.eval_expr(value).await?;
                    self.module
                        .borrow_mut()
                        .variables
                        .insert(name.to_string(), value);
                }
                return Ok(());
            }
            let defined = self
                .scopes
                .iter()
                .any(|scope| scope.variables.contains_key(name))
                || self.module.borrow().variables.contains_key(name);
            if !defined {
                let value = self.eval_expr(value).await?;
                self.define_variable(name.to_string(), value);
            }
            return Ok(());
        }

        let value = self.eval_expr(value).await?;
        // Assignment targets the nearest declaring scope; otherwise the
        // name is declared in the current scope.
        for scope in self.scopes.iter_mut().rev() {
            if scope.variables.contains_key(name) {
                scope.variables.insert(name.to_string(), value);
                return Ok(());
            }
        }
        if self.module.borrow().variables.contains_key(name) || self.scopes.is_empty() {
            self.module
                .borrow_mut()
                .variables
                .insert(name.to_string(), value);
            return Ok(());
        }
        self.define_variable(name.to_string(), value);
        Ok(())
    }

    fn define_variable(&mut self, name: String, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.variables.insert(name, value);
            }
            None => {
                self.module.borrow_mut().variables.insert(name, value);
            }
        }
    }

    fn define_mixin(&mut self, name: String, callable: Callable) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.mixins.insert(name, callable);
            }
            None => {
                self.module.borrow_mut().mixins.insert(name, callable);
            }
        }
    }

    fn define_function(&mut self, name: String, callable: Callable) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.functions.insert(name, callable);
            }
            None => {
                self.module.borrow_mut().functions.insert(name, callable);
            }
        }
    }

    fn make_callable(&self, decl: &Rc<CallableDecl>, mixin: bool) -> Callable {
        let user = Rc::new(UserCallable {
            declaration: Rc::clone(decl),
            captures: self.captures(),
            url: self.url.clone(),
        });
        let kind = if mixin {
            CallableKind::UserMixin(user)
        } else {
            CallableKind::UserFunction(user)
        };
        Callable::new(decl.name.clone(), kind)
    }

    // Module system statements.

    async fn eval_config_entries(
        &mut self,
        entries: &[ConfigEntry],
    ) -> CompileResult<Vec<(String, Value, Span, bool)>> {
        let mut evaluated = Vec::with_capacity(entries.len());
        for entry in entries {
            let value = self.eval_expr(&entry.value).await?;
            evaluated.push((entry.name.clone(), value, entry.span, entry.guarded));
        }
        Ok(evaluated)
    }

    async fn eval_use(
        &mut self,
        url: &str,
        namespace: &UseNamespace,
        config: &[ConfigEntry],
        span: Span,
    ) -> CompileResult<()> {
        let entries = self.eval_config_entries(config).await?;
        let module = if let Some(builtin) = url.strip_prefix("sass:") {
            if !entries.is_empty() {
                return Err(CompileError::runtime(
                    "Built-in modules can't be configured.",
                    span,
                ));
            }
            self.builtin_module(builtin, span)?
        } else {
            let configuration = if entries.is_empty() {
                Configuration::empty()
            } else {
                Configuration::new(
                    entries
                        .into_iter()
                        .map(|(name, value, span, _)| (name, value, span))
                        .collect(),
                )
            };
            self.load_module(url, span, configuration, LoadKind::Use)
                .await?
        };
        match namespace {
            UseNamespace::Global => {
                self.globals.push(module);
            }
            UseNamespace::Named(name) => {
                self.bind_namespace(name.clone(), module, span)?;
            }
            UseNamespace::Default => {
                let stem = default_namespace(url);
                self.bind_namespace(stem, module, span)?;
            }
        }
        Ok(())
    }

    fn bind_namespace(
        &mut self,
        name: String,
        module: Rc<RefCell<Module>>,
        span: Span,
    ) -> CompileResult<()> {
        if self.namespaces.contains_key(&name) {
            return Err(CompileError::runtime(
                format!("There's already a module with namespace \"{name}\"."),
                span,
            ));
        }
        self.namespaces.insert(name, module);
        Ok(())
    }

    async fn eval_forward(
        &mut self,
        url: &str,
        prefix: Option<&str>,
        show: Option<&[String]>,
        hide: Option<&[String]>,
        config: &[ConfigEntry],
        span: Span,
    ) -> CompileResult<()> {
        let entries = self.eval_config_entries(config).await?;
        let module = if let Some(builtin) = url.strip_prefix("sass:") {
            self.builtin_module(builtin, span)?
        } else {
            let configuration = self.config.forward(entries);
            self.load_module(url, span, configuration, LoadKind::Forward)
                .await?
        };
        let loaded = module.borrow();
        let mut target = self.module.borrow_mut();
        loaded.forward_into(&mut target, prefix, show, hide);
        Ok(())
    }

    fn builtin_module(&self, name: &str, span: Span) -> CompileResult<Rc<RefCell<Module>>> {
        self.ctx
            .builtin_modules
            .get(name)
            .map(Rc::clone)
            .ok_or_else(|| {
                CompileError::runtime(
                    format!("Invalid built-in module: \"sass:{name}\"."),
                    span,
                )
            })
    }

    /// Fetch a canonical identifier through its resolver, at most once per
    /// compilation. The registry is never borrowed across the await.
    async fn fetch_source(
        &mut self,
        canonical: &SourceUrl,
        origin: ImporterId,
        span: Span,
    ) -> CompileResult<StylesheetSource> {
        if let Some(cached) = self.registry.borrow().cached_source(canonical) {
            return Ok(cached);
        }
        tracing::debug!(url = %canonical, "loading stylesheet");
        let loaded = self.ctx.chain.load(canonical, origin).await?;
        let Some(source) = loaded else {
            return Err(CompileError::CanonicalizedButNotLoaded {
                url: canonical.clone(),
                span,
                from: self.url.clone(),
            });
        };
        self.registry.borrow_mut().store_source(canonical, &source);
        Ok(source)
    }

    /// Load a module: resolve, consult the slot, and evaluate at most
    /// once. The `InProgress` slot is installed before the module's source
    /// is fetched, so the slot is the mutual-exclusion point across every
    /// suspension the load performs.
    pub(crate) async fn load_module(
        &mut self,
        reference: &str,
        span: Span,
        config: Rc<Configuration>,
        kind: LoadKind,
    ) -> CompileResult<Rc<RefCell<Module>>> {
        let resolved = self.ctx.chain.resolve(reference, self.url.as_ref()).await?;
        let Some((canonical, origin)) = resolved else {
            return Err(CompileError::UnresolvedImport {
                reference: reference.to_string(),
                span,
                url: self.url.clone(),
            });
        };

        let slot = self.registry.borrow().slot(&canonical);
        match slot {
            Some(ModuleSlot::Complete(index)) => {
                if !config.is_empty() {
                    return Err(CompileError::runtime(
                        format!(
                            "{canonical} was already loaded, so it can't be configured using \"with\"."
                        ),
                        span,
                    ));
                }
                return Ok(self.registry.borrow().module(index));
            }
            Some(ModuleSlot::InProgress(_)) => {
                return Err(CompileError::Cycle {
                    url: canonical,
                    span,
                    from: self.url.clone(),
                });
            }
            Some(ModuleSlot::Failed(message)) => {
                return Err(CompileError::runtime(message, span));
            }
            None => {}
        }

        let cell = Rc::new(RefCell::new(Module::new(Some(canonical.clone()))));
        let index = self
            .registry
            .borrow_mut()
            .begin(&canonical, Rc::clone(&cell));

        let source = match self.fetch_source(&canonical, origin, span).await {
            Ok(source) => source,
            Err(err) => {
                self.registry.borrow_mut().fail(&canonical, &err);
                return Err(err);
            }
        };
        let sheet = match parse_stylesheet(&source.contents, source.syntax) {
            Ok(sheet) => sheet,
            Err(err) => {
                let err = err.with_url(Some(&canonical));
                self.registry.borrow_mut().fail(&canonical, &err);
                return Err(err);
            }
        };

        let mut evaluator = Evaluator::new(
            Rc::clone(&self.ctx),
            Rc::clone(&self.registry),
            Rc::clone(&cell),
            Some(canonical.clone()),
            Rc::clone(&config),
        );
        match evaluator.evaluate_module(&sheet).await {
            Ok(()) => {
                self.registry
                    .borrow_mut()
                    .complete(&canonical, index, kind != LoadKind::LoadCss);
            }
            Err(err) => {
                self.registry.borrow_mut().fail(&canonical, &err);
                return Err(err);
            }
        }

        if let Some((name, config_span)) = config.first_unused() {
            return Err(CompileError::runtime(
                format!("${name} was not declared with !default in the @used module."),
                config_span,
            ));
        }
        Ok(cell)
    }

    async fn eval_import<'b>(
        &mut self,
        targets: &[ImportTarget],
        _span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<()> {
        for target in targets {
            match target {
                ImportTarget::Css { text, span: _ } => {
                    out.nodes.push(CssNode::AtRule {
                        name: "import".to_string(),
                        params: text.clone(),
                        body: None,
                    });
                }
                ImportTarget::Sass { url, span } => {
                    self.eval_sass_import(url, *span, out).await?;
                }
            }
        }
        Ok(())
    }

    /// Legacy `@import`: a textual merge into the current module and the
    /// current lexical scope. A cyclic import resolves to whatever the
    /// in-progress source has defined so far, which the shared context
    /// already exposes, so the cyclic edge is a no-op.
    async fn eval_sass_import<'b>(
        &mut self,
        url: &str,
        span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<()> {
        self.ctx.sink.deprecation(
            Deprecation::Import,
            &format!("Sass @import rules are deprecated; rewrite \"{url}\" as a @use."),
        );
        let resolved = self.ctx.chain.resolve(url, self.url.as_ref()).await?;
        let Some((canonical, origin)) = resolved else {
            return Err(CompileError::UnresolvedImport {
                reference: url.to_string(),
                span,
                url: self.url.clone(),
            });
        };
        if self.registry.borrow().importing(&canonical) {
            tracing::debug!(url = %canonical, "tolerated import cycle");
            return Ok(());
        }
        let source = self.fetch_source(&canonical, origin, span).await?;
        let sheet = parse_stylesheet(&source.contents, source.syntax)
            .map_err(|err| err.with_url(Some(&canonical)))?;
        self.registry.borrow_mut().begin_import(&canonical);
        let saved_url = self.url.replace(canonical.clone());
        let result = self
            .eval_statements(&sheet.statements, out)
            .await
            .map_err(|err| err.with_url(Some(&canonical)));
        self.url = saved_url;
        self.registry.borrow_mut().end_import();
        result.map(|_| ())
    }

    async fn eval_content<'b>(&mut self, span: Span, out: &mut Out<'b>) -> CompileResult<()> {
        let Some(block) = self.content.clone() else {
            return Err(CompileError::runtime(
                "@content is only allowed within mixin declarations.",
                span,
            ));
        };
        let mut evaluator = self.from_captures(&block.captures);
        evaluator.content = block.content.clone();
        evaluator.scopes.push(Scope::default());
        evaluator.eval_statements(&block.body, out).await?;
        Ok(())
    }

    async fn eval_at_rule<'b>(
        &mut self,
        name: &str,
        params: &Interpolation,
        body: Option<&[Statement]>,
        _span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<()> {
        let params = self.resolve_interpolation(params).await?;
        let Some(body) = body else {
            out.nodes.push(CssNode::AtRule {
                name: name.to_string(),
                params,
                body: None,
            });
            return Ok(());
        };
        let mut inner = Vec::new();
        match out.selector.clone() {
            Some(selector) if name != "keyframes" => {
                // An at-rule inside a style rule wraps the rule around its
                // declarations.
                let mut items = Vec::new();
                let mut nodes = Vec::new();
                {
                    let mut child = Out {
                        nodes: &mut nodes,
                        items: Some(&mut items),
                        selector: Some(selector.clone()),
                    };
                    self.scopes.push(Scope::default());
                    let flow = self.eval_statements(body, &mut child).await;
                    self.scopes.pop();
                    flow?;
                }
                if !items.is_empty() {
                    inner.push(CssNode::Rule { selector, items });
                }
                inner.extend(nodes);
            }
            _ => {
                let mut child = Out {
                    nodes: &mut inner,
                    items: None,
                    selector: None,
                };
                self.scopes.push(Scope::default());
                let flow = self.eval_statements(body, &mut child).await;
                self.scopes.pop();
                flow?;
            }
        }
        out.nodes.push(CssNode::AtRule {
            name: name.to_string(),
            params,
            body: Some(inner),
        });
        Ok(())
    }

    async fn eval_include<'b>(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        arguments: &ArgumentInvocation,
        content: Option<&[Statement]>,
        span: Span,
        out: &mut Out<'b>,
    ) -> CompileResult<()> {
        let callable = self.lookup_mixin(namespace, name).ok_or_else(|| {
            CompileError::runtime(format!("Undefined mixin \"{name}\"."), span)
        })?;
        let args = self.eval_arguments(arguments).await?;
        let block = content.map(|body| {
            Rc::new(ContentBlock {
                body: body.to_vec(),
                captures: self.captures(),
                content: self.content.clone(),
            })
        });
        match callable.kind().clone() {
            CallableKind::UserMixin(user) => {
                let mut evaluator = self.from_captures(&user.captures);
                evaluator.content = block;
                let scope = evaluator
                    .bind_arguments(&user.declaration, args, span)
                    .await?;
                evaluator.scopes.push(scope);
                let result = evaluator
                    .eval_statements(&user.declaration.body, out)
                    .await
                    .map_err(|err| {
                        err.with_url(user.url.as_ref()).push_frame(TraceFrame {
                            name: name.to_string(),
                            url: self.url.clone(),
                            span,
                        })
                    });
                evaluator.scopes.pop();
                result.map(|_| ())
            }
            CallableKind::BuiltinMixin(handler) => handler(self, args, out.nodes).await,
            _ => Err(CompileError::runtime(
                format!("\"{name}\" is a function, not a mixin."),
                span,
            )),
        }
    }

    // Member lookup.

    fn lookup_variable(
        &self,
        namespace: Option<&str>,
        name: &str,
        span: Span,
    ) -> CompileResult<Value> {
        if let Some(namespace) = namespace {
            let module = self.lookup_namespace(namespace, span)?;
            let value = module.borrow().variables.get(name).cloned();
            return value.ok_or_else(|| {
                CompileError::runtime(format!("Undefined variable \"${name}\"."), span)
            });
        }
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.variables.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.module.borrow().variables.get(name) {
            return Ok(value.clone());
        }
        for module in self.globals.iter().rev() {
            if let Some(value) = module.borrow().variables.get(name) {
                return Ok(value.clone());
            }
        }
        Err(CompileError::runtime(
            format!("Undefined variable \"${name}\"."),
            span,
        ))
    }

    fn lookup_namespace(&self, namespace: &str, span: Span) -> CompileResult<Rc<RefCell<Module>>> {
        self.namespaces.get(namespace).map(Rc::clone).ok_or_else(|| {
            CompileError::runtime(
                format!("There is no module with the namespace \"{namespace}\"."),
                span,
            )
        })
    }

    fn lookup_mixin(&self, namespace: Option<&str>, name: &str) -> Option<Callable> {
        if let Some(namespace) = namespace {
            return self
                .namespaces
                .get(namespace)
                .and_then(|module| module.borrow().mixins.get(name).cloned());
        }
        for scope in self.scopes.iter().rev() {
            if let Some(callable) = scope.mixins.get(name) {
                return Some(callable.clone());
            }
        }
        if let Some(callable) = self.module.borrow().mixins.get(name) {
            return Some(callable.clone());
        }
        for module in self.globals.iter().rev() {
            if let Some(callable) = module.borrow().mixins.get(name) {
                return Some(callable.clone());
            }
        }
        self.ctx
            .global_functions
            .borrow()
            .mixins
            .get(name)
            .cloned()
    }

    fn lookup_function(&self, namespace: Option<&str>, name: &str) -> Option<Callable> {
        if let Some(namespace) = namespace {
            return self
                .namespaces
                .get(namespace)
                .and_then(|module| module.borrow().functions.get(name).cloned());
        }
        for scope in self.scopes.iter().rev() {
            if let Some(callable) = scope.functions.get(name) {
                return Some(callable.clone());
            }
        }
        if let Some(callable) = self.module.borrow().functions.get(name) {
            return Some(callable.clone());
        }
        for module in self.globals.iter().rev() {
            if let Some(callable) = module.borrow().functions.get(name) {
                return Some(callable.clone());
            }
        }
        if let Some(host) = self.ctx.host_functions.get(name) {
            return Some(Callable::new(name, CallableKind::Host(Arc::clone(host))));
        }
        self.ctx
            .global_functions
            .borrow()
            .functions
            .get(name)
            .cloned()
    }

    /// Function lookup for `meta.get-function`.
    pub(crate) fn find_function(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<Callable> {
        self.lookup_function(namespace, name)
    }

    // Expressions.

    pub(crate) fn eval_expr<'a>(
        &'a mut self,
        expr: &'a Expr,
    ) -> LocalBoxFuture<'a, CompileResult<Value>> {
        Box::pin(async move {
            match expr {
                Expr::Null(_) => Ok(Value::Null),
                Expr::Boolean(value, _) => Ok(Value::bool(*value)),
                Expr::Number { value, unit, .. } => Ok(Value::Number(match unit {
                    Some(unit) => Number::with_unit(*value, unit.clone()),
                    None => Number::new(*value),
                })),
                Expr::Color {
                    red,
                    green,
                    blue,
                    alpha,
                    ..
                } => Ok(Value::Color(Color::rgb(*red, *green, *blue, *alpha))),
                Expr::String { contents, .. } => {
                    let text = self.resolve_interpolation(contents).await?;
                    Ok(Value::quoted_string(text))
                }
                Expr::Identifier { contents, .. } => {
                    let text = self.resolve_interpolation(contents).await?;
                    if text == "&" {
                        return Ok(Value::Null);
                    }
                    Ok(Value::unquoted_string(text))
                }
                Expr::Variable {
                    namespace,
                    name,
                    span,
                } => self.lookup_variable(namespace.as_deref(), name, *span),
                Expr::List {
                    elements,
                    separator,
                    bracketed,
                    ..
                } => {
                    let mut values = Vec::with_capacity(elements.len());
                    for element in elements {
                        values.push(self.eval_expr(element).await?);
                    }
                    Ok(Value::List(List {
                        elements: values,
                        separator: *separator,
                        bracketed: *bracketed,
                    }))
                }
                Expr::Map { entries, span } => {
                    let mut map = SassMap::new();
                    for (key, value) in entries {
                        let key = self.eval_expr(key).await?;
                        let value = self.eval_expr(value).await?;
                        if map.get(&key).is_some() {
                            return Err(CompileError::runtime(
                                format!("Duplicate key {}.", inspect_value(&key)),
                                *span,
                            ));
                        }
                        map.insert(key, value);
                    }
                    Ok(Value::Map(map))
                }
                Expr::Unary { op, operand, span } => {
                    let value = self.eval_expr(operand).await?;
                    unary_operation(*op, &value, *span)
                }
                Expr::Binary {
                    op, left, right, span,
                } => self.eval_binary(*op, left, right, *span).await,
                Expr::Paren { inner, .. } => self.eval_expr(inner).await,
                Expr::FunctionCall {
                    namespace,
                    name,
                    arguments,
                    span,
                } => {
                    self.eval_function_call(namespace.as_deref(), name, arguments, *span)
                        .await
                }
                Expr::Calc { name, args, span } => self.eval_calc(name, args, *span).await,
                Expr::Special { name, contents, .. } => {
                    let text = self.resolve_interpolation(contents).await?;
                    Ok(Value::unquoted_string(format!("{name}({text})")))
                }
            }
        })
    }

    async fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> CompileResult<Value> {
        match op {
            BinaryOp::And => {
                let left = self.eval_expr(left).await?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(right).await
            }
            BinaryOp::Or => {
                let left = self.eval_expr(left).await?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(right).await
            }
            BinaryOp::Div => {
                let left_value = self.eval_expr(left).await?;
                let right_value = self.eval_expr(right).await?;
                match (&left_value, &right_value) {
                    (Value::Number(a), Value::Number(b)) => {
                        let quotient = a.divide(b);
                        if slash_operand(left) && slash_operand(right) {
                            // `font: 10px/8px` round-trips as written.
                            Ok(Value::Number(quotient.with_slash(a.clone(), b.clone())))
                        } else {
                            self.ctx.sink.deprecation(
                                Deprecation::SlashDiv,
                                &format!(
                                    "Using / for division is deprecated; use math.div({}, {}) instead.",
                                    inspect_value(&left_value),
                                    inspect_value(&right_value)
                                ),
                            );
                            Ok(Value::Number(quotient))
                        }
                    }
                    _ => slash_fallback(&left_value, &right_value),
                }
            }
            _ => {
                let left = self.eval_expr(left).await?;
                let right = self.eval_expr(right).await?;
                binary_operation(op, &left, &right, span)
            }
        }
    }

    async fn eval_function_call(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        arguments: &ArgumentInvocation,
        span: Span,
    ) -> CompileResult<Value> {
        // `if()` evaluates only the taken branch.
        if namespace.is_none() && name == "if" {
            let [condition, consequent, alternate] = arguments.positional.as_slice() else {
                return Err(CompileError::runtime(
                    "if() expects three arguments.",
                    span,
                ));
            };
            return if self.eval_expr(condition).await?.is_truthy() {
                self.eval_expr(consequent).await
            } else {
                self.eval_expr(alternate).await
            };
        }
        let Some(callable) = self.lookup_function(namespace, name) else {
            if namespace.is_some() {
                return Err(CompileError::runtime(
                    format!("Undefined function \"{name}\"."),
                    span,
                ));
            }
            // Unknown plain-css function: render the call as written.
            if !arguments.named.is_empty() || arguments.keyword_rest.is_some() {
                return Err(CompileError::runtime(
                    "Plain CSS functions don't support keyword arguments.",
                    span,
                ));
            }
            let args = self.eval_arguments(arguments).await?;
            let mut rendered = Vec::with_capacity(args.positional.len());
            for value in &args.positional {
                let mut text = String::new();
                write_value(value, &mut text, self.ctx.style == OutputStyle::Compressed)?;
                rendered.push(text);
            }
            return Ok(Value::unquoted_string(format!(
                "{name}({})",
                rendered.join(", ")
            )));
        };
        let args = self.eval_arguments(arguments).await?;
        self.invoke_function(&callable, args, span).await
    }

    pub(crate) fn invoke_function<'a>(
        &'a mut self,
        callable: &'a Callable,
        args: EvaluatedArgs,
        span: Span,
    ) -> LocalBoxFuture<'a, CompileResult<Value>> {
        Box::pin(async move {
            match callable.kind().clone() {
                CallableKind::UserFunction(user) => {
                    let mut evaluator = self.from_captures(&user.captures);
                    evaluator.in_function = true;
                    let scope = evaluator
                        .bind_arguments(&user.declaration, args, span)
                        .await?;
                    evaluator.scopes.push(scope);
                    let mut nodes = Vec::new();
                    let flow = {
                        let mut out = Out {
                            nodes: &mut nodes,
                            items: None,
                            selector: None,
                        };
                        evaluator
                            .eval_statements(&user.declaration.body, &mut out)
                            .await
                            .map_err(|err| {
                                err.with_url(user.url.as_ref()).push_frame(TraceFrame {
                                    name: format!("{}()", callable.name()),
                                    url: self.url.clone(),
                                    span,
                                })
                            })?
                    };
                    match flow {
                        Flow::Return(value) => Ok(value),
                        Flow::Normal => Err(CompileError::runtime(
                            format!("Function {} finished without @return.", callable.name()),
                            span,
                        )),
                    }
                }
                CallableKind::Builtin(handler) => {
                    // `call()` re-enters the evaluator, so it dispatches
                    // here where the inner invocation can suspend.
                    if callable.name() == "call" {
                        self.eval_call_invocation(args, span).await
                    } else {
                        handler(self, args)
                    }
                }
                CallableKind::Host(host) => {
                    if !args.named.is_empty() {
                        return Err(CompileError::runtime(
                            format!(
                                "Function {} doesn't accept keyword arguments.",
                                callable.name()
                            ),
                            span,
                        ));
                    }
                    host(&args.positional).map_err(|err| {
                        err.push_frame(TraceFrame {
                            name: format!("{}()", callable.name()),
                            url: self.url.clone(),
                            span,
                        })
                    })
                }
                CallableKind::UserMixin(_) | CallableKind::BuiltinMixin(_) => Err(
                    CompileError::runtime(
                        format!("\"{}\" is a mixin, not a function.", callable.name()),
                        span,
                    ),
                ),
            }
        })
    }

    /// `meta.call($function, $args...)`: invoke a function reference with
    /// the remaining arguments.
    async fn eval_call_invocation(
        &mut self,
        mut args: EvaluatedArgs,
        span: Span,
    ) -> CompileResult<Value> {
        if args.positional.is_empty() {
            return Err(CompileError::runtime("Missing argument $function.", span));
        }
        let function = args.positional.remove(0);
        let callable = match &function {
            Value::Function(callable) => callable.clone(),
            // A bare name still resolves, for pre-module-system callers.
            Value::String(string) => self
                .find_function(None, &string.text)
                .ok_or_else(|| {
                    CompileError::runtime(
                        format!("Function not found: {}", string.text),
                        span,
                    )
                })?,
            other => {
                return Err(argument_error(
                    format!("{} is not a function reference.", inspect_value(other)),
                    Some("function"),
                    span,
                ))
            }
        };
        self.invoke_function(&callable, args, span).await
    }

    async fn eval_calc(&mut self, name: &str, args: &[Expr], span: Span) -> CompileResult<Value> {
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_calc_arg(arg, span).await?);
        }
        match Calculation::new(name, evaluated).reduce() {
            Ok(number) => Ok(Value::Number(number)),
            Err(calculation) => Ok(Value::Calculation(calculation)),
        }
    }

    fn eval_calc_arg<'a>(
        &'a mut self,
        expr: &'a Expr,
        span: Span,
    ) -> LocalBoxFuture<'a, CompileResult<CalculationArg>> {
        Box::pin(async move {
            match expr {
                Expr::Binary {
                    op: op @ (BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Div),
                    left,
                    right,
                    ..
                } => {
                    let lhs = self.eval_calc_arg(left, span).await?;
                    let rhs = self.eval_calc_arg(right, span).await?;
                    let op = match op {
                        BinaryOp::Plus => CalcOp::Plus,
                        BinaryOp::Minus => CalcOp::Minus,
                        BinaryOp::Times => CalcOp::Times,
                        _ => CalcOp::Div,
                    };
                    Ok(CalculationArg::operation(op, lhs, rhs))
                }
                Expr::Paren { inner, .. } => self.eval_calc_arg(inner, span).await,
                Expr::Calc { name, args, .. } => {
                    match self.eval_calc(name, args, span).await? {
                        Value::Number(number) => Ok(CalculationArg::Number(number)),
                        Value::Calculation(calculation) => {
                            Ok(CalculationArg::Calculation(calculation))
                        }
                        other => Ok(CalculationArg::Text(inspect_value(&other))),
                    }
                }
                other => {
                    let value = self.eval_expr(other).await?;
                    match value {
                        Value::Number(number) => Ok(CalculationArg::Number(number)),
                        Value::String(string) if !string.quoted => {
                            Ok(CalculationArg::Text(string.text))
                        }
                        Value::Calculation(calculation) => {
                            Ok(CalculationArg::Calculation(calculation))
                        }
                        other => Err(CompileError::runtime(
                            format!(
                                "{} isn't valid inside a calculation.",
                                inspect_value(&other)
                            ),
                            span,
                        )),
                    }
                }
            }
        })
    }

    // Argument plumbing.

    pub(crate) async fn eval_arguments(
        &mut self,
        invocation: &ArgumentInvocation,
    ) -> CompileResult<EvaluatedArgs> {
        let mut positional = Vec::with_capacity(invocation.positional.len());
        for expr in &invocation.positional {
            positional.push(self.eval_expr(expr).await?);
        }
        let mut named = Vec::with_capacity(invocation.named.len());
        for (name, expr) in &invocation.named {
            named.push((name.clone(), self.eval_expr(expr).await?));
        }
        if let Some(rest) = &invocation.rest {
            let rest_span = rest.span();
            match self.eval_expr(rest).await? {
                Value::ArgList(args) => {
                    positional.extend(args.elements);
                    named.extend(args.keywords);
                }
                Value::Map(map) => {
                    self.spread_keyword_map(map, &mut named, rest_span)?;
                }
                other => positional.extend(other.as_vec()),
            }
        }
        if let Some(keyword_rest) = &invocation.keyword_rest {
            let rest_span = keyword_rest.span();
            let map = self
                .eval_expr(keyword_rest)
                .await?
                .assert_map(None, rest_span)?;
            self.spread_keyword_map(map, &mut named, rest_span)?;
        }
        Ok(EvaluatedArgs {
            positional,
            named,
            span: invocation.span,
        })
    }

    fn spread_keyword_map(
        &self,
        map: SassMap,
        named: &mut Vec<(String, Value)>,
        span: Span,
    ) -> CompileResult<()> {
        for (key, value) in map.into_entries() {
            let Value::String(string) = &key else {
                return Err(CompileError::runtime(
                    format!(
                        "Variable keyword argument map must have string keys, found {}.",
                        inspect_value(&key)
                    ),
                    span,
                ));
            };
            named.push((string.text.clone(), value));
        }
        Ok(())
    }

    /// Bind evaluated arguments to a parameter list, producing the call
    /// scope. Defaults evaluate left to right with earlier parameters in
    /// scope.
    async fn bind_arguments(
        &mut self,
        declaration: &CallableDecl,
        args: EvaluatedArgs,
        span: Span,
    ) -> CompileResult<Scope> {
        let params = &declaration.arguments;
        let supplied = args.positional.len();
        let mut positional = args.positional.into_iter();
        let mut named: HashMap<String, Value> = args.named.into_iter().collect();

        self.scopes.push(Scope::default());
        for (name, default) in &params.parameters {
            let value = if let Some(value) = named.remove(name) {
                Ok(value)
            } else if let Some(value) = positional.next() {
                Ok(value)
            } else if let Some(default) = default {
                // Earlier parameters are already bound in the pushed scope.
                self.eval_expr(default).await
            } else {
                Err(CompileError::runtime(
                    format!("Missing argument ${name}."),
                    span,
                ))
            };
            match value {
                Ok(value) => {
                    self.scopes
                        .last_mut()
                        .expect("binding scope pushed above")
                        .variables
                        .insert(name.clone(), value);
                }
                Err(err) => {
                    self.scopes.pop();
                    return Err(err);
                }
            }
        }
        let mut scope = self.scopes.pop().expect("binding scope pushed above");

        let leftover: Vec<Value> = positional.collect();
        match &params.rest {
            Some(rest_name) => {
                let keywords: Vec<(String, Value)> = named.into_iter().collect();
                scope.variables.insert(
                    rest_name.clone(),
                    Value::ArgList(ArgList::new(leftover, ListSeparator::Comma, keywords)),
                );
            }
            None => {
                if !leftover.is_empty() {
                    return Err(CompileError::runtime(
                        format!(
                            "Only {} argument{} allowed, but {supplied} were passed.",
                            params.parameters.len(),
                            if params.parameters.len() == 1 { "" } else { "s" },
                        ),
                        span,
                    ));
                }
                if let Some(name) = named.keys().next() {
                    return Err(CompileError::runtime(
                        format!("No argument named ${name}."),
                        span,
                    ));
                }
            }
        }
        Ok(scope)
    }

    // Interpolation and selectors.

    pub(crate) async fn resolve_interpolation(
        &mut self,
        interpolation: &Interpolation,
    ) -> CompileResult<String> {
        let mut out = String::new();
        for part in &interpolation.parts {
            match part {
                InterpPart::Text(text) => out.push_str(text),
                InterpPart::Expr(expr) => {
                    let value = self.eval_expr(expr).await?;
                    match &value {
                        Value::String(string) => out.push_str(&string.text),
                        Value::Null => {}
                        other => {
                            write_value(
                                other,
                                &mut out,
                                self.ctx.style == OutputStyle::Compressed,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    pub(crate) fn sink(&self) -> &WarningSink {
        &self.ctx.sink
    }
}

/// Whether a division operand keeps the literal `a/b` spelling: number
/// literals and nested slash chains do, anything computed does not.
fn slash_operand(expr: &Expr) -> bool {
    match expr {
        Expr::Number { .. } => true,
        Expr::Binary {
            op: BinaryOp::Div,
            left,
            right,
            ..
        } => slash_operand(left) && slash_operand(right),
        _ => false,
    }
}

/// The default namespace of `@use "url"`: the stem of the final path
/// segment.
fn default_namespace(url: &str) -> String {
    let tail = url.rsplit(['/', ':']).next().unwrap_or(url);
    let tail = tail.strip_prefix('_').unwrap_or(tail);
    match tail.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => tail.to_string(),
    }
}

/// Resolve a written selector against the enclosing rule: `&` substitutes
/// the parent selector, otherwise the parent prefixes as a descendant
/// combinator, crossing comma lists on both sides.
fn resolve_selector(
    written: &str,
    parent: Option<&str>,
    span: Span,
) -> CompileResult<String> {
    let child_parts: Vec<&str> = written
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let Some(parent) = parent else {
        if written.contains('&') {
            return Err(CompileError::runtime(
                "Top-level selectors may not contain the parent selector \"&\".",
                span,
            ));
        }
        return Ok(child_parts.join(", "));
    };
    let parent_parts: Vec<&str> = parent.split(',').map(str::trim).collect();
    let mut resolved = Vec::with_capacity(child_parts.len() * parent_parts.len());
    for child in &child_parts {
        for parent_part in &parent_parts {
            if child.contains('&') {
                resolved.push(child.replace('&', parent_part));
            } else {
                resolved.push(format!("{parent_part} {child}"));
            }
        }
    }
    Ok(resolved.join(", "))
}

fn statement_span(statement: &Statement) -> Span {
    match statement {
        Statement::RuleSet { span, .. }
        | Statement::Declaration { span, .. }
        | Statement::VariableDecl { span, .. }
        | Statement::Use { span, .. }
        | Statement::Forward { span, .. }
        | Statement::Import { span, .. }
        | Statement::Include { span, .. }
        | Statement::Content { span }
        | Statement::Return { span, .. }
        | Statement::If { span, .. }
        | Statement::Each { span, .. }
        | Statement::For { span, .. }
        | Statement::While { span, .. }
        | Statement::ErrorRule { span, .. }
        | Statement::WarnRule { span, .. }
        | Statement::DebugRule { span, .. }
        | Statement::Extend { span, .. }
        | Statement::AtRule { span, .. }
        | Statement::LoudComment { span, .. } => *span,
        Statement::MixinDecl(decl) | Statement::FunctionDecl(decl) => decl.span,
    }
}

/// The entry surface of the extension engine: rewrite rule selectors so
/// every rule matching an extended target also matches its extenders.
pub(crate) fn apply_extensions(nodes: &mut [CssNode], extensions: &[Extension]) {
    if extensions.is_empty() {
        return;
    }
    for node in nodes.iter_mut() {
        match node {
            CssNode::Rule { selector, .. } => {
                let mut parts: Vec<String> =
                    selector.split(',').map(|part| part.trim().to_string()).collect();
                let mut added = Vec::new();
                for extension in extensions {
                    for part in &parts {
                        let rewritten: String = part
                            .split_whitespace()
                            .map(|component| {
                                if component == extension.target {
                                    extension.extender.as_str()
                                } else {
                                    component
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(" ");
                        if rewritten != *part
                            && !parts.contains(&rewritten)
                            && !added.contains(&rewritten)
                        {
                            added.push(rewritten);
                        }
                    }
                }
                parts.extend(added);
                *selector = parts.join(", ");
            }
            CssNode::AtRule {
                body: Some(body), ..
            } => apply_extensions(body, extensions),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_selectors_cross_comma_lists() {
        let resolved =
            resolve_selector("c, d", Some("a, b"), Span::default()).expect("resolves");
        assert_eq!(resolved, "a c, b c, a d, b d");
    }

    #[test]
    fn ampersand_substitutes_the_parent() {
        let resolved =
            resolve_selector("&:hover", Some("a"), Span::default()).expect("resolves");
        assert_eq!(resolved, "a:hover");
        assert!(resolve_selector("&", None, Span::default()).is_err());
    }

    #[test]
    fn default_namespace_is_the_stem() {
        assert_eq!(default_namespace("theme"), "theme");
        assert_eq!(default_namespace("lib/_theme.scss"), "theme");
        assert_eq!(default_namespace("sass:math"), "math");
    }

    #[test]
    fn extensions_rewrite_matching_components() {
        let mut nodes = vec![CssNode::Rule {
            selector: ".error".to_string(),
            items: vec![CssItem::Declaration {
                name: "color".to_string(),
                value: "red".to_string(),
            }],
        }];
        apply_extensions(
            &mut nodes,
            &[Extension {
                target: ".error".to_string(),
                extender: ".fatal".to_string(),
                optional: false,
            }],
        );
        let CssNode::Rule { selector, .. } = &nodes[0] else {
            panic!("expected rule");
        };
        assert_eq!(selector, ".error, .fatal");
    }
}

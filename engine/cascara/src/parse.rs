use std::rc::Rc;

use crate::ast::{
    ArgumentDeclaration, ArgumentInvocation, CallableDecl, ConfigEntry, Expr, ImportTarget,
    InterpPart, Interpolation, Statement, Stylesheet, UseNamespace,
};
use crate::error::{CompileError, CompileResult, Span};
use crate::options::Syntax;
use crate::value::{BinaryOp, ListSeparator, UnaryOp};

/// Parse one stylesheet in any of the three surface syntaxes. The indented
/// syntax is normalized to a brace-delimited spelling first, the way
/// sass2scss did, so one grammar serves both.
pub fn parse_stylesheet(source: &str, syntax: Syntax) -> CompileResult<Stylesheet> {
    match syntax {
        Syntax::Indented => {
            let braced = braceify(source);
            Parser::new(&braced, false).parse()
        }
        Syntax::Scss => Parser::new(source, false).parse(),
        Syntax::Css => Parser::new(source, true).parse(),
    }
}

/// Convert indentation-delimited blocks to braces and newline-terminated
/// statements to semicolons.
fn braceify(source: &str) -> String {
    let lines: Vec<(usize, &str)> = source
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let indent = line.len() - line.trim_start().len();
            (indent, line.trim())
        })
        .collect();

    let mut out = String::new();
    let mut stack: Vec<usize> = Vec::new();
    for (index, (indent, text)) in lines.iter().enumerate() {
        let next_indent = lines.get(index + 1).map(|(next, _)| *next);
        out.push_str(text);
        match next_indent {
            Some(next) if next > *indent => {
                stack.push(*indent);
                out.push_str(" {\n");
            }
            next => {
                if !text.starts_with("//") {
                    out.push(';');
                }
                out.push('\n');
                let target = next.unwrap_or(0);
                while stack.last().is_some_and(|&open| open >= target) {
                    stack.pop();
                    out.push_str("}\n");
                }
            }
        }
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    plain_css: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, plain_css: bool) -> Self {
        Self {
            input,
            pos: 0,
            plain_css,
        }
    }

    fn parse(mut self) -> CompileResult<Stylesheet> {
        let statements = self.parse_statements(true)?;
        self.skip_ws();
        if !self.is_eof() {
            return Err(self.error("expected statement"));
        }
        Ok(Stylesheet { statements })
    }

    // Cursor primitives.

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn lookahead(&self, text: &str) -> bool {
        self.input[self.pos..].starts_with(text)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parse(message.into(), Span::new(self.pos, self.pos + 1))
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if self.peek() == Some(ch) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected \"{ch}\"")))
        }
    }

    fn consume(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and silent comments. Loud comments are statements
    /// and stay put.
    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.lookahead("//") => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip whitespace and all comments, for positions inside expressions.
    fn skip_ws_and_comments(&mut self) {
        loop {
            self.skip_ws();
            if self.lookahead("/*") {
                self.pos += 2;
                while !self.is_eof() && !self.lookahead("*/") {
                    self.bump();
                }
                self.pos = (self.pos + 2).min(self.input.len());
            } else {
                break;
            }
        }
    }

    fn consume_word(&mut self, word: &str) -> bool {
        if !self.lookahead(word) {
            return false;
        }
        let after = self.input[self.pos + word.len()..].chars().next();
        if after.is_some_and(is_identifier_part) {
            return false;
        }
        self.pos += word.len();
        true
    }

    // Statements.

    fn parse_statements(&mut self, root: bool) -> CompileResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some('}') => break,
                Some(';') => {
                    self.bump();
                }
                Some('/') if self.lookahead("/*") => {
                    statements.push(self.parse_loud_comment()?);
                }
                _ => {
                    if let Some(statement) = self.parse_statement(root)? {
                        statements.push(statement);
                    }
                }
            }
        }
        Ok(statements)
    }

    fn parse_block(&mut self) -> CompileResult<Vec<Statement>> {
        self.skip_ws();
        self.expect('{')?;
        let statements = self.parse_statements(false)?;
        self.skip_ws();
        self.expect('}')?;
        Ok(statements)
    }

    fn parse_statement(&mut self, root: bool) -> CompileResult<Option<Statement>> {
        match self.peek() {
            Some('$') => {
                if self.plain_css {
                    return Err(self.error("Sass variables aren't allowed in plain CSS"));
                }
                Ok(Some(self.parse_variable_declaration()?))
            }
            Some('@') => self.parse_at_rule(root),
            _ => {
                if root || !self.looks_like_declaration() {
                    Ok(Some(self.parse_rule_set()?))
                } else {
                    Ok(Some(self.parse_declaration()?))
                }
            }
        }
    }

    fn parse_loud_comment(&mut self) -> CompileResult<Statement> {
        let start = self.pos;
        let mut contents = Interpolation::default();
        let mut text = String::from("/*");
        self.pos += 2;
        loop {
            if self.is_eof() {
                return Err(self.error("unterminated comment"));
            }
            if self.lookahead("*/") {
                self.pos += 2;
                text.push_str("*/");
                break;
            }
            if self.lookahead("#{") {
                contents.parts.push(InterpPart::Text(std::mem::take(&mut text)));
                contents.parts.push(InterpPart::Expr(self.parse_interpolated_expr()?));
                continue;
            }
            text.push(self.bump().expect("not at eof"));
        }
        if !text.is_empty() {
            contents.parts.push(InterpPart::Text(text));
        }
        contents.span = Span::new(start, self.pos);
        Ok(Statement::LoudComment {
            text: contents,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_variable_declaration(&mut self) -> CompileResult<Statement> {
        let start = self.pos;
        self.expect('$')?;
        let name = self.parse_identifier()?;
        self.skip_ws_and_comments();
        self.expect(':')?;
        self.skip_ws_and_comments();
        let value = self.parse_expression(true)?;
        let mut default = false;
        let mut global = false;
        loop {
            self.skip_ws_and_comments();
            if self.consume('!') {
                if self.consume_word("default") {
                    default = true;
                } else if self.consume_word("global") {
                    global = true;
                } else {
                    return Err(self.error("expected \"default\" or \"global\""));
                }
            } else {
                break;
            }
        }
        self.end_statement()?;
        Ok(Statement::VariableDecl {
            name,
            value,
            default,
            global,
            span: Span::new(start, self.pos),
        })
    }

    fn end_statement(&mut self) -> CompileResult<()> {
        self.skip_ws();
        match self.peek() {
            Some(';') => {
                self.bump();
                Ok(())
            }
            Some('}') | None => Ok(()),
            _ => Err(self.error("expected \";\"")),
        }
    }

    fn forbid_in_css(&self, name: &str) -> CompileResult<()> {
        if self.plain_css {
            Err(self.error(format!("@{name} isn't allowed in plain CSS")))
        } else {
            Ok(())
        }
    }

    fn parse_at_rule(&mut self, root: bool) -> CompileResult<Option<Statement>> {
        let start = self.pos;
        self.expect('@')?;
        let name = self.parse_identifier()?;
        match name.as_str() {
            "use" => {
                self.forbid_in_css("use")?;
                if !root {
                    return Err(self.error("@use rules must be written at the root of the stylesheet"));
                }
                self.parse_use(start).map(Some)
            }
            "forward" => {
                self.forbid_in_css("forward")?;
                if !root {
                    return Err(
                        self.error("@forward rules must be written at the root of the stylesheet")
                    );
                }
                self.parse_forward(start).map(Some)
            }
            "import" => self.parse_import(start).map(Some),
            "mixin" => {
                self.forbid_in_css("mixin")?;
                let decl = self.parse_callable_declaration(start)?;
                Ok(Some(Statement::MixinDecl(Rc::new(decl))))
            }
            "function" => {
                self.forbid_in_css("function")?;
                let decl = self.parse_callable_declaration(start)?;
                Ok(Some(Statement::FunctionDecl(Rc::new(decl))))
            }
            "include" => {
                self.forbid_in_css("include")?;
                self.parse_include(start).map(Some)
            }
            "content" => {
                self.forbid_in_css("content")?;
                self.end_statement()?;
                Ok(Some(Statement::Content {
                    span: Span::new(start, self.pos),
                }))
            }
            "return" => {
                self.forbid_in_css("return")?;
                self.skip_ws_and_comments();
                let value = self.parse_expression(true)?;
                self.end_statement()?;
                Ok(Some(Statement::Return {
                    value,
                    span: Span::new(start, self.pos),
                }))
            }
            "if" => {
                self.forbid_in_css("if")?;
                self.parse_if(start).map(Some)
            }
            "else" => Err(self.error("@else without matching @if")),
            "each" => {
                self.forbid_in_css("each")?;
                self.parse_each(start).map(Some)
            }
            "for" => {
                self.forbid_in_css("for")?;
                self.parse_for(start).map(Some)
            }
            "while" => {
                self.forbid_in_css("while")?;
                self.skip_ws_and_comments();
                let condition = self.parse_expression(true)?;
                let body = self.parse_block()?;
                Ok(Some(Statement::While {
                    condition,
                    body,
                    span: Span::new(start, self.pos),
                }))
            }
            "error" | "warn" | "debug" => {
                self.forbid_in_css(&name)?;
                self.skip_ws_and_comments();
                let value = self.parse_expression(true)?;
                self.end_statement()?;
                let span = Span::new(start, self.pos);
                Ok(Some(match name.as_str() {
                    "error" => Statement::ErrorRule { value, span },
                    "warn" => Statement::WarnRule { value, span },
                    _ => Statement::DebugRule { value, span },
                }))
            }
            "extend" => {
                self.forbid_in_css("extend")?;
                self.skip_ws();
                let selector = self.parse_interpolation_until(&[';', '}', '!'])?;
                let mut optional = false;
                if self.consume('!') {
                    if !self.consume_word("optional") {
                        return Err(self.error("expected \"optional\""));
                    }
                    optional = true;
                }
                self.end_statement()?;
                Ok(Some(Statement::Extend {
                    selector,
                    optional,
                    span: Span::new(start, self.pos),
                }))
            }
            "charset" => {
                // The front-end consumes the directive; the serializer
                // re-derives it from the output.
                self.skip_ws();
                let _ = self.parse_quoted_string()?;
                self.end_statement()?;
                Ok(None)
            }
            _ => self.parse_passthrough_at_rule(name, start).map(Some),
        }
    }

    fn parse_use(&mut self, start: usize) -> CompileResult<Statement> {
        self.skip_ws();
        let url = self.parse_quoted_string()?;
        self.skip_ws();
        let namespace = if self.consume_word("as") {
            self.skip_ws();
            if self.consume('*') {
                UseNamespace::Global
            } else {
                UseNamespace::Named(self.parse_identifier()?)
            }
        } else {
            UseNamespace::Default
        };
        self.skip_ws();
        let config = if self.consume_word("with") {
            self.parse_config_clause()?
        } else {
            Vec::new()
        };
        self.end_statement()?;
        Ok(Statement::Use {
            url,
            namespace,
            config,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_forward(&mut self, start: usize) -> CompileResult<Statement> {
        self.skip_ws();
        let url = self.parse_quoted_string()?;
        let mut prefix = None;
        let mut show = None;
        let mut hide = None;
        let mut config = Vec::new();
        loop {
            self.skip_ws();
            if self.consume_word("as") {
                self.skip_ws();
                let name = self.parse_identifier()?;
                self.expect('*')?;
                prefix = Some(name);
            } else if self.consume_word("show") {
                show = Some(self.parse_member_list()?);
            } else if self.consume_word("hide") {
                hide = Some(self.parse_member_list()?);
            } else if self.consume_word("with") {
                config = self.parse_config_clause()?;
            } else {
                break;
            }
        }
        self.end_statement()?;
        Ok(Statement::Forward {
            url,
            prefix,
            show,
            hide,
            config,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_member_list(&mut self) -> CompileResult<Vec<String>> {
        let mut members = Vec::new();
        loop {
            self.skip_ws();
            if self.consume('$') {
                members.push(format!("${}", self.parse_identifier()?));
            } else {
                members.push(self.parse_identifier()?);
            }
            self.skip_ws();
            if !self.consume(',') {
                break;
            }
        }
        Ok(members)
    }

    fn parse_config_clause(&mut self) -> CompileResult<Vec<ConfigEntry>> {
        self.skip_ws();
        self.expect('(')?;
        let mut entries = Vec::new();
        loop {
            self.skip_ws_and_comments();
            if self.consume(')') {
                break;
            }
            let entry_start = self.pos;
            self.expect('$')?;
            let name = self.parse_identifier()?;
            self.skip_ws_and_comments();
            self.expect(':')?;
            self.skip_ws_and_comments();
            let value = self.parse_expression(false)?;
            self.skip_ws_and_comments();
            let mut guarded = false;
            if self.consume('!') {
                if !self.consume_word("default") {
                    return Err(self.error("expected \"default\""));
                }
                guarded = true;
            }
            entries.push(ConfigEntry {
                name,
                value,
                guarded,
                span: Span::new(entry_start, self.pos),
            });
            self.skip_ws_and_comments();
            if !self.consume(',') {
                self.expect(')')?;
                break;
            }
        }
        Ok(entries)
    }

    fn parse_import(&mut self, start: usize) -> CompileResult<Statement> {
        let mut targets = Vec::new();
        loop {
            self.skip_ws();
            let target_start = self.pos;
            if self.lookahead("url(") {
                let special = self.parse_special_function("url")?;
                let Expr::Special { contents, .. } = &special else {
                    unreachable!("parse_special_function returns Expr::Special");
                };
                let text = contents.as_plain().unwrap_or_default();
                targets.push(ImportTarget::Css {
                    text: format!("url({text})"),
                    span: Span::new(target_start, self.pos),
                });
            } else {
                let url = self.parse_quoted_string()?;
                let span = Span::new(target_start, self.pos);
                if is_plain_css_import(&url) || self.plain_css {
                    targets.push(ImportTarget::Css {
                        text: format!("\"{url}\""),
                        span,
                    });
                } else {
                    targets.push(ImportTarget::Sass { url, span });
                }
            }
            self.skip_ws();
            if !self.consume(',') {
                break;
            }
        }
        self.end_statement()?;
        Ok(Statement::Import {
            targets,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_callable_declaration(&mut self, start: usize) -> CompileResult<CallableDecl> {
        self.skip_ws();
        let name = self.parse_identifier()?;
        self.skip_ws();
        let arguments = if self.peek() == Some('(') {
            self.parse_argument_declaration()?
        } else {
            ArgumentDeclaration::default()
        };
        let body = self.parse_block()?;
        Ok(CallableDecl {
            name,
            arguments,
            body,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_argument_declaration(&mut self) -> CompileResult<ArgumentDeclaration> {
        let start = self.pos;
        self.expect('(')?;
        let mut parameters = Vec::new();
        let mut rest = None;
        loop {
            self.skip_ws_and_comments();
            if self.consume(')') {
                break;
            }
            self.expect('$')?;
            let name = self.parse_identifier()?;
            self.skip_ws_and_comments();
            if self.lookahead("...") {
                self.pos += 3;
                rest = Some(name);
                self.skip_ws_and_comments();
                self.expect(')')?;
                break;
            }
            let default = if self.consume(':') {
                self.skip_ws_and_comments();
                Some(self.parse_expression(false)?)
            } else {
                None
            };
            parameters.push((name, default));
            self.skip_ws_and_comments();
            if !self.consume(',') {
                self.expect(')')?;
                break;
            }
        }
        Ok(ArgumentDeclaration {
            parameters,
            rest,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_include(&mut self, start: usize) -> CompileResult<Statement> {
        self.skip_ws();
        let first = self.parse_identifier()?;
        let (namespace, name) = if self.consume('.') {
            (Some(first), self.parse_identifier()?)
        } else {
            (None, first)
        };
        self.skip_ws();
        let arguments = if self.peek() == Some('(') {
            self.parse_argument_invocation()?
        } else {
            ArgumentInvocation::default()
        };
        self.skip_ws();
        let content = if self.peek() == Some('{') {
            Some(self.parse_block()?)
        } else {
            self.end_statement()?;
            None
        };
        Ok(Statement::Include {
            namespace,
            name,
            arguments,
            content,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_if(&mut self, start: usize) -> CompileResult<Statement> {
        self.skip_ws_and_comments();
        let condition = self.parse_expression(true)?;
        let body = self.parse_block()?;
        let mut clauses = vec![(condition, body)];
        let mut otherwise = None;
        loop {
            let before_else = self.pos;
            self.skip_ws();
            if !self.consume_word("@else") {
                self.pos = before_else;
                break;
            }
            self.skip_ws();
            if self.consume_word("if") {
                self.skip_ws_and_comments();
                let condition = self.parse_expression(true)?;
                let body = self.parse_block()?;
                clauses.push((condition, body));
            } else {
                otherwise = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Statement::If {
            clauses,
            otherwise,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_each(&mut self, start: usize) -> CompileResult<Statement> {
        let mut bindings = Vec::new();
        loop {
            self.skip_ws();
            self.expect('$')?;
            bindings.push(self.parse_identifier()?);
            self.skip_ws();
            if !self.consume(',') {
                break;
            }
        }
        if !self.consume_word("in") {
            return Err(self.error("expected \"in\""));
        }
        self.skip_ws_and_comments();
        let list = self.parse_expression(true)?;
        let body = self.parse_block()?;
        Ok(Statement::Each {
            bindings,
            list,
            body,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_for(&mut self, start: usize) -> CompileResult<Statement> {
        self.skip_ws();
        self.expect('$')?;
        let variable = self.parse_identifier()?;
        self.skip_ws();
        if !self.consume_word("from") {
            return Err(self.error("expected \"from\""));
        }
        self.skip_ws_and_comments();
        let from = self.parse_expression_until_word(&["through", "to"])?;
        self.skip_ws();
        let inclusive = if self.consume_word("through") {
            true
        } else if self.consume_word("to") {
            false
        } else {
            return Err(self.error("expected \"through\" or \"to\""));
        };
        self.skip_ws_and_comments();
        let to = self.parse_expression(false)?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            variable,
            from,
            to,
            inclusive,
            body,
            span: Span::new(start, self.pos),
        })
    }

    /// `@for` bounds end at the `through`/`to` keyword rather than a
    /// delimiter, so the space-list loop must not swallow it.
    fn parse_expression_until_word(&mut self, stops: &[&str]) -> CompileResult<Expr> {
        let saved_stops: Vec<String> = stops.iter().map(|s| (*s).to_string()) .collect();
        self.parse_space_list(Some(&saved_stops))
    }

    fn parse_passthrough_at_rule(
        &mut self,
        name: String,
        start: usize,
    ) -> CompileResult<Statement> {
        self.skip_ws();
        let params = self.parse_interpolation_until(&['{', ';', '}'])?;
        let body = if self.peek() == Some('{') {
            Some(self.parse_block()?)
        } else {
            self.end_statement()?;
            None
        };
        Ok(Statement::AtRule {
            name,
            params,
            body,
            span: Span::new(start, self.pos),
        })
    }

    // Style rules and declarations.

    /// Decide between a nested declaration and a nested rule by scanning to
    /// the first `;`, `{` or `}` outside any nesting: a block opener means a
    /// rule unless a `:` immediately precedes it (nested properties).
    fn looks_like_declaration(&self) -> bool {
        let bytes = self.input.as_bytes();
        let mut index = self.pos;
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut last_meaningful = 0u8;
        while index < bytes.len() {
            let byte = bytes[index];
            if let Some(active) = quote {
                if byte == b'\\' {
                    index += 2;
                    continue;
                }
                if byte == active {
                    quote = None;
                }
                index += 1;
                continue;
            }
            match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b'#' if index + 1 < bytes.len() && bytes[index + 1] == b'{' => {
                    index += 2;
                    depth += 1;
                    continue;
                }
                b'{' if depth == 0 => return last_meaningful == b':',
                b'}' if depth > 0 => depth -= 1,
                b';' | b'}' if depth == 0 => return true,
                _ => {}
            }
            if !byte.is_ascii_whitespace() {
                last_meaningful = byte;
            }
            index += 1;
        }
        true
    }

    fn parse_rule_set(&mut self) -> CompileResult<Statement> {
        let start = self.pos;
        let selector = self.parse_interpolation_until(&['{'])?;
        if selector.parts.is_empty() {
            return Err(self.error("expected selector"));
        }
        let body = self.parse_block()?;
        Ok(Statement::RuleSet {
            selector,
            body,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_declaration(&mut self) -> CompileResult<Statement> {
        let start = self.pos;
        let name = self.parse_interpolation_until(&[':'])?;
        self.expect(':')?;
        self.skip_ws_and_comments();
        let custom_property = matches!(
            name.parts.first(),
            Some(InterpPart::Text(text)) if text.starts_with("--")
        );
        if custom_property {
            // Custom property values are raw css text.
            let value = self.parse_interpolation_until(&[';', '}'])?;
            self.end_statement()?;
            let span = Span::new(start, self.pos);
            return Ok(Statement::Declaration {
                name,
                value: Some(Expr::Identifier {
                    contents: value,
                    span,
                }),
                children: None,
                span,
            });
        }
        let value = if self.peek() == Some('{') {
            None
        } else {
            let mut expr = self.parse_expression(true)?;
            self.skip_ws_and_comments();
            if self.consume('!') {
                if !self.consume_word("important") {
                    return Err(self.error("expected \"important\""));
                }
                let span = expr.span();
                expr = Expr::List {
                    elements: vec![
                        expr,
                        Expr::Identifier {
                            contents: Interpolation::literal("!important", span),
                            span,
                        },
                    ],
                    separator: ListSeparator::Space,
                    bracketed: false,
                    span,
                };
            }
            Some(expr)
        };
        self.skip_ws();
        let children = if self.peek() == Some('{') {
            Some(self.parse_block()?)
        } else {
            self.end_statement()?;
            None
        };
        Ok(Statement::Declaration {
            name,
            value,
            children,
            span: Span::new(start, self.pos),
        })
    }

    // Interpolation.

    /// Raw text with `#{...}` parts, up to one of the stop characters at
    /// nesting depth zero. Trims surrounding whitespace of the text parts.
    fn parse_interpolation_until(&mut self, stops: &[char]) -> CompileResult<Interpolation> {
        let start = self.pos;
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            let Some(ch) = self.peek() else { break };
            if depth == 0 && stops.contains(&ch) {
                break;
            }
            match ch {
                '#' if self.lookahead("#{") => {
                    if !text.is_empty() {
                        parts.push(InterpPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(InterpPart::Expr(self.parse_interpolated_expr()?));
                }
                '"' | '\'' => {
                    let quoted = self.parse_quoted_string_raw()?;
                    text.push(ch);
                    text.push_str(&quoted);
                    text.push(ch);
                }
                '(' | '[' => {
                    depth += 1;
                    text.push(ch);
                    self.bump();
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    text.push(ch);
                    self.bump();
                }
                '/' if self.lookahead("//") => {
                    while let Some(next) = self.peek() {
                        if next == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.lookahead("/*") => {
                    while !self.is_eof() && !self.lookahead("*/") {
                        self.bump();
                    }
                    self.pos = (self.pos + 2).min(self.input.len());
                }
                '\n' => {
                    text.push(' ');
                    self.bump();
                }
                _ => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        if !text.is_empty() {
            parts.push(InterpPart::Text(text));
        }
        // Trim outer whitespace without disturbing inner spacing.
        if let Some(InterpPart::Text(first)) = parts.first_mut() {
            *first = first.trim_start().to_string();
        }
        if let Some(InterpPart::Text(last)) = parts.last_mut() {
            *last = last.trim_end().to_string();
            if last.is_empty() {
                parts.pop();
            }
        }
        Ok(Interpolation {
            parts,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_interpolated_expr(&mut self) -> CompileResult<Expr> {
        self.expect('#')?;
        self.expect('{')?;
        self.skip_ws_and_comments();
        let expr = self.parse_expression(true)?;
        self.skip_ws_and_comments();
        self.expect('}')?;
        Ok(expr)
    }

    // Identifiers and strings.

    fn parse_identifier(&mut self) -> CompileResult<String> {
        let Some(first) = self.peek() else {
            return Err(self.error("expected identifier"));
        };
        if !is_identifier_start(first) {
            return Err(self.error("expected identifier"));
        }
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if is_identifier_part(ch) {
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        // Hyphens and underscores are interchangeable in sass identifiers.
        Ok(name.replace('_', "-"))
    }

    fn parse_quoted_string(&mut self) -> CompileResult<String> {
        let Some(quote @ ('"' | '\'')) = self.peek() else {
            return Err(self.error("expected string"));
        };
        let _ = quote;
        self.parse_quoted_string_raw()
    }

    /// The text between quotes, cursor left after the closing quote.
    fn parse_quoted_string_raw(&mut self) -> CompileResult<String> {
        let quote = self.bump().expect("caller checked the quote");
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some(ch) if ch == quote => break,
                Some(ch) => text.push(ch),
            }
        }
        Ok(text)
    }

    // Expressions.

    fn parse_expression(&mut self, allow_comma: bool) -> CompileResult<Expr> {
        if allow_comma {
            self.parse_comma_list()
        } else {
            self.parse_space_list(None)
        }
    }

    fn parse_comma_list(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let first = self.parse_space_list(None)?;
        self.skip_ws_and_comments();
        if self.peek() != Some(',') {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.consume(',') {
            self.skip_ws_and_comments();
            if !self.at_expression_start() {
                break;
            }
            elements.push(self.parse_space_list(None)?);
            self.skip_ws_and_comments();
        }
        Ok(Expr::List {
            elements,
            separator: ListSeparator::Comma,
            bracketed: false,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_space_list(&mut self, stop_words: Option<&[String]>) -> CompileResult<Expr> {
        let start = self.pos;
        let first = self.parse_or()?;
        let mut elements = vec![first];
        loop {
            self.skip_ws_and_comments();
            if !self.at_expression_start() {
                break;
            }
            if let Some(stops) = stop_words {
                let at_stop = stops.iter().any(|word| {
                    self.lookahead(word)
                        && !self.input[self.pos + word.len()..]
                            .chars()
                            .next()
                            .is_some_and(is_identifier_part)
                });
                if at_stop {
                    break;
                }
            }
            elements.push(self.parse_or()?);
        }
        if elements.len() == 1 {
            return Ok(elements.pop().expect("one element"));
        }
        Ok(Expr::List {
            elements,
            separator: ListSeparator::Space,
            bracketed: false,
            span: Span::new(start, self.pos),
        })
    }

    fn at_expression_start(&self) -> bool {
        match self.peek() {
            None => false,
            Some(ch) => {
                if matches!(
                    ch,
                    ';' | '}' | '{' | ')' | ']' | ',' | ':' | '!' | '<' | '>' | '=' | '*' | '%'
                        | '/' | '&' | '~' | '^'
                ) {
                    return false;
                }
                if ch == '+' || ch == '-' {
                    // A sign only starts a new element when glued to it.
                    return self.peek_second().is_some_and(|next| !next.is_whitespace());
                }
                ch.is_alphanumeric()
                    || matches!(ch, '$' | '"' | '\'' | '(' | '[' | '#' | '.' | '_' | '\\')
            }
        }
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws_and_comments();
            if !self.consume_word("or") {
                break;
            }
            self.skip_ws_and_comments();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_equality()?;
        loop {
            self.skip_ws_and_comments();
            if !self.consume_word("and") {
                break;
            }
            self.skip_ws_and_comments();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_relational()?;
        loop {
            self.skip_ws_and_comments();
            let op = if self.lookahead("==") {
                BinaryOp::Eq
            } else if self.lookahead("!=") {
                BinaryOp::Neq
            } else {
                break;
            };
            self.pos += 2;
            self.skip_ws_and_comments();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_additive()?;
        loop {
            self.skip_ws_and_comments();
            let op = if self.lookahead("<=") {
                self.pos += 2;
                BinaryOp::Lte
            } else if self.lookahead(">=") {
                self.pos += 2;
                BinaryOp::Gte
            } else if self.peek() == Some('<') {
                self.pos += 1;
                BinaryOp::Lt
            } else if self.peek() == Some('>') {
                self.pos += 1;
                BinaryOp::Gt
            } else {
                break;
            };
            self.skip_ws_and_comments();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_multiplicative()?;
        loop {
            let before = self.pos;
            self.skip_ws_and_comments();
            let Some(op_char @ ('+' | '-')) = self.peek() else {
                self.pos = before;
                break;
            };
            // `10px -5px` is a space list, not subtraction: a sign glued to
            // the right operand but detached from the left binds rightward.
            let spaced_before = before != self.pos;
            let glued_after = self
                .peek_second()
                .is_some_and(|next| !next.is_whitespace() && next != '=');
            if spaced_before && glued_after {
                self.pos = before;
                break;
            }
            self.bump();
            self.skip_ws_and_comments();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op: if op_char == '+' {
                    BinaryOp::Plus
                } else {
                    BinaryOp::Minus
                },
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws_and_comments();
            let op = match self.peek() {
                Some('*') => BinaryOp::Times,
                Some('%') => BinaryOp::Rem,
                Some('/') if !self.lookahead("//") && !self.lookahead("/*") => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            self.skip_ws_and_comments();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: Span::new(start, self.pos),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        if self.consume_word("not") {
            self.skip_ws_and_comments();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span: Span::new(start, self.pos),
            });
        }
        if let Some(sign @ ('-' | '+')) = self.peek() {
            // `-` might open a negative number literal or a hyphenated
            // identifier; only treat it as an operator when it isn't glued
            // to an identifier.
            let next = self.peek_second();
            if sign == '-' && next.is_some_and(|ch| is_identifier_start(ch) && !ch.is_ascii_digit())
            {
                return self.parse_primary();
            }
            if next.is_some_and(|ch| ch.is_ascii_digit() || ch == '.' || ch == '$' || ch == '(') {
                if next.is_some_and(|ch| ch.is_ascii_digit() || ch == '.') {
                    return self.parse_primary();
                }
                self.bump();
                self.skip_ws_and_comments();
                let operand = self.parse_unary()?;
                return Ok(Expr::Unary {
                    op: if sign == '-' {
                        UnaryOp::Minus
                    } else {
                        UnaryOp::Plus
                    },
                    operand: Box::new(operand),
                    span: Span::new(start, self.pos),
                });
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        match self.peek() {
            None => Err(self.error("expected expression")),
            Some('(') => self.parse_paren(),
            Some('[') => self.parse_bracketed_list(),
            Some('"') | Some('\'') => self.parse_string_expr(),
            Some('#') => {
                if self.lookahead("#{") {
                    self.parse_identifier_expr()
                } else {
                    self.parse_hex_color()
                }
            }
            Some('$') => {
                self.bump();
                let name = self.parse_identifier()?;
                Ok(Expr::Variable {
                    namespace: None,
                    name,
                    span: Span::new(start, self.pos),
                })
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number(false),
            Some(ch) if (ch == '-' || ch == '+') && self.peek_second().is_some_and(|n| n.is_ascii_digit() || n == '.') => {
                let negative = ch == '-';
                self.bump();
                self.parse_number(negative)
            }
            Some('&') => {
                self.bump();
                Ok(Expr::Identifier {
                    contents: Interpolation::literal("&", Span::new(start, self.pos)),
                    span: Span::new(start, self.pos),
                })
            }
            Some(ch) if is_identifier_start(ch) => self.parse_identifier_expr(),
            Some(ch) => Err(self.error(format!("unexpected character \"{ch}\""))),
        }
    }

    fn parse_paren(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        self.expect('(')?;
        self.skip_ws_and_comments();
        if self.consume(')') {
            return Ok(Expr::List {
                elements: Vec::new(),
                separator: ListSeparator::Undecided,
                bracketed: false,
                span: Span::new(start, self.pos),
            });
        }
        let first = self.parse_space_list(None)?;
        self.skip_ws_and_comments();
        if self.consume(':') {
            self.skip_ws_and_comments();
            let value = self.parse_space_list(None)?;
            let mut entries = vec![(first, value)];
            loop {
                self.skip_ws_and_comments();
                if !self.consume(',') {
                    break;
                }
                self.skip_ws_and_comments();
                if self.peek() == Some(')') {
                    break;
                }
                let key = self.parse_space_list(None)?;
                self.skip_ws_and_comments();
                self.expect(':')?;
                self.skip_ws_and_comments();
                let value = self.parse_space_list(None)?;
                entries.push((key, value));
            }
            self.skip_ws_and_comments();
            self.expect(')')?;
            return Ok(Expr::Map {
                entries,
                span: Span::new(start, self.pos),
            });
        }
        if self.peek() == Some(',') {
            let mut elements = vec![first];
            while self.consume(',') {
                self.skip_ws_and_comments();
                if self.peek() == Some(')') {
                    break;
                }
                elements.push(self.parse_space_list(None)?);
                self.skip_ws_and_comments();
            }
            self.expect(')')?;
            return Ok(Expr::List {
                elements,
                separator: ListSeparator::Comma,
                bracketed: false,
                span: Span::new(start, self.pos),
            });
        }
        self.expect(')')?;
        Ok(Expr::Paren {
            inner: Box::new(first),
            span: Span::new(start, self.pos),
        })
    }

    fn parse_bracketed_list(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        self.expect('[')?;
        let mut elements = Vec::new();
        let mut separator = ListSeparator::Undecided;
        loop {
            self.skip_ws_and_comments();
            if self.consume(']') {
                break;
            }
            elements.push(self.parse_space_list(None)?);
            self.skip_ws_and_comments();
            if self.consume(',') {
                separator = ListSeparator::Comma;
            }
        }
        if separator == ListSeparator::Undecided && elements.len() > 1 {
            separator = ListSeparator::Space;
        }
        Ok(Expr::List {
            elements,
            separator,
            bracketed: true,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_string_expr(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let quote = self.bump().expect("caller checked the quote");
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('#') if self.lookahead("#{") => {
                    if !text.is_empty() {
                        parts.push(InterpPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(InterpPart::Expr(self.parse_interpolated_expr()?));
                }
                Some('\\') => {
                    self.bump();
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some(ch) if ch == quote => {
                    self.bump();
                    break;
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        if !text.is_empty() {
            parts.push(InterpPart::Text(text));
        }
        let span = Span::new(start, self.pos);
        Ok(Expr::String {
            contents: Interpolation { parts, span },
            span,
        })
    }

    fn parse_hex_color(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        self.expect('#')?;
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_hexdigit() && digits.len() < 8 {
                digits.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let span = Span::new(start, self.pos);
        let expand = |pair: &str| u8::from_str_radix(pair, 16).unwrap_or(0) as f64;
        let short = |nibble: &str| {
            let value = u8::from_str_radix(nibble, 16).unwrap_or(0);
            (value * 16 + value) as f64
        };
        match digits.len() {
            3 => Ok(Expr::Color {
                red: short(&digits[0..1]),
                green: short(&digits[1..2]),
                blue: short(&digits[2..3]),
                alpha: 1.0,
                span,
            }),
            4 => Ok(Expr::Color {
                red: short(&digits[0..1]),
                green: short(&digits[1..2]),
                blue: short(&digits[2..3]),
                alpha: short(&digits[3..4]) / 255.0,
                span,
            }),
            6 => Ok(Expr::Color {
                red: expand(&digits[0..2]),
                green: expand(&digits[2..4]),
                blue: expand(&digits[4..6]),
                alpha: 1.0,
                span,
            }),
            8 => Ok(Expr::Color {
                red: expand(&digits[0..2]),
                green: expand(&digits[2..4]),
                blue: expand(&digits[4..6]),
                alpha: expand(&digits[6..8]) / 255.0,
                span,
            }),
            _ => Err(self.error("expected hex digit")),
        }
    }

    fn parse_number(&mut self, negative: bool) -> CompileResult<Expr> {
        let start = self.pos;
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                // A trailing `..` belongs to a rest argument.
                if ch == '.' && self.lookahead("...") {
                    break;
                }
                if ch == '.'
                    && !self
                        .peek_second()
                        .is_some_and(|next| next.is_ascii_digit())
                {
                    break;
                }
                text.push(ch);
                self.bump();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek_second()
                    .is_some_and(|next| next.is_ascii_digit() || next == '-')
            {
                text.push(ch);
                self.bump();
                if self.peek() == Some('-') {
                    text.push('-');
                    self.bump();
                }
            } else {
                break;
            }
        }
        let mut value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid number \"{text}\"")))?;
        if negative {
            value = -value;
        }
        let unit = if self.consume('%') {
            Some("%".to_string())
        } else if self.peek().is_some_and(|ch| ch.is_alphabetic()) {
            let mut unit = String::new();
            while let Some(ch) = self.peek() {
                if ch.is_alphabetic() {
                    unit.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            Some(unit)
        } else {
            None
        };
        Ok(Expr::Number {
            value,
            unit,
            span: Span::new(start, self.pos),
        })
    }

    fn parse_identifier_expr(&mut self) -> CompileResult<Expr> {
        let start = self.pos;
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('#') if self.lookahead("#{") => {
                    if !text.is_empty() {
                        parts.push(InterpPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(InterpPart::Expr(self.parse_interpolated_expr()?));
                }
                Some(ch) if is_identifier_part(ch) => {
                    text.push(ch);
                    self.bump();
                }
                _ => break,
            }
        }
        if !text.is_empty() {
            parts.push(InterpPart::Text(text));
        }
        let span = Span::new(start, self.pos);
        let interpolated = parts
            .iter()
            .any(|part| matches!(part, InterpPart::Expr(_)));
        let plain = if interpolated {
            None
        } else {
            Interpolation {
                parts: parts.clone(),
                span,
            }
            .as_plain()
        };

        if let Some(word) = &plain {
            match word.as_str() {
                "null" => return Ok(Expr::Null(span)),
                "true" => return Ok(Expr::Boolean(true, span)),
                "false" => return Ok(Expr::Boolean(false, span)),
                _ => {}
            }
            // Namespaced member access.
            if self.peek() == Some('.') && !self.plain_css {
                let after_dot = self.pos;
                self.bump();
                if self.consume('$') {
                    let name = self.parse_identifier()?;
                    return Ok(Expr::Variable {
                        namespace: Some(word.clone()),
                        name,
                        span: Span::new(start, self.pos),
                    });
                }
                if self.peek().is_some_and(is_identifier_start) {
                    let name = self.parse_identifier()?;
                    if self.peek() == Some('(') {
                        let arguments = self.parse_argument_invocation()?;
                        return Ok(Expr::FunctionCall {
                            namespace: Some(word.clone()),
                            name,
                            arguments,
                            span: Span::new(start, self.pos),
                        });
                    }
                }
                self.pos = after_dot;
            }
            if self.peek() == Some('(') {
                return self.parse_call(word.clone(), start);
            }
        }

        Ok(Expr::Identifier {
            contents: Interpolation { parts, span },
            span,
        })
    }

    fn parse_call(&mut self, name: String, start: usize) -> CompileResult<Expr> {
        match name.as_str() {
            "calc" | "clamp" | "min" | "max" => {
                self.expect('(')?;
                let mut args = Vec::new();
                loop {
                    self.skip_ws_and_comments();
                    if self.consume(')') {
                        break;
                    }
                    args.push(self.parse_space_list(None)?);
                    self.skip_ws_and_comments();
                    if !self.consume(',') {
                        self.expect(')')?;
                        break;
                    }
                }
                Ok(Expr::Calc {
                    name,
                    args,
                    span: Span::new(start, self.pos),
                })
            }
            "var" | "env" | "url" | "expression" => self.parse_special_function(&name),
            _ => {
                let arguments = self.parse_argument_invocation()?;
                Ok(Expr::FunctionCall {
                    namespace: None,
                    name,
                    arguments,
                    span: Span::new(start, self.pos),
                })
            }
        }
    }

    /// Capture the raw text of a css function whose contents sass must not
    /// reinterpret, interpolation excepted.
    fn parse_special_function(&mut self, name: &str) -> CompileResult<Expr> {
        let start = self.pos;
        self.expect('(')?;
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(self.error("expected \")\"")),
                Some('#') if self.lookahead("#{") => {
                    if !text.is_empty() {
                        parts.push(InterpPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(InterpPart::Expr(self.parse_interpolated_expr()?));
                }
                Some('(') => {
                    depth += 1;
                    text.push('(');
                    self.bump();
                }
                Some(')') => {
                    if depth == 0 {
                        self.bump();
                        break;
                    }
                    depth -= 1;
                    text.push(')');
                    self.bump();
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        if !text.is_empty() {
            parts.push(InterpPart::Text(text));
        }
        let span = Span::new(start, self.pos);
        Ok(Expr::Special {
            name: name.to_string(),
            contents: Interpolation { parts, span },
            span,
        })
    }

    fn parse_argument_invocation(&mut self) -> CompileResult<ArgumentInvocation> {
        let start = self.pos;
        self.expect('(')?;
        let mut invocation = ArgumentInvocation::default();
        loop {
            self.skip_ws_and_comments();
            if self.consume(')') {
                break;
            }
            // `$name: value` is a keyword argument; a lone `$name` is
            // positional.
            if self.peek() == Some('$') {
                let saved = self.pos;
                self.bump();
                let name = self.parse_identifier()?;
                self.skip_ws_and_comments();
                if self.consume(':') {
                    self.skip_ws_and_comments();
                    let value = self.parse_space_list(None)?;
                    invocation.named.push((name, value));
                    self.skip_ws_and_comments();
                    if !self.consume(',') {
                        self.expect(')')?;
                        break;
                    }
                    continue;
                }
                self.pos = saved;
            }
            let value = self.parse_space_list(None)?;
            self.skip_ws_and_comments();
            if self.lookahead("...") {
                self.pos += 3;
                if invocation.rest.is_none() {
                    invocation.rest = Some(Box::new(value));
                } else {
                    invocation.keyword_rest = Some(Box::new(value));
                }
            } else {
                invocation.positional.push(value);
            }
            self.skip_ws_and_comments();
            if !self.consume(',') {
                self.expect(')')?;
                break;
            }
        }
        invocation.span = Span::new(start, self.pos);
        Ok(invocation)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}

/// `@import` targets css passes through untouched: explicit `.css`, a
/// protocol, or a protocol-relative reference.
fn is_plain_css_import(url: &str) -> bool {
    url.ends_with(".css")
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Stylesheet {
        parse_stylesheet(source, Syntax::Scss).expect("parse")
    }

    #[test]
    fn parses_a_simple_rule() {
        let sheet = parse("a {\n  b: c;\n}");
        let [Statement::RuleSet { selector, body, .. }] = sheet.statements.as_slice() else {
            panic!("expected one rule");
        };
        assert_eq!(selector.as_plain().as_deref(), Some("a"));
        assert!(matches!(body.as_slice(), [Statement::Declaration { .. }]));
    }

    #[test]
    fn distinguishes_nested_rules_from_declarations() {
        let sheet = parse("a { b:hover { c: d; } e: f; }");
        let [Statement::RuleSet { body, .. }] = sheet.statements.as_slice() else {
            panic!("expected one rule");
        };
        assert!(matches!(
            body.as_slice(),
            [Statement::RuleSet { .. }, Statement::Declaration { .. }]
        ));
    }

    #[test]
    fn parses_use_with_configuration() {
        let sheet = parse("@use \"theme\" as t with ($accent: 1px, $muted: 2px);");
        let [Statement::Use {
            url,
            namespace,
            config,
            ..
        }] = sheet.statements.as_slice()
        else {
            panic!("expected @use");
        };
        assert_eq!(url, "theme");
        assert_eq!(*namespace, UseNamespace::Named("t".to_string()));
        assert_eq!(config.len(), 2);
        assert_eq!(config[0].name, "accent");
    }

    #[test]
    fn parses_binary_precedence() {
        let sheet = parse("a { b: 1 + 2 * 3; }");
        let [Statement::RuleSet { body, .. }] = sheet.statements.as_slice() else {
            panic!("expected rule");
        };
        let [Statement::Declaration {
            value: Some(Expr::Binary { op, right, .. }),
            ..
        }] = body.as_slice()
        else {
            panic!("expected declaration with binary value");
        };
        assert_eq!(*op, BinaryOp::Plus);
        assert!(matches!(
            right.as_ref(),
            Expr::Binary {
                op: BinaryOp::Times,
                ..
            }
        ));
    }

    #[test]
    fn signed_numbers_make_space_lists_not_subtraction() {
        let sheet = parse("a { b: 10px -5px; }");
        let [Statement::RuleSet { body, .. }] = sheet.statements.as_slice() else {
            panic!("expected rule");
        };
        let [Statement::Declaration {
            value: Some(Expr::List { elements, .. }),
            ..
        }] = body.as_slice()
        else {
            panic!("expected space list");
        };
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn parses_maps_and_lists_in_parens() {
        let sheet = parse("$m: (a: 1, b: 2); $l: (1, 2, 3);");
        let [Statement::VariableDecl { value: map, .. }, Statement::VariableDecl { value: list, .. }] =
            sheet.statements.as_slice()
        else {
            panic!("expected two declarations");
        };
        assert!(matches!(map, Expr::Map { entries, .. } if entries.len() == 2));
        assert!(matches!(
            list,
            Expr::List {
                elements,
                separator: ListSeparator::Comma,
                ..
            } if elements.len() == 3
        ));
    }

    #[test]
    fn indented_syntax_normalizes_to_blocks() {
        let sheet = parse_stylesheet("a\n  b: c\n\nd\n  e: f", Syntax::Indented).expect("parse");
        assert_eq!(sheet.statements.len(), 2);
        assert!(matches!(sheet.statements[0], Statement::RuleSet { .. }));
    }

    #[test]
    fn plain_css_rejects_sass_constructs() {
        assert!(parse_stylesheet("@use \"other\";", Syntax::Css).is_err());
        assert!(parse_stylesheet("$a: 1;", Syntax::Css).is_err());
        assert!(parse_stylesheet("a { b: c; }", Syntax::Css).is_ok());
    }

    #[test]
    fn special_functions_capture_raw_text() {
        let sheet = parse("a { b: var(--x, 1px); }");
        let [Statement::RuleSet { body, .. }] = sheet.statements.as_slice() else {
            panic!("expected rule");
        };
        let [Statement::Declaration {
            value: Some(Expr::Special { name, contents, .. }),
            ..
        }] = body.as_slice()
        else {
            panic!("expected special function");
        };
        assert_eq!(name, "var");
        assert_eq!(contents.as_plain().as_deref(), Some("--x, 1px"));
    }

    #[test]
    fn keyword_and_rest_arguments_parse() {
        let sheet = parse("a { b: call($fn, 1, $x: 2, $rest...); }");
        let [Statement::RuleSet { body, .. }] = sheet.statements.as_slice() else {
            panic!("expected rule");
        };
        let [Statement::Declaration {
            value: Some(Expr::FunctionCall { arguments, .. }),
            ..
        }] = body.as_slice()
        else {
            panic!("expected call");
        };
        assert_eq!(arguments.positional.len(), 2);
        assert_eq!(arguments.named.len(), 1);
        assert!(arguments.rest.is_some());
    }
}

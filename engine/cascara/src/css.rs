use std::fmt::Write;

use crate::options::OutputStyle;

/// An item inside a style rule's block.
#[derive(Clone, Debug, PartialEq)]
pub enum CssItem {
    Declaration { name: String, value: String },
    Comment(String),
}

/// One node of the output css tree the evaluator accumulates.
#[derive(Clone, Debug, PartialEq)]
pub enum CssNode {
    Rule {
        selector: String,
        items: Vec<CssItem>,
    },
    AtRule {
        name: String,
        params: String,
        body: Option<Vec<CssNode>>,
    },
    Comment(String),
}

impl CssNode {
    fn is_empty(&self) -> bool {
        match self {
            CssNode::Rule { items, .. } => items.is_empty(),
            CssNode::AtRule { body: Some(body), .. } => body.iter().all(CssNode::is_empty),
            CssNode::AtRule { body: None, .. } | CssNode::Comment(_) => false,
        }
    }
}

/// Render the css tree. Expanded output indents with two spaces and
/// separates top-level statements with a blank line; compressed output drops
/// all whitespace and non-loud comments.
pub fn write_stylesheet(nodes: &[CssNode], style: OutputStyle) -> String {
    let mut out = String::new();
    match style {
        OutputStyle::Expanded => {
            let mut first = true;
            for node in nodes {
                if node.is_empty() || skipped_comment(node, style) {
                    continue;
                }
                if !first {
                    out.push('\n');
                }
                first = false;
                write_expanded(node, &mut out, 0);
            }
        }
        OutputStyle::Compressed => {
            for node in nodes {
                if node.is_empty() || skipped_comment(node, style) {
                    continue;
                }
                write_compressed(node, &mut out);
            }
        }
    }
    out
}

fn skipped_comment(node: &CssNode, style: OutputStyle) -> bool {
    match node {
        // Compressed output keeps only loud `/*!` comments.
        CssNode::Comment(text) => {
            style == OutputStyle::Compressed && !text.starts_with("/*!")
        }
        _ => false,
    }
}

fn write_expanded(node: &CssNode, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        CssNode::Rule { selector, items } => {
            let _ = writeln!(out, "{indent}{selector} {{");
            for item in items {
                match item {
                    CssItem::Declaration { name, value } => {
                        let _ = writeln!(out, "{indent}  {name}: {value};");
                    }
                    CssItem::Comment(text) => {
                        let _ = writeln!(out, "{indent}  {text}");
                    }
                }
            }
            let _ = writeln!(out, "{indent}}}");
        }
        CssNode::AtRule { name, params, body } => {
            let head = if params.is_empty() {
                format!("{indent}@{name}")
            } else {
                format!("{indent}@{name} {params}")
            };
            match body {
                None => {
                    let _ = writeln!(out, "{head};");
                }
                Some(children) => {
                    let _ = writeln!(out, "{head} {{");
                    let mut first = true;
                    for child in children {
                        if child.is_empty() {
                            continue;
                        }
                        if !first {
                            out.push('\n');
                        }
                        first = false;
                        write_expanded(child, out, depth + 1);
                    }
                    let _ = writeln!(out, "{indent}}}");
                }
            }
        }
        CssNode::Comment(text) => {
            let _ = writeln!(out, "{indent}{text}");
        }
    }
}

fn write_compressed(node: &CssNode, out: &mut String) {
    match node {
        CssNode::Rule { selector, items } => {
            let _ = write!(out, "{}{{", compress_selector(selector));
            let mut first = true;
            for item in items {
                if let CssItem::Declaration { name, value } = item {
                    if !first {
                        out.push(';');
                    }
                    first = false;
                    let _ = write!(out, "{name}:{value}");
                }
            }
            out.push('}');
        }
        CssNode::AtRule { name, params, body } => {
            if params.is_empty() {
                let _ = write!(out, "@{name}");
            } else {
                let _ = write!(out, "@{name} {params}");
            }
            match body {
                None => out.push(';'),
                Some(children) => {
                    out.push('{');
                    for child in children {
                        if child.is_empty() || skipped_comment(child, OutputStyle::Compressed) {
                            continue;
                        }
                        write_compressed(child, out);
                    }
                    out.push('}');
                }
            }
        }
        CssNode::Comment(text) => out.push_str(text),
    }
}

fn compress_selector(selector: &str) -> String {
    selector
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply the charset policy: when the rendered css contains a non-ASCII
/// code point, expanded output gains a `@charset` directive and compressed
/// output a BOM. `charset: false` suppresses both.
pub fn apply_charset(css: String, style: OutputStyle, charset: bool) -> String {
    if !charset || css.is_ascii() {
        return css;
    }
    match style {
        OutputStyle::Expanded => format!("@charset \"UTF-8\";\n{css}"),
        OutputStyle::Compressed => format!("\u{feff}{css}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(selector: &str, declarations: &[(&str, &str)]) -> CssNode {
        CssNode::Rule {
            selector: selector.to_string(),
            items: declarations
                .iter()
                .map(|(name, value)| CssItem::Declaration {
                    name: (*name).to_string(),
                    value: (*value).to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn expanded_rules_are_blank_line_separated() {
        let css = write_stylesheet(
            &[rule("a", &[("b", "c")]), rule("d", &[("e", "f")])],
            OutputStyle::Expanded,
        );
        assert_eq!(css, "a {\n  b: c;\n}\n\nd {\n  e: f;\n}\n");
    }

    #[test]
    fn compressed_output_has_no_whitespace() {
        let css = write_stylesheet(
            &[rule("a, b", &[("c", "d"), ("e", "f")])],
            OutputStyle::Compressed,
        );
        assert_eq!(css, "a,b{c:d;e:f}");
    }

    #[test]
    fn empty_rules_are_dropped() {
        let css = write_stylesheet(&[rule("a", &[])], OutputStyle::Expanded);
        assert_eq!(css, "");
    }

    #[test]
    fn at_rules_nest_their_children() {
        let css = write_stylesheet(
            &[CssNode::AtRule {
                name: "media".into(),
                params: "screen".into(),
                body: Some(vec![rule("a", &[("b", "c")])]),
            }],
            OutputStyle::Expanded,
        );
        assert_eq!(css, "@media screen {\n  a {\n    b: c;\n  }\n}\n");
    }

    #[test]
    fn charset_policy_matches_style() {
        let unicode = "a {\n  b: \u{1f46d};\n}\n".to_string();
        let expanded = apply_charset(unicode.clone(), OutputStyle::Expanded, true);
        assert!(expanded.starts_with("@charset \"UTF-8\";\n"));
        let compressed = apply_charset(unicode.clone(), OutputStyle::Compressed, true);
        assert!(compressed.starts_with('\u{feff}'));
        let silent = apply_charset(unicode, OutputStyle::Expanded, false);
        assert!(silent.starts_with("a {"));
        let ascii = apply_charset("a{b:c}".to_string(), OutputStyle::Compressed, true);
        assert_eq!(ascii, "a{b:c}");
    }
}

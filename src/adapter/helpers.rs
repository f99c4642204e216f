//! Tree-sitter helpers shared by the language adapters

use super::framework::{FileContext, ParseError, SyntaxTree};
use crate::symbol::{Span, Symbol, SymbolKind};
use crate::uri::SymbolUri;
use tree_sitter::{Node, Parser};

/// Parse `source` with a grammar. A tree containing error or missing nodes
/// is reported as a syntax error at the first such node.
pub fn parse_with(language: tree_sitter::Language, source: &str) -> Result<SyntaxTree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| ParseError::Grammar(e.to_string()))?;

    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(root).unwrap_or(root);
        let pos = at.start_position();
        return Err(ParseError::Syntax {
            line: pos.row as u32 + 1,
            column: pos.column as u32 + 1,
        });
    }
    Ok(SyntaxTree::new(tree, source.to_string()))
}

/// First ERROR or MISSING node in document order
pub fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

pub fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|c| c.kind() == kind)
}

pub fn span_of(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row as u32 + 1, start.column as u32, end.row as u32 + 1, end.column as u32)
}

pub fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Collapse whitespace so multi-line signatures fit on one line
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last segment of a dotted, `::` or `/` separated path
pub fn last_segment(path: &str) -> &str {
    path.rsplit(['.', ':', '/']).find(|s| !s.is_empty()).unwrap_or(path)
}

/// Strip a trailing generic argument list: `Vec<T>` → `Vec`, `List[T]` → `List`
pub fn strip_generics(name: &str) -> &str {
    name.split(['<', '[']).next().unwrap_or(name).trim()
}

/// The file-level module symbol, spanning the whole file
pub fn module_symbol(ctx: &FileContext, root: Node<'_>, doc: Option<String>) -> Symbol {
    let mut span = span_of(root);
    span.start_line = 1;
    span.start_col = 0;
    let symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Module, &ctx.module_path, span);
    match doc {
        Some(doc) => symbol.with_doc(doc),
        None => symbol,
    }
}

/// Where a definition lives while walking a file.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: SymbolUri,
    pub qualifier: Option<String>,
    /// Directly inside a class-like body: functions become methods
    pub in_class: bool,
    /// Module level: assignments become variables
    pub top_level: bool,
}

impl Scope {
    pub fn module(module: &Symbol) -> Self {
        Self {
            parent: module.uri.clone(),
            qualifier: None,
            in_class: false,
            top_level: true,
        }
    }

    pub fn qualify(&self, name: &str) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{name}"),
            None => name.to_string(),
        }
    }

    pub fn enter(&self, parent: SymbolUri, qualifier: String, in_class: bool) -> Self {
        Self {
            parent,
            qualifier: Some(qualifier),
            in_class,
            top_level: false,
        }
    }
}

/// Innermost non-variable symbol whose span contains the node's start.
/// Falls back to the module symbol.
pub fn enclosing(symbols: &[Symbol], node: Node<'_>) -> Option<SymbolUri> {
    let pos = node.start_position();
    let (line, col) = (pos.row as u32 + 1, pos.column as u32);
    symbols
        .iter()
        .filter(|s| s.kind != SymbolKind::Variable && s.span.contains(line, col))
        .min_by_key(|s| s.span.extent())
        .or_else(|| symbols.first())
        .map(|s| s.uri.clone())
}

/// Consecutive comment siblings directly above `node`, oldest first.
///
/// `skip` names node kinds that may sit between the comments and the
/// declaration (attributes, decorators). `accept` filters comment text.
pub fn leading_comments(node: Node<'_>, source: &str, skip: &[&str], accept: impl Fn(&str) -> bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut boundary = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        if skip.contains(&sibling.kind()) {
            boundary = sibling.start_position().row;
            current = sibling.prev_sibling();
            continue;
        }
        if !sibling.kind().contains("comment") || sibling.end_position().row + 1 < boundary {
            break;
        }
        let body = text(sibling, source);
        if !accept(body) {
            break;
        }
        lines.push(body.to_string());
        boundary = sibling.start_position().row;
        current = sibling.prev_sibling();
    }

    lines.reverse();
    lines
}

/// Strip comment markers (`///`, `//`, `/** */`, leading `*`) and join lines
pub fn clean_comment(lines: &[String]) -> String {
    let mut out = Vec::new();
    for raw in lines {
        let body = raw.trim();
        let body = body.strip_prefix("/**").unwrap_or(body);
        let body = body.strip_suffix("*/").unwrap_or(body);
        for line in body.lines() {
            let line = line.trim();
            let line = line
                .strip_prefix("///")
                .or_else(|| line.strip_prefix("//!"))
                .or_else(|| line.strip_prefix("//"))
                .or_else(|| line.strip_prefix('*'))
                .unwrap_or(line);
            out.push(line.trim().to_string());
        }
    }
    out.join("\n").trim().to_string()
}

/// Strip string prefixes and quotes from a Python docstring literal
pub fn clean_docstring(raw: &str) -> String {
    let s = raw.trim().trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let mut body = s;
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if s.len() >= 2 * quote.len() && s.starts_with(quote) && s.ends_with(quote) {
            body = &s[quote.len()..s.len() - quote.len()];
            break;
        }
    }
    body.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring("\"\"\"Say hello.\n\n    Twice.\n    \"\"\""), "Say hello.\n\nTwice.");
        assert_eq!(clean_docstring("r'raw'"), "raw");
    }

    #[test]
    fn test_clean_comment() {
        let jsdoc = vec!["/**\n * Adds numbers.\n * @param a first\n */".to_string()];
        assert_eq!(clean_comment(&jsdoc), "Adds numbers.\n@param a first");

        let rust = vec!["/// Line one".to_string(), "/// Line two".to_string()];
        assert_eq!(clean_comment(&rust), "Line one\nLine two");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(last_segment("crate::net::Client"), "Client");
        assert_eq!(last_segment("os.path"), "path");
        assert_eq!(strip_generics("HashMap<K, V>"), "HashMap");
        assert_eq!(one_line("(a,\n    b)"), "(a, b)");
    }

    #[test]
    fn test_parse_reports_first_error() {
        let err = parse_with(tree_sitter_python::LANGUAGE.into(), "x = 1\ny = (\n").err().unwrap();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }
}

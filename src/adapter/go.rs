//! Go language adapter
//!
//! Named types map to `class`; methods are qualified by their receiver type.
//! Struct embedding is not treated as inheritance.

use super::framework::{FileContext, LanguageAdapter, ParseError, RawReference, SyntaxTree};
use super::helpers::{
    clean_comment, enclosing, field_children, last_segment, leading_comments, line_of, module_symbol, named_children,
    one_line, parse_with, span_of, strip_generics, text,
};
use crate::edge::EdgeKind;
use crate::language::Language;
use crate::symbol::{Symbol, SymbolKind};
use tree_sitter::Node;

pub struct GoAdapter;

impl GoAdapter {
    fn doc(node: Node, source: &str) -> Option<String> {
        let lines = leading_comments(node, source, &[], |c| c.starts_with("//"));
        (!lines.is_empty()).then(|| clean_comment(&lines)).filter(|d| !d.is_empty())
    }

    fn signature(node: Node, source: &str) -> String {
        let mut signature = node
            .child_by_field_name("parameters")
            .map(|p| one_line(text(p, source)))
            .unwrap_or_else(|| "()".to_string());
        if let Some(result) = node.child_by_field_name("result") {
            signature.push(' ');
            signature.push_str(&one_line(text(result, source)));
        }
        signature
    }

    /// `(s *Server)` or `(l List[T])` → `Server` / `List`
    fn receiver_type(receiver: Node, source: &str) -> Option<String> {
        let written = text(receiver, source).trim_matches(|c| c == '(' || c == ')');
        let ty = written.split_whitespace().last()?.trim_start_matches('*');
        let ty = strip_generics(ty);
        (!ty.is_empty()).then(|| ty.to_string())
    }

    fn declarations(&self, root: Node, source: &str, ctx: &FileContext, module: &Symbol, out: &mut Vec<Symbol>) {
        let symbol = |kind: SymbolKind, name: &str, node: Node, doc_node: Node| {
            let symbol = Symbol::new(&ctx.project, &ctx.path, kind, name, span_of(node)).with_parent(module.uri.clone());
            match Self::doc(doc_node, source) {
                Some(doc) => symbol.with_doc(doc),
                None => symbol,
            }
        };

        for node in named_children(root) {
            match node.kind() {
                "function_declaration" => {
                    let Some(name) = node.child_by_field_name("name") else { continue };
                    out.push(symbol(SymbolKind::Function, text(name, source), node, node).with_signature(Self::signature(node, source)));
                }
                "method_declaration" => {
                    let Some(name) = node.child_by_field_name("name") else { continue };
                    let receiver = node.child_by_field_name("receiver").and_then(|r| Self::receiver_type(r, source));
                    let qualified = match &receiver {
                        Some(ty) => format!("{ty}.{}", text(name, source)),
                        None => text(name, source).to_string(),
                    };
                    let mut method = symbol(SymbolKind::Method, &qualified, node, node).with_signature(Self::signature(node, source));
                    if let Some(owner) = receiver.and_then(|ty| out.iter().find(|s| s.kind == SymbolKind::Class && s.name == ty)) {
                        method.parent = Some(owner.uri.clone());
                    }
                    out.push(method);
                }
                "type_declaration" => {
                    for spec in named_children(node).into_iter().filter(|s| matches!(s.kind(), "type_spec" | "type_alias")) {
                        let Some(name) = spec.child_by_field_name("name") else { continue };
                        let mut class = symbol(SymbolKind::Class, text(name, source), spec, node);
                        if let Some(ty) = spec.child_by_field_name("type") {
                            let head = match ty.kind() {
                                "struct_type" => "struct".to_string(),
                                "interface_type" => "interface".to_string(),
                                _ => one_line(text(ty, source)),
                            };
                            class = class.with_signature(head);
                        }
                        out.push(class);
                    }
                }
                "const_declaration" | "var_declaration" => {
                    let specs: Vec<Node> = named_children(node)
                        .into_iter()
                        .flat_map(|c| if c.kind() == "var_spec_list" { named_children(c) } else { vec![c] })
                        .filter(|s| matches!(s.kind(), "const_spec" | "var_spec"))
                        .collect();
                    for spec in specs {
                        for name in field_children(spec, "name") {
                            let mut var = symbol(SymbolKind::Variable, text(name, source), spec, node);
                            if let Some(ty) = spec.child_by_field_name("type") {
                                var = var.with_signature(one_line(text(ty, source)));
                            }
                            out.push(var);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn import_spec(spec: Node, source: &str, from: &crate::uri::SymbolUri, refs: &mut Vec<RawReference>) {
        let Some(path) = spec.child_by_field_name("path") else { return };
        let written = text(path, source).trim_matches(|c| c == '"' || c == '`');
        if written.is_empty() {
            return;
        }
        let alias = spec.child_by_field_name("name").map(|n| text(n, source).to_string());
        refs.push(
            RawReference::new(from.clone(), EdgeKind::Imports, last_segment(written), line_of(spec))
                .with_module(written.replace('/', "."))
                .with_alias(alias),
        );
    }

    fn call(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(callee) = node.child_by_field_name("function") else { return };
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        match callee.kind() {
            "identifier" => refs.push(RawReference::new(from, EdgeKind::Calls, text(callee, source), line)),
            "selector_expression" => {
                let (Some(operand), Some(field)) = (callee.child_by_field_name("operand"), callee.child_by_field_name("field")) else {
                    return;
                };
                refs.push(RawReference::new(from, EdgeKind::Calls, text(field, source), line).with_receiver(text(operand, source)));
            }
            _ => {}
        }
    }
}

impl LanguageAdapter for GoAdapter {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        parse_with(tree_sitter_go::LANGUAGE.into(), source)
    }

    fn extract_symbols(&self, ctx: &FileContext, tree: &SyntaxTree) -> Vec<Symbol> {
        let root = tree.root();
        let source = tree.source();
        let package_doc = named_children(root)
            .into_iter()
            .find(|n| n.kind() == "package_clause")
            .and_then(|n| Self::doc(n, source));
        let module = module_symbol(ctx, root, package_doc);

        let mut out = vec![module.clone()];
        self.declarations(root, source, ctx, &module, &mut out);
        out
    }

    fn extract_references(&self, _ctx: &FileContext, tree: &SyntaxTree, symbols: &[Symbol]) -> Vec<RawReference> {
        let source = tree.source();
        let mut refs = Vec::new();
        let mut stack = vec![tree.root()];

        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_declaration" => {
                    if let Some(from) = enclosing(symbols, node) {
                        for child in named_children(node) {
                            match child.kind() {
                                "import_spec" => Self::import_spec(child, source, &from, &mut refs),
                                "import_spec_list" => {
                                    for spec in named_children(child).into_iter().filter(|s| s.kind() == "import_spec") {
                                        Self::import_spec(spec, source, &from, &mut refs);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    continue;
                }
                "call_expression" => self.call(node, source, symbols, &mut refs),
                _ => {}
            }
            stack.extend(named_children(node).into_iter().rev());
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(path: &str, source: &str) -> (Vec<Symbol>, Vec<RawReference>) {
        let adapter = GoAdapter;
        let ctx = FileContext::new("p", path);
        let tree = adapter.parse(source).unwrap();
        let symbols = adapter.extract_symbols(&ctx, &tree);
        let refs = adapter.extract_references(&ctx, &tree, &symbols);
        (symbols, refs)
    }

    const SERVER: &str = r#"// Package server runs the API.
package server

import (
	"fmt"
	h "net/http"
)

const DefaultPort = 8080

// Server handles requests.
type Server struct {
	port int
}

// NewServer builds a server.
func NewServer(port int) *Server {
	return &Server{port: port}
}

func (s *Server) Start() error {
	fmt.Println(s.port)
	return h.ListenAndServe(s.addr(), nil)
}
"#;

    #[test]
    fn test_symbols() {
        let (symbols, _) = extract("server/server.go", SERVER);
        let names: Vec<(&str, SymbolKind)> = symbols.iter().map(|s| (s.qualified_name.as_str(), s.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("server.server", SymbolKind::Module),
                ("DefaultPort", SymbolKind::Variable),
                ("Server", SymbolKind::Class),
                ("NewServer", SymbolKind::Function),
                ("Server.Start", SymbolKind::Method),
            ]
        );

        assert_eq!(symbols[0].doc.as_deref(), Some("Package server runs the API."));
        assert_eq!(symbols[2].signature.as_deref(), Some("struct"));
        assert_eq!(symbols[2].doc.as_deref(), Some("Server handles requests."));
        assert_eq!(symbols[3].signature.as_deref(), Some("(port int) *Server"));
        assert_eq!(symbols[4].parent.as_ref(), Some(&symbols[2].uri));
    }

    #[test]
    fn test_references() {
        let (_, refs) = extract("server/server.go", SERVER);

        let http = refs.iter().find(|r| r.kind == EdgeKind::Imports && r.name == "http").unwrap();
        assert_eq!(http.module.as_deref(), Some("net.http"));
        assert_eq!(http.alias.as_deref(), Some("h"));

        let listen = refs.iter().find(|r| r.name == "ListenAndServe").unwrap();
        assert_eq!(listen.receiver.as_deref(), Some("h"));
        assert_eq!(listen.from.name, "Server.Start");

        assert!(refs.iter().any(|r| r.kind == EdgeKind::Calls && r.name == "addr"));
    }
}

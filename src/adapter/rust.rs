//! Rust language adapter
//!
//! Structs, enums, unions, traits and type aliases map to `class`; methods
//! inside `impl` and `trait` blocks are qualified by their type. `impl Trait
//! for Type` produces an inheritance reference from the type.

use super::framework::{FileContext, LanguageAdapter, ParseError, RawReference, SyntaxTree};
use super::helpers::{
    Scope, clean_comment, enclosing, last_segment, leading_comments, line_of, module_symbol, named_children, one_line,
    parse_with, span_of, strip_generics, text,
};
use crate::edge::EdgeKind;
use crate::language::Language;
use crate::symbol::{Symbol, SymbolKind};
use tree_sitter::Node;

const TYPE_ITEMS: &[&str] = &["struct_item", "enum_item", "union_item", "trait_item", "type_item"];

pub struct RustAdapter;

impl RustAdapter {
    fn doc(node: Node, source: &str) -> Option<String> {
        let lines = leading_comments(node, source, &["attribute_item"], |c| {
            (c.starts_with("///") && !c.starts_with("////")) || c.starts_with("/**")
        });
        (!lines.is_empty()).then(|| clean_comment(&lines)).filter(|d| !d.is_empty())
    }

    fn module_doc(root: Node, source: &str) -> Option<String> {
        let lines: Vec<String> = named_children(root)
            .into_iter()
            .take_while(|n| n.kind() == "line_comment" || n.kind() == "block_comment")
            .map(|n| text(n, source).to_string())
            .filter(|c| c.starts_with("//!"))
            .collect();
        (!lines.is_empty()).then(|| clean_comment(&lines)).filter(|d| !d.is_empty())
    }

    /// Item head up to the body: `struct Point<T>`, `trait Shape: Debug`
    fn head(node: Node, source: &str) -> String {
        let written = text(node, source);
        let end = written.find(['{', ';', '(']).unwrap_or(written.len());
        one_line(&written[..end])
    }

    fn walk(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        for child in named_children(node) {
            match child.kind() {
                "function_item" | "function_signature_item" => self.function(child, source, ctx, scope, out),
                kind if TYPE_ITEMS.contains(&kind) => self.type_item(child, source, ctx, scope, out),
                "impl_item" => self.impl_block(child, source, ctx, scope, out),
                "mod_item" => {
                    let (Some(name), Some(body)) = (child.child_by_field_name("name"), child.child_by_field_name("body")) else {
                        continue;
                    };
                    let inner = Scope {
                        parent: scope.parent.clone(),
                        qualifier: Some(scope.qualify(text(name, source))),
                        in_class: false,
                        top_level: true,
                    };
                    self.walk(body, source, ctx, &inner, out);
                }
                "const_item" | "static_item" if scope.top_level => {
                    let Some(name) = child.child_by_field_name("name") else { continue };
                    let mut symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Variable, scope.qualify(text(name, source)), span_of(child))
                        .with_parent(scope.parent.clone());
                    if let Some(ty) = child.child_by_field_name("type") {
                        symbol = symbol.with_signature(format!(": {}", one_line(text(ty, source))));
                    }
                    if let Some(doc) = Self::doc(child, source) {
                        symbol = symbol.with_doc(doc);
                    }
                    out.push(symbol);
                }
                "line_comment" | "block_comment" | "attribute_item" | "use_declaration" => {}
                _ => self.walk(child, source, ctx, scope, out),
            }
        }
    }

    fn function(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let qualified = scope.qualify(text(name_node, source));
        let kind = if scope.in_class { SymbolKind::Method } else { SymbolKind::Function };

        let mut signature = node
            .child_by_field_name("parameters")
            .map(|p| one_line(text(p, source)))
            .unwrap_or_else(|| "()".to_string());
        if let Some(ret) = node.child_by_field_name("return_type") {
            signature.push_str(" -> ");
            signature.push_str(&one_line(text(ret, source)));
        }

        let mut symbol = Symbol::new(&ctx.project, &ctx.path, kind, &qualified, span_of(node))
            .with_signature(signature)
            .with_parent(scope.parent.clone());
        if let Some(doc) = Self::doc(node, source) {
            symbol = symbol.with_doc(doc);
        }

        let inner = scope.enter(symbol.uri.clone(), qualified, false);
        out.push(symbol);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, ctx, &inner, out);
        }
    }

    fn type_item(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let qualified = scope.qualify(text(name_node, source));

        let mut symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Class, &qualified, span_of(node))
            .with_signature(Self::head(node, source))
            .with_parent(scope.parent.clone());
        if let Some(doc) = Self::doc(node, source) {
            symbol = symbol.with_doc(doc);
        }

        let uri = symbol.uri.clone();
        out.push(symbol);
        if node.kind() == "trait_item" {
            if let Some(body) = node.child_by_field_name("body") {
                self.walk(body, source, ctx, &scope.enter(uri, qualified, true), out);
            }
        }
    }

    /// Methods of `impl Type` are qualified `Type.method` and parented to the
    /// type's symbol when it is declared earlier in the same file.
    fn impl_block(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let (Some(ty), Some(body)) = (node.child_by_field_name("type"), node.child_by_field_name("body")) else { return };
        let type_name = scope.qualify(strip_generics(text(ty, source)));
        let parent = out
            .iter()
            .find(|s| s.kind == SymbolKind::Class && s.qualified_name == type_name)
            .map(|s| s.uri.clone())
            .unwrap_or_else(|| scope.parent.clone());

        self.walk(body, source, ctx, &scope.enter(parent, type_name, true), out);
    }

    /// Flatten a use tree: `a::{b, c::d as e}` → `(a, b)`, `(a.c, d, e)`
    fn use_tree(node: Node, source: &str, prefix: &[String], from: &crate::uri::SymbolUri, line: u32, refs: &mut Vec<RawReference>) {
        let path_segments = |n: Node| -> Vec<String> {
            text(n, source)
                .split("::")
                .map(str::trim)
                .filter(|s| !s.is_empty() && !matches!(*s, "crate" | "self" | "super"))
                .map(str::to_string)
                .collect()
        };
        let push = |segments: Vec<String>, alias: Option<String>, refs: &mut Vec<RawReference>| {
            let mut full: Vec<String> = prefix.to_vec();
            full.extend(segments);
            let Some(name) = full.pop() else { return };
            let mut reference = RawReference::new(from.clone(), EdgeKind::Imports, name, line).with_alias(alias);
            if !full.is_empty() {
                reference = reference.with_module(full.join("."));
            }
            refs.push(reference);
        };

        match node.kind() {
            "identifier" | "scoped_identifier" => push(path_segments(node), None, refs),
            "use_as_clause" => {
                let Some(path) = node.child_by_field_name("path") else { return };
                let alias = node.child_by_field_name("alias").map(|a| text(a, source).to_string());
                push(path_segments(path), alias, refs);
            }
            "scoped_use_list" => {
                let mut nested = prefix.to_vec();
                if let Some(path) = node.child_by_field_name("path") {
                    nested.extend(path_segments(path));
                }
                if let Some(list) = node.child_by_field_name("list") {
                    for item in named_children(list) {
                        Self::use_tree(item, source, &nested, from, line, refs);
                    }
                }
            }
            "use_list" => {
                for item in named_children(node) {
                    Self::use_tree(item, source, prefix, from, line, refs);
                }
            }
            _ => {}
        }
    }

    fn call(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(mut callee) = node.child_by_field_name("function") else { return };
        if callee.kind() == "generic_function" {
            let Some(inner) = callee.child_by_field_name("function") else { return };
            callee = inner;
        }
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        match callee.kind() {
            "identifier" => refs.push(RawReference::new(from, EdgeKind::Calls, text(callee, source), line)),
            "scoped_identifier" => {
                let Some(name) = callee.child_by_field_name("name") else { return };
                let mut reference = RawReference::new(from, EdgeKind::Calls, text(name, source), line);
                if let Some(path) = callee.child_by_field_name("path") {
                    reference = reference.with_receiver(strip_generics(last_segment(text(path, source))));
                }
                refs.push(reference);
            }
            "field_expression" => {
                let (Some(value), Some(field)) = (callee.child_by_field_name("value"), callee.child_by_field_name("field")) else {
                    return;
                };
                refs.push(RawReference::new(from, EdgeKind::Calls, text(field, source), line).with_receiver(text(value, source)));
            }
            _ => {}
        }
    }

    fn trait_impl(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let (Some(ty), Some(tr)) = (node.child_by_field_name("type"), node.child_by_field_name("trait")) else { return };
        let type_name = strip_generics(text(ty, source));
        let from = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Class && s.name == type_name)
            .map(|s| s.uri.clone())
            .or_else(|| enclosing(symbols, node));
        let Some(from) = from else { return };

        let trait_name = strip_generics(last_segment(strip_generics(text(tr, source))));
        refs.push(RawReference::new(from, EdgeKind::Inherits, trait_name, line_of(node)));
    }
}

impl LanguageAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        parse_with(tree_sitter_rust::LANGUAGE.into(), source)
    }

    fn extract_symbols(&self, ctx: &FileContext, tree: &SyntaxTree) -> Vec<Symbol> {
        let root = tree.root();
        let source = tree.source();
        let module = module_symbol(ctx, root, Self::module_doc(root, source));
        let scope = Scope::module(&module);

        let mut out = vec![module];
        self.walk(root, source, ctx, &scope, &mut out);
        out
    }

    fn extract_references(&self, _ctx: &FileContext, tree: &SyntaxTree, symbols: &[Symbol]) -> Vec<RawReference> {
        let source = tree.source();
        let mut refs = Vec::new();
        let mut stack = vec![tree.root()];

        while let Some(node) = stack.pop() {
            match node.kind() {
                "use_declaration" => {
                    if let (Some(argument), Some(from)) = (node.child_by_field_name("argument"), enclosing(symbols, node)) {
                        Self::use_tree(argument, source, &[], &from, line_of(node), &mut refs);
                    }
                }
                "call_expression" => self.call(node, source, symbols, &mut refs),
                "impl_item" => self.trait_impl(node, source, symbols, &mut refs),
                _ => {}
            }
            stack.extend(named_children(node).into_iter().rev());
        }
        refs
    }
}

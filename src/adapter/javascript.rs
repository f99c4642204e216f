//! JavaScript language adapter
//!
//! Handles ES modules and CommonJS: function declarations, classes and
//! their methods, `const f = () => ...` bindings, module-level variables,
//! `import`/`require`, calls, `new` and `extends`.

use super::framework::{FileContext, LanguageAdapter, ParseError, RawReference, SyntaxTree};
use super::helpers::{
    Scope, child_of_kind, clean_comment, enclosing, last_segment, leading_comments, line_of, module_symbol,
    named_children, one_line, parse_with, span_of, text,
};
use crate::edge::EdgeKind;
use crate::language::{Language, module_path};
use crate::symbol::{Symbol, SymbolKind};
use tree_sitter::Node;

const FUNCTION_VALUES: &[&str] = &["arrow_function", "function_expression", "function", "generator_function"];

pub struct JavaScriptAdapter;

impl JavaScriptAdapter {
    /// JSDoc block above a declaration, looking through `export`
    fn jsdoc(node: Node, source: &str) -> Option<String> {
        let anchor = match node.parent() {
            Some(parent) if parent.kind() == "export_statement" => parent,
            _ => node,
        };
        let lines = leading_comments(anchor, source, &[], |c| c.starts_with("/**"));
        // Only the block nearest to the declaration documents it
        let last = lines.last()?;
        Some(clean_comment(std::slice::from_ref(last))).filter(|d| !d.is_empty())
    }

    fn params(node: Node, source: &str) -> String {
        node.child_by_field_name("parameters")
            .or_else(|| node.child_by_field_name("parameter"))
            .map(|p| {
                let written = one_line(text(p, source));
                if written.starts_with('(') { written } else { format!("({written})") }
            })
            .unwrap_or_else(|| "()".to_string())
    }

    fn walk(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        for child in named_children(node) {
            match child.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    self.function(child, child, source, ctx, scope, out);
                }
                "class_declaration" => self.class(child, source, ctx, scope, out),
                "method_definition" if scope.in_class => self.function(child, child, source, ctx, scope, out),
                "lexical_declaration" | "variable_declaration" => self.declaration(child, source, ctx, scope, out),
                "comment" => {}
                _ => self.walk(child, source, ctx, scope, out),
            }
        }
    }

    /// `decl` carries the name, `callable` the parameters and body
    fn function(&self, decl: Node, callable: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(name_node) = decl.child_by_field_name("name") else { return };
        let qualified = scope.qualify(text(name_node, source));
        let kind = if scope.in_class { SymbolKind::Method } else { SymbolKind::Function };

        let doc_anchor = if decl.kind() == "variable_declarator" { decl.parent().unwrap_or(decl) } else { decl };
        let mut symbol = Symbol::new(&ctx.project, &ctx.path, kind, &qualified, span_of(doc_anchor))
            .with_signature(Self::params(callable, source))
            .with_parent(scope.parent.clone());
        if let Some(doc) = Self::jsdoc(doc_anchor, source) {
            symbol = symbol.with_doc(doc);
        }

        let inner = scope.enter(symbol.uri.clone(), qualified, false);
        out.push(symbol);
        if let Some(body) = callable.child_by_field_name("body") {
            self.walk(body, source, ctx, &inner, out);
        }
    }

    fn class(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let qualified = scope.qualify(text(name_node, source));

        let mut symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Class, &qualified, span_of(node))
            .with_parent(scope.parent.clone());
        if let Some(heritage) = child_of_kind(node, "class_heritage") {
            symbol = symbol.with_signature(one_line(text(heritage, source)));
        }
        if let Some(doc) = Self::jsdoc(node, source) {
            symbol = symbol.with_doc(doc);
        }

        let inner = scope.enter(symbol.uri.clone(), qualified, true);
        out.push(symbol);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, source, ctx, &inner, out);
        }
    }

    fn declaration(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        for declarator in named_children(node).into_iter().filter(|c| c.kind() == "variable_declarator") {
            let Some(name_node) = declarator.child_by_field_name("name").filter(|n| n.kind() == "identifier") else {
                continue;
            };
            match declarator.child_by_field_name("value") {
                Some(value) if FUNCTION_VALUES.contains(&value.kind()) => {
                    self.function(declarator, value, source, ctx, scope, out);
                }
                value => {
                    if scope.top_level {
                        let symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Variable, text(name_node, source), span_of(node))
                            .with_parent(scope.parent.clone());
                        out.push(symbol);
                    }
                    if let Some(value) = value {
                        self.walk(value, source, ctx, scope, out);
                    }
                }
            }
        }
    }

    /// `./util/math.js` imported from `src/app.js` → `src.util.math`
    fn module_for(ctx: &FileContext, specifier: &str) -> String {
        if !specifier.starts_with('.') {
            return specifier.replace('/', ".");
        }
        let mut parts: Vec<&str> = ctx.dir().split('/').filter(|s| !s.is_empty()).collect();
        for segment in specifier.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        module_path(&parts.join("/"))
    }

    fn string_value(node: Node, source: &str) -> String {
        text(node, source).trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
    }

    fn import(&self, node: Node, source: &str, ctx: &FileContext, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(from) = enclosing(symbols, node) else { return };
        let Some(source_node) = node.child_by_field_name("source") else { return };
        let module = Self::module_for(ctx, &Self::string_value(source_node, source));
        let line = line_of(node);
        let whole_module = || RawReference::new(from.clone(), EdgeKind::Imports, last_segment(&module), line).with_module(&module);

        let Some(clause) = child_of_kind(node, "import_clause") else {
            refs.push(whole_module());
            return;
        };

        for part in named_children(clause) {
            match part.kind() {
                "identifier" => {
                    refs.push(RawReference::new(from.clone(), EdgeKind::Imports, text(part, source), line).with_module(&module));
                }
                "namespace_import" => {
                    let alias = child_of_kind(part, "identifier").map(|n| text(n, source).to_string());
                    refs.push(whole_module().with_alias(alias));
                }
                "named_imports" => {
                    for spec in named_children(part).into_iter().filter(|s| s.kind() == "import_specifier") {
                        let Some(name) = spec.child_by_field_name("name") else { continue };
                        let alias = spec.child_by_field_name("alias").map(|n| text(n, source).to_string());
                        refs.push(
                            RawReference::new(from.clone(), EdgeKind::Imports, text(name, source), line)
                                .with_module(&module)
                                .with_alias(alias),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn call(&self, node: Node, source: &str, ctx: &FileContext, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let field = if node.kind() == "new_expression" { "constructor" } else { "function" };
        let Some(callee) = node.child_by_field_name(field) else { return };
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        match callee.kind() {
            "identifier" if text(callee, source) == "require" => {
                let arg = node
                    .child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0))
                    .filter(|a| a.kind() == "string");
                if let Some(arg) = arg {
                    let module = Self::module_for(ctx, &Self::string_value(arg, source));
                    refs.push(RawReference::new(from, EdgeKind::Imports, last_segment(&module), line).with_module(&module));
                }
            }
            "identifier" => refs.push(RawReference::new(from, EdgeKind::Calls, text(callee, source), line)),
            "member_expression" => {
                let (Some(object), Some(property)) = (callee.child_by_field_name("object"), callee.child_by_field_name("property")) else {
                    return;
                };
                refs.push(
                    RawReference::new(from, EdgeKind::Calls, text(property, source), line).with_receiver(text(object, source)),
                );
            }
            _ => {}
        }
    }

    fn heritage(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(from) = enclosing(symbols, node) else { return };
        let Some(base) = node.named_child(0) else { return };
        let line = line_of(node);

        match base.kind() {
            "identifier" => refs.push(RawReference::new(from, EdgeKind::Inherits, text(base, source), line)),
            "member_expression" => {
                let (Some(object), Some(property)) = (base.child_by_field_name("object"), base.child_by_field_name("property")) else {
                    return;
                };
                refs.push(
                    RawReference::new(from, EdgeKind::Inherits, text(property, source), line).with_receiver(text(object, source)),
                );
            }
            _ => {}
        }
    }
}

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        parse_with(tree_sitter_javascript::LANGUAGE.into(), source)
    }

    fn extract_symbols(&self, ctx: &FileContext, tree: &SyntaxTree) -> Vec<Symbol> {
        let root = tree.root();
        let source = tree.source();
        let module = module_symbol(ctx, root, None);
        let scope = Scope::module(&module);

        let mut out = vec![module];
        self.walk(root, source, ctx, &scope, &mut out);
        out
    }

    fn extract_references(&self, ctx: &FileContext, tree: &SyntaxTree, symbols: &[Symbol]) -> Vec<RawReference> {
        let source = tree.source();
        let mut refs = Vec::new();
        let mut stack = vec![tree.root()];

        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" => self.import(node, source, ctx, symbols, &mut refs),
                "call_expression" | "new_expression" => self.call(node, source, ctx, symbols, &mut refs),
                "class_heritage" => self.heritage(node, source, symbols, &mut refs),
                _ => {}
            }
            stack.extend(named_children(node).into_iter().rev());
        }
        refs
    }
}

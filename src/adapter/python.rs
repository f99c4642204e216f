//! Python language adapter
//!
//! Extracts modules, classes, functions, methods and module-level
//! assignments, plus import/call/inheritance references.

use super::framework::{FileContext, LanguageAdapter, ParseError, RawReference, SyntaxTree};
use super::helpers::{
    Scope, clean_docstring, enclosing, field_children, line_of, module_symbol, named_children, one_line, parse_with,
    span_of, text,
};
use crate::edge::EdgeKind;
use crate::language::Language;
use crate::symbol::{Symbol, SymbolKind};
use tree_sitter::Node;

pub struct PythonAdapter;

impl PythonAdapter {
    /// Docstring: a string literal as the first statement of a block
    fn docstring(block: Node, source: &str) -> Option<String> {
        let first = block.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.named_child(0)?;
        (expr.kind() == "string").then(|| clean_docstring(text(expr, source)))
    }

    fn walk(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        for child in named_children(node) {
            match child.kind() {
                "function_definition" => self.function(child, source, ctx, scope, out),
                "class_definition" => self.class(child, source, ctx, scope, out),
                "decorated_definition" => {
                    if let Some(def) = child.child_by_field_name("definition") {
                        match def.kind() {
                            "function_definition" => self.function(def, source, ctx, scope, out),
                            "class_definition" => self.class(def, source, ctx, scope, out),
                            _ => {}
                        }
                    }
                }
                "expression_statement" if scope.top_level => self.assignment(child, source, ctx, scope, out),
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

        let body = node.child_by_field_name("body");
        let mut symbol = Symbol::new(&ctx.project, &ctx.path, kind, &qualified, span_of(node))
            .with_signature(signature)
            .with_parent(scope.parent.clone());
        if let Some(doc) = body.and_then(|b| Self::docstring(b, source)) {
            symbol = symbol.with_doc(doc);
        }

        let inner = scope.enter(symbol.uri.clone(), qualified, false);
        out.push(symbol);
        if let Some(body) = body {
            self.walk(body, source, ctx, &inner, out);
        }
    }

    fn class(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let qualified = scope.qualify(text(name_node, source));

        let body = node.child_by_field_name("body");
        let mut symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Class, &qualified, span_of(node))
            .with_parent(scope.parent.clone());
        if let Some(bases) = node.child_by_field_name("superclasses") {
            symbol = symbol.with_signature(one_line(text(bases, source)));
        }
        if let Some(doc) = body.and_then(|b| Self::docstring(b, source)) {
            symbol = symbol.with_doc(doc);
        }

        let inner = scope.enter(symbol.uri.clone(), qualified, true);
        out.push(symbol);
        if let Some(body) = body {
            self.walk(body, source, ctx, &inner, out);
        }
    }

    /// `NAME = value` or `NAME: type = value` at module level
    fn assignment(&self, node: Node, source: &str, ctx: &FileContext, scope: &Scope, out: &mut Vec<Symbol>) {
        let Some(assign) = node.named_child(0).filter(|n| n.kind() == "assignment") else { return };
        let Some(left) = assign.child_by_field_name("left").filter(|n| n.kind() == "identifier") else { return };

        let mut symbol = Symbol::new(&ctx.project, &ctx.path, SymbolKind::Variable, text(left, source), span_of(node))
            .with_parent(scope.parent.clone());
        if let Some(ty) = assign.child_by_field_name("type") {
            symbol = symbol.with_signature(format!(": {}", one_line(text(ty, source))));
        }
        out.push(symbol);
    }

    /// `from .sibling import x` inside `pkg/mod.py` names `pkg.sibling`
    fn absolute_module(ctx: &FileContext, written: &str) -> String {
        let dots = written.chars().take_while(|c| *c == '.').count();
        let rest = &written[dots..];
        if dots == 0 {
            return rest.to_string();
        }

        let mut package: Vec<&str> = ctx.module_path.split('.').collect();
        let is_package_init = ctx.path.ends_with("__init__.py");
        if !is_package_init || ctx.module_path == "crate" {
            package.pop();
        }
        for _ in 1..dots {
            package.pop();
        }
        if !rest.is_empty() {
            package.push(rest);
        }
        package.retain(|s| !s.is_empty() && *s != "crate");
        package.join(".")
    }

    fn imports(&self, node: Node, source: &str, ctx: &FileContext, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        // (imported node, optional alias)
        let split = |n: Node| -> (String, Option<String>) {
            if n.kind() == "aliased_import" {
                let name = n.child_by_field_name("name").map(|x| text(x, source)).unwrap_or("");
                let alias = n.child_by_field_name("alias").map(|x| text(x, source).to_string());
                (name.to_string(), alias)
            } else {
                (text(n, source).to_string(), None)
            }
        };

        match node.kind() {
            "import_statement" => {
                for target in field_children(node, "name") {
                    let (module, alias) = split(target);
                    if module.is_empty() {
                        continue;
                    }
                    refs.push(
                        RawReference::new(from.clone(), EdgeKind::Imports, &module, line)
                            .with_module(&module)
                            .with_alias(alias),
                    );
                }
            }
            "import_from_statement" => {
                let Some(module_node) = node.child_by_field_name("module_name") else { return };
                let module = Self::absolute_module(ctx, text(module_node, source));
                for target in field_children(node, "name") {
                    let (name, alias) = split(target);
                    if name.is_empty() {
                        continue;
                    }
                    let mut reference = RawReference::new(from.clone(), EdgeKind::Imports, name, line).with_alias(alias);
                    if !module.is_empty() {
                        reference = reference.with_module(&module);
                    }
                    refs.push(reference);
                }
            }
            _ => {}
        }
    }

    fn call(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(function) = node.child_by_field_name("function") else { return };
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        match function.kind() {
            "identifier" => refs.push(RawReference::new(from, EdgeKind::Calls, text(function, source), line)),
            "attribute" => {
                let (Some(object), Some(attr)) = (function.child_by_field_name("object"), function.child_by_field_name("attribute")) else {
                    return;
                };
                refs.push(
                    RawReference::new(from, EdgeKind::Calls, text(attr, source), line).with_receiver(text(object, source)),
                );
            }
            _ => {}
        }
    }

    fn bases(&self, node: Node, source: &str, symbols: &[Symbol], refs: &mut Vec<RawReference>) {
        let Some(bases) = node.child_by_field_name("superclasses") else { return };
        let Some(from) = enclosing(symbols, node) else { return };
        let line = line_of(node);

        for base in named_children(bases) {
            match base.kind() {
                "identifier" => refs.push(RawReference::new(from.clone(), EdgeKind::Inherits, text(base, source), line)),
                "attribute" => {
                    let (Some(object), Some(attr)) = (base.child_by_field_name("object"), base.child_by_field_name("attribute")) else {
                        continue;
                    };
                    refs.push(
                        RawReference::new(from.clone(), EdgeKind::Inherits, text(attr, source), line)
                            .with_receiver(text(object, source)),
                    );
                }
                _ => {}
            }
        }
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        parse_with(tree_sitter_python::LANGUAGE.into(), source)
    }

    fn extract_symbols(&self, ctx: &FileContext, tree: &SyntaxTree) -> Vec<Symbol> {
        let root = tree.root();
        let source = tree.source();
        let module = module_symbol(ctx, root, Self::docstring(root, source));
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
                "import_statement" | "import_from_statement" => self.imports(node, source, ctx, symbols, &mut refs),
                "call" => self.call(node, source, symbols, &mut refs),
                "class_definition" => self.bases(node, source, symbols, &mut refs),
                _ => {}
            }
            stack.extend(named_children(node).into_iter().rev());
        }
        refs
    }
}

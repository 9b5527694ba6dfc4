//! Static checks run at compile time: syntax, imports, free identifiers and
//! entry-point discovery.

use std::collections::HashSet;

use tree_sitter::{Node, Parser, Tree};

use crate::error::CompileFailure;

/// Names every component may use without declaring them.
pub(crate) const INTRINSICS: &[&str] = &[
    "undefined",
    "NaN",
    "Infinity",
    "Math",
    "JSON",
    "String",
    "Number",
    "Boolean",
    "Array",
    "Object",
    "Error",
    "TypeError",
    "parseInt",
    "parseFloat",
    "isNaN",
    "console",
];

/// Importable modules and the injected global each one resolves to.
pub(crate) const MODULES: &[(&str, &str)] = &[("react", "React"), ("styled-components", "styled")];

/// Subtrees whose identifiers never refer to value bindings.
const UNCHECKED: &[&str] = &[
    "type_annotation",
    "type_arguments",
    "type_parameters",
    "type_alias_declaration",
    "interface_declaration",
    "import_statement",
];

/// Where the component function lives in the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Entry {
    DefaultExport,
    Binding(String),
    /// Trailing bare function expression, by byte range.
    Completion { start: usize, end: usize },
}

pub(crate) fn parse(source: &str) -> Result<Tree, CompileFailure> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
        .map_err(|e| CompileFailure::Parser(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| CompileFailure::Parser("parse did not complete".into()))
}

/// Run every static check and locate the entry point.
pub(crate) fn analyze(
    tree: &Tree,
    source: &str,
    name: &str,
    globals: &[String],
) -> Result<Entry, CompileFailure> {
    let root = tree.root_node();
    let src = source.as_bytes();

    check_syntax(root)?;
    check_imports(root, src, globals)?;
    check_references(root, src, globals)?;
    find_entry(root, src, name).ok_or(CompileFailure::NoEntry)
}

pub(crate) fn module_for(source_literal: &str) -> Option<&'static str> {
    let module = source_literal.trim_matches(|c: char| c == '"' || c == '\'' || c == '`');
    MODULES
        .iter()
        .find(|(m, _)| *m == module)
        .map(|(_, global)| *global)
}

pub(crate) fn text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

pub(crate) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// Pre-order walk without recursion. `visit` returns whether the node's
/// children are visited.
fn walk<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>) -> bool) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if visit(node) {
            let mut kids = children(node);
            kids.reverse();
            stack.extend(kids);
        }
    }
}

fn check_syntax(root: Node) -> Result<(), CompileFailure> {
    if !root.has_error() {
        return Ok(());
    }
    let mut at = root.start_position();
    let mut found = false;
    walk(root, |node| {
        if found {
            return false;
        }
        if node.is_error() || node.is_missing() {
            at = node.start_position();
            found = true;
            return false;
        }
        node.has_error()
    });
    Err(CompileFailure::Syntax {
        line: at.row + 1,
        column: at.column + 1,
    })
}

fn check_imports(root: Node, src: &[u8], globals: &[String]) -> Result<(), CompileFailure> {
    let mut failure = None;
    walk(root, |node| {
        if failure.is_some() {
            return false;
        }
        match node.kind() {
            "import_statement" => {
                let module = node
                    .child_by_field_name("source")
                    .map(|s| text(s, src))
                    .unwrap_or("");
                let permitted = module_for(module).is_some_and(|g| globals.iter().any(|x| x == g));
                if !permitted {
                    failure = Some(CompileFailure::ForbiddenImport(
                        module.trim_matches(|c: char| c == '"' || c == '\'').to_string(),
                    ));
                }
                false
            }
            "call_expression" => {
                let dynamic = node
                    .child_by_field_name("function")
                    .is_some_and(|f| f.kind() == "import");
                if dynamic {
                    failure = Some(CompileFailure::ForbiddenImport("import()".into()));
                    return false;
                }
                true
            }
            _ => true,
        }
    });
    failure.map_or(Ok(()), Err)
}

// ── Free identifiers ────────────────────────────────────────────────────

fn check_references(root: Node, src: &[u8], globals: &[String]) -> Result<(), CompileFailure> {
    let mut known: HashSet<String> = declared_names(root, src);
    known.extend(globals.iter().cloned());
    known.extend(INTRINSICS.iter().map(|s| s.to_string()));

    let mut undeclared = None;
    walk(root, |node| {
        if undeclared.is_some() || UNCHECKED.contains(&node.kind()) {
            return false;
        }
        let is_reference = match node.kind() {
            "identifier" => !is_non_reference_identifier(node, src),
            "shorthand_property_identifier" => true,
            _ => false,
        };
        if is_reference {
            let name = text(node, src);
            if !known.contains(name) {
                undeclared = Some(CompileFailure::UndeclaredName(name.to_string()));
            }
        }
        true
    });
    undeclared.map_or(Ok(()), Err)
}

/// Intrinsic JSX tag names and the trailing segments of JSX member names
/// are identifiers in the grammar but never refer to bindings.
fn is_non_reference_identifier(node: Node, src: &[u8]) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "jsx_closing_element" => true,
        "jsx_opening_element" | "jsx_self_closing_element" => {
            let is_name = parent
                .child_by_field_name("name")
                .is_some_and(|n| n.id() == node.id());
            is_name && text(node, src).starts_with(|c: char| c.is_ascii_lowercase())
        }
        "nested_identifier" => parent.named_child(0).is_some_and(|n| n.id() != node.id()),
        _ => false,
    }
}

fn declared_names(root: Node, src: &[u8]) -> HashSet<String> {
    let mut names = HashSet::new();
    walk(root, |node| {
        match node.kind() {
            "variable_declarator" => {
                if let Some(pattern) = node.child_by_field_name("name") {
                    pattern_names(pattern, src, &mut names);
                }
            }
            "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "class_declaration" => {
                if let Some(n) = node.child_by_field_name("name") {
                    names.insert(text(n, src).to_string());
                }
            }
            "formal_parameters" => {
                for param in named_children(node) {
                    pattern_names(param, src, &mut names);
                }
            }
            "arrow_function" => {
                if let Some(p) = node.child_by_field_name("parameter") {
                    pattern_names(p, src, &mut names);
                }
            }
            "catch_clause" => {
                if let Some(p) = node.child_by_field_name("parameter") {
                    pattern_names(p, src, &mut names);
                }
            }
            "for_in_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    pattern_names(left, src, &mut names);
                }
            }
            "import_clause" => import_names(node, src, &mut names),
            _ => {}
        }
        true
    });
    names
}

fn import_names(clause: Node, src: &[u8], names: &mut HashSet<String>) {
    for child in named_children(clause) {
        match child.kind() {
            "identifier" => {
                names.insert(text(child, src).to_string());
            }
            "namespace_import" => {
                for id in named_children(child) {
                    names.insert(text(id, src).to_string());
                }
            }
            "named_imports" => {
                for spec in named_children(child) {
                    let local = spec
                        .child_by_field_name("alias")
                        .or_else(|| spec.child_by_field_name("name"));
                    if let Some(local) = local {
                        names.insert(text(local, src).to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn pattern_names(pattern: Node, src: &[u8], names: &mut HashSet<String>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            names.insert(text(pattern, src).to_string());
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                pattern_names(value, src, names);
            }
        }
        "object_assignment_pattern" | "assignment_pattern" => {
            if let Some(left) = pattern.child_by_field_name("left") {
                pattern_names(left, src, names);
            }
        }
        "required_parameter" | "optional_parameter" => {
            if let Some(inner) = pattern.child_by_field_name("pattern") {
                pattern_names(inner, src, names);
            }
        }
        "rest_pattern" | "object_pattern" | "array_pattern" => {
            for child in named_children(pattern) {
                pattern_names(child, src, names);
            }
        }
        _ => {}
    }
}

// ── Entry discovery ─────────────────────────────────────────────────────

/// Entry preference: default export, a binding named like the component,
/// a trailing function expression, then the last function binding
/// (capitalized names first).
pub(crate) fn find_entry(root: Node, src: &[u8], name: &str) -> Option<Entry> {
    let statements = named_children(root);

    if statements.iter().any(|s| is_default_export(*s)) {
        return Some(Entry::DefaultExport);
    }

    let bindings: Vec<(String, Option<Node>)> = statements
        .iter()
        .flat_map(|s| top_level_bindings(*s, src))
        .collect();
    if bindings.iter().any(|(binding, _)| binding == name) {
        return Some(Entry::Binding(name.to_string()));
    }

    if let Some(last) = statements.last().filter(|s| s.kind() == "expression_statement") {
        if let Some(expr) = last.named_child(0) {
            if is_function_like(unwrap_parens(expr)) {
                return Some(Entry::Completion {
                    start: expr.start_byte(),
                    end: expr.end_byte(),
                });
            }
        }
    }

    let functions: Vec<&String> = bindings
        .iter()
        .filter(|(_, value)| value.map_or(true, is_component_value))
        .map(|(binding, _)| binding)
        .collect();
    functions
        .iter()
        .rev()
        .find(|b| b.starts_with(|c: char| c.is_ascii_uppercase()))
        .or_else(|| functions.last())
        .map(|b| Entry::Binding(b.to_string()))
}

pub(crate) fn is_default_export(statement: Node) -> bool {
    statement.kind() == "export_statement"
        && children(statement).iter().any(|c| c.kind() == "default")
}

/// Top-level names with their initializer; function declarations have none.
fn top_level_bindings<'t>(statement: Node<'t>, src: &[u8]) -> Vec<(String, Option<Node<'t>>)> {
    match statement.kind() {
        "export_statement" => statement
            .child_by_field_name("declaration")
            .map(|d| top_level_bindings(d, src))
            .unwrap_or_default(),
        "function_declaration" => statement
            .child_by_field_name("name")
            .map(|n| vec![(text(n, src).to_string(), None)])
            .unwrap_or_default(),
        "lexical_declaration" | "variable_declaration" => named_children(statement)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .filter_map(|d| {
                let name = d.child_by_field_name("name")?;
                (name.kind() == "identifier")
                    .then(|| (text(name, src).to_string(), d.child_by_field_name("value")))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn unwrap_parens(mut node: Node) -> Node {
    while node.kind() == "parenthesized_expression" {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

fn is_function_like(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function"
    )
}

/// Function values, plus wrappers like `React.memo(() => …)` and
/// styled templates, which also render.
fn is_component_value(value: Node) -> bool {
    let value = unwrap_parens(value);
    is_function_like(value) || value.kind() == "call_expression"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals() -> Vec<String> {
        vec!["React".into(), "styled".into()]
    }

    fn check(source: &str, name: &str) -> Result<Entry, CompileFailure> {
        let tree = parse(source)?;
        analyze(&tree, source, name, &globals())
    }

    #[test]
    fn default_export_wins() {
        let src =
            "const Other = () => <p/>;\nexport default function Hero() { return <h1>Hi</h1>; }";
        assert_eq!(check(src, "Card"), Ok(Entry::DefaultExport));
    }

    #[test]
    fn binding_named_like_component() {
        let src =
            "const Helper = () => null;\nconst Hero = () => <Helper />;\nconst Last = () => null;";
        assert_eq!(check(src, "Hero"), Ok(Entry::Binding("Hero".into())));
    }

    #[test]
    fn bare_function_expression() {
        let src = "(props) => <div>{props.title}</div>";
        assert!(matches!(check(src, "Hero"), Ok(Entry::Completion { start: 0, .. })));
    }

    #[test]
    fn last_capitalized_function_binding() {
        let src = "function Banner() { return <b/>; }\nconst format = (x) => x;";
        assert_eq!(check(src, "Hero"), Ok(Entry::Binding("Banner".into())));
    }

    #[test]
    fn undeclared_identifier_rejected() {
        let src = "const Hero = () => <div>{fetchData()}</div>;";
        assert_eq!(
            check(src, "Hero"),
            Err(CompileFailure::UndeclaredName("fetchData".into()))
        );
    }

    #[test]
    fn undeclared_component_tag_rejected() {
        let src = "const Hero = () => <Widget />;";
        assert_eq!(
            check(src, "Hero"),
            Err(CompileFailure::UndeclaredName("Widget".into()))
        );
    }

    #[test]
    fn destructured_and_imported_names_are_declared() {
        let src = r#"import React, { useState as useLocal } from 'react';
import styled from 'styled-components';
const Box = styled.div`color: ${({ $tone }) => $tone};`;
export default function Hero({ title = 'Hi', items: [first, ...rest] }) {
  const [open] = useLocal(false);
  try { JSON.parse('{}'); } catch (err) { console.log(err); }
  for (const item of rest) { console.log(item); }
  return <Box $tone="red">{open ? title : first}</Box>;
}"#;
        assert_eq!(check(src, "Hero"), Ok(Entry::DefaultExport));
    }

    #[test]
    fn foreign_import_rejected() {
        let src = "import axios from 'axios';\nexport default () => <div/>;";
        assert_eq!(
            check(src, "Hero"),
            Err(CompileFailure::ForbiddenImport("axios".into()))
        );
    }

    #[test]
    fn import_requires_injected_global() {
        let src = "import styled from 'styled-components';\nexport default () => <div/>;";
        let tree = parse(src).unwrap();
        let result = analyze(&tree, src, "Hero", &["React".to_string()]);
        assert_eq!(
            result,
            Err(CompileFailure::ForbiddenImport("styled-components".into()))
        );
    }

    #[test]
    fn syntax_error_reports_position() {
        let src = "const Hero = () => {\n  return <div>;\n";
        assert!(matches!(check(src, "Hero"), Err(CompileFailure::Syntax { .. })));
    }

    #[test]
    fn no_function_means_no_entry() {
        assert_eq!(check("const x = 1;", "Hero"), Err(CompileFailure::NoEntry));
    }
}

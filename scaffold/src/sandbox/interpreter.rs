//! Tree-walking evaluator for generated components.
//!
//! Executes the TSX syntax tree directly: there is no bytecode and no host
//! access beyond the injected `React` / `styled` objects and a handful of
//! language intrinsics. Every statement, expression and rendered node costs
//! one step; the wall clock is sampled every [`CLOCK_CHECK_INTERVAL`] steps.
//!
//! ```text
//! run ─► install globals ─► execute module ─► pick entry ─► render element tree
//!                                                              │
//!                      component call ◄──── Component(value) ──┘
//! ```

use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::debug;
use tree_sitter::Node;

use super::markup::{self, Attr};
use super::scope::{self, children, named_children, Entry, INTRINSICS};
use super::value::{
    error_object, format_number, string_to_number, ArrayRef, Builtin, Closure, Element,
    ElementKind, Global, Namespace, Scope, StyledComponent, StyledTarget, Value,
};
use crate::error::RenderError;

/// Combined statement/expression/render recursion bound, independent of the
/// call-depth limit so deeply nested literals cannot exhaust the stack.
const MAX_NESTING: usize = 256;
const CLOCK_CHECK_INTERVAL: u64 = 64;
/// Upper bound for strings and arrays built by `repeat`, `padStart`,
/// `Array.from({ length })` and index assignment.
const MAX_MATERIALIZED_LEN: usize = 100_000;

const REACT_MEMBERS: &[&str] = &[
    "useState",
    "useEffect",
    "useLayoutEffect",
    "useMemo",
    "useCallback",
    "useRef",
    "useContext",
    "useReducer",
    "useId",
    "createElement",
    "createContext",
    "Fragment",
    "memo",
    "forwardRef",
];
const MATH_MEMBERS: &[&str] = &[
    "floor", "ceil", "round", "abs", "min", "max", "pow", "sqrt", "random", "trunc", "sign",
];
const JSON_MEMBERS: &[&str] = &["stringify", "parse"];
const OBJECT_MEMBERS: &[&str] = &["keys", "values", "entries", "assign", "freeze", "fromEntries"];
const ARRAY_MEMBERS: &[&str] = &["isArray", "from", "of"];
const CONSOLE_MEMBERS: &[&str] = &["log", "info", "warn", "error", "debug"];
const STYLED_HELPERS: &[&str] = &["css", "keyframes"];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub timeout: Duration,
    pub max_steps: u64,
    pub max_depth: usize,
}

/// Abrupt completion: a value thrown by the component, or an engine error.
pub(crate) enum Fault<'t> {
    Throw(Value<'t>),
    Error(RenderError),
}

impl From<RenderError> for Fault<'_> {
    fn from(e: RenderError) -> Self {
        Fault::Error(e)
    }
}

type Eval<'t, T> = Result<T, Fault<'t>>;

enum Flow<'t> {
    Normal,
    Return(Value<'t>),
    Break,
    Continue,
}

#[derive(Clone, Copy, PartialEq)]
enum Bind {
    Declare,
    Assign,
}

fn type_error<'t>(message: impl Into<String>) -> Fault<'t> {
    Fault::Error(RenderError::Type(message.into()))
}

fn unsupported<'t>(what: &str) -> Fault<'t> {
    Fault::Error(RenderError::Unsupported(what.to_string()))
}

/// Parse `source`, execute it and render the entry component with `props`.
pub(crate) fn render_entry(
    source: &str,
    entry: &Entry,
    component: &str,
    globals: &[String],
    limits: Limits,
    props: &serde_json::Value,
) -> Result<String, RenderError> {
    let tree = scope::parse(source).map_err(|e| RenderError::Unsupported(e.to_string()))?;
    let mut interpreter = Interpreter::new(source.as_bytes(), component, limits);
    interpreter
        .run(tree.root_node(), entry, globals, props)
        .map_err(|fault| match fault {
            Fault::Throw(value) => RenderError::Thrown(value.to_display()),
            Fault::Error(e) => e,
        })
}

struct ModuleResult<'t> {
    default_export: Option<Value<'t>>,
    completion: Value<'t>,
}

struct Interpreter<'t> {
    src: &'t [u8],
    component: String,
    limits: Limits,
    started: Instant,
    steps: u64,
    depth: usize,
    nesting: usize,
    random_state: u64,
    next_id: u32,
}

impl<'t> Interpreter<'t> {
    fn new(src: &'t [u8], component: &str, limits: Limits) -> Self {
        Self {
            src,
            component: component.to_string(),
            limits,
            started: Instant::now(),
            steps: 0,
            depth: 0,
            nesting: 0,
            random_state: 0x2545_f491_4f6c_dd1d,
            next_id: 0,
        }
    }

    fn text(&self, node: Node<'t>) -> &'t str {
        node.utf8_text(self.src).unwrap_or("")
    }

    fn raw(&self, start: usize, end: usize) -> &'t str {
        self.src
            .get(start..end)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    fn tick(&mut self) -> Eval<'t, ()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(RenderError::StepLimit.into());
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 && self.started.elapsed() > self.limits.timeout
        {
            return Err(RenderError::Timeout.into());
        }
        Ok(())
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Eval<'t, T>) -> Eval<'t, T> {
        self.tick()?;
        self.nesting += 1;
        let result = if self.nesting > MAX_NESTING {
            Err(RenderError::DepthLimit.into())
        } else {
            f(self)
        };
        self.nesting -= 1;
        result
    }

    // ── Module ──────────────────────────────────────────────────────────

    fn run(
        &mut self,
        root: Node<'t>,
        entry: &Entry,
        globals: &[String],
        props: &serde_json::Value,
    ) -> Eval<'t, String> {
        let global = Rc::new(Scope::default());
        install_globals(&global, globals);

        let module = self.run_module(root, &global)?;
        let component = match entry {
            Entry::DefaultExport => module.default_export.unwrap_or(Value::Undefined),
            Entry::Binding(name) => global.lookup(name).unwrap_or(Value::Undefined),
            Entry::Completion { .. } => module.completion,
        };
        if !matches!(
            component,
            Value::Function(_) | Value::Styled(_) | Value::Builtin(_)
        ) {
            return Err(RenderError::NoEntry.into());
        }

        let props = match Value::from_json(props) {
            Value::Object(map) => map.borrow().clone(),
            _ => IndexMap::new(),
        };
        let element = Element {
            kind: ElementKind::Component(component),
            props,
            children: Vec::new(),
        };
        let mut out = String::new();
        self.render(&Value::Element(Rc::new(element)), &mut out)?;
        Ok(out)
    }

    fn run_module(&mut self, root: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, ModuleResult<'t>> {
        let statements = named_children(root);
        self.hoist(&statements, scope);

        let mut result = ModuleResult {
            default_export: None,
            completion: Value::Undefined,
        };
        for statement in statements {
            match statement.kind() {
                "import_statement" => self.bind_import(statement, scope),
                "export_statement" => {
                    let is_default = scope::is_default_export(statement);
                    if let Some(declaration) = statement.child_by_field_name("declaration") {
                        self.exec(declaration, scope)?;
                        if is_default {
                            result.default_export = declaration
                                .child_by_field_name("name")
                                .and_then(|n| scope.lookup(self.text(n)));
                        }
                    } else if let Some(value) = statement.child_by_field_name("value") {
                        let value = self.eval(value, scope)?;
                        if is_default {
                            result.default_export = Some(value);
                        }
                    }
                }
                "expression_statement" => {
                    if let Some(expr) = named_children(statement).first() {
                        result.completion = self.eval(*expr, scope)?;
                    }
                }
                _ => {
                    self.exec(statement, scope)?;
                }
            }
        }
        Ok(result)
    }

    fn bind_import(&mut self, statement: Node<'t>, scope: &Rc<Scope<'t>>) {
        let module = statement
            .child_by_field_name("source")
            .map(|s| self.text(s))
            .unwrap_or("");
        let Some(global) = scope::module_for(module) else {
            return;
        };
        let namespace = scope.lookup(global).unwrap_or(Value::Undefined);

        let Some(clause) = named_children(statement)
            .into_iter()
            .find(|n| n.kind() == "import_clause")
        else {
            return;
        };
        for part in named_children(clause) {
            match part.kind() {
                "identifier" => scope.declare(self.text(part), namespace.clone()),
                "namespace_import" => {
                    for id in named_children(part) {
                        scope.declare(self.text(id), namespace.clone());
                    }
                }
                "named_imports" => {
                    for spec in named_children(part) {
                        let Some(imported) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let local = spec.child_by_field_name("alias").unwrap_or(imported);
                        let value = self
                            .get_property(&namespace, self.text(imported))
                            .unwrap_or(Value::Undefined);
                        scope.declare(self.text(local), value);
                    }
                }
                _ => {}
            }
        }
    }

    /// Function declarations are visible before their statement runs.
    fn hoist(&mut self, statements: &[Node<'t>], scope: &Rc<Scope<'t>>) {
        for statement in statements {
            let declaration = if statement.kind() == "export_statement" {
                statement.child_by_field_name("declaration")
            } else {
                Some(*statement)
            };
            let Some(declaration) = declaration.filter(|d| d.kind() == "function_declaration")
            else {
                continue;
            };
            if let Some(name) = declaration.child_by_field_name("name") {
                let closure = self.make_closure(declaration, scope);
                scope.declare(self.text(name), closure);
            }
        }
    }

    fn make_closure(&self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Value<'t> {
        let params = match node.child_by_field_name("parameter") {
            Some(single) => vec![single],
            None => node
                .child_by_field_name("parameters")
                .map(named_children)
                .unwrap_or_default(),
        };
        let body = node.child_by_field_name("body").unwrap_or(node);
        Value::Function(Rc::new(Closure {
            name: node
                .child_by_field_name("name")
                .map(|n| Rc::from(self.text(n))),
            params,
            body,
            env: Rc::clone(scope),
        }))
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_block(&mut self, block: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        let statements = named_children(block);
        self.hoist(&statements, scope);
        for statement in statements {
            match self.exec(statement, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        self.nested(|this| this.exec_inner(node, scope))
    }

    fn exec_inner(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        match node.kind() {
            "expression_statement" => {
                if let Some(expr) = named_children(node).first() {
                    self.eval(*expr, scope)?;
                }
                Ok(Flow::Normal)
            }
            "lexical_declaration" | "variable_declaration" => {
                for declarator in named_children(node) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let value = match declarator.child_by_field_name("value") {
                        Some(v) => self.eval(v, scope)?,
                        None => Value::Undefined,
                    };
                    if let Some(pattern) = declarator.child_by_field_name("name") {
                        self.bind_pattern(pattern, value, scope, Bind::Declare)?;
                    }
                }
                Ok(Flow::Normal)
            }
            // Hoisted, or type-level only.
            "function_declaration"
            | "empty_statement"
            | "type_alias_declaration"
            | "interface_declaration"
            | "import_statement" => Ok(Flow::Normal),
            "return_statement" => {
                let value = match named_children(node).first() {
                    Some(expr) => self.eval(*expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            "throw_statement" => {
                let value = match named_children(node).first() {
                    Some(expr) => self.eval(*expr, scope)?,
                    None => Value::Undefined,
                };
                Err(Fault::Throw(value))
            }
            "statement_block" => self.exec_block(node, &Scope::child(scope)),
            "if_statement" => {
                let condition = self.eval_field(node, "condition", scope)?;
                if condition.truthy() {
                    match node.child_by_field_name("consequence") {
                        Some(consequence) => self.exec(consequence, scope),
                        None => Ok(Flow::Normal),
                    }
                } else if let Some(alternative) = node.child_by_field_name("alternative") {
                    let branch = if alternative.kind() == "else_clause" {
                        named_children(alternative).first().copied()
                    } else {
                        Some(alternative)
                    };
                    match branch {
                        Some(branch) => self.exec(branch, scope),
                        None => Ok(Flow::Normal),
                    }
                } else {
                    Ok(Flow::Normal)
                }
            }
            "for_in_statement" => self.exec_for_in(node, scope),
            "for_statement" => self.exec_for(node, scope),
            "while_statement" => {
                loop {
                    self.tick()?;
                    if !self.eval_field(node, "condition", scope)?.truthy() {
                        break;
                    }
                    if let Some(flow) = self.loop_body(node, scope)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            "do_statement" => {
                loop {
                    self.tick()?;
                    if let Some(flow) = self.loop_body(node, scope)? {
                        return Ok(flow);
                    }
                    if !self.eval_field(node, "condition", scope)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            "try_statement" => self.exec_try(node, scope),
            "switch_statement" => self.exec_switch(node, scope),
            "break_statement" => Ok(Flow::Break),
            "continue_statement" => Ok(Flow::Continue),
            other => Err(unsupported(other)),
        }
    }

    /// Run a loop body. `Some(flow)` means the loop must exit with `flow`;
    /// a `break` exits with `Normal`.
    fn loop_body(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Option<Flow<'t>>> {
        let Some(body) = node.child_by_field_name("body") else {
            return Ok(None);
        };
        Ok(match self.exec(body, scope)? {
            Flow::Break => Some(Flow::Normal),
            Flow::Return(v) => Some(Flow::Return(v)),
            Flow::Normal | Flow::Continue => None,
        })
    }

    fn exec_for_in(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        let collection = self.eval_field(node, "right", scope)?;
        let over_keys = node
            .child_by_field_name("operator")
            .is_some_and(|op| self.text(op) == "in");
        let items = if over_keys {
            entries(&collection)
                .into_iter()
                .map(|(k, _)| Value::str(k))
                .collect()
        } else {
            self.iterate(&collection)?
        };
        let Some(left) = node.child_by_field_name("left") else {
            return Err(unsupported("for-in without binding"));
        };

        for item in items {
            self.tick()?;
            let iteration = Scope::child(scope);
            self.bind_pattern(left, item, &iteration, Bind::Declare)?;
            if let Some(flow) = self.loop_body(node, &iteration)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        let loop_scope = Scope::child(scope);
        if let Some(init) = node.child_by_field_name("initializer") {
            self.eval_clause(init, &loop_scope)?;
        }
        loop {
            self.tick()?;
            if let Some(condition) = node.child_by_field_name("condition") {
                if !self.eval_clause(condition, &loop_scope)?.truthy() {
                    break;
                }
            }
            if let Some(flow) = self.loop_body(node, &loop_scope)? {
                return Ok(flow);
            }
            if let Some(increment) = node.child_by_field_name("increment") {
                self.eval(increment, &loop_scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// `for (init; cond; …)` clauses may be statements or bare expressions.
    fn eval_clause(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        match node.kind() {
            "expression_statement" => match named_children(node).first() {
                Some(expr) => self.eval(*expr, scope),
                None => Ok(Value::Bool(true)),
            },
            "empty_statement" => Ok(Value::Bool(true)),
            "lexical_declaration" | "variable_declaration" => {
                self.exec(node, scope)?;
                Ok(Value::Undefined)
            }
            _ => self.eval(node, scope),
        }
    }

    fn exec_try(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        let outcome = match node.child_by_field_name("body") {
            Some(body) => self.exec(body, scope),
            None => Ok(Flow::Normal),
        };
        let outcome = match (outcome, node.child_by_field_name("handler")) {
            (Err(fault), Some(handler)) if is_catchable(&fault) => {
                let catch_scope = Scope::child(scope);
                if let Some(param) = handler.child_by_field_name("parameter") {
                    self.bind_pattern(param, caught_value(fault), &catch_scope, Bind::Declare)?;
                }
                match handler.child_by_field_name("body") {
                    Some(body) => self.exec(body, &catch_scope),
                    None => Ok(Flow::Normal),
                }
            }
            (outcome, _) => outcome,
        };
        if let Some(finalizer) = node.child_by_field_name("finalizer") {
            let body = finalizer.child_by_field_name("body").unwrap_or(finalizer);
            match self.exec(body, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn exec_switch(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Flow<'t>> {
        let discriminant = self.eval_field(node, "value", scope)?;
        let cases = node
            .child_by_field_name("body")
            .map(named_children)
            .unwrap_or_default();

        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if case.kind() != "switch_case" {
                continue;
            }
            let test = self.eval_field(*case, "value", scope)?;
            if test.strict_equals(&discriminant) {
                start = Some(i);
                break;
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.kind() == "switch_default"));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };

        let switch_scope = Scope::child(scope);
        for case in &cases[start..] {
            let test_id = case.child_by_field_name("value").map(|n| n.id());
            for statement in named_children(*case) {
                if Some(statement.id()) == test_id {
                    continue;
                }
                match self.exec(statement, &switch_scope)? {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    flow => return Ok(flow),
                }
            }
        }
        Ok(Flow::Normal)
    }

    // ── Bindings ────────────────────────────────────────────────────────

    fn bind_name(
        &self,
        name: &str,
        value: Value<'t>,
        scope: &Rc<Scope<'t>>,
        mode: Bind,
    ) -> Eval<'t, ()> {
        match mode {
            Bind::Declare => {
                scope.declare(name, value);
                Ok(())
            }
            Bind::Assign if scope.assign(name, value) => Ok(()),
            Bind::Assign => Err(RenderError::Reference(name.to_string()).into()),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: Node<'t>,
        value: Value<'t>,
        scope: &Rc<Scope<'t>>,
        mode: Bind,
    ) -> Eval<'t, ()> {
        match pattern.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.bind_name(self.text(pattern), value, scope, mode)
            }
            "object_pattern" => {
                if value.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        self.text(pattern),
                        value.to_display()
                    )));
                }
                let mut used = Vec::new();
                for property in named_children(pattern) {
                    match property.kind() {
                        "shorthand_property_identifier_pattern" => {
                            let key = self.text(property);
                            used.push(key.to_string());
                            let v = self.get_property(&value, key)?;
                            self.bind_name(key, v, scope, mode)?;
                        }
                        "pair_pattern" => {
                            let key = match property.child_by_field_name("key") {
                                Some(k) => self.property_key(k, scope)?,
                                None => continue,
                            };
                            let v = self.get_property(&value, &key)?;
                            used.push(key);
                            if let Some(target) = property.child_by_field_name("value") {
                                self.bind_pattern(target, v, scope, mode)?;
                            }
                        }
                        "object_assignment_pattern" => {
                            let Some(left) = property.child_by_field_name("left") else {
                                continue;
                            };
                            let key = self.text(left).to_string();
                            let mut v = self.get_property(&value, &key)?;
                            if matches!(v, Value::Undefined) {
                                v = self.eval_field(property, "right", scope)?;
                            }
                            used.push(key);
                            self.bind_pattern(left, v, scope, mode)?;
                        }
                        "rest_pattern" => {
                            let rest: IndexMap<String, Value<'t>> = entries(&value)
                                .into_iter()
                                .filter(|(k, _)| !used.contains(k))
                                .collect();
                            if let Some(target) = named_children(property).first() {
                                self.bind_pattern(*target, Value::object(rest), scope, mode)?;
                            }
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            "array_pattern" => {
                let items = self.iterate(&value)?;
                for (i, element) in named_children(pattern).into_iter().enumerate() {
                    if element.kind() == "rest_pattern" {
                        let rest = items.get(i..).map(<[_]>::to_vec).unwrap_or_default();
                        self.bind_pattern(element, Value::array(rest), scope, mode)?;
                        break;
                    }
                    let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    self.bind_pattern(element, item, scope, mode)?;
                }
                Ok(())
            }
            "assignment_pattern" => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval_field(pattern, "right", scope)?
                } else {
                    value
                };
                match pattern.child_by_field_name("left") {
                    Some(left) => self.bind_pattern(left, value, scope, mode),
                    None => Ok(()),
                }
            }
            "required_parameter" | "optional_parameter" => {
                let value = match (&value, pattern.child_by_field_name("value")) {
                    (Value::Undefined, Some(default)) => self.eval(default, scope)?,
                    _ => value,
                };
                match pattern.child_by_field_name("pattern") {
                    Some(inner) => self.bind_pattern(inner, value, scope, mode),
                    None => Ok(()),
                }
            }
            // The caller has already collected the remaining items.
            "rest_pattern" => match named_children(pattern).first() {
                Some(target) => self.bind_pattern(*target, value, scope, mode),
                None => Ok(()),
            },
            "member_expression" | "subscript_expression" | "parenthesized_expression"
                if mode == Bind::Assign =>
            {
                self.assign_to(pattern, value, scope)
            }
            other => Err(unsupported(other)),
        }
    }

    fn bind_params(
        &mut self,
        params: &[Node<'t>],
        args: &[Value<'t>],
        scope: &Rc<Scope<'t>>,
    ) -> Eval<'t, ()> {
        for (i, param) in params.iter().enumerate() {
            let is_rest = param.kind() == "rest_pattern"
                || param
                    .child_by_field_name("pattern")
                    .is_some_and(|p| p.kind() == "rest_pattern");
            let value = if is_rest {
                Value::array(args.get(i..).map(<[_]>::to_vec).unwrap_or_default())
            } else {
                args.get(i).cloned().unwrap_or(Value::Undefined)
            };
            self.bind_pattern(*param, value, scope, Bind::Declare)?;
        }
        Ok(())
    }

    fn assign_to(
        &mut self,
        target: Node<'t>,
        value: Value<'t>,
        scope: &Rc<Scope<'t>>,
    ) -> Eval<'t, ()> {
        match target.kind() {
            "identifier" => self.bind_name(self.text(target), value, scope, Bind::Assign),
            "member_expression" => {
                let object = self.eval_field(target, "object", scope)?;
                let key = target
                    .child_by_field_name("property")
                    .map(|p| self.text(p))
                    .unwrap_or("");
                set_property(&object, key, value)
            }
            "subscript_expression" => {
                let object = self.eval_field(target, "object", scope)?;
                let index = self.eval_field(target, "index", scope)?;
                set_property(&object, &property_name(&index), value)
            }
            "parenthesized_expression" => match named_children(target).first() {
                Some(inner) => self.assign_to(*inner, value, scope),
                None => Ok(()),
            },
            "object_pattern" | "array_pattern" => {
                self.bind_pattern(target, value, scope, Bind::Assign)
            }
            other => Err(unsupported(other)),
        }
    }

    fn property_key(&mut self, key: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, String> {
        Ok(match key.kind() {
            "string" => decode_string_literal(self.text(key)),
            "number" => format_number(number_literal(self.text(key))),
            "computed_property_name" => match named_children(key).first() {
                Some(expr) => property_name(&self.eval(*expr, scope)?),
                None => String::new(),
            },
            _ => self.text(key).to_string(),
        })
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval_field(
        &mut self,
        node: Node<'t>,
        field: &str,
        scope: &Rc<Scope<'t>>,
    ) -> Eval<'t, Value<'t>> {
        match node.child_by_field_name(field) {
            Some(child) => self.eval(child, scope),
            None => Ok(Value::Undefined),
        }
    }

    fn eval(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        self.nested(|this| this.eval_inner(node, scope))
    }

    fn eval_inner(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        match node.kind() {
            "number" => Ok(Value::Number(number_literal(self.text(node)))),
            "string" => Ok(Value::str(decode_string_literal(self.text(node)))),
            "template_string" => {
                let (quasis, values) = self.template_parts(node, scope)?;
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(v) = values.get(i) {
                        out.push_str(&v.to_display());
                    }
                }
                Ok(Value::str(out))
            }
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            "undefined" | "this" => Ok(Value::Undefined),
            "identifier" => {
                let name = self.text(node);
                scope
                    .lookup(name)
                    .ok_or_else(|| RenderError::Reference(name.to_string()).into())
            }
            "parenthesized_expression" | "as_expression" | "satisfies_expression"
            | "non_null_expression" => match named_children(node).first() {
                Some(inner) => self.eval(*inner, scope),
                None => Ok(Value::Undefined),
            },
            "type_assertion" => match named_children(node).last() {
                Some(inner) => self.eval(*inner, scope),
                None => Ok(Value::Undefined),
            },
            "sequence_expression" => {
                let mut last = Value::Undefined;
                for part in named_children(node) {
                    last = self.eval(part, scope)?;
                }
                Ok(last)
            }
            "array" => {
                let mut items = Vec::new();
                for element in named_children(node) {
                    if element.kind() == "spread_element" {
                        let spread = self.eval_first_child(element, scope)?;
                        items.extend(self.iterate(&spread)?);
                    } else {
                        items.push(self.eval(element, scope)?);
                    }
                }
                Ok(Value::array(items))
            }
            "object" => self.eval_object(node, scope),
            "arrow_function" | "function_expression" | "function" => {
                Ok(self.make_closure(node, scope))
            }
            "call_expression" => self.eval_call(node, scope),
            "new_expression" => {
                let constructor = self.eval_field(node, "constructor", scope)?;
                let args = match node.child_by_field_name("arguments") {
                    Some(args) => self.eval_args(args, scope)?,
                    None => Vec::new(),
                };
                match constructor {
                    Value::Builtin(b @ Builtin::Global(Global::Error | Global::TypeError)) => {
                        self.call_builtin(b, args)
                    }
                    _ => Err(unsupported("new")),
                }
            }
            "member_expression" => {
                let object = self.eval_field(node, "object", scope)?;
                if object.is_nullish() && chain_is_optional(node) {
                    return Ok(Value::Undefined);
                }
                let key = node
                    .child_by_field_name("property")
                    .map(|p| self.text(p))
                    .unwrap_or("");
                self.get_property(&object, key)
            }
            "subscript_expression" => {
                let object = self.eval_field(node, "object", scope)?;
                if object.is_nullish() && chain_is_optional(node) {
                    return Ok(Value::Undefined);
                }
                let index = self.eval_field(node, "index", scope)?;
                self.get_property(&object, &property_name(&index))
            }
            "binary_expression" => self.eval_binary(node, scope),
            "unary_expression" => self.eval_unary(node, scope),
            "update_expression" => {
                let Some(argument) = node.child_by_field_name("argument") else {
                    return Err(unsupported("update_expression"));
                };
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| self.text(op))
                    .unwrap_or("++");
                let prefix = node
                    .child(0)
                    .is_some_and(|first| matches!(first.kind(), "++" | "--"));
                let old = self.eval(argument, scope)?.to_number();
                let new = if operator == "--" { old - 1.0 } else { old + 1.0 };
                self.assign_to(argument, Value::Number(new), scope)?;
                Ok(Value::Number(if prefix { new } else { old }))
            }
            "assignment_expression" => {
                let value = self.eval_field(node, "right", scope)?;
                if let Some(left) = node.child_by_field_name("left") {
                    self.assign_to(left, value.clone(), scope)?;
                }
                Ok(value)
            }
            "augmented_assignment_expression" => self.eval_augmented(node, scope),
            "ternary_expression" => {
                if self.eval_field(node, "condition", scope)?.truthy() {
                    self.eval_field(node, "consequence", scope)
                } else {
                    self.eval_field(node, "alternative", scope)
                }
            }
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => {
                self.eval_jsx(node, scope)
            }
            other => Err(unsupported(other)),
        }
    }

    fn eval_first_child(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        match named_children(node).first() {
            Some(child) => self.eval(*child, scope),
            None => Ok(Value::Undefined),
        }
    }

    fn eval_object(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let mut map = IndexMap::new();
        for member in named_children(node) {
            match member.kind() {
                "pair" => {
                    let key = match member.child_by_field_name("key") {
                        Some(k) => self.property_key(k, scope)?,
                        None => continue,
                    };
                    let value = self.eval_field(member, "value", scope)?;
                    map.insert(key, value);
                }
                "shorthand_property_identifier" => {
                    let name = self.text(member);
                    let value = scope
                        .lookup(name)
                        .ok_or_else(|| Fault::from(RenderError::Reference(name.to_string())))?;
                    map.insert(name.to_string(), value);
                }
                "spread_element" => {
                    let spread = self.eval_first_child(member, scope)?;
                    map.extend(entries(&spread));
                }
                "method_definition" => {
                    let key = match member.child_by_field_name("name") {
                        Some(k) => self.property_key(k, scope)?,
                        None => continue,
                    };
                    map.insert(key, self.make_closure(member, scope));
                }
                other => return Err(unsupported(other)),
            }
        }
        Ok(Value::object(map))
    }

    /// Cooked template pieces and the evaluated substitutions between them.
    fn template_parts(
        &mut self,
        node: Node<'t>,
        scope: &Rc<Scope<'t>>,
    ) -> Eval<'t, (Vec<String>, Vec<Value<'t>>)> {
        let mut quasis = Vec::new();
        let mut values = Vec::new();
        let mut cursor = node.start_byte() + 1;
        let end = node.end_byte().saturating_sub(1).max(cursor);

        for child in children(node) {
            if child.kind() != "template_substitution" {
                continue;
            }
            quasis.push(decode_escapes(self.raw(cursor, child.start_byte())));
            values.push(self.eval_first_child(child, scope)?);
            cursor = child.end_byte();
        }
        quasis.push(decode_escapes(self.raw(cursor, end)));
        Ok((quasis, values))
    }

    fn eval_args(&mut self, args: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Vec<Value<'t>>> {
        let mut values = Vec::new();
        for arg in named_children(args) {
            if arg.kind() == "spread_element" {
                let spread = self.eval_first_child(arg, scope)?;
                values.extend(self.iterate(&spread)?);
            } else {
                values.push(self.eval(arg, scope)?);
            }
        }
        Ok(values)
    }

    fn eval_binary(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.text(op))
            .unwrap_or("");
        let left = self.eval_field(node, "left", scope)?;
        match operator {
            "&&" if !left.truthy() => return Ok(left),
            "||" if left.truthy() => return Ok(left),
            "??" if !left.is_nullish() => return Ok(left),
            "&&" | "||" | "??" => return self.eval_field(node, "right", scope),
            _ => {}
        }
        let right = self.eval_field(node, "right", scope)?;
        binary(operator, &left, &right)
    }

    fn eval_unary(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.text(op))
            .unwrap_or("");
        let Some(argument) = node.child_by_field_name("argument") else {
            return Err(unsupported("unary_expression"));
        };
        if operator == "typeof" && argument.kind() == "identifier" {
            // `typeof undeclared` is not a ReferenceError.
            return Ok(match scope.lookup(self.text(argument)) {
                Some(v) => Value::str(v.type_of()),
                None => Value::str("undefined"),
            });
        }
        let value = self.eval(argument, scope)?;
        Ok(match operator {
            "!" => Value::Bool(!value.truthy()),
            "-" => Value::Number(-value.to_number()),
            "+" => Value::Number(value.to_number()),
            "~" => Value::Number(f64::from(!to_int32(value.to_number()))),
            "typeof" => Value::str(value.type_of()),
            "void" => Value::Undefined,
            other => return Err(unsupported(other)),
        })
    }

    fn eval_augmented(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let Some(left) = node.child_by_field_name("left") else {
            return Err(unsupported("augmented_assignment_expression"));
        };
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.text(op))
            .unwrap_or("+=");
        let current = self.eval(left, scope)?;
        let assign = match operator {
            "&&=" => current.truthy(),
            "||=" => !current.truthy(),
            "??=" => current.is_nullish(),
            _ => true,
        };
        if !assign {
            return Ok(current);
        }
        let right = self.eval_field(node, "right", scope)?;
        let value = match operator {
            "&&=" | "||=" | "??=" => right,
            op => binary(op.trim_end_matches('='), &current, &right)?,
        };
        self.assign_to(left, value.clone(), scope)?;
        Ok(value)
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn eval_call(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let Some(callee) = node.child_by_field_name("function") else {
            return Err(unsupported("call_expression"));
        };
        let Some(args_node) = node.child_by_field_name("arguments") else {
            return Err(unsupported("call_expression"));
        };

        if args_node.kind() == "template_string" {
            let tag = self.eval(callee, scope)?;
            let (quasis, values) = self.template_parts(args_node, scope)?;
            return self.call_tagged(tag, quasis, values);
        }

        if callee.kind() == "member_expression" {
            let object = self.eval_field(callee, "object", scope)?;
            if object.is_nullish() && chain_is_optional(callee) {
                return Ok(Value::Undefined);
            }
            let method = callee
                .child_by_field_name("property")
                .map(|p| self.text(p))
                .unwrap_or("");
            let args = self.eval_args(args_node, scope)?;
            return self.call_method(object, method, args);
        }

        let function = self.eval(callee, scope)?;
        if function.is_nullish() && chain_is_optional(node) {
            return Ok(Value::Undefined);
        }
        let args = self.eval_args(args_node, scope)?;
        self.call_value(&function, args, self.text(callee))
    }

    fn call_value(
        &mut self,
        function: &Value<'t>,
        args: Vec<Value<'t>>,
        label: &str,
    ) -> Eval<'t, Value<'t>> {
        match function {
            Value::Function(closure) => self.call_closure(Rc::clone(closure), args),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args),
            Value::Namespace(Namespace::Styled) => {
                let target = args.into_iter().next().unwrap_or(Value::Undefined);
                Ok(Value::StyledFactory(Rc::new(StyledTarget::Component(
                    target,
                ))))
            }
            _ => Err(type_error(format!("{label} is not a function"))),
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure<'t>>,
        args: Vec<Value<'t>>,
    ) -> Eval<'t, Value<'t>> {
        self.depth += 1;
        let result = if self.depth > self.limits.max_depth {
            Err(RenderError::DepthLimit.into())
        } else {
            self.invoke(&closure, &args)
        };
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, closure: &Closure<'t>, args: &[Value<'t>]) -> Eval<'t, Value<'t>> {
        let local = Scope::child(&closure.env);
        self.bind_params(&closure.params, args, &local)?;
        if closure.body.kind() == "statement_block" {
            match self.exec_block(closure.body, &local)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            }
        } else {
            self.eval(closure.body, &local)
        }
    }

    fn call_tagged(
        &mut self,
        tag: Value<'t>,
        quasis: Vec<String>,
        values: Vec<Value<'t>>,
    ) -> Eval<'t, Value<'t>> {
        match tag {
            Value::StyledFactory(target) => Ok(Value::Styled(Rc::new(StyledComponent {
                target,
                quasis,
                interpolations: values,
            }))),
            Value::Builtin(Builtin::Member(Namespace::Styled, "css")) => {
                let mut css = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    css.push_str(quasi);
                    if let Some(v) = values.get(i) {
                        css.push_str(&css_text(v));
                    }
                }
                Ok(Value::str(css))
            }
            Value::Builtin(Builtin::Member(Namespace::Styled, "keyframes")) => {
                let hash = blake3::hash(quasis.concat().as_bytes());
                Ok(Value::str(format!("kf-{}", &hash.to_hex()[..8])))
            }
            other => {
                let mut args = vec![Value::array(quasis.into_iter().map(Value::str).collect())];
                args.extend(values);
                self.call_value(&other, args, "tag")
            }
        }
    }

    fn call_method(
        &mut self,
        object: Value<'t>,
        method: &str,
        args: Vec<Value<'t>>,
    ) -> Eval<'t, Value<'t>> {
        match &object {
            Value::Array(items) => self.array_method(items, method, args),
            Value::Str(s) => self.string_method(s, method, args),
            Value::Number(n) => number_method(*n, method, &args),
            _ if method == "toString" => Ok(Value::str(object.to_display())),
            _ if method == "hasOwnProperty" => {
                let key = args.first().map(property_name).unwrap_or_default();
                Ok(Value::Bool(entries(&object).iter().any(|(k, _)| *k == key)))
            }
            _ => {
                let function = self.get_property(&object, method)?;
                if !function.is_callable() {
                    return Err(type_error(format!("{method} is not a function")));
                }
                self.call_value(&function, args, method)
            }
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value<'t>>) -> Eval<'t, Value<'t>> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        match builtin {
            Builtin::NoopSetter => Ok(Value::Undefined),
            Builtin::Global(global) => Ok(match global {
                Global::String => Value::str(if args.is_empty() {
                    String::new()
                } else {
                    arg(0).to_display()
                }),
                Global::Number => Value::Number(if args.is_empty() {
                    0.0
                } else {
                    arg(0).to_number()
                }),
                Global::Boolean => Value::Bool(arg(0).truthy()),
                Global::ParseInt => {
                    let radix = match arg(1) {
                        Value::Undefined => 10,
                        r => r.to_number() as u32,
                    };
                    Value::Number(parse_int(&arg(0).to_display(), radix))
                }
                Global::ParseFloat => Value::Number(parse_float(&arg(0).to_display())),
                Global::IsNaN => Value::Bool(arg(0).to_number().is_nan()),
                Global::Error => error_object("Error", &message_of(&arg(0))),
                Global::TypeError => error_object("TypeError", &message_of(&arg(0))),
            }),
            Builtin::Member(Namespace::React, hook) => self.call_react(hook, args),
            Builtin::Member(Namespace::Math, f) => Ok(self.call_math(f, &args)),
            Builtin::Member(Namespace::Json, "stringify") => {
                let pretty = arg(2).to_number() > 0.0;
                Ok(match arg(0).to_json() {
                    Some(json) if pretty => {
                        Value::str(serde_json::to_string_pretty(&json).unwrap_or_default())
                    }
                    Some(json) => Value::str(json.to_string()),
                    None => Value::Undefined,
                })
            }
            Builtin::Member(Namespace::Json, _) => {
                match serde_json::from_str::<serde_json::Value>(&arg(0).to_display()) {
                    Ok(json) => Ok(Value::from_json(&json)),
                    Err(e) => Err(Fault::Throw(error_object("SyntaxError", &e.to_string()))),
                }
            }
            Builtin::Member(Namespace::Object, f) => Ok(call_object(f, &args)),
            Builtin::Member(Namespace::Array, f) => self.call_array_static(f, args),
            Builtin::Member(Namespace::Console, level) => {
                let line = args
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(component = %self.component, method = level, "console: {line}");
                Ok(Value::Undefined)
            }
            // css / keyframes called without a template.
            Builtin::Member(Namespace::Styled, _) => Ok(Value::str("")),
        }
    }

    fn call_react(&mut self, hook: &str, args: Vec<Value<'t>>) -> Eval<'t, Value<'t>> {
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Undefined);
        match hook {
            "useState" => {
                let initial = if first.is_callable() {
                    self.call_value(&first, Vec::new(), "initializer")?
                } else {
                    first
                };
                Ok(Value::array(vec![initial, Value::Builtin(Builtin::NoopSetter)]))
            }
            "useReducer" => {
                let initial = args.next().unwrap_or(Value::Undefined);
                let initial = match args.next() {
                    Some(init) if init.is_callable() => {
                        self.call_value(&init, vec![initial], "init")?
                    }
                    _ => initial,
                };
                Ok(Value::array(vec![initial, Value::Builtin(Builtin::NoopSetter)]))
            }
            // Effects never run during a static render.
            "useEffect" | "useLayoutEffect" => Ok(Value::Undefined),
            "useMemo" => self.call_value(&first, Vec::new(), "useMemo callback"),
            "useCallback" | "memo" | "forwardRef" => Ok(first),
            "useRef" => {
                let mut map = IndexMap::new();
                map.insert("current".to_string(), first);
                Ok(Value::object(map))
            }
            "useContext" => match first {
                Value::Object(map) => Ok(map
                    .borrow()
                    .get("_currentValue")
                    .cloned()
                    .unwrap_or(Value::Undefined)),
                _ => Ok(Value::Undefined),
            },
            "createContext" => {
                let mut map = IndexMap::new();
                map.insert(
                    "Provider".to_string(),
                    Value::Builtin(Builtin::Member(Namespace::React, "Fragment")),
                );
                map.insert("_currentValue".to_string(), first);
                Ok(Value::object(map))
            }
            "useId" => {
                self.next_id += 1;
                Ok(Value::str(format!(":r{}:", self.next_id - 1)))
            }
            "createElement" => {
                let kind = element_kind(first)?;
                let props = match args.next() {
                    Some(Value::Object(map)) => map.borrow().clone(),
                    _ => IndexMap::new(),
                };
                Ok(Value::Element(Rc::new(Element {
                    kind,
                    props,
                    children: args.collect(),
                })))
            }
            other => Err(type_error(format!("React.{other} is not a function"))),
        }
    }

    fn call_math(&mut self, f: &str, args: &[Value<'t>]) -> Value<'t> {
        let n = |i: usize| args.get(i).map_or(f64::NAN, Value::to_number);
        Value::Number(match f {
            "floor" => n(0).floor(),
            "ceil" => n(0).ceil(),
            // JavaScript rounds halves toward +∞.
            "round" => (n(0) + 0.5).floor(),
            "abs" => n(0).abs(),
            "trunc" => n(0).trunc(),
            "sign" => {
                let x = n(0);
                if x.is_nan() || x == 0.0 {
                    x
                } else {
                    x.signum()
                }
            }
            "sqrt" => n(0).sqrt(),
            "pow" => n(0).powf(n(1)),
            "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, js_min),
            "max" => args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, js_max),
            "random" => self.next_random(),
            _ => f64::NAN,
        })
    }

    /// xorshift64; renders must be reproducible.
    fn next_random(&mut self) -> f64 {
        let mut x = self.random_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.random_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn call_array_static(&mut self, f: &str, args: Vec<Value<'t>>) -> Eval<'t, Value<'t>> {
        match f {
            "isArray" => Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_))))),
            "of" => Ok(Value::array(args)),
            _ => {
                let source = args.first().cloned().unwrap_or(Value::Undefined);
                let items = match &source {
                    Value::Object(map) => {
                        let len = map.borrow().get("length").map_or(0.0, Value::to_number);
                        let len = if len.is_nan() { 0 } else { len.max(0.0) as usize };
                        if len > MAX_MATERIALIZED_LEN {
                            return Err(type_error("Invalid array length"));
                        }
                        vec![Value::Undefined; len]
                    }
                    other => self.iterate(other)?,
                };
                match args.get(1) {
                    Some(mapper) if mapper.is_callable() => {
                        let mut mapped = Vec::with_capacity(items.len());
                        for (i, item) in items.into_iter().enumerate() {
                            mapped.push(self.call_value(
                                mapper,
                                vec![item, Value::Number(i as f64)],
                                "mapFn",
                            )?);
                        }
                        Ok(Value::array(mapped))
                    }
                    _ => Ok(Value::array(items)),
                }
            }
        }
    }

    fn array_method(
        &mut self,
        items: &ArrayRef<'t>,
        method: &str,
        args: Vec<Value<'t>>,
    ) -> Eval<'t, Value<'t>> {
        let snapshot: Vec<Value<'t>> = items.borrow().clone();
        let len = snapshot.len();
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let this = Value::Array(Rc::clone(items));

        match method {
            "map" | "filter" | "forEach" | "find" | "findIndex" | "some" | "every" => {
                let callback = arg(0);
                let mut mapped = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let result = self.call_value(
                        &callback,
                        vec![item.clone(), Value::Number(i as f64), this.clone()],
                        method,
                    )?;
                    match method {
                        "map" => mapped.push(result),
                        "filter" if result.truthy() => mapped.push(item),
                        "find" if result.truthy() => return Ok(item),
                        "findIndex" if result.truthy() => return Ok(Value::Number(i as f64)),
                        "some" if result.truthy() => return Ok(Value::Bool(true)),
                        "every" if !result.truthy() => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(match method {
                    "map" | "filter" => Value::array(mapped),
                    "find" | "forEach" => Value::Undefined,
                    "findIndex" => Value::Number(-1.0),
                    "some" => Value::Bool(false),
                    _ => Value::Bool(true),
                })
            }
            "reduce" => {
                let callback = arg(0);
                let mut iter = snapshot.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(type_error("Reduce of empty array with no initial value"))
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call_value(
                        &callback,
                        vec![acc, item, Value::Number(i as f64), this.clone()],
                        "reduce",
                    )?;
                }
                Ok(acc)
            }
            "join" | "toString" => {
                let separator = match arg(0) {
                    Value::Undefined => ",".to_string(),
                    s => s.to_display(),
                };
                Ok(Value::str(
                    snapshot
                        .iter()
                        .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                        .collect::<Vec<_>>()
                        .join(&separator),
                ))
            }
            "slice" => {
                let start = relative_index(&arg(0), len, 0);
                let end = relative_index(&arg(1), len, len);
                Ok(Value::array(
                    snapshot.get(start..end.max(start)).map(<[_]>::to_vec).unwrap_or_default(),
                ))
            }
            "includes" => {
                let needle = arg(0);
                Ok(Value::Bool(snapshot.iter().any(|v| {
                    let both_nan = matches!(
                        (v, &needle),
                        (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan()
                    );
                    v.strict_equals(&needle) || both_nan
                })))
            }
            "indexOf" => {
                let needle = arg(0);
                Ok(Value::Number(
                    snapshot
                        .iter()
                        .position(|v| v.strict_equals(&needle))
                        .map_or(-1.0, |i| i as f64),
                ))
            }
            "concat" => {
                let mut joined = snapshot;
                for a in args {
                    match a {
                        Value::Array(more) => joined.extend(more.borrow().iter().cloned()),
                        other => joined.push(other),
                    }
                }
                Ok(Value::array(joined))
            }
            "flat" => {
                let mut flat = Vec::new();
                for item in snapshot {
                    match item {
                        Value::Array(inner) => flat.extend(inner.borrow().iter().cloned()),
                        other => flat.push(other),
                    }
                }
                Ok(Value::array(flat))
            }
            "at" => {
                let i = arg(0).to_number();
                let index = if i < 0.0 { len as f64 + i } else { i };
                Ok(if index >= 0.0 && (index as usize) < len {
                    snapshot[index as usize].clone()
                } else {
                    Value::Undefined
                })
            }
            "push" => {
                let mut items = items.borrow_mut();
                if items.len() + args.len() > MAX_MATERIALIZED_LEN {
                    return Err(type_error("Invalid array length"));
                }
                items.extend(args);
                Ok(Value::Number(items.len() as f64))
            }
            "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut items = items.borrow_mut();
                Ok(if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                })
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(this)
            }
            "sort" => {
                let comparator = arg(0);
                let mut sorted: Vec<Value<'t>> = Vec::with_capacity(len);
                // Insertion sort so the comparator can fail or hit the step budget.
                for item in snapshot {
                    let mut at = sorted.len();
                    while at > 0 {
                        let before = if comparator.is_callable() {
                            self.call_value(
                                &comparator,
                                vec![item.clone(), sorted[at - 1].clone()],
                                "compareFn",
                            )?
                            .to_number()
                                < 0.0
                        } else {
                            item.to_display() < sorted[at - 1].to_display()
                        };
                        if !before {
                            break;
                        }
                        at -= 1;
                    }
                    sorted.insert(at, item);
                }
                *items.borrow_mut() = sorted;
                Ok(this)
            }
            other => Err(type_error(format!("array.{other} is not a function"))),
        }
    }

    fn string_method(
        &mut self,
        s: &Rc<str>,
        method: &str,
        args: Vec<Value<'t>>,
    ) -> Eval<'t, Value<'t>> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        let char_slice = |start: usize, end: usize| -> String {
            chars.get(start..end.max(start)).map(String::from_iter).unwrap_or_default()
        };

        Ok(match method {
            "toUpperCase" => Value::str(s.to_uppercase()),
            "toLowerCase" => Value::str(s.to_lowercase()),
            "trim" => Value::str(s.trim()),
            "trimStart" => Value::str(s.trim_start()),
            "trimEnd" => Value::str(s.trim_end()),
            "toString" | "valueOf" => Value::Str(Rc::clone(s)),
            "split" => {
                let limit = match arg(1) {
                    Value::Undefined => usize::MAX,
                    n => n.to_number().max(0.0) as usize,
                };
                let parts: Vec<Value<'t>> = match arg(0) {
                    Value::Undefined => vec![Value::Str(Rc::clone(s))],
                    sep => {
                        let sep = sep.to_display();
                        if sep.is_empty() {
                            chars.iter().map(|c| Value::str(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::str).collect()
                        }
                    }
                };
                Value::array(parts.into_iter().take(limit).collect())
            }
            "slice" => {
                let start = relative_index(&arg(0), len, 0);
                let end = relative_index(&arg(1), len, len);
                Value::str(char_slice(start, end))
            }
            "substring" => {
                let clamp = |v: Value<'t>, default: usize| match v {
                    Value::Undefined => default,
                    v => {
                        let n = v.to_number();
                        if n.is_nan() { 0 } else { n.clamp(0.0, len as f64) as usize }
                    }
                };
                let (a, b) = (clamp(arg(0), 0), clamp(arg(1), len));
                Value::str(char_slice(a.min(b), a.max(b)))
            }
            "includes" => Value::Bool(s.contains(arg(0).to_display().as_str())),
            "startsWith" => Value::Bool(s.starts_with(arg(0).to_display().as_str())),
            "endsWith" => Value::Bool(s.ends_with(arg(0).to_display().as_str())),
            "indexOf" => Value::Number(
                s.find(arg(0).to_display().as_str())
                    .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
            ),
            "charAt" | "at" => {
                let i = arg(0).to_number();
                let i = if method == "at" && i < 0.0 { len as f64 + i } else { i };
                let i = if i.is_nan() { 0.0 } else { i };
                Value::str(
                    (i >= 0.0)
                        .then(|| chars.get(i as usize))
                        .flatten()
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
            }
            "charCodeAt" => {
                let i = arg(0).to_number();
                let i = if i.is_nan() { 0.0 } else { i };
                Value::Number(
                    (i >= 0.0)
                        .then(|| chars.get(i as usize))
                        .flatten()
                        .map_or(f64::NAN, |c| f64::from(u32::from(*c))),
                )
            }
            "replace" | "replaceAll" => {
                let pattern = arg(0).to_display();
                let replacement = arg(1);
                let mut out = String::new();
                let mut rest: &str = s;
                while let Some(at) = rest.find(pattern.as_str()) {
                    out.push_str(&rest[..at]);
                    let replaced = if replacement.is_callable() {
                        self.call_value(&replacement, vec![Value::str(&pattern)], "replacer")?
                            .to_display()
                    } else {
                        replacement.to_display()
                    };
                    out.push_str(&replaced);
                    rest = &rest[at + pattern.len()..];
                    if method == "replace" || pattern.is_empty() {
                        break;
                    }
                }
                out.push_str(rest);
                Value::str(out)
            }
            "padStart" | "padEnd" => {
                let target = arg(0).to_number();
                let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
                if target > MAX_MATERIALIZED_LEN {
                    return Err(type_error("Invalid string length"));
                }
                let fill = match arg(1) {
                    Value::Undefined => " ".to_string(),
                    f => f.to_display(),
                };
                if target <= len || fill.is_empty() {
                    Value::Str(Rc::clone(s))
                } else {
                    let padding: String = fill.chars().cycle().take(target - len).collect();
                    if method == "padStart" {
                        Value::str(format!("{padding}{s}"))
                    } else {
                        Value::str(format!("{s}{padding}"))
                    }
                }
            }
            "repeat" => {
                let count = arg(0).to_number();
                let too_long = s
                    .len()
                    .checked_mul(count as usize)
                    .map_or(true, |total| total > MAX_MATERIALIZED_LEN);
                if count.is_nan() || count < 0.0 || too_long {
                    return Err(type_error("Invalid count value"));
                }
                Value::str(s.repeat(count as usize))
            }
            "concat" => {
                let mut out = s.to_string();
                for a in &args {
                    out.push_str(&a.to_display());
                }
                Value::str(out)
            }
            "localeCompare" => {
                let other = arg(0).to_display();
                Value::Number(match (**s).cmp(other.as_str()) {
                    std::cmp::Ordering::Less => -1.0,
                    std::cmp::Ordering::Equal => 0.0,
                    std::cmp::Ordering::Greater => 1.0,
                })
            }
            other => return Err(type_error(format!("string.{other} is not a function"))),
        })
    }

    /// Items produced by `for…of`, spreads and array destructuring.
    fn iterate(&self, value: &Value<'t>) -> Eval<'t, Vec<Value<'t>>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(type_error(format!("{} is not iterable", other.type_of()))),
        }
    }

    // ── Properties ──────────────────────────────────────────────────────

    fn get_property(&self, object: &Value<'t>, key: &str) -> Eval<'t, Value<'t>> {
        Ok(match object {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    object.to_display()
                )))
            }
            Value::Str(s) => match key {
                "length" => Value::Number(s.chars().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map_or(Value::Undefined, |c| Value::str(c.to_string())),
            },
            Value::Array(items) => match key {
                "length" => Value::Number(items.borrow().len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.borrow().get(i).cloned())
                    .unwrap_or(Value::Undefined),
            },
            Value::Object(map) => map.borrow().get(key).cloned().unwrap_or(Value::Undefined),
            Value::Namespace(ns) => namespace_member(*ns, key),
            Value::Function(closure) => match key {
                "name" => Value::str(closure.name.as_deref().unwrap_or_default()),
                "length" => Value::Number(closure.params.len() as f64),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        })
    }

    // ── JSX ─────────────────────────────────────────────────────────────

    fn eval_jsx(&mut self, node: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, Value<'t>> {
        let (opening, body) = match node.kind() {
            "jsx_self_closing_element" => (Some(node), Vec::new()),
            "jsx_fragment" => (None, named_children(node)),
            _ => (
                node.child_by_field_name("open_tag"),
                named_children(node)
                    .into_iter()
                    .filter(|c| !matches!(c.kind(), "jsx_opening_element" | "jsx_closing_element"))
                    .collect(),
            ),
        };

        let name = opening.and_then(|o| o.child_by_field_name("name"));
        let kind = match name {
            None => ElementKind::Fragment,
            Some(name) => self.jsx_type(name, scope)?,
        };

        let mut props = IndexMap::new();
        if let Some(opening) = opening {
            for attribute in named_children(opening) {
                match attribute.kind() {
                    "jsx_attribute" => {
                        let parts = named_children(attribute);
                        let Some(attr_name) = parts.first() else {
                            continue;
                        };
                        let value = match parts.get(1) {
                            None => Value::Bool(true),
                            Some(v) if v.kind() == "string" => {
                                let raw = self.text(*v);
                                let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or("");
                                Value::str(markup::decode_entities(inner))
                            }
                            Some(v) if v.kind() == "jsx_expression" => {
                                self.eval_first_child(*v, scope)?
                            }
                            Some(v) => self.eval(*v, scope)?,
                        };
                        props.insert(self.text(*attr_name).to_string(), value);
                    }
                    // `{...rest}`
                    "jsx_expression" => {
                        if let Some(spread) = named_children(attribute).first() {
                            let value = self.eval_first_child(*spread, scope)?;
                            props.extend(entries(&value));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut children_values = Vec::new();
        for child in body {
            match child.kind() {
                "jsx_text" => {
                    let text = markup::jsx_text(self.text(child));
                    if !text.is_empty() {
                        children_values.push(Value::str(text));
                    }
                }
                "html_character_reference" => {
                    children_values.push(Value::str(markup::decode_entities(self.text(child))));
                }
                "jsx_expression" => match named_children(child).first() {
                    None => {}
                    Some(inner) if inner.kind() == "spread_element" => {
                        let spread = self.eval_first_child(*inner, scope)?;
                        children_values.extend(self.iterate(&spread)?);
                    }
                    Some(inner) => children_values.push(self.eval(*inner, scope)?),
                },
                _ => children_values.push(self.eval(child, scope)?),
            }
        }

        Ok(Value::Element(Rc::new(Element {
            kind,
            props,
            children: children_values,
        })))
    }

    fn jsx_type(&mut self, name: Node<'t>, scope: &Rc<Scope<'t>>) -> Eval<'t, ElementKind<'t>> {
        let full = self.text(name);
        match name.kind() {
            "identifier" if full.starts_with(|c: char| c.is_ascii_lowercase()) => {
                Ok(ElementKind::Intrinsic(Rc::from(full)))
            }
            "identifier" | "member_expression" | "nested_identifier" => {
                let mut segments = full.split('.');
                let head = segments.next().unwrap_or("");
                let mut value = scope
                    .lookup(head)
                    .ok_or_else(|| Fault::from(RenderError::Reference(head.to_string())))?;
                for segment in segments {
                    value = self.get_property(&value, segment.trim())?;
                }
                element_kind(value)
            }
            _ => Ok(ElementKind::Intrinsic(Rc::from(full))),
        }
    }

    // ── Rendering ───────────────────────────────────────────────────────

    fn render(&mut self, value: &Value<'t>, out: &mut String) -> Eval<'t, ()> {
        self.nested(|this| match value {
            Value::Undefined | Value::Null | Value::Bool(_) => Ok(()),
            Value::Number(n) => {
                out.push_str(&markup::escape_text(&format_number(*n)));
                Ok(())
            }
            Value::Str(s) => {
                out.push_str(&markup::escape_text(s));
                Ok(())
            }
            Value::Array(items) => {
                let items = items.borrow().clone();
                for item in &items {
                    this.render(item, out)?;
                }
                Ok(())
            }
            Value::Element(element) => this.render_element(element, out),
            Value::Object(_) => Err(type_error("Objects are not valid as a React child")),
            // Functions and host objects render nothing.
            _ => Ok(()),
        })
    }

    fn render_children(
        &mut self,
        element: &Element<'t>,
        out: &mut String,
    ) -> Eval<'t, ()> {
        if element.children.is_empty() {
            if let Some(children) = element.props.get("children") {
                return self.render(children, out);
            }
        }
        for child in &element.children {
            self.render(child, out)?;
        }
        Ok(())
    }

    fn render_element(&mut self, element: &Element<'t>, out: &mut String) -> Eval<'t, ()> {
        match &element.kind {
            ElementKind::Fragment => self.render_children(element, out),
            ElementKind::Intrinsic(tag) => self.render_intrinsic(tag, element, out),
            ElementKind::Component(component) => {
                let props = component_props(element);
                match component {
                    Value::Styled(styled) => self.render_styled(styled, props, out),
                    Value::Str(tag) => {
                        let intrinsic = Element {
                            kind: ElementKind::Intrinsic(Rc::clone(tag)),
                            props,
                            children: Vec::new(),
                        };
                        self.render_intrinsic(tag, &intrinsic, out)
                    }
                    Value::Builtin(Builtin::Member(Namespace::React, "Fragment")) => {
                        self.render_children(element, out)
                    }
                    other => {
                        let result =
                            self.call_value(other, vec![Value::object(props)], "component")?;
                        self.render(&result, out)
                    }
                }
            }
        }
    }

    fn render_intrinsic(
        &mut self,
        tag: &str,
        element: &Element<'t>,
        out: &mut String,
    ) -> Eval<'t, ()> {
        let mut attrs = Vec::new();
        for (key, value) in &element.props {
            if matches!(key.as_str(), "key" | "ref" | "children" | "dangerouslySetInnerHTML")
                || key.starts_with('$')
                || value.is_callable()
            {
                continue;
            }
            let attr = match (key.as_str(), value) {
                ("style", Value::Object(map)) => {
                    let css = style_object(&map.borrow());
                    if css.is_empty() {
                        continue;
                    }
                    Attr::Text(css)
                }
                (_, Value::Bool(true)) if key.starts_with("aria-") || key.starts_with("data-") => {
                    Attr::Text("true".into())
                }
                (_, Value::Bool(true)) => Attr::Flag,
                (_, Value::Bool(false) | Value::Undefined | Value::Null) => continue,
                (
                    _,
                    Value::Object(_)
                    | Value::Element(_)
                    | Value::Styled(_)
                    | Value::StyledFactory(_),
                ) => continue,
                (_, other) => Attr::Text(other.to_display()),
            };
            attrs.push((markup::attribute_name(key).to_string(), attr));
        }

        out.push_str(&markup::open_tag(tag, &attrs));
        if markup::is_void(tag) {
            return Ok(());
        }
        self.render_children(element, out)?;
        out.push_str(&format!("</{tag}>"));
        Ok(())
    }

    fn render_styled(
        &mut self,
        styled: &StyledComponent<'t>,
        props: IndexMap<String, Value<'t>>,
        out: &mut String,
    ) -> Eval<'t, ()> {
        let props_value = Value::object(props.clone());
        let mut css = String::new();
        for (i, quasi) in styled.quasis.iter().enumerate() {
            css.push_str(quasi);
            if let Some(interpolation) = styled.interpolations.get(i) {
                let resolved = if interpolation.is_callable() {
                    self.call_value(interpolation, vec![props_value.clone()], "interpolation")?
                } else {
                    interpolation.clone()
                };
                css.push_str(&css_text(&resolved));
            }
        }

        let class = format!("sc-{}", &blake3::hash(css.as_bytes()).to_hex()[..8]);
        let class = match props.get("className") {
            Some(extra) if !extra.is_nullish() => format!("{class} {}", extra.to_display()),
            _ => class,
        };
        let mut style = markup::inline_declarations(&css);
        if let Some(Value::Object(explicit)) = props.get("style") {
            let explicit = style_object(&explicit.borrow());
            if !explicit.is_empty() {
                style = if style.is_empty() {
                    explicit
                } else {
                    format!("{style}; {explicit}")
                };
            }
        }

        let tag_override = match props.get("as") {
            Some(Value::Str(tag)) => Some(Rc::clone(tag)),
            _ => None,
        };
        let mut forwarded: IndexMap<String, Value<'t>> = props
            .into_iter()
            .filter(|(k, _)| !k.starts_with('$') && k != "as" && k != "style" && k != "className")
            .collect();
        forwarded.insert("className".into(), Value::str(class));
        if !style.is_empty() {
            forwarded.insert("style".into(), Value::str(style));
        }

        let kind = match (tag_override, &*styled.target) {
            (Some(tag), _) => ElementKind::Intrinsic(tag),
            (None, StyledTarget::Tag(tag)) => ElementKind::Intrinsic(Rc::clone(tag)),
            (None, StyledTarget::Component(component)) => ElementKind::Component(component.clone()),
        };
        let element = Element {
            kind,
            props: forwarded,
            children: Vec::new(),
        };
        self.render_element(&element, out)
    }
}

// ── Free helpers ────────────────────────────────────────────────────────

fn install_globals<'t>(scope: &Rc<Scope<'t>>, globals: &[String]) {
    for global in globals {
        match global.as_str() {
            "React" => scope.declare("React", Value::Namespace(Namespace::React)),
            "styled" => scope.declare("styled", Value::Namespace(Namespace::Styled)),
            _ => {}
        }
    }
    for name in INTRINSICS {
        let value = match *name {
            "NaN" => Value::Number(f64::NAN),
            "Infinity" => Value::Number(f64::INFINITY),
            "Math" => Value::Namespace(Namespace::Math),
            "JSON" => Value::Namespace(Namespace::Json),
            "Object" => Value::Namespace(Namespace::Object),
            "Array" => Value::Namespace(Namespace::Array),
            "console" => Value::Namespace(Namespace::Console),
            "String" => Value::Builtin(Builtin::Global(Global::String)),
            "Number" => Value::Builtin(Builtin::Global(Global::Number)),
            "Boolean" => Value::Builtin(Builtin::Global(Global::Boolean)),
            "parseInt" => Value::Builtin(Builtin::Global(Global::ParseInt)),
            "parseFloat" => Value::Builtin(Builtin::Global(Global::ParseFloat)),
            "isNaN" => Value::Builtin(Builtin::Global(Global::IsNaN)),
            "Error" => Value::Builtin(Builtin::Global(Global::Error)),
            "TypeError" => Value::Builtin(Builtin::Global(Global::TypeError)),
            _ => Value::Undefined,
        };
        scope.declare(name, value);
    }
}

fn namespace_member<'t>(namespace: Namespace, key: &str) -> Value<'t> {
    let table = match namespace {
        Namespace::React => REACT_MEMBERS,
        Namespace::Math => match key {
            "PI" => return Value::Number(std::f64::consts::PI),
            "E" => return Value::Number(std::f64::consts::E),
            _ => MATH_MEMBERS,
        },
        Namespace::Json => JSON_MEMBERS,
        Namespace::Object => OBJECT_MEMBERS,
        Namespace::Array => ARRAY_MEMBERS,
        Namespace::Console => CONSOLE_MEMBERS,
        Namespace::Styled => {
            if let Some(helper) = STYLED_HELPERS.iter().find(|h| **h == key) {
                return Value::Builtin(Builtin::Member(Namespace::Styled, *helper));
            }
            if key.starts_with(|c: char| c.is_ascii_lowercase()) {
                return Value::StyledFactory(Rc::new(StyledTarget::Tag(Rc::from(key))));
            }
            return Value::Undefined;
        }
    };
    table
        .iter()
        .find(|m| **m == key)
        .map_or(Value::Undefined, |m| {
            Value::Builtin(Builtin::Member(namespace, *m))
        })
}

/// `Math.min` semantics: any NaN argument wins.
fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn element_kind(value: Value<'_>) -> Result<ElementKind<'_>, Fault<'_>> {
    match value {
        Value::Builtin(Builtin::Member(Namespace::React, "Fragment")) => Ok(ElementKind::Fragment),
        Value::Str(tag) => Ok(ElementKind::Intrinsic(tag)),
        v @ (Value::Function(_) | Value::Styled(_) | Value::Builtin(_)) => {
            Ok(ElementKind::Component(v))
        }
        other => Err(type_error(format!(
            "Element type is invalid: expected a component but got {}",
            other.type_of()
        ))),
    }
}

fn component_props<'t>(element: &Element<'t>) -> IndexMap<String, Value<'t>> {
    let mut props = element.props.clone();
    match element.children.as_slice() {
        [] => {}
        [only] => {
            props.insert("children".into(), only.clone());
        }
        many => {
            props.insert("children".into(), Value::array(many.to_vec()));
        }
    }
    props
}

/// Own enumerable entries, as `Object.entries` / spreads see them.
fn entries<'t>(value: &Value<'t>) -> Vec<(String, Value<'t>)> {
    match value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn set_property<'t>(object: &Value<'t>, key: &str, value: Value<'t>) -> Eval<'t, ()> {
    match object {
        Value::Undefined | Value::Null => Err(type_error(format!(
            "Cannot set properties of {} (setting '{key}')",
            object.to_display()
        ))),
        Value::Object(map) => {
            map.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = value.to_number();
                if len.is_nan() || len < 0.0 || len as usize > MAX_MATERIALIZED_LEN {
                    return Err(type_error("Invalid array length"));
                }
                items.resize(len as usize, Value::Undefined);
            } else if let Ok(index) = key.parse::<usize>() {
                if index >= MAX_MATERIALIZED_LEN {
                    return Err(type_error("Invalid array length"));
                }
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        // Primitive wrappers and host objects silently ignore writes.
        _ => Ok(()),
    }
}

fn chain_is_optional(mut node: Node<'_>) -> bool {
    loop {
        if children(node).iter().any(|c| c.kind() == "optional_chain") {
            return true;
        }
        let inner = match node.kind() {
            "member_expression" | "subscript_expression" => node.child_by_field_name("object"),
            "call_expression" => node.child_by_field_name("function"),
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return false,
        }
    }
}

fn is_catchable(fault: &Fault<'_>) -> bool {
    match fault {
        Fault::Throw(_) => true,
        Fault::Error(e) => matches!(e, RenderError::Reference(_) | RenderError::Type(_)),
    }
}

fn caught_value(fault: Fault<'_>) -> Value<'_> {
    match fault {
        Fault::Throw(value) => value,
        Fault::Error(RenderError::Reference(name)) => {
            error_object("ReferenceError", &format!("{name} is not defined"))
        }
        Fault::Error(other) => error_object("TypeError", &other.to_string()),
    }
}

fn message_of(value: &Value<'_>) -> String {
    match value {
        Value::Undefined => String::new(),
        v => v.to_display(),
    }
}

fn property_name(value: &Value<'_>) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

fn relative_index(value: &Value<'_>, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn to_int32(n: f64) -> i32 {
    if n.is_finite() {
        (n.trunc() as i64 & 0xffff_ffff) as u32 as i32
    } else {
        0
    }
}

fn binary<'t>(operator: &str, left: &Value<'t>, right: &Value<'t>) -> Eval<'t, Value<'t>> {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    let int = |f: fn(i32, u32) -> f64| {
        Value::Number(f(to_int32(left.to_number()), to_int32(right.to_number()) as u32))
    };
    let compare = |f: fn(std::cmp::Ordering) -> bool| match (left, right) {
        (Value::Str(a), Value::Str(b)) => Value::Bool(f(a.cmp(b))),
        _ => {
            let (a, b) = (left.to_number(), right.to_number());
            Value::Bool(a.partial_cmp(&b).is_some_and(f))
        }
    };
    Ok(match operator {
        "+" => {
            let stringy = |v: &Value<'t>| {
                !matches!(
                    v,
                    Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
                )
            };
            if stringy(left) || stringy(right) {
                Value::str(format!("{}{}", left.to_display(), right.to_display()))
            } else {
                num(|a, b| a + b)
            }
        }
        "-" => num(|a, b| a - b),
        "*" => num(|a, b| a * b),
        "/" => num(|a, b| a / b),
        "%" => num(|a, b| a % b),
        "**" => num(f64::powf),
        "==" => Value::Bool(left.loose_equals(right)),
        "!=" => Value::Bool(!left.loose_equals(right)),
        "===" => Value::Bool(left.strict_equals(right)),
        "!==" => Value::Bool(!left.strict_equals(right)),
        "<" => compare(|o| o.is_lt()),
        ">" => compare(|o| o.is_gt()),
        "<=" => compare(|o| o.is_le()),
        ">=" => compare(|o| o.is_ge()),
        "&" => int(|a, b| f64::from(a & b as i32)),
        "|" => int(|a, b| f64::from(a | b as i32)),
        "^" => int(|a, b| f64::from(a ^ b as i32)),
        "<<" => int(|a, b| f64::from(a.wrapping_shl(b & 31))),
        ">>" => int(|a, b| f64::from(a.wrapping_shr(b & 31))),
        "in" => Value::Bool(
            entries(right)
                .iter()
                .any(|(k, _)| *k == property_name(left)),
        ),
        other => return Err(unsupported(other)),
    })
}

fn call_object<'t>(f: &str, args: &[Value<'t>]) -> Value<'t> {
    let first = args.first().cloned().unwrap_or(Value::Undefined);
    match f {
        "keys" => Value::array(entries(&first).into_iter().map(|(k, _)| Value::str(k)).collect()),
        "values" => Value::array(entries(&first).into_iter().map(|(_, v)| v).collect()),
        "entries" => Value::array(
            entries(&first)
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                .collect(),
        ),
        "assign" => {
            if let Value::Object(target) = &first {
                for source in args.iter().skip(1) {
                    let more = entries(source);
                    target.borrow_mut().extend(more);
                }
            }
            first
        }
        "fromEntries" => {
            let mut map = IndexMap::new();
            if let Value::Array(pairs) = &first {
                for pair in pairs.borrow().iter() {
                    if let Value::Array(kv) = pair {
                        let kv = kv.borrow();
                        let key = kv.first().map(property_name).unwrap_or_default();
                        map.insert(key, kv.get(1).cloned().unwrap_or(Value::Undefined));
                    }
                }
            }
            Value::object(map)
        }
        // freeze
        _ => first,
    }
}

fn number_method<'t>(n: f64, method: &str, args: &[Value<'t>]) -> Eval<'t, Value<'t>> {
    Ok(match method {
        "toFixed" => {
            let digits = args.first().map_or(0.0, Value::to_number);
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Value::str(format!("{n:.digits$}"))
        }
        "toString" | "valueOf" => Value::str(format_number(n)),
        "toLocaleString" => Value::str(locale_format(n)),
        other => return Err(type_error(format!("number.{other} is not a function"))),
    })
}

/// en-US grouping with at most three fraction digits.
fn locale_format(n: f64) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let rounded = format!("{:.3}", n.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((&rounded, ""));
    let frac = frac_part.trim_end_matches('0');
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && (int_part != "0" || !frac.is_empty()) { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

fn css_text(value: &Value<'_>) -> String {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => String::new(),
        Value::Array(items) => items.borrow().iter().map(css_text).collect(),
        other => other.to_display(),
    }
}

fn style_object(map: &IndexMap<String, Value<'_>>) -> String {
    map.iter()
        .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Null | Value::Bool(_)))
        .map(|(k, v)| {
            let number = match v {
                Value::Number(n) => Some(*n),
                _ => None,
            };
            format!(
                "{}: {}",
                markup::css_property(k),
                markup::css_value(k, number, &v.to_display())
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn number_literal(text: &str) -> f64 {
    let cleaned = text.replace('_', "");
    let radix = |prefix: &[&str], radix: u32| {
        prefix
            .iter()
            .find_map(|p| cleaned.strip_prefix(p))
            .map(|digits| i64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64))
    };
    radix(&["0x", "0X"], 16)
        .or_else(|| radix(&["0o", "0O"], 8))
        .or_else(|| radix(&["0b", "0B"], 2))
        .unwrap_or_else(|| cleaned.trim_end_matches('n').parse().unwrap_or(f64::NAN))
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let radix = if (2..=36).contains(&radix) { radix } else { 10 };
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let valid: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    let value = valid
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    // Longest prefix that parses as a number.
    let candidate: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| string_to_number_strict(&candidate[..end]))
        .unwrap_or(f64::NAN)
}

fn string_to_number_strict(s: &str) -> Option<f64> {
    let n = string_to_number(s);
    (!n.is_nan() && !s.trim().is_empty()).then_some(n)
}

/// Strip the quotes from a JS string literal and decode its escapes.
fn decode_string_literal(raw: &str) -> String {
    let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or("");
    decode_escapes(inner)
}

fn decode_escapes(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(c);
                }
            }
            // Line continuation.
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

//! Runtime values for the component interpreter.
//!
//! Values borrow syntax nodes from the parse tree (`'t`), so they only live
//! for the duration of a single render.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tree_sitter::Node;

pub(crate) type ArrayRef<'t> = Rc<RefCell<Vec<Value<'t>>>>;
pub(crate) type ObjectRef<'t> = Rc<RefCell<IndexMap<String, Value<'t>>>>;

#[derive(Clone)]
pub(crate) enum Value<'t> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef<'t>),
    Object(ObjectRef<'t>),
    Function(Rc<Closure<'t>>),
    Builtin(Builtin),
    Namespace(Namespace),
    /// `styled.div` / `styled(Component)`, waiting for its template.
    StyledFactory(Rc<StyledTarget<'t>>),
    Styled(Rc<StyledComponent<'t>>),
    Element(Rc<Element<'t>>),
}

/// Host objects exposed to components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
    React,
    Styled,
    Math,
    Json,
    Object,
    Array,
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Global {
    String,
    Number,
    Boolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    Error,
    TypeError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Global(Global),
    /// A function member of a namespace, e.g. `React.useState`.
    Member(Namespace, &'static str),
    /// The setter half of `useState`; a single static render never re-renders.
    NoopSetter,
}

pub(crate) struct Closure<'t> {
    pub name: Option<Rc<str>>,
    /// Parameter pattern nodes in declaration order.
    pub params: Vec<Node<'t>>,
    /// `statement_block` or a bare expression (arrow functions).
    pub body: Node<'t>,
    pub env: Rc<Scope<'t>>,
}

pub(crate) enum StyledTarget<'t> {
    Tag(Rc<str>),
    Component(Value<'t>),
}

pub(crate) struct StyledComponent<'t> {
    pub target: Rc<StyledTarget<'t>>,
    pub quasis: Vec<String>,
    pub interpolations: Vec<Value<'t>>,
}

pub(crate) enum ElementKind<'t> {
    Intrinsic(Rc<str>),
    Fragment,
    Component(Value<'t>),
}

pub(crate) struct Element<'t> {
    pub kind: ElementKind<'t>,
    pub props: IndexMap<String, Value<'t>>,
    pub children: Vec<Value<'t>>,
}

// ── Scopes ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Scope<'t> {
    vars: RefCell<HashMap<String, Value<'t>>>,
    parent: Option<Rc<Scope<'t>>>,
}

impl<'t> Scope<'t> {
    pub fn child(parent: &Rc<Scope<'t>>) -> Rc<Scope<'t>> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn declare(&self, name: &str, value: Value<'t>) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value<'t>> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Assign to the nearest existing binding. Returns `false` if none exists.
    pub fn assign(&self, name: &str, value: Value<'t>) -> bool {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

impl<'t> Value<'t> {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value<'t>>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: IndexMap<String, Value<'t>>) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Namespace(Namespace::Styled)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Builtin(_) | Value::StyledFactory(_) => "function",
            Value::Styled(_) => "object",
            Value::Namespace(Namespace::Styled) => "function",
            _ => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [only] => only.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(map) => {
                let map = map.borrow();
                match (map.get("name"), map.get("message")) {
                    (Some(Value::Str(name)), Some(message)) if name.ends_with("Error") => {
                        format!("{name}: {}", message.to_display())
                    }
                    _ => "[object Object]".into(),
                }
            }
            Value::Function(_) | Value::Builtin(_) | Value::StyledFactory(_) => {
                "function".into()
            }
            Value::Styled(_) | Value::Element(_) | Value::Namespace(_) => "[object Object]".into(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value<'t>) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            (Value::Styled(a), Value::Styled(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value<'t>) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_equals(other),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// `JSON.stringify` semantics: functions and undefined are skipped in
    /// objects and become `null` in arrays.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Undefined
            | Value::Function(_)
            | Value::Builtin(_)
            | Value::StyledFactory(_)
            | Value::Namespace(_) => return None,
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_json().unwrap_or(serde_json::Value::Null))
                    .collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                    .collect(),
            ),
            Value::Styled(_) | Value::Element(_) => serde_json::Value::Object(Default::default()),
        })
    }
}

/// Build an `Error`-like object.
pub(crate) fn error_object<'t>(name: &str, message: &str) -> Value<'t> {
    let mut map = IndexMap::new();
    map.insert("name".to_string(), Value::str(name));
    map.insert("message".to_string(), Value::str(message));
    Value::object(map)
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.into()
    } else if n == 0.0 {
        // Both zeros print as "0".
        "0".into()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

pub(crate) fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    // Rust accepts "inf" / "nan" spellings that JavaScript does not.
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_matches_js() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_coercion() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::str("1")));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(!Value::Number(1.0).strict_equals(&Value::str("1")));
    }

    #[test]
    fn error_objects_display_name_and_message() {
        assert_eq!(error_object("TypeError", "x").to_display(), "TypeError: x");
    }
}

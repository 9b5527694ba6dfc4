//! Repair parser for quasi-JSON model output.
//!
//! Generation models often answer with JavaScript object literals rather
//! than JSON: single-quoted strings, bare keys, trailing commas and the odd
//! `'prefix' + variable` concatenation. [`repair`] normalizes those forms and
//! then insists on a strict parse:
//!
//! ```text
//! raw ─► strip fences ─► strict JSON? ──yes──► value (unchanged)
//!                            │no
//!                            ▼
//!        trim to outermost {…} / […]
//!                            ▼
//!        split into code / string segments
//!          · resolve 'lit' + ident against the context
//!          · single → double quotes, \' kept as a plain apostrophe
//!                            ▼
//!        code segments only: quote bare keys, drop trailing commas
//!                            ▼
//!        strict parse ──fail──► MalformedArtifact { raw }
//! ```
//!
//! String contents are never rewritten by the key and comma passes, so an
//! apostrophe or a `word:` inside a string survives untouched.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{RepairError, RepairResult};

/// Parse model output into JSON, repairing common object-literal habits.
///
/// `context` resolves identifiers in `'literal' + identifier` concatenations;
/// unknown identifiers resolve to the empty string.
pub fn repair(raw: &str, context: &HashMap<String, String>) -> RepairResult<Value> {
    let text = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let normalized = normalize(trim_to_structure(text), context);
    serde_json::from_str(&normalized).map_err(|e| {
        debug!(raw = %raw, normalized = %normalized, error = %e, "artifact repair failed");
        RepairError::malformed(e.to_string(), raw)
    })
}

/// [`repair`] followed by a typed decode. A shape mismatch is reported as
/// [`RepairError::MalformedArtifact`] as well.
pub fn repair_into<T: DeserializeOwned>(
    raw: &str,
    context: &HashMap<String, String>,
) -> RepairResult<T> {
    repair_value_into(repair(raw, context)?, raw)
}

/// Typed decode of an already repaired value.
pub fn repair_value_into<T: DeserializeOwned>(value: Value, raw: &str) -> RepairResult<T> {
    serde_json::from_value(value).map_err(|e| {
        debug!(raw = %raw, error = %e, "artifact has unexpected shape");
        RepairError::malformed(e.to_string(), raw)
    })
}

/// Remove a surrounding markdown code fence (with optional language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (`json`, `tsx`, …) up to the first newline.
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Cut leading and trailing prose around the outermost object or array.
fn trim_to_structure(text: &str) -> &str {
    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

// ── Segmentation ────────────────────────────────────────────────────────

enum Segment {
    Code(String),
    /// JSON-escaped string body, without the surrounding quotes.
    Str(String),
}

fn normalize(text: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for segment in segments(text, context) {
        match segment {
            Segment::Code(code) => out.push_str(&fix_code(&code)),
            Segment::Str(body) => {
                out.push('"');
                out.push_str(&body);
                out.push('"');
            }
        }
    }
    out
}

fn segments(text: &str, context: &HashMap<String, String>) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut code = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '"' && c != '\'' {
            code.push(c);
            i += 1;
            continue;
        }

        if !code.is_empty() {
            segments.push(Segment::Code(std::mem::take(&mut code)));
        }
        let (mut body, mut next) = read_string(&chars, i);

        // Fold `+ identifier` and `+ 'literal'` continuations into the literal.
        loop {
            let mut j = skip_whitespace(&chars, next);
            if chars.get(j) != Some(&'+') {
                break;
            }
            j = skip_whitespace(&chars, j + 1);
            match chars.get(j) {
                Some('"') | Some('\'') => {
                    let (more, after) = read_string(&chars, j);
                    body.push_str(&more);
                    next = after;
                }
                Some(&ch) if is_ident_char(ch) => {
                    let start = j;
                    while chars.get(j).is_some_and(|&ch| is_ident_char(ch)) {
                        j += 1;
                    }
                    let ident: String = chars[start..j].iter().collect();
                    let value = context.get(&ident).map(String::as_str).unwrap_or("");
                    body.push_str(&json_escape(value));
                    next = j;
                }
                _ => break,
            }
        }

        segments.push(Segment::Str(body));
        i = next;
    }

    if !code.is_empty() {
        segments.push(Segment::Code(code));
    }
    segments
}

/// Read a quoted literal starting at `start`. Returns the JSON-escaped body
/// and the index just past the closing quote.
fn read_string(chars: &[char], start: usize) -> (String, usize) {
    let quote = chars[start];
    let mut body = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    i += 1;
                    continue;
                };
                if escaped == '\'' {
                    body.push('\'');
                } else {
                    body.push('\\');
                    body.push(escaped);
                }
                i += 2;
            }
            c if c == quote => return (body, i + 1),
            '"' => {
                body.push_str("\\\"");
                i += 1;
            }
            '\n' => {
                body.push_str("\\n");
                i += 1;
            }
            '\r' => {
                body.push_str("\\r");
                i += 1;
            }
            '\t' => {
                body.push_str("\\t");
                i += 1;
            }
            c => {
                body.push(c);
                i += 1;
            }
        }
    }
    // Unterminated literal; the strict parse decides what happens next.
    (body, chars.len())
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    i
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn json_escape(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

// ── Code passes ─────────────────────────────────────────────────────────

/// `word:` outside string literals.
static BARE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)(\s*):").expect("BARE_KEY_RE regex should compile"));
static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",(\s*[}\]])").expect("TRAILING_COMMA_RE regex should compile")
});

fn fix_code(code: &str) -> String {
    let keyed = BARE_KEY_RE.replace_all(code, "\"$1\"$2:");
    TRAILING_COMMA_RE.replace_all(&keyed, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_context() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn strict_json_passes_through_unchanged() {
        let raw = r#"{"pages":[{"name":"Home","components":["Hero"]}]}"#;
        let value = repair(raw, &no_context()).unwrap();
        assert_eq!(serde_json::to_string(&value).unwrap(), raw);
    }

    #[test]
    fn object_literal_is_normalized() {
        let raw = "{name: 'Home', components: ['Header', 'Hero',],}";
        assert_eq!(
            repair(raw, &no_context()).unwrap(),
            json!({"name": "Home", "components": ["Header", "Hero"]})
        );
    }

    #[test]
    fn escaped_apostrophe_becomes_plain_apostrophe() {
        let raw = r"{title: 'Bob\'s Bakery'}";
        assert_eq!(
            repair(raw, &no_context()).unwrap(),
            json!({"title": "Bob's Bakery"})
        );
    }

    #[test]
    fn apostrophes_in_double_quoted_strings_are_untouched() {
        let raw = r#"{purpose: "Show the team's work", 'tagline': 'We "ship"'}"#;
        assert_eq!(
            repair(raw, &no_context()).unwrap(),
            json!({"purpose": "Show the team's work", "tagline": "We \"ship\""})
        );
    }

    #[test]
    fn colons_inside_strings_are_not_keys() {
        let raw = "{endpoint: 'https://api.example.com/v1', note: 'time: 10:30',}";
        assert_eq!(
            repair(raw, &no_context()).unwrap(),
            json!({"endpoint": "https://api.example.com/v1", "note": "time: 10:30"})
        );
    }

    #[test]
    fn concatenation_resolves_against_context() {
        let mut ctx = HashMap::new();
        ctx.insert("project.name".to_string(), "Acme".to_string());
        let raw = "{title: 'Welcome to ' + project.name, footer: 'by ' + missing}";
        assert_eq!(
            repair(raw, &ctx).unwrap(),
            json!({"title": "Welcome to Acme", "footer": "by "})
        );
    }

    #[test]
    fn chained_concatenation() {
        let mut ctx = HashMap::new();
        ctx.insert("name".to_string(), "Ann \"A\"".to_string());
        let raw = "{greeting: 'Hi ' + name + '!'}";
        assert_eq!(
            repair(raw, &ctx).unwrap(),
            json!({"greeting": "Hi Ann \"A\"!"})
        );
    }

    #[test]
    fn fenced_output_with_prose() {
        let raw = "```json\nHere you go: [{name: 'Home'}]\n```";
        assert_eq!(repair(raw, &no_context()).unwrap(), json!([{"name": "Home"}]));
    }

    #[test]
    fn hopeless_text_is_malformed_with_raw_kept() {
        let raw = "{pages: [Home, About}";
        match repair(raw, &no_context()) {
            Err(RepairError::MalformedArtifact { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("expected MalformedArtifact, got {other:?}"),
        }
    }

    #[test]
    fn typed_decode_failure_is_malformed() {
        let raw = "{colors: 'blue'}";
        let result: RepairResult<crate::model::StylingPlan> = repair_into(raw, &no_context());
        assert!(matches!(result, Err(RepairError::MalformedArtifact { .. })));
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_code_fences("```tsx\nconst A = 1;\n```"), "const A = 1;");
        assert_eq!(strip_code_fences("```const A = 1;```"), "const A = 1;");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }
}

//! HTML-like serialization for rendered component trees.

/// Elements that never have children or a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Style properties that take bare numbers.
const UNITLESS: &[&str] = &[
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "lineHeight",
    "opacity",
    "order",
    "zIndex",
    "zoom",
    "gridRow",
    "gridColumn",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Attr {
    /// Boolean attribute, rendered without a value.
    Flag,
    Text(String),
}

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// React prop name to HTML attribute name.
pub(crate) fn attribute_name(prop: &str) -> &str {
    match prop {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    }
}

pub(crate) fn open_tag(tag: &str, attrs: &[(String, Attr)]) -> String {
    let mut out = format!("<{tag}");
    for (name, value) in attrs {
        match value {
            Attr::Flag => {
                out.push(' ');
                out.push_str(name);
            }
            Attr::Text(text) => {
                out.push_str(&format!(" {name}=\"{}\"", escape_attr(text)));
            }
        }
    }
    if is_void(tag) {
        out.push_str(" />");
    } else {
        out.push('>');
    }
    out
}

/// `backgroundColor` → `background-color`, `WebkitTransform` →
/// `-webkit-transform`. Custom properties pass through.
pub(crate) fn css_property(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 || name.starts_with(|c: char| c.is_ascii_uppercase()) {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Render a CSS value for `prop`, appending `px` to bare numbers where the
/// browser would.
pub(crate) fn css_value(prop: &str, number: Option<f64>, text: &str) -> String {
    match number {
        Some(n) if n != 0.0 && !UNITLESS.contains(&prop) => format!("{text}px"),
        _ => text.to_string(),
    }
}

/// Top-level declarations of a styled-components template, flattened to an
/// inline style. Comments and nested blocks (`&:hover {…}`, `@media …`) are
/// dropped since inline styles cannot express them.
pub(crate) fn inline_declarations(css: &str) -> String {
    let without_comments = strip_comments(css);
    let mut top_level = String::new();
    let mut depth = 0usize;
    let mut pending = String::new();

    for c in without_comments.chars() {
        match c {
            '{' => {
                depth += 1;
                // Selector text that opened the block is not a declaration.
                pending.clear();
            }
            '}' => {
                depth = depth.saturating_sub(1);
                pending.clear();
            }
            ';' if depth == 0 => {
                top_level.push_str(&pending);
                top_level.push(';');
                pending.clear();
            }
            c if depth == 0 => pending.push(c),
            _ => {}
        }
    }
    top_level.push_str(&pending);

    top_level
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (!prop.is_empty() && !value.is_empty()).then(|| format!("{prop}: {value}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Normalize JSX text the way React does: lines are trimmed, blank lines
/// dropped and the remainder joined with single spaces.
pub(crate) fn jsx_text(raw: &str) -> String {
    if !raw.contains('\n') {
        return decode_entities(raw);
    }
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    decode_entities(&joined)
}

pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&copy;", "©")
        .replace("&amp;", "&")
}

/// Deterministic stand-in for a component that failed to compile or render.
pub fn placeholder(name: &str, reason: &str) -> String {
    format!(
        "<div class=\"component-error\" data-component=\"{}\">Error loading {}: {}</div>",
        escape_attr(name),
        escape_text(name),
        escape_text(reason)
    )
}

//! Static scan for configuration variables referenced by generated code.
//!
//! Two reference forms are recognized against a configurable config object
//! (`process.env` by default):
//!
//! ```text
//! process.env.API_KEY            process.env["API_KEY"]
//! const { DB_URL, TOKEN: token, PORT = 3000 } = process.env;
//! ```

use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tree::VirtualFileNode;

pub const DEFAULT_CONFIG_OBJECT: &str = "process.env";

/// Distinct variable names in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredConfig(IndexSet<String>);

impl RequiredConfig {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequiredConfig {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<String> for RequiredConfig {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigScanner {
    dotted: Regex,
    destructured: Regex,
}

impl Default for ConfigScanner {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_OBJECT)
    }
}

impl ConfigScanner {
    /// Scanner for references to `object` (e.g. `process.env`, `CONFIG`).
    pub fn new(object: &str) -> Self {
        let object = regex::escape(object.trim());
        let dotted = Regex::new(&format!(
            r#"\b{object}(?:\.([A-Za-z_$][\w$]*)|\[\s*["']([^"']+)["']\s*\])"#
        ))
        .expect("dotted config regex should compile");
        let destructured = Regex::new(&format!(r"\{{([^{{}}]*)\}}\s*=\s*{object}\b"))
            .expect("destructured config regex should compile");
        Self {
            dotted,
            destructured,
        }
    }

    /// Names referenced by `text`, in order of appearance.
    pub fn scan_text(&self, text: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();
        for caps in self.dotted.captures_iter(text) {
            if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
                found.push((name.start(), name.as_str().to_string()));
            }
        }
        for caps in self.destructured.captures_iter(text) {
            let Some(body) = caps.get(1) else {
                continue;
            };
            let mut offset = body.start();
            for item in body.as_str().split(',') {
                if let Some(name) = destructured_name(item) {
                    found.push((offset, name.to_string()));
                }
                offset += item.len() + 1;
            }
        }
        found.sort_by_key(|(at, _)| *at);
        found.into_iter().map(|(_, name)| name).collect()
    }

    /// Union over every leaf of the tree.
    pub fn scan(&self, root: &VirtualFileNode) -> RequiredConfig {
        root.leaves()
            .into_iter()
            .flat_map(|(_, content)| self.scan_text(content))
            .collect()
    }
}

/// `A`, `A: alias`, `A = fallback`, `A: alias = fallback`; rest elements are
/// not names.
fn destructured_name(item: &str) -> Option<&str> {
    let item = item.trim();
    if item.is_empty() || item.starts_with("...") {
        return None;
    }
    let name = item
        .split(|c: char| c == ':' || c == '=')
        .next()
        .map(str::trim)
        .unwrap_or("");
    let name = name.trim_matches(|c: char| c == '"' || c == '\'');
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    valid.then_some(name)
}

/// Required configuration for a tree, with the default config object.
pub fn scan_required_config(root: &VirtualFileNode) -> RequiredConfig {
    ConfigScanner::default().scan(root)
}

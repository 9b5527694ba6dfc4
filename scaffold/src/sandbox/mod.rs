//! Sandboxed compilation of generated TSX components.
//!
//! A component source becomes a [`RenderableUnit`] in two phases:
//!
//! ```text
//! compile:  strip fences ─► parse (tree-sitter TSX)
//!           ─► syntax / import / free-name checks ─► entry
//! render:   worker thread ─► catch_unwind
//!           ─► interpreter (timeout, step budget, depth limit) ─► markup
//! ```
//!
//! Neither phase can fail from the caller's point of view: compile failures
//! are stored in the unit, and any failure at render time (including a
//! panic inside the interpreter) yields [`placeholder`] markup instead.

mod interpreter;
mod markup;
mod scope;
mod value;

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CompileFailure, RenderError};
use crate::repair::strip_code_fences;

pub use markup::placeholder;
pub(crate) use markup::escape_attr;

use interpreter::Limits;
use scope::Entry;

/// Stack for the render thread; the interpreter recurses once per nesting level.
const RENDER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Limits and injected globals for every unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock budget for one render.
    pub timeout_ms: u64,
    /// Evaluation steps allowed per render.
    pub max_steps: u64,
    /// Nested function calls allowed per render.
    pub max_depth: usize,
    /// Globals visible to components. Only `React` and `styled` are
    /// recognized; importing the matching module binds the same value.
    pub globals: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 250,
            max_steps: 200_000,
            max_depth: 64,
            globals: vec!["React".to_string(), "styled".to_string()],
        }
    }
}

impl SandboxConfig {
    fn limits(&self) -> Limits {
        Limits {
            timeout: Duration::from_millis(self.timeout_ms),
            max_steps: self.max_steps,
            max_depth: self.max_depth,
        }
    }
}

/// Entry points for turning source text into units.
pub struct CompilationUnit;

impl CompilationUnit {
    /// Compile `source` into a unit. Never fails: a unit that did not compile
    /// renders the failure placeholder.
    pub fn compile(source: &str, name: &str, config: &SandboxConfig) -> RenderableUnit {
        let source = strip_code_fences(source).to_string();
        let compiled = Self::analyze(&source, name, config);
        if let Err(failure) = &compiled {
            debug!(component = name, %failure, "component failed to compile");
        }
        RenderableUnit {
            name: name.to_string(),
            source,
            compiled,
            config: config.clone(),
        }
    }

    /// The compile step alone, used to accept or reject generated source.
    pub fn self_check(
        source: &str,
        name: &str,
        config: &SandboxConfig,
    ) -> Result<(), CompileFailure> {
        Self::analyze(strip_code_fences(source), name, config).map(|_| ())
    }

    fn analyze(source: &str, name: &str, config: &SandboxConfig) -> Result<Entry, CompileFailure> {
        if source.trim().is_empty() {
            return Err(CompileFailure::Empty);
        }
        let tree = scope::parse(source)?;
        scope::analyze(&tree, source, name, &config.globals)
    }
}

/// Output of one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub markup: String,
    /// Why the placeholder was produced, if it was.
    pub failure: Option<String>,
}

impl Rendered {
    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }
}

/// An isolated, invocable compiled component.
#[derive(Debug, Clone)]
pub struct RenderableUnit {
    name: String,
    source: String,
    compiled: Result<Entry, CompileFailure>,
    config: SandboxConfig,
}

impl RenderableUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn failure(&self) -> Option<&CompileFailure> {
        self.compiled.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.compiled.is_ok()
    }

    /// Render with `props`. Failures of any kind produce the placeholder.
    pub fn render(&self, props: &serde_json::Value) -> Rendered {
        let entry = match &self.compiled {
            Ok(entry) => entry,
            Err(failure) => return self.placeholder(failure.to_string()),
        };
        match self.render_isolated(entry, props) {
            Ok(markup) => Rendered {
                markup,
                failure: None,
            },
            Err(e) => {
                warn!(component = %self.name, error = %e, "component render failed");
                self.placeholder(e.to_string())
            }
        }
    }

    fn placeholder(&self, reason: String) -> Rendered {
        Rendered {
            markup: placeholder(&self.name, &reason),
            failure: Some(reason),
        }
    }

    /// Run the interpreter on a dedicated thread with a large stack, behind
    /// `catch_unwind`. Falls back to the calling thread if spawning fails.
    fn render_isolated(
        &self,
        entry: &Entry,
        props: &serde_json::Value,
    ) -> Result<String, RenderError> {
        let limits = self.config.limits();
        let panicked = |payload: Box<dyn std::any::Any + Send>| {
            Err(RenderError::Panicked(panic_message(payload.as_ref())))
        };
        let job = || {
            panic::catch_unwind(AssertUnwindSafe(|| {
                interpreter::render_entry(
                    &self.source,
                    entry,
                    &self.name,
                    &self.config.globals,
                    limits,
                    props,
                )
            }))
            .unwrap_or_else(panicked)
        };

        std::thread::scope(|s| {
            match std::thread::Builder::new()
                .name(format!("render-{}", self.name))
                .stack_size(RENDER_STACK_BYTES)
                .spawn_scoped(s, job)
            {
                Ok(handle) => handle.join().unwrap_or_else(panicked),
                Err(e) => {
                    debug!(
                        component = %self.name,
                        error = %e,
                        "render thread unavailable, rendering inline"
                    );
                    job()
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Source of a component as an ES module for the packaged project: the
/// injected globals are imported explicitly and the entry becomes the
/// default export.
pub fn module_source(source: &str, name: &str) -> String {
    let source = strip_code_fences(source);
    let mut header = String::new();
    for (module, global) in scope::MODULES {
        if !imports_module(source, module) {
            header.push_str(&format!("import {global} from '{module}';\n"));
        }
    }

    let entry = scope::parse(source)
        .ok()
        .and_then(|tree| scope::find_entry(tree.root_node(), source.as_bytes(), name));
    let body = match entry {
        Some(Entry::Binding(binding)) => format!("{source}\n\nexport default {binding};\n"),
        Some(Entry::Completion { start, end }) => format!(
            "{}const {name} = {};\n\nexport default {name};\n",
            &source[..start],
            &source[start..end]
        ),
        Some(Entry::DefaultExport) | None => format!("{source}\n"),
    };
    if header.is_empty() {
        body
    } else {
        format!("{header}\n{body}")
    }
}

fn imports_module(source: &str, module: &str) -> bool {
    source.contains(&format!("from '{module}'")) || source.contains(&format!("from \"{module}\""))
}

//! Error types for the deterministic half of the pipeline.
//!
//! Repair and assembly errors propagate to callers. Compile and render
//! failures never escape a [`RenderableUnit`](crate::sandbox::RenderableUnit);
//! they are carried as values and turned into placeholder markup.

use thiserror::Error;

/// Result type alias for repair operations
pub type RepairResult<T> = Result<T, RepairError>;

/// Model output that could not be turned into valid structured data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepairError {
    /// Normalization finished but the text still is not strict JSON, or the
    /// JSON does not have the shape of the requested artifact.
    #[error("malformed artifact: {reason}")]
    MalformedArtifact {
        /// Parser or decoder message
        reason: String,
        /// The untouched model output, kept for diagnostics
        raw: String,
    },
}

impl RepairError {
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedArtifact {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// Raw model text that failed to parse.
    pub fn raw(&self) -> &str {
        match self {
            Self::MalformedArtifact { raw, .. } => raw,
        }
    }
}

/// The project tree could not be produced at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    /// A required upstream artifact is missing or did not succeed.
    #[error("unable to produce project tree: missing {0}")]
    MissingArtifact(&'static str),

    /// The page plan succeeded but declares no pages.
    #[error("unable to produce project tree: page plan has no pages")]
    NoPages,
}

/// Why a generated component could not be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileFailure {
    #[error("component source is empty")]
    Empty,

    #[error("parser unavailable: {0}")]
    Parser(String),

    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("import of '{0}' is not permitted")]
    ForbiddenImport(String),

    #[error("'{0}' is not defined")]
    UndeclaredName(String),

    #[error("no component function found")]
    NoEntry,
}

/// Failure raised while invoking a compiled component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The component executed a `throw`.
    #[error("uncaught {0}")]
    Thrown(String),

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("unsupported syntax: {0}")]
    Unsupported(String),

    #[error("render timed out")]
    Timeout,

    #[error("step budget exhausted")]
    StepLimit,

    #[error("maximum call depth exceeded")]
    DepthLimit,

    #[error("no component function found")]
    NoEntry,

    #[error("renderer panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    /// Budget errors cannot be caught by a `try` block inside the component.
    pub fn is_budget(&self) -> bool {
        matches!(self, Self::Timeout | Self::StepLimit | Self::DepthLimit)
    }
}

/// Invalid placement event from the layout editor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("instance '{instance_id}' already placed on page '{page}'")]
    DuplicateInstance { page: String, instance_id: String },

    #[error("instance '{instance_id}' not found on page '{page}'")]
    UnknownInstance { page: String, instance_id: String },
}

/// A deploy bundle could not be prepared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// Required configuration variables without a supplied value.
    #[error("missing values for required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("project tree has no package manifest")]
    MissingManifest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_keeps_raw_text() {
        let err = RepairError::malformed("expected value", "{pages: ???}");
        assert_eq!(err.raw(), "{pages: ???}");
        assert_eq!(err.to_string(), "malformed artifact: expected value");
    }

    #[test]
    fn missing_config_lists_keys() {
        let err = DeployError::MissingConfig(vec!["DB_URL".into(), "TOKEN".into()]);
        assert_eq!(
            err.to_string(),
            "missing values for required configuration: DB_URL, TOKEN"
        );
    }

    #[test]
    fn budget_errors_are_flagged() {
        assert!(RenderError::Timeout.is_budget());
        assert!(RenderError::DepthLimit.is_budget());
        assert!(!RenderError::Thrown("Error: boom".into()).is_budget());
    }
}

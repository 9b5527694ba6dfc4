//! Error types for the generation pipeline.

use std::path::PathBuf;

use scaffold::AssemblyError;
use thiserror::Error;

use crate::stages::IllegalTransition;

/// A call to the generation or deploy service failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response envelope: {0}")]
    Envelope(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Every attempt for one artifact was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{label}: generation failed after {attempts} attempts")]
pub struct GenerationExhausted {
    pub label: String,
    pub attempts: u32,
    /// Why the final attempt was rejected.
    pub last_failure: Option<String>,
}

/// Whole-pipeline failures. Per-artifact failures are recorded as statuses
/// and never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("page plan produced no pages")]
    NoPages,

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("unknown artifact: {0}")]
    UnknownArtifact(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

//! Runtime configuration.
//!
//! Precedence, highest first: `APPGEN_*` environment variables, the TOML
//! file, built-in defaults.
//!
//! ```toml
//! endpoint = "https://sparkengine.ai/api/engine/completion"
//! max_attempts = 3
//!
//! [templates]
//! component = "my-component-template"
//!
//! [sandbox]
//! timeout_ms = 500
//!
//! [assembler]
//! extension = "jsx"
//! canvas = { width = 1440.0, height = 900.0 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use scaffold::config_scan::DEFAULT_CONFIG_OBJECT;
use scaffold::{AssemblerConfig, SandboxConfig};

use crate::error::ConfigError;
use crate::prompts::TemplateIds;
use crate::retry::DEFAULT_MAX_ATTEMPTS;

pub const ENV_ENDPOINT: &str = "APPGEN_ENDPOINT";
pub const ENV_API_KEY: &str = "APPGEN_API_KEY";
pub const ENV_DEPLOYER_URL: &str = "APPGEN_DEPLOYER_URL";
pub const ENV_MAX_ATTEMPTS: &str = "APPGEN_MAX_ATTEMPTS";
pub const ENV_TIMEOUT_SECS: &str = "APPGEN_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppgenConfig {
    /// Generation service completion URL.
    pub endpoint: String,
    pub api_key: String,
    /// Base URL of the deploy service; deploying is unavailable without it.
    pub deployer_url: Option<String>,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    /// Expression generated code reads configuration from.
    pub config_object: String,
    pub templates: TemplateIds,
    pub sandbox: SandboxConfig,
    pub assembler: AssemblerConfig,
}

impl Default for AppgenConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sparkengine.ai/api/engine/completion".to_string(),
            api_key: String::new(),
            deployer_url: None,
            request_timeout_secs: 120,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            config_object: DEFAULT_CONFIG_OBJECT.to_string(),
            templates: TemplateIds::default(),
            sandbox: SandboxConfig::default(),
            assembler: AssemblerConfig::default(),
        }
    }
}

impl AppgenConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loading config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `APPGEN_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(url) = get(ENV_DEPLOYER_URL) {
            self.deployer_url = Some(url);
        }
        if let Some(value) = get(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_override(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = get(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_override(ENV_TIMEOUT_SECS, &value)?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

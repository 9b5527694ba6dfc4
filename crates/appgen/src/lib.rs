//! appgen: turns an app brief into a packaged web project.
//!
//! This crate provides:
//! - `GenerationOrchestrator`: the staged pipeline with a concurrent fan-out
//! - `RetryController`: bounded, validated retries around each generation call
//! - `GenerationClient`: the generation service contract and its HTTP client
//! - `StatusBus`: live and historical per-artifact status
//! - `Deployer`: the deploy service contract and its HTTP client
//!
//! Parsing, sandboxed rendering and assembly live in the `scaffold` crate.
//!
//! # Usage
//!
//! ```bash
//! APPGEN_API_KEY=... appgen generate --name "Bob's Bakery" \
//!     --purpose "Sell bread online" --colors "warm browns" --multi-page --out ./site
//! appgen preview components/Hero.js --name Hero --props '{"title":"Hi"}'
//! appgen scan ./site
//! ```

pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod stages;
pub mod status;

pub use client::{GenerationClient, GenerationOutput, HttpGenerationClient};
pub use config::AppgenConfig;
pub use deploy::{DeployStatus, Deployer, HttpDeployer};
pub use error::{ClientError, ConfigError, GenerationExhausted, PipelineError};
pub use orchestrator::GenerationOrchestrator;
pub use retry::RetryController;
pub use stages::{PipelineStage, StageMachine};
pub use status::{StatusBus, StatusSink, StatusUpdate};

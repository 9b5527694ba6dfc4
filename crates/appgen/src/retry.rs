//! Bounded retry around one generation call.
//!
//! ```text
//! generating ─► try 1 ─ok─► success
//!                 │rejected
//!                 ▼
//!           retrying (1) ─► try 2 ─ok─► success
//!                             │rejected
//!                             ▼
//!                       retrying (2) ─► try 3 ─ok─► success
//!                                         │rejected
//!                                         ▼
//!                                       failed ─► GenerationExhausted
//! ```
//!
//! A try is rejected when the service call fails, when the text is empty
//! after trimming, or when the validator refuses it. All three consume a
//! slot the same way. Tries never overlap.

use std::future::Future;

use tracing::{info, warn};

use scaffold::ArtifactStatus;

use crate::error::{ClientError, GenerationExhausted};
use crate::status::StatusSink;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryController {
    max_attempts: u32,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryController {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Accept the first non-empty text.
    pub async fn attempt<S, G, Fut>(
        &self,
        label: &str,
        sink: &S,
        generate: G,
    ) -> Result<String, GenerationExhausted>
    where
        S: StatusSink + ?Sized,
        G: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ClientError>>,
    {
        self.attempt_with(label, sink, generate, |text| Ok(text.to_string()))
            .await
    }

    /// Accept the first non-empty text that `validate` turns into a value.
    /// The validator's error string is kept as the rejection reason.
    pub async fn attempt_with<T, S, G, Fut, V>(
        &self,
        label: &str,
        sink: &S,
        mut generate: G,
        mut validate: V,
    ) -> Result<T, GenerationExhausted>
    where
        S: StatusSink + ?Sized,
        G: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ClientError>>,
        V: FnMut(&str) -> Result<T, String>,
    {
        sink.publish(label, ArtifactStatus::Generating).await;

        let mut last_failure = None;
        for attempt in 1..=self.max_attempts {
            let outcome = match generate().await {
                Ok(text) if text.trim().is_empty() => Err("empty output".to_string()),
                Ok(text) => validate(&text),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(value) => {
                    info!(label, attempt, "artifact accepted");
                    sink.publish(label, ArtifactStatus::Success).await;
                    return Ok(value);
                }
                Err(reason) => {
                    warn!(label, attempt, %reason, "attempt rejected");
                    last_failure = Some(reason);
                    if attempt < self.max_attempts {
                        sink.publish(label, ArtifactStatus::Retrying(attempt)).await;
                    }
                }
            }
        }

        sink.publish(label, ArtifactStatus::Failed).await;
        Err(GenerationExhausted {
            label: label.to_string(),
            attempts: self.max_attempts,
            last_failure,
        })
    }
}

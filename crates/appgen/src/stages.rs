//! Pipeline stage machine: explicit stages and legal transition guards.
//!
//! Every generation run starts at `PagePlan` and terminates at either `Ready`
//! or `Aborted`. Each transition is validated and recorded with a reason so a
//! run can be reconstructed from its log.
//!
//! ```text
//! PagePlan → Styling → ApiSurface → Schema → FanOut → Ready
//!     └──────────┴──────────┴──────────┴────────┴──→ Aborted
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Pages and the components each one uses.
    PagePlan,
    /// Colour roles.
    Styling,
    /// Declared serverless APIs.
    ApiSurface,
    /// Database tables.
    Schema,
    /// Components, API code and SQL generated concurrently.
    FanOut,
    /// Every artifact has settled. Terminal.
    Ready,
    /// The page plan could not be produced. Terminal.
    Aborted,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Aborted)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PagePlan => write!(f, "PagePlan"),
            Self::Styling => write!(f, "Styling"),
            Self::ApiSurface => write!(f, "ApiSurface"),
            Self::Schema => write!(f, "Schema"),
            Self::FanOut => write!(f, "FanOut"),
            Self::Ready => write!(f, "Ready"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

fn is_legal_transition(from: PipelineStage, to: PipelineStage) -> bool {
    use PipelineStage::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (PagePlan, Styling)
            | (Styling, ApiSurface)
            | (ApiSurface, Schema)
            | (Schema, FanOut)
            | (FanOut, Ready)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineStage,
    pub to: PipelineStage,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal stage transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Current stage plus the full transition log of one run.
#[derive(Debug)]
pub struct StageMachine {
    current: PipelineStage,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::PagePlan,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Move to `to` if the stage graph allows it.
    pub fn advance(
        &mut self,
        to: PipelineStage,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::info!(
            from = %self.current,
            to = %to,
            reason = reason.unwrap_or(""),
            "stage transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn abort(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(PipelineStage::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `PagePlan → … → Ready (12ms, 5 transitions)`
    pub fn summary(&self) -> String {
        let path: Vec<String> = std::iter::once(PipelineStage::PagePlan.to_string())
            .chain(self.transitions.iter().map(|t| t.to.to_string()))
            .collect();
        format!(
            "{} ({}ms, {} transitions)",
            path.join(" → "),
            self.created_at.elapsed().as_millis(),
            self.transitions.len()
        )
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let mut sm = StageMachine::new();
        sm.advance(PipelineStage::Styling, Some("3 pages")).unwrap();
        sm.advance(PipelineStage::ApiSurface, None).unwrap();
        sm.advance(PipelineStage::Schema, None).unwrap();
        sm.advance(PipelineStage::FanOut, None).unwrap();
        sm.advance(PipelineStage::Ready, Some("all settled")).unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 5);
        assert_eq!(sm.transitions()[0].reason.as_deref(), Some("3 pages"));
        assert!(sm
            .summary()
            .starts_with("PagePlan → Styling → ApiSurface → Schema → FanOut → Ready"));
    }

    #[test]
    fn skipping_a_stage_is_illegal() {
        let mut sm = StageMachine::new();
        let err = sm.advance(PipelineStage::Schema, None).unwrap_err();
        assert_eq!(err.from, PipelineStage::PagePlan);
        assert_eq!(err.to, PipelineStage::Schema);
        assert_eq!(sm.current(), PipelineStage::PagePlan);
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn abort_from_any_running_stage() {
        for stage in [
            PipelineStage::PagePlan,
            PipelineStage::Styling,
            PipelineStage::ApiSurface,
            PipelineStage::Schema,
            PipelineStage::FanOut,
        ] {
            let mut sm = StageMachine {
                current: stage,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.abort("no pages").is_ok());
            assert_eq!(sm.current(), PipelineStage::Aborted);
        }
    }

    #[test]
    fn terminal_stages_are_final() {
        let mut sm = StageMachine::new();
        sm.abort("no pages").unwrap();
        assert!(sm.abort("again").is_err());
        assert!(sm.advance(PipelineStage::Styling, None).is_err());
    }
}

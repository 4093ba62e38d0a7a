// Stage Domain Model

use super::error::{DomainError, Result};
use super::queue::QueueSpec;
use serde::{Deserialize, Serialize};

/// Default (and only supported) prefetch for stage consumers
pub const STAGE_PREFETCH: u16 = 1;

/// The three consumer stages of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Intake,
    Ai,
    Scrape,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Intake => "intake",
            StageKind::Ai => "ai",
            StageKind::Scrape => "scrape",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage: one queue-consuming unit with a single domain responsibility
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Consumer name on the broker (durable across reconnects)
    pub name: String,
    pub input: QueueSpec,
    pub output: Option<QueueSpec>,
    pub prefetch: u16,
}

impl StageSpec {
    pub fn new(kind: StageKind, input: QueueSpec, output: Option<QueueSpec>) -> Self {
        Self {
            kind,
            name: format!("{}-stage", kind.as_str()),
            input,
            output,
            prefetch: STAGE_PREFETCH,
        }
    }

    /// Stages serialize their domain action: prefetch must stay at 1
    pub fn validate(&self) -> Result<()> {
        self.input.validate()?;
        if let Some(output) = &self.output {
            output.validate()?;
        }
        if self.prefetch != STAGE_PREFETCH {
            return Err(DomainError::InvalidPrefetch(self.prefetch));
        }
        Ok(())
    }
}

/// Stage consumer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Declaring,
    Consuming,
    Handling,
    Closing,
}

impl ConsumerState {
    pub fn can_transition_to(&self, next: ConsumerState) -> bool {
        use ConsumerState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Declaring)
                | (Connecting, Disconnected)
                | (Declaring, Consuming)
                | (Declaring, Closing)
                | (Consuming, Handling)
                | (Consuming, Closing)
                | (Handling, Consuming)
                | (Handling, Closing)
                | (Closing, Disconnected)
        )
    }

    /// Validated transition
    pub fn transition(self, next: ConsumerState) -> Result<ConsumerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerState::Disconnected => write!(f, "DISCONNECTED"),
            ConsumerState::Connecting => write!(f, "CONNECTING"),
            ConsumerState::Declaring => write!(f, "DECLARING"),
            ConsumerState::Consuming => write!(f, "CONSUMING"),
            ConsumerState::Handling => write!(f, "HANDLING"),
            ConsumerState::Closing => write!(f, "CLOSING"),
        }
    }
}

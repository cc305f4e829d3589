// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input/output shapes for the interactive bootstrap dialogue (§4.7).

use serde::{Deserialize, Serialize};

/// Normalized bootstrap input: purpose, repo URL, and the latest user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapContext {
    /// What the user wants the repository analyzed for.
    pub purpose: String,
    /// Repository URL under discussion, if known yet.
    pub repo_url: String,
    /// The latest raw user input, whitespace-trimmed.
    pub user_input: String,
}

impl BootstrapContext {
    /// Build a context, trimming whitespace from every field as the data
    /// model requires.
    #[must_use]
    pub fn new(
        purpose: impl Into<String>,
        repo_url: impl Into<String>,
        user_input: impl Into<String>,
    ) -> Self {
        Self {
            purpose: purpose.into().trim().to_string(),
            repo_url: repo_url.into().trim().to_string(),
            user_input: user_input.into().trim().to_string(),
        }
    }
}

/// Result of one bootstrap-loop turn, per §4.7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapPipeline<T> {
    /// The worker's normal output for this turn.
    pub result: T,
    /// `true` when the host should re-run the pipeline with the next input.
    pub need_more_input: bool,
}

/// Bootstrap conversation state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    /// First turn: no user input has arrived yet.
    Greeting,
    /// Blocked on `waitForInput`.
    AwaitingInput,
    /// An LLM call is in flight to produce the next turn.
    Replying,
    /// `need_more_input` resolved to `false`.
    Completed,
}

impl BootstrapState {
    /// Valid forward transitions for this state machine.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Greeting, Self::AwaitingInput)
                | (Self::AwaitingInput, Self::Replying)
                | (Self::Replying, Self::AwaitingInput)
                | (Self::Replying, Self::Completed)
        )
    }
}

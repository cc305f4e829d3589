// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progress/log/LLM-chunk events surfaced to a host driver.

use serde::{Deserialize, Serialize};

/// One event flowing through the event stream, always tagged with the
/// worker key that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A free-form log line.
    Log {
        /// Log message.
        message: String,
    },
    /// Coarse progress update, 0..=100.
    Progress {
        /// Percent complete.
        progress: u8,
    },
    /// One streamed chunk of an in-flight LLM response.
    LlmChunk {
        /// The chunk text.
        chunk: String,
    },
    /// The worker finished successfully.
    Complete,
    /// The worker failed.
    Error {
        /// Human-readable failure message.
        message: String,
    },
}

/// An [`EventKind`] tagged with the worker that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Key of the worker this event is about.
    pub worker: String,
    /// The event payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Build a log event.
    #[must_use]
    pub fn log(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Log {
                message: message.into(),
            },
        }
    }

    /// Build a progress event, clamping to `0..=100`.
    #[must_use]
    pub fn progress(worker: impl Into<String>, progress: u8) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Progress {
                progress: progress.min(100),
            },
        }
    }

    /// Build an LLM-chunk event.
    #[must_use]
    pub fn llm_chunk(worker: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::LlmChunk {
                chunk: chunk.into(),
            },
        }
    }

    /// Build a completion event.
    #[must_use]
    pub fn complete(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Complete,
        }
    }

    /// Build an error event.
    #[must_use]
    pub fn error(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Error {
                message: message.into(),
            },
        }
    }
}

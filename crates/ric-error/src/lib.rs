// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Stable error taxonomy for the worker orchestration runtime.
//!
//! Every subsystem raises its failures as a [`RicError`] variant. Hosts are
//! expected to match on [`RicError::code`] rather than the `Display` string,
//! since the sentinel [`ErrorCode`] values are the part of this crate's API
//! that is guaranteed not to change shape across releases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-matchable error kind.
///
/// These correspond to the sentinel kinds named in the runtime design:
/// `ErrUnknown`, `ErrCyclic`, `ErrToolNotAllowed`, `ErrMaxIterations`,
/// `ErrModelNotRegistered`, `ErrModelLevelRequired`, `ErrInvalidJSON`, plus
/// the broader configuration/dependency/cache/transport/credit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Catch-all for a failure with no more specific kind.
    Unknown,
    /// A worker's predecessor closure contains a cycle.
    Cyclic,
    /// A requested tool name is outside the worker's allow-list.
    ToolNotAllowed,
    /// The tool loop exceeded its iteration cap.
    MaxIterations,
    /// `(provider, model)` is not registered with the model registry.
    ModelNotRegistered,
    /// A role/capability default was required but none is configured.
    ModelLevelRequired,
    /// An LLM response did not parse as JSON.
    InvalidJson,
    /// Missing registry, missing LLM client, or nil tool provider.
    Configuration,
    /// Unknown worker key, unlisted require, or unused require under the
    /// `error` dependency-usage policy.
    DependencyDeclaration,
    /// Artifact store read or write failed.
    CacheIo,
    /// Non-permanent LLM transport failure, eligible for retry.
    LlmTransport,
    /// LLM failure wrapped as permanent; retry is disabled.
    LlmPermanent,
    /// Context was cancelled while blocked on a rate limiter or credit take.
    RateCreditExhausted,
    /// Interaction wait was cancelled or timed out.
    InteractionCancelled,
}

impl ErrorCode {
    /// Stable string form, e.g. `"CYCLIC"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Cyclic => "CYCLIC",
            Self::ToolNotAllowed => "TOOL_NOT_ALLOWED",
            Self::MaxIterations => "MAX_ITERATIONS",
            Self::ModelNotRegistered => "MODEL_NOT_REGISTERED",
            Self::ModelLevelRequired => "MODEL_LEVEL_REQUIRED",
            Self::InvalidJson => "INVALID_JSON",
            Self::Configuration => "CONFIGURATION",
            Self::DependencyDeclaration => "DEPENDENCY_DECLARATION",
            Self::CacheIo => "CACHE_IO",
            Self::LlmTransport => "LLM_TRANSPORT",
            Self::LlmPermanent => "LLM_PERMANENT",
            Self::RateCreditExhausted => "RATE_CREDIT_EXHAUSTED",
            Self::InteractionCancelled => "INTERACTION_CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified runtime error.
///
/// Each variant names the condition from the design's error-handling section
/// and carries whatever context a host needs to report it; [`RicError::code`]
/// projects the variant down to its stable [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum RicError {
    /// Catch-all, used when an inner collaborator returns an opaque failure.
    #[error("{0}")]
    Unknown(String),

    /// §4.3 step 2 / P6: cyclic dependency closure.
    #[error("cyclic dependency detected at {worker}")]
    Cyclic {
        /// Worker key at which the cycle was detected.
        worker: String,
    },

    /// §4.1: executor was asked to run an unregistered worker key.
    #[error("unknown worker key {key}")]
    UnknownWorker {
        /// The key that was not found in the merged registry.
        key: String,
    },

    /// §4.2 / P5: a worker read an artifact it did not declare in `requires`.
    #[error("worker {worker} requested artifact {key} but it is not declared in Requires")]
    UnlistedRequire {
        /// The worker that performed the read.
        worker: String,
        /// The artifact key it tried to read.
        key: String,
    },

    /// §4.2: `error` dependency-usage policy found declared-but-unread keys.
    #[error("worker {worker} declared requires {unused:?} but never read them")]
    UnusedRequires {
        /// The worker whose `buildInput` left requires unread.
        worker: String,
        /// The unread keys.
        unused: Vec<String>,
    },

    /// §4.8: tool name outside the worker's allow-list.
    #[error("tool {tool} is not allowed for this worker")]
    ToolNotAllowed {
        /// The disallowed tool name.
        tool: String,
    },

    /// §4.8 / P11: tool loop exceeded its iteration cap.
    #[error("tool loop exceeded max iterations ({max_iters})")]
    MaxIterations {
        /// The configured cap.
        max_iters: u32,
    },

    /// §4.6: `resolve` could not find a registered `(provider, model)`.
    #[error("model {provider}::{model} is not registered")]
    ModelNotRegistered {
        /// Requested provider.
        provider: String,
        /// Requested model.
        model: String,
    },

    /// §4.6: no default configured for a role+tier and no candidate exists.
    #[error("no default model configured for role={role} tier={tier}")]
    ModelLevelRequired {
        /// Requested role.
        role: String,
        /// Requested capability tier.
        tier: String,
    },

    /// §4.5/§7: LLM response body did not parse as JSON.
    #[error("invalid JSON response: {source}")]
    InvalidJson {
        /// The raw response body, kept for debugging.
        raw: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// §7: missing registry, missing LLM client, or nil tool provider.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// §7/§4.4: artifact store read/write failure.
    #[error("cache I/O error for {key}: {source}")]
    CacheIo {
        /// The worker key whose artifact failed to read or write.
        key: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// §7: non-permanent LLM transport failure, eligible for retry.
    #[error("LLM transport error: {0}")]
    LlmTransport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// §7/P9: an error explicitly wrapped to disable retry.
    #[error("permanent LLM error: {0}")]
    LlmPermanent(#[from] PermanentError),

    /// §7: context cancelled while blocked on a rate limiter or credit take.
    #[error("cancelled while waiting for rate limit or credit")]
    RateCreditExhausted,

    /// §4.7/§7: interaction wait cancelled or timed out.
    #[error("interaction cancelled or timed out")]
    InteractionCancelled,
}

impl RicError {
    /// Project this error down to its stable [`ErrorCode`].
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unknown(_) => ErrorCode::Unknown,
            Self::Cyclic { .. } => ErrorCode::Cyclic,
            Self::UnknownWorker { .. } | Self::UnlistedRequire { .. } | Self::UnusedRequires { .. } => {
                ErrorCode::DependencyDeclaration
            }
            Self::ToolNotAllowed { .. } => ErrorCode::ToolNotAllowed,
            Self::MaxIterations { .. } => ErrorCode::MaxIterations,
            Self::ModelNotRegistered { .. } => ErrorCode::ModelNotRegistered,
            Self::ModelLevelRequired { .. } => ErrorCode::ModelLevelRequired,
            Self::InvalidJson { .. } => ErrorCode::InvalidJson,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::CacheIo { .. } => ErrorCode::CacheIo,
            Self::LlmTransport(_) => ErrorCode::LlmTransport,
            Self::LlmPermanent(_) => ErrorCode::LlmPermanent,
            Self::RateCreditExhausted => ErrorCode::RateCreditExhausted,
            Self::InteractionCancelled => ErrorCode::InteractionCancelled,
        }
    }
}

/// Wraps any error to mark it non-retryable.
///
/// The retry middleware (§4.5 step 4) checks for this wrapper and aborts
/// after a single attempt instead of applying exponential backoff.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct PermanentError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl PermanentError {
    /// Wrap `source` as permanent.
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

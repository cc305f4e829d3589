// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod artifact;
mod bootstrap;
mod canonical;
mod capability;
mod context;
mod event;
mod model;

pub use artifact::{Artifact, ArtifactMeta, CacheStrategyKind, DepsUsagePolicy, WorkerOutput};
pub use bootstrap::{BootstrapContext, BootstrapPipeline, BootstrapState};
pub use canonical::{canonical_json, fingerprint, Fingerprint};
pub use capability::{EventEmitter, Hook, LlmClient, ToolProvider, ToolSpec};
pub use context::{ModelSelection, RunContext};
pub use event::{Event, EventKind};
pub use model::{CapabilityTier, ModelProfile, RateLimitConfig, RateLimitHeaders, Role, SelectionMode};

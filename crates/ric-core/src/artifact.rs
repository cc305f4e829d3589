// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted worker output and its sidecar metadata.

use crate::canonical::Fingerprint;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a worker's `run`. Only `runtime_state` is persisted and visible
/// to downstream workers; `client_view` is forwarded to the event bus only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Persisted, cacheable state. Becomes the `<key>.json` artifact body.
    pub runtime_state: Value,
    /// Optional view shown to the event-stream consumer, never cached.
    pub client_view: Option<Value>,
}

impl WorkerOutput {
    /// Construct an output with no client-facing view.
    #[must_use]
    pub fn new(runtime_state: Value) -> Self {
        Self {
            runtime_state,
            client_view: None,
        }
    }

    /// Attach a client view.
    #[must_use]
    pub fn with_client_view(mut self, view: Value) -> Self {
        self.client_view = Some(view);
        self
    }
}

/// Sidecar metadata persisted alongside `<key>.json` as `<key>.meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactMeta {
    /// Fingerprint of the input that produced this artifact.
    pub inputs: Fingerprint,
    /// Model-defaults salt active when this artifact was produced.
    pub salt: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: DateTime<Utc>,
}

impl ArtifactMeta {
    /// `true` when this metadata matches the fingerprint/salt of a new call,
    /// i.e. I3's cache-hit condition.
    #[must_use]
    pub fn matches(&self, fingerprint: &str, salt: &str) -> bool {
        self.inputs == fingerprint && self.salt == salt
    }
}

/// An in-memory view of a persisted artifact: state plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// The worker key this artifact belongs to.
    pub key: String,
    /// The persisted runtime state.
    pub runtime_state: Value,
    /// The sidecar metadata.
    pub meta: ArtifactMeta,
}

/// Which persistence strategy a worker uses, per §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategyKind {
    /// Content-addressed reuse: a cache hit skips `run` entirely.
    Json,
    /// Always rewrites; `tryLoad` never reports a hit.
    Versioned,
}

/// Policy applied when a worker declares a `requires` key it never reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepsUsagePolicy {
    /// Unused requires are a hard error (default).
    Error,
    /// Unused requires are logged but do not fail the run.
    Warn,
    /// Unused requires are not reported at all.
    Ignore,
}

impl Default for DepsUsagePolicy {
    fn default() -> Self {
        Self::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_meta_matches_requires_both_fields() {
        let meta = ArtifactMeta {
            inputs: "abc".into(),
            salt: "s1".into(),
            created_at: Utc::now(),
        };
        assert!(meta.matches("abc", "s1"));
        assert!(!meta.matches("abc", "s2"));
        assert!(!meta.matches("def", "s1"));
    }

    #[test]
    fn worker_output_builder() {
        let out = WorkerOutput::new(json!({"a": 1})).with_client_view(json!("hello"));
        assert_eq!(out.runtime_state, json!({"a": 1}));
        assert_eq!(out.client_view, Some(json!("hello")));
    }

    #[test]
    fn deps_usage_policy_defaults_to_error() {
        assert_eq!(DepsUsagePolicy::default(), DepsUsagePolicy::Error);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The handle the executor receives, per §6.

use ric_cache::FileArtifactStore;
use ric_core::{DepsUsagePolicy, LlmClient, ToolProvider};
use ric_registry::Registry;
use std::path::Path;
use std::sync::Arc;

/// Capabilities and configuration the executor reads from for every
/// worker run: where artifacts live, which specs are registered, which
/// tools and LLM client to dispatch through, and the run-wide cache
/// controls (`model_salt`, `force_from`, `deps_usage`).
pub trait Runtime: Send + Sync {
    /// This run's output directory.
    fn out_dir(&self) -> &Path;

    /// Repository root under analysis, a minimal stand-in for the
    /// out-of-scope `RepoFS` capability.
    fn repo_fs(&self) -> &Path;

    /// The artifact store backing every cache strategy.
    fn artifacts(&self) -> &FileArtifactStore;

    /// The merged registry of worker specs.
    fn resolver(&self) -> &Registry;

    /// The tool-call capability available to the tool loop.
    fn mcp(&self) -> &dyn ToolProvider;

    /// Salt folded into every worker's fingerprint, invalidating caches
    /// when model defaults change (§4.6).
    fn model_salt(&self) -> String;

    /// Worker key whose cache should be bypassed and whose downstream
    /// artifacts should be invalidated on a successful run, if any.
    fn force_from(&self) -> Option<&str>;

    /// Policy applied to declared-but-unread `requires` keys (§4.2).
    fn deps_usage(&self) -> DepsUsagePolicy;

    /// The LLM client workers dispatch through.
    fn llm(&self) -> &Arc<dyn LlmClient>;
}

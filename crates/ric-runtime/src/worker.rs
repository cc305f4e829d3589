// SPDX-License-Identifier: MIT OR Apache-2.0
//! The executable counterpart to [`ric_registry::WorkerMeta`].

use crate::runtime::Runtime;
use async_trait::async_trait;
use ric_core::{RunContext, WorkerOutput};
use ric_error::RicError;
use ric_registry::Deps;
use serde_json::Value;

/// One worker's executable behavior: build its input from predecessor
/// artifacts, then run against that input.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Normalized key, matching the registry's [`ric_registry::WorkerMeta::key`].
    fn key(&self) -> &str;

    /// Build this worker's input from its declared predecessors (§4.3 step 3).
    ///
    /// # Errors
    ///
    /// Returns an error if a predecessor read fails (e.g.
    /// [`RicError::UnlistedRequire`]) or the input cannot otherwise be
    /// constructed.
    fn build_input(&self, ctx: &RunContext, deps: &Deps<'_>) -> Result<Value, RicError>;

    /// Execute against `input`, returning the artifact to persist.
    ///
    /// # Errors
    ///
    /// Returns whatever error the worker's own logic or its LLM/tool calls
    /// produce.
    async fn run(&self, ctx: &RunContext, input: &Value, runtime: &dyn Runtime) -> Result<WorkerOutput, RicError>;
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability contracts the core depends on but never implements: the LLM
//! wire client, tool execution, the event sink, and the interaction port.
//! Concrete implementations are external collaborators (§1).

use crate::context::RunContext;
use crate::model::RateLimitHeaders;
use async_trait::async_trait;
use ric_error::RicError;
use serde_json::Value;
use uuid::Uuid;

/// The LLM wire capability the core dispatches through, opaque beyond this
/// contract (§4.5).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Request a single JSON completion.
    async fn generate_json(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
    ) -> Result<String, RicError>;

    /// Request a streamed JSON completion, invoking `on_chunk` for each
    /// delta as it arrives.
    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError>;

    /// Estimate the token count of `text`.
    fn count_tokens(&self, text: &str) -> usize;

    /// Maximum prompt+completion tokens this client accepts.
    fn token_capacity(&self) -> usize;

    /// Human-readable client name, used in logs and the client cache key.
    fn name(&self) -> &str;

    /// Release any held resources. Called at most once per distinct client.
    async fn close(&self);

    /// Normalized rate-limit headers from the most recent call, if the
    /// provider exposes them. Used by the header-respect middleware layer.
    fn last_headers(&self) -> Option<RateLimitHeaders> {
        None
    }
}

/// One callable tool surfaced to the tool loop (§4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Tool name, matched against the allow-list and `ActionEnvelope.tool_name`.
    pub name: String,
    /// Human-readable description shown to the LLM.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
    /// JSON Schema for the tool's output.
    pub output_schema: Value,
}

/// Tool execution capability (§4.8). Concrete providers (scan, file-read,
/// word-index, snippet collection) are external collaborators.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Enumerate the tools this provider exposes.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Invoke `name` with `input`, returning its JSON result.
    async fn call(&self, ctx: &RunContext, name: &str, input: Value) -> Result<Value, RicError>;
}

/// Sink for progress/log/LLM-chunk/complete/error events (§6).
///
/// Implementations may drop events under backpressure; `emit` must never
/// block.
pub trait EventEmitter: Send + Sync {
    /// Best-effort, non-blocking emit of one event.
    fn emit(&self, event: crate::event::Event);
}

/// Host-provided port that pauses a worker until external user input
/// arrives for a run (§4.7).
#[async_trait]
pub trait InteractionWaiter: Send + Sync {
    /// Block until the host supplies the next user turn, or `ctx` is
    /// cancelled/times out.
    async fn wait_for_input(&self, ctx: &RunContext, run_id: Uuid) -> Result<String, RicError>;

    /// Stream an assistant message without blocking on a reply.
    async fn publish_output(
        &self,
        ctx: &RunContext,
        run_id: Uuid,
        interaction_id: &str,
        message: &str,
    ) -> Result<(), RicError>;
}

/// Best-effort before/after observation hook attached to a context (§4.5
/// layer 5).
pub trait Hook: Send + Sync {
    /// Called immediately before an inner LLM call.
    fn before(&self, worker: &str, phase: &str);
    /// Called immediately after, with a short outcome description.
    fn after(&self, worker: &str, phase: &str, outcome: &str);
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool loop (§4.8): `{tool, final}` action envelopes against a
//! [`ToolProvider`], with allow-list enforcement and an iteration cap.

use ric_core::{RunContext, ToolProvider};
use ric_error::RicError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// What the model asked for on one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Call a tool and feed its result back in.
    Tool,
    /// Stop the loop and return `final`.
    Final,
}

/// One turn's raw decoded payload, before allow-list enforcement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionEnvelope {
    /// The requested action, if the payload carried one at all.
    pub action: Option<Action>,
    /// Tool name for `action = tool`.
    pub tool_name: Option<String>,
    /// Tool input for `action = tool`.
    pub tool_input: Option<Value>,
    /// Final answer for `action = r#final`.
    #[serde(rename = "final")]
    pub r#final: Option<Value>,
}

/// Decode `raw` into an [`ActionEnvelope`], falling back to treating it as a
/// bare final answer when it carries none of `action`/`tool_name`/`final`
/// (§4.8's heuristic fallback).
#[must_use]
pub fn parse_envelope(raw: &Value) -> ActionEnvelope {
    if let Ok(envelope) = serde_json::from_value::<ActionEnvelope>(raw.clone()) {
        if envelope.action.is_some() || envelope.tool_name.is_some() || envelope.r#final.is_some() {
            return envelope;
        }
    }
    ActionEnvelope {
        action: Some(Action::Final),
        tool_name: None,
        tool_input: None,
        r#final: Some(raw.clone()),
    }
}

/// Drive the tool loop: repeatedly calls `next_turn` with the running
/// transcript, dispatches `tool` actions through `mcp` (rejecting names
/// outside `allowed` when it is non-empty), and appends each tool result
/// back into the transcript until a `final` action is produced or
/// `max_iters` is exceeded.
///
/// # Errors
///
/// Returns [`RicError::ToolNotAllowed`] for a disallowed tool,
/// [`RicError::MaxIterations`] once the cap is exceeded, or whatever error
/// `next_turn`/`mcp.call` produce.
pub async fn run_tool_loop<F, Fut>(
    ctx: &RunContext,
    mcp: &dyn ToolProvider,
    allowed: &BTreeSet<String>,
    max_iters: u32,
    mut transcript: Value,
    mut next_turn: F,
) -> Result<Value, RicError>
where
    F: FnMut(Value) -> Fut,
    Fut: std::future::Future<Output = Result<Value, RicError>>,
{
    for _ in 0..max_iters {
        let raw = next_turn(transcript.clone()).await?;
        let envelope = parse_envelope(&raw);

        match envelope.action.unwrap_or(Action::Final) {
            Action::Final => {
                return Ok(envelope.r#final.unwrap_or(raw));
            }
            Action::Tool => {
                let tool_name = envelope.tool_name.clone().unwrap_or_default();
                if !allowed.is_empty() && !allowed.contains(&tool_name) {
                    return Err(RicError::ToolNotAllowed { tool: tool_name });
                }
                let input = envelope.tool_input.clone().unwrap_or(Value::Null);
                let result = mcp.call(ctx, &tool_name, input).await?;
                transcript = append_tool_result(transcript, &tool_name, &result);
            }
        }
    }
    Err(RicError::MaxIterations { max_iters })
}

fn append_tool_result(transcript: Value, tool_name: &str, result: &Value) -> Value {
    let mut entries = match transcript {
        Value::Array(entries) => entries,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    entries.push(serde_json::json!({ "tool": tool_name, "result": result }));
    Value::Array(entries)
}

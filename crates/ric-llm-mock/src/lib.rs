// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use async_trait::async_trait;
use ric_core::{LlmClient, RateLimitHeaders, RunContext, ToolProvider, ToolSpec};
use ric_error::RicError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Canned `LlmClient`: replays a fixed queue of responses, holding on the
/// last one once exhausted. Records every prompt it was asked to answer.
pub struct MockLlmClient {
    responses: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// Seed the client with `responses`, returned in order.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().expect("mock llm client mutex poisoned");
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses.last().cloned().unwrap_or_else(|| "{}".to_string())
        }
    }

    /// Prompts seen so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock llm client mutex poisoned").clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate_json(&self, _ctx: &RunContext, prompt: &str, _input: &Value) -> Result<String, RicError> {
        self.calls.lock().expect("mock llm client mutex poisoned").push(prompt.to_string());
        Ok(self.next_response())
    }

    async fn generate_json_stream(
        &self,
        _ctx: &RunContext,
        prompt: &str,
        _input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        self.calls.lock().expect("mock llm client mutex poisoned").push(prompt.to_string());
        let response = self.next_response();
        for chunk in response.as_bytes().chunks(16) {
            on_chunk(std::str::from_utf8(chunk).unwrap_or(""));
        }
        Ok(response)
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn token_capacity(&self) -> usize {
        100_000
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn close(&self) {}

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        None
    }
}

/// Canned `ToolProvider`: a fixed `name -> result` map, recording every
/// call it receives.
pub struct MockToolProvider {
    results: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockToolProvider {
    /// Seed the provider with `results`.
    #[must_use]
    pub fn new(results: HashMap<String, Value>) -> Self {
        Self {
            results,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls seen so far, in order, as `(tool_name, input)`.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("mock tool provider mutex poisoned").clone()
    }
}

#[async_trait]
impl ToolProvider for MockToolProvider {
    fn specs(&self) -> Vec<ToolSpec> {
        self.results
            .keys()
            .map(|name| ToolSpec {
                name: name.clone(),
                description: String::new(),
                input_schema: Value::Null,
                output_schema: Value::Null,
            })
            .collect()
    }

    async fn call(&self, _ctx: &RunContext, name: &str, input: Value) -> Result<Value, RicError> {
        self.calls.lock().expect("mock tool provider mutex poisoned").push((name.to_string(), input));
        self.results
            .get(name)
            .cloned()
            .ok_or_else(|| RicError::ToolNotAllowed { tool: name.to_string() })
    }
}

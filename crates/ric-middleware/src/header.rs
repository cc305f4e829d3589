// SPDX-License-Identifier: MIT OR Apache-2.0
//! Header-respect middleware (§4.5 step 3, P10).

use async_trait::async_trait;
use ric_core::{LlmClient, RateLimitHeaders, RunContext};
use ric_error::RicError;
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// After each inner call, reads the client's normalized rate-limit headers
/// and delays the *next* call by at least `retry_after_sec` seconds
/// (falling back to `reset_requests`/`reset_tokens` when `retry_after_sec`
/// is absent), per P10.
pub struct HeaderRespectClient {
    inner: std::sync::Arc<dyn LlmClient>,
    not_before: Mutex<Option<Instant>>,
}

impl HeaderRespectClient {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: std::sync::Arc<dyn LlmClient>) -> Self {
        Self {
            inner,
            not_before: Mutex::new(None),
        }
    }

    async fn wait_if_needed(&self, ctx: &RunContext) -> Result<(), RicError> {
        let deadline = *self.not_before.lock().expect("header-respect mutex poisoned");
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if deadline > now {
                let remaining = deadline - now;
                tokio::select! {
                    () = tokio::time::sleep(remaining) => {}
                    () = ctx.cancellation().cancelled() => return Err(RicError::RateCreditExhausted),
                }
            }
        }
        Ok(())
    }

    fn record_headers(&self, headers: Option<RateLimitHeaders>) {
        let Some(headers) = headers else { return };
        let wait_secs = headers
            .retry_after_sec
            .or(headers.reset_requests)
            .or(headers.reset_tokens);
        if let Some(secs) = wait_secs {
            let mut guard = self.not_before.lock().expect("header-respect mutex poisoned");
            *guard = Some(Instant::now() + Duration::from_secs(u64::from(secs)));
        }
    }
}

#[async_trait]
impl LlmClient for HeaderRespectClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        self.wait_if_needed(ctx).await?;
        let result = self.inner.generate_json(ctx, prompt, input).await;
        self.record_headers(self.inner.last_headers());
        result
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        self.wait_if_needed(ctx).await?;
        let result = self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await;
        self.record_headers(self.inner.last_headers());
        result
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "header-respect"
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        self.inner.last_headers()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Global rate-limit with credit bypass (§4.5 step 6).

use async_trait::async_trait;
use ric_core::{LlmClient, RateLimitHeaders, RunContext};
use ric_error::RicError;
use ric_ratelimit::MultiLimiter;
use serde_json::Value;
use std::sync::Arc;

/// Gates calls through a shared [`MultiLimiter`], unless the context has a
/// reserved credit available: `ctx.take_credit()` succeeding bypasses the
/// limiter entirely for that call.
pub struct CreditBypassRateLimitedClient {
    inner: Arc<dyn LlmClient>,
    limiter: Arc<MultiLimiter>,
}

impl CreditBypassRateLimitedClient {
    /// Wrap `inner`, gating every call (without a reserved credit) through
    /// `limiter`.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, limiter: Arc<MultiLimiter>) -> Self {
        Self { inner, limiter }
    }

    async fn admit(&self, ctx: &RunContext) -> Result<(), RicError> {
        if ctx.take_credit() {
            return Ok(());
        }
        self.limiter.acquire(ctx.cancellation()).await
    }
}

#[async_trait]
impl LlmClient for CreditBypassRateLimitedClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        self.admit(ctx).await?;
        self.inner.generate_json(ctx, prompt, input).await
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        self.admit(ctx).await?;
        self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "rate-limit-credit-bypass"
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        self.inner.last_headers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ric_core::RateLimitConfig;
    use std::time::{Duration, Instant};

    struct EchoClient;

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn generate_json(&self, _: &RunContext, _: &str, _: &Value) -> Result<String, RicError> {
            Ok("{}".to_string())
        }
        async fn generate_json_stream(
            &self,
            _: &RunContext,
            _: &str,
            _: &Value,
            _: &mut (dyn FnMut(&str) + Send),
        ) -> Result<String, RicError> {
            Ok("{}".to_string())
        }
        fn count_tokens(&self, _: &str) -> usize {
            0
        }
        fn token_capacity(&self) -> usize {
            1000
        }
        fn name(&self) -> &str {
            "echo"
        }
        async fn close(&self) {}
        fn last_headers(&self) -> Option<RateLimitHeaders> {
            None
        }
    }

    #[tokio::test]
    async fn reserved_credits_bypass_the_limiter_per_scenario_5() {
        let config = RateLimitConfig {
            rps: 1,
            burst: 1,
            ..Default::default()
        };
        let limiter = Arc::new(MultiLimiter::from_config(&config, 1));
        let client = CreditBypassRateLimitedClient::new(Arc::new(EchoClient), limiter);
        let ctx = RunContext::new(uuid::Uuid::nil()).with_credits(2);

        let start = Instant::now();
        client.generate_json(&ctx, "p", &Value::Null).await.unwrap();
        client.generate_json(&ctx, "p", &Value::Null).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));

        client.generate_json(&ctx, "p", &Value::Null).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}

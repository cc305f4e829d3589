// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry wrapping (§4.5 step 4, P9) and logging/hooks (§4.5 step 5).

use async_trait::async_trait;
use ric_core::{Hook, LlmClient, RateLimitHeaders, RunContext};
use ric_error::RicError;
use ric_retry::RetryPolicy;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Retries the inner call under `policy`, racing backoff sleeps against the
/// context's cancellation token.
pub struct RetryingClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        self.policy
            .retry(ctx.cancellation(), || self.inner.generate_json(ctx, prompt, input))
            .await
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        // A single retry attempt owns the whole stream; replaying a partial
        // stream on retry would double-emit chunks already delivered, so we
        // only retry the call as a unit and let the inner client decide how
        // much of the stream (if any) to re-open.
        self.policy
            .retry(ctx.cancellation(), || self.inner.generate_json_stream(ctx, prompt, input, on_chunk))
            .await
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "retry"
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        self.inner.last_headers()
    }
}

/// Calls the context's [`Hook`] before and after each inner call and emits a
/// `tracing` span, per §4.9. Hook failures never propagate: a hook is
/// best-effort observability, not part of the call's correctness.
pub struct LoggingClient {
    inner: Arc<dyn LlmClient>,
}

impl LoggingClient {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self { inner }
    }

    fn before(&self, ctx: &RunContext, phase: &str) {
        if let Some(hook) = ctx.hook() {
            hook.before(ctx.worker_key(), phase);
        }
    }

    fn after(&self, ctx: &RunContext, phase: &str, outcome: &str) {
        if let Some(hook) = ctx.hook() {
            hook.after(ctx.worker_key(), phase, outcome);
        }
    }
}

#[async_trait]
impl LlmClient for LoggingClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        let span = tracing::info_span!("middleware.llm", worker = ctx.worker_key(), run_id = %ctx.run_id());
        async {
            self.before(ctx, "generate_json");
            let result = self.inner.generate_json(ctx, prompt, input).await;
            match &result {
                Ok(_) => self.after(ctx, "generate_json", "ok"),
                Err(err) => self.after(ctx, "generate_json", &err.to_string()),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        let span = tracing::info_span!("middleware.llm", worker = ctx.worker_key(), run_id = %ctx.run_id());
        async {
            self.before(ctx, "generate_json_stream");
            let result = self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await;
            match &result {
                Ok(_) => self.after(ctx, "generate_json_stream", "ok"),
                Err(err) => self.after(ctx, "generate_json_stream", &err.to_string()),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "logging"
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
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FlakyClient {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn generate_json(&self, _: &RunContext, _: &str, _: &Value) -> Result<String, RicError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(RicError::Unknown("transient".into()));
            }
            Ok("{}".to_string())
        }
        async fn generate_json_stream(
            &self,
            ctx: &RunContext,
            prompt: &str,
            input: &Value,
            _: &mut (dyn FnMut(&str) + Send),
        ) -> Result<String, RicError> {
            self.generate_json(ctx, prompt, input).await
        }
        fn count_tokens(&self, _: &str) -> usize {
            0
        }
        fn token_capacity(&self) -> usize {
            1000
        }
        fn name(&self) -> &str {
            "flaky"
        }
        async fn close(&self) {}
        fn last_headers(&self) -> Option<RateLimitHeaders> {
            None
        }
    }

    #[tokio::test]
    async fn retrying_client_recovers_from_transient_failure_per_p9() {
        let inner = Arc::new(FlakyClient {
            failures_left: AtomicU32::new(2),
        });
        let policy = RetryPolicy::builder().max_attempts(3).base_delay(Duration::from_millis(1)).build();
        let client = RetryingClient::new(inner, policy);
        let ctx = RunContext::new(uuid::Uuid::nil());
        let result = client.generate_json(&ctx, "p", &Value::Null).await;
        assert_eq!(result.unwrap(), "{}");
    }

    struct RecordingHook {
        events: Mutex<Vec<String>>,
    }

    impl Hook for RecordingHook {
        fn before(&self, worker: &str, phase: &str) {
            self.events.lock().unwrap().push(format!("before:{worker}:{phase}"));
        }
        fn after(&self, worker: &str, phase: &str, outcome: &str) {
            self.events.lock().unwrap().push(format!("after:{worker}:{phase}:{outcome}"));
        }
    }

    #[tokio::test]
    async fn logging_client_invokes_hook_before_and_after() {
        let inner = Arc::new(FlakyClient {
            failures_left: AtomicU32::new(0),
        });
        let hook = Arc::new(RecordingHook { events: Mutex::new(Vec::new()) });
        let client = LoggingClient::new(inner);
        let ctx = RunContext::new(uuid::Uuid::nil()).with_hook(hook.clone());

        client.generate_json(&ctx, "p", &Value::Null).await.unwrap();

        let events = hook.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("before:"));
        assert!(events[1].starts_with("after:") && events[1].ends_with(":ok"));
    }
}

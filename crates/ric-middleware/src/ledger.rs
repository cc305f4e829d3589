// SPDX-License-Identifier: MIT OR Apache-2.0
//! Usage ledger, the innermost layer of the chain (§4.5 step 7).

use async_trait::async_trait;
use chrono::Utc;
use ric_core::{LlmClient, RateLimitHeaders, RunContext};
use ric_error::RicError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Per-day, per-model request/error/token counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageCounters {
    /// Number of calls attempted.
    pub requests: u64,
    /// Number of calls that returned an error.
    pub errors: u64,
    /// Tokens attributed to this model on this day.
    pub tokens: u64,
}

/// `ledger[date][model] -> counters`, serialized as the whole-file JSON
/// document persisted at `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageLedgerDocument {
    days: BTreeMap<String, BTreeMap<String, UsageCounters>>,
}

/// Mutex-guarded in-memory ledger, flushed to `path` on every update. A
/// flush failure is logged and swallowed: accounting must never fail the
/// LLM call it is measuring (§7).
pub struct UsageLedger {
    path: PathBuf,
    doc: Mutex<UsageLedgerDocument>,
}

impl UsageLedger {
    /// Load (or initialize) the ledger at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    fn record(&self, model: &str, tokens: u64, errored: bool) {
        let date = Utc::now().date_naive().to_string();
        let mut doc = self.doc.lock().expect("usage ledger mutex poisoned");
        let entry = doc.days.entry(date).or_default().entry(model.to_string()).or_default();
        entry.requests += 1;
        entry.tokens += tokens;
        if errored {
            entry.errors += 1;
        }

        if let Err(err) = flush(&self.path, &doc) {
            tracing::warn!(path = %self.path.display(), error = %err, "usage ledger flush failed");
        }
    }

    /// Snapshot the ledger document for inspection (tests, CLI reporting).
    #[must_use]
    pub fn snapshot(&self) -> UsageLedgerDocument {
        self.doc.lock().expect("usage ledger mutex poisoned").clone()
    }
}

fn flush(path: &Path, doc: &UsageLedgerDocument) -> Result<(), std::io::Error> {
    let raw = serde_json::to_string_pretty(doc)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, raw)
}

/// Attributes each call to `model` in the shared [`UsageLedger`].
pub struct LedgeredClient {
    inner: Arc<dyn LlmClient>,
    ledger: Arc<UsageLedger>,
    model: String,
}

impl LedgeredClient {
    /// Wrap `inner`, accounting every call against `model` in `ledger`.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, ledger: Arc<UsageLedger>, model: impl Into<String>) -> Self {
        Self {
            inner,
            ledger,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for LedgeredClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        let result = self.inner.generate_json(ctx, prompt, input).await;
        let tokens = result.as_ref().map(|out| self.inner.count_tokens(out)).unwrap_or(0) as u64;
        self.ledger.record(&self.model, tokens, result.is_err());
        result
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        let result = self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await;
        let tokens = result.as_ref().map(|out| self.inner.count_tokens(out)).unwrap_or(0) as u64;
        self.ledger.record(&self.model, tokens, result.is_err());
        result
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "usage-ledger"
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        self.inner.last_headers()
    }
}

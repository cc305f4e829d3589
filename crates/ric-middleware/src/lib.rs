// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod header;
mod ledger;
mod ratelimit_credit;
mod retry_log;
mod select;

pub use header::HeaderRespectClient;
pub use ledger::{LedgeredClient, UsageCounters, UsageLedger, UsageLedgerDocument};
pub use ratelimit_credit::CreditBypassRateLimitedClient;
pub use retry_log::{LoggingClient, RetryingClient};
pub use select::{ClientFactory, ModelSelectClient};

use ric_core::LlmClient;
use ric_models::ModelRegistry;
use ric_ratelimit::MultiLimiter;
use ric_retry::RetryPolicy;
use std::sync::{Arc, Mutex};

/// Builds the canonical outermost-to-innermost chain from §4.5: model-select
/// + dispatch, header-respect, retry, logging/hooks, rate-limit (credit
/// bypassed), usage ledger, wrapping `inner`.
pub fn build_chain(
    inner: Arc<dyn LlmClient>,
    registry: Arc<Mutex<ModelRegistry>>,
    factory: Arc<dyn ClientFactory>,
    retry_policy: RetryPolicy,
    limiter: Arc<MultiLimiter>,
    ledger: Arc<UsageLedger>,
    ledger_model: impl Into<String>,
) -> Arc<dyn LlmClient> {
    let chain: Arc<dyn LlmClient> = Arc::new(LedgeredClient::new(inner, ledger, ledger_model));
    let chain: Arc<dyn LlmClient> = Arc::new(CreditBypassRateLimitedClient::new(chain, limiter));
    let chain: Arc<dyn LlmClient> = Arc::new(LoggingClient::new(chain));
    let chain: Arc<dyn LlmClient> = Arc::new(RetryingClient::new(chain, retry_policy));
    let chain: Arc<dyn LlmClient> = Arc::new(HeaderRespectClient::new(chain));
    Arc::new(ModelSelectClient::new(chain, registry, factory))
}

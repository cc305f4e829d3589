// SPDX-License-Identifier: MIT OR Apache-2.0
//! Model-selection data types shared by the model registry and middleware.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role a worker plays when requesting a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A worker executing one pipeline stage.
    Worker,
    /// A worker planning or orchestrating other workers.
    Planner,
}

/// Requested model capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTier {
    /// Cheapest / fastest tier.
    Low,
    /// Default tier.
    Middle,
    /// Capable tier for harder reasoning.
    High,
    /// Most capable tier available.
    Xhigh,
}

/// How the model-select middleware chooses among equally-tiered candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Always use the registry default for the requested role+tier.
    Fixed,
    /// Score candidates by remaining tokens/requests and pick the best.
    PreferAvailable,
}

/// Static, immutable description of one registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelProfile {
    /// Provider name, e.g. `"openai"`.
    pub provider: String,
    /// Capability tier this model is registered under.
    pub tier: CapabilityTier,
    /// Concrete model identifier, e.g. `"gpt-4.1"`.
    pub model: String,
    /// Role this profile is intended for.
    pub role: Role,
    /// Maximum prompt+completion tokens this model accepts.
    pub max_tokens: u32,
    /// Optional per-model rate-limit override.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Token-bucket / counter configuration. A field of `0` means "disabled".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RateLimitConfig {
    /// Requests per second.
    pub rps: u32,
    /// Burst size for the RPS bucket.
    pub burst: u32,
    /// Requests per minute.
    pub rpm: u32,
    /// Requests per day.
    pub rpd: u32,
    /// Tokens per minute.
    pub tpm: u32,
    /// Tokens per day.
    pub tpd: u32,
}

impl RateLimitConfig {
    /// `true` when every field is `0`, i.e. the limiter is fully disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        *self == Self::default()
    }
}

/// Rate-limit headers normalized from a provider response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RateLimitHeaders {
    /// Seconds the caller should wait before retrying, if present.
    pub retry_after_sec: Option<u32>,
    /// Provider's advertised request-count ceiling for the current window.
    pub limit_requests: Option<u32>,
    /// Provider's advertised token ceiling for the current window.
    pub limit_tokens: Option<u32>,
    /// Requests remaining in the current window.
    pub remaining_requests: Option<u32>,
    /// Tokens remaining in the current window.
    pub remaining_tokens: Option<u32>,
    /// Seconds until the request window resets.
    pub reset_requests: Option<u32>,
    /// Seconds until the token window resets.
    pub reset_tokens: Option<u32>,
}

impl RateLimitHeaders {
    /// Score used by "prefer-available" selection: prefer remaining tokens,
    /// falling back to remaining requests, per §4.5.
    #[must_use]
    pub fn availability_score(&self) -> Option<u32> {
        self.remaining_tokens.or(self.remaining_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_limit_is_disabled() {
        assert!(RateLimitConfig::default().is_disabled());
    }

    #[test]
    fn nonzero_field_is_not_disabled() {
        let cfg = RateLimitConfig {
            rps: 5,
            ..Default::default()
        };
        assert!(!cfg.is_disabled());
    }

    #[test]
    fn availability_prefers_tokens_over_requests() {
        let headers = RateLimitHeaders {
            remaining_tokens: Some(100),
            remaining_requests: Some(5),
            ..Default::default()
        };
        assert_eq!(headers.availability_score(), Some(100));
    }

    #[test]
    fn availability_falls_back_to_requests() {
        let headers = RateLimitHeaders {
            remaining_requests: Some(5),
            ..Default::default()
        };
        assert_eq!(headers.availability_score(), Some(5));
    }

    #[test]
    fn capability_tier_orders_low_to_xhigh() {
        assert!(CapabilityTier::Low < CapabilityTier::Middle);
        assert!(CapabilityTier::Middle < CapabilityTier::High);
        assert!(CapabilityTier::High < CapabilityTier::Xhigh);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use async_trait::async_trait;
use ric_core::{CapabilityTier, LlmClient, ModelProfile, RateLimitHeaders, Role, RunContext};
use ric_error::RicError;
use ric_ratelimit::{MultiLimiter, TokenBucket};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

fn blank(s: Option<&str>) -> bool {
    s.map_or(true, |v| v.trim().is_empty())
}

/// Indexes registered [`ModelProfile`]s by `(provider, model)` and by
/// `(role, tier)` default, and resolves a call's requested role/tier/
/// provider/model into a concrete pair per §4.6.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    profiles: BTreeMap<(String, String), ModelProfile>,
    defaults: HashMap<(Role, CapabilityTier), (String, String)>,
}

impl ModelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `profile`, indexed by `(provider, model)`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `provider` or `model` is blank.
    pub fn register_model(&mut self, profile: ModelProfile) -> Result<(), RicError> {
        if profile.provider.trim().is_empty() || profile.model.trim().is_empty() {
            return Err(RicError::Configuration(
                "model profile requires a non-blank provider and model".to_string(),
            ));
        }
        self.profiles
            .insert((profile.provider.clone(), profile.model.clone()), profile);
        Ok(())
    }

    /// Name `(provider, model)` as the default for `role` + `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`RicError::ModelNotRegistered`] if the pair isn't registered.
    pub fn set_default(
        &mut self,
        role: Role,
        tier: CapabilityTier,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<(), RicError> {
        let provider = provider.into();
        let model = model.into();
        if !self.profiles.contains_key(&(provider.clone(), model.clone())) {
            return Err(RicError::ModelNotRegistered { provider, model });
        }
        self.defaults.insert((role, tier), (provider, model));
        Ok(())
    }

    /// Look up a registered profile.
    #[must_use]
    pub fn profile(&self, provider: &str, model: &str) -> Option<&ModelProfile> {
        self.profiles.get(&(provider.to_string(), model.to_string()))
    }

    /// Resolve a call's requested role/tier/provider/model into a concrete
    /// `(provider, model)` pair per §4.6.
    ///
    /// # Errors
    ///
    /// Returns [`RicError::ModelLevelRequired`] if both are blank and no
    /// default or candidate exists for `role` + `tier`, or
    /// [`RicError::ModelNotRegistered`] if an explicit pair isn't
    /// registered.
    pub fn resolve(
        &self,
        role: Role,
        tier: CapabilityTier,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<(String, String), RicError> {
        match (blank(provider), blank(model)) {
            (true, true) => self
                .defaults
                .get(&(role, tier))
                .cloned()
                .or_else(|| self.first_candidate(role, tier))
                .ok_or_else(|| RicError::ModelLevelRequired {
                    role: format!("{role:?}"),
                    tier: format!("{tier:?}"),
                }),
            (false, true) => {
                let (_, default_model) =
                    self.defaults
                        .get(&(role, tier))
                        .ok_or_else(|| RicError::ModelLevelRequired {
                            role: format!("{role:?}"),
                            tier: format!("{tier:?}"),
                        })?;
                let provider = provider.unwrap().to_string();
                let model = default_model.clone();
                self.require_registered(provider, model)
            }
            (true, false) => {
                let (default_provider, _) =
                    self.defaults
                        .get(&(role, tier))
                        .ok_or_else(|| RicError::ModelLevelRequired {
                            role: format!("{role:?}"),
                            tier: format!("{tier:?}"),
                        })?;
                let provider = default_provider.clone();
                let model = model.unwrap().to_string();
                self.require_registered(provider, model)
            }
            (false, false) => {
                self.require_registered(provider.unwrap().to_string(), model.unwrap().to_string())
            }
        }
    }

    fn require_registered(&self, provider: String, model: String) -> Result<(String, String), RicError> {
        if self.profiles.contains_key(&(provider.clone(), model.clone())) {
            Ok((provider, model))
        } else {
            Err(RicError::ModelNotRegistered { provider, model })
        }
    }

    fn first_candidate(&self, role: Role, tier: CapabilityTier) -> Option<(String, String)> {
        self.profiles
            .values()
            .find(|p| p.role == role && p.tier == tier)
            .map(|p| (p.provider.clone(), p.model.clone()))
    }

    /// A canonical string listing every `(role, tier) -> (provider, model)`
    /// default, folded into every worker's fingerprint so that changing a
    /// default invalidates dependent caches (§4.6).
    #[must_use]
    pub fn defaults_salt(&self) -> String {
        let mut entries: Vec<String> = self
            .defaults
            .iter()
            .map(|((role, tier), (provider, model))| format!("{role:?}:{tier:?}={provider}::{model}"))
            .collect();
        entries.sort_unstable();
        let mut out = String::new();
        for entry in entries {
            let _ = write!(out, "{entry};");
        }
        out
    }

    /// Build a bound client for `(provider, model)`, wrapping `raw` with
    /// this profile's rate-limit config (if any) in the order
    /// multi-limit → day-token-limit → per-second-limit, outside in.
    #[must_use]
    pub fn build_client(&self, provider: &str, model: &str, raw: Arc<dyn LlmClient>) -> Arc<dyn LlmClient> {
        let Some(profile) = self.profile(provider, model) else {
            return raw;
        };
        let Some(rate_limit) = profile.rate_limit else {
            return raw;
        };
        if rate_limit.is_disabled() {
            return raw;
        }

        let mut client = raw;

        if let Some(bucket) = TokenBucket::new(f64::from(rate_limit.rps), rate_limit.burst.max(1)) {
            client = Arc::new(RateLimitedClient::new(client, Arc::new(bucket)));
        }

        if rate_limit.tpd > 0 {
            let bucket = TokenBucket::new(f64::from(rate_limit.tpd) / 86_400.0, DEFAULT_TOKEN_ESTIMATE);
            if let Some(bucket) = bucket {
                client = Arc::new(RateLimitedClient::new(client, Arc::new(bucket)));
            }
        }

        let multi = MultiLimiter::from_config(&rate_limit, DEFAULT_TOKEN_ESTIMATE);
        if !multi.is_noop() {
            client = Arc::new(RateLimitedClient::new(client, Arc::new(multi)));
        }

        client
    }
}

const DEFAULT_TOKEN_ESTIMATE: u32 = 1000;

#[async_trait]
trait Gate: Send + Sync {
    async fn acquire(&self, ctx: &RunContext) -> Result<(), RicError>;
}

#[async_trait]
impl Gate for TokenBucket {
    async fn acquire(&self, ctx: &RunContext) -> Result<(), RicError> {
        TokenBucket::acquire(self, ctx.cancellation()).await
    }
}

#[async_trait]
impl Gate for MultiLimiter {
    async fn acquire(&self, ctx: &RunContext) -> Result<(), RicError> {
        MultiLimiter::acquire(self, ctx.cancellation()).await
    }
}

/// An [`LlmClient`] decorator that acquires from a rate-limit gate before
/// every call, otherwise delegating to `inner` (§4.6's per-model wrapping).
struct RateLimitedClient {
    inner: Arc<dyn LlmClient>,
    gate: Arc<dyn Gate>,
}

impl RateLimitedClient {
    fn new(inner: Arc<dyn LlmClient>, gate: Arc<dyn Gate>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl LlmClient for RateLimitedClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        self.gate.acquire(ctx).await?;
        self.inner.generate_json(ctx, prompt, input).await
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        self.gate.acquire(ctx).await?;
        self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        self.inner.name()
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

    fn profile(provider: &str, model: &str, role: Role, tier: CapabilityTier) -> ModelProfile {
        ModelProfile {
            provider: provider.to_string(),
            tier,
            model: model.to_string(),
            role,
            max_tokens: 8000,
            rate_limit: None,
        }
    }

    #[test]
    fn resolve_both_blank_uses_default() {
        let mut registry = ModelRegistry::new();
        registry
            .register_model(profile("openai", "gpt-4.1", Role::Worker, CapabilityTier::Middle))
            .unwrap();
        registry
            .set_default(Role::Worker, CapabilityTier::Middle, "openai", "gpt-4.1")
            .unwrap();

        let resolved = registry
            .resolve(Role::Worker, CapabilityTier::Middle, None, None)
            .unwrap();
        assert_eq!(resolved, ("openai".to_string(), "gpt-4.1".to_string()));
    }

    #[test]
    fn resolve_both_blank_falls_back_to_first_candidate_without_default() {
        let mut registry = ModelRegistry::new();
        registry
            .register_model(profile("anthropic", "claude-x", Role::Worker, CapabilityTier::High))
            .unwrap();
        let resolved = registry
            .resolve(Role::Worker, CapabilityTier::High, None, None)
            .unwrap();
        assert_eq!(resolved, ("anthropic".to_string(), "claude-x".to_string()));
    }

    #[test]
    fn resolve_both_blank_errors_without_default_or_candidate() {
        let registry = ModelRegistry::new();
        let result = registry.resolve(Role::Worker, CapabilityTier::High, None, None);
        assert!(matches!(result, Err(RicError::ModelLevelRequired { .. })));
    }

    #[test]
    fn resolve_fills_blank_provider_from_default() {
        let mut registry = ModelRegistry::new();
        registry
            .register_model(profile("openai", "gpt-4.1", Role::Worker, CapabilityTier::Middle))
            .unwrap();
        registry
            .set_default(Role::Worker, CapabilityTier::Middle, "openai", "gpt-4.1")
            .unwrap();
        let resolved = registry
            .resolve(Role::Worker, CapabilityTier::Middle, None, Some("gpt-4.1"))
            .unwrap();
        assert_eq!(resolved.0, "openai");
    }

    #[test]
    fn resolve_explicit_pair_must_be_registered_per_i5() {
        let registry = ModelRegistry::new();
        let result = registry.resolve(
            Role::Worker,
            CapabilityTier::Middle,
            Some("openai"),
            Some("gpt-9000"),
        );
        assert!(matches!(result, Err(RicError::ModelNotRegistered { .. })));
    }

    #[test]
    fn set_default_requires_prior_registration() {
        let mut registry = ModelRegistry::new();
        let result = registry.set_default(Role::Worker, CapabilityTier::Low, "openai", "gpt-4.1");
        assert!(matches!(result, Err(RicError::ModelNotRegistered { .. })));
    }

    #[test]
    fn defaults_salt_changes_when_default_changes() {
        let mut registry = ModelRegistry::new();
        registry
            .register_model(profile("openai", "gpt-4.1", Role::Worker, CapabilityTier::Middle))
            .unwrap();
        registry
            .register_model(profile("openai", "gpt-5", Role::Worker, CapabilityTier::Middle))
            .unwrap();
        registry
            .set_default(Role::Worker, CapabilityTier::Middle, "openai", "gpt-4.1")
            .unwrap();
        let salt_before = registry.defaults_salt();
        registry
            .set_default(Role::Worker, CapabilityTier::Middle, "openai", "gpt-5")
            .unwrap();
        let salt_after = registry.defaults_salt();
        assert_ne!(salt_before, salt_after);
    }

    #[tokio::test]
    async fn build_client_returns_raw_when_no_rate_limit_configured() {
        struct Dummy;
        #[async_trait]
        impl LlmClient for Dummy {
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
                8000
            }
            fn name(&self) -> &str {
                "dummy"
            }
            async fn close(&self) {}
        }

        let mut registry = ModelRegistry::new();
        registry
            .register_model(profile("openai", "gpt-4.1", Role::Worker, CapabilityTier::Middle))
            .unwrap();
        let client = registry.build_client("openai", "gpt-4.1", Arc::new(Dummy));
        let ctx = RunContext::new(uuid::Uuid::nil());
        let result = client.generate_json(&ctx, "p", &Value::Null).await.unwrap();
        assert_eq!(result, "{}");
        let _ = RateLimitConfig::default();
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Model-select + model-dispatch, the outermost layer of the chain (§4.5
//! step 1-2).

use async_trait::async_trait;
use ric_core::{CapabilityTier, LlmClient, ModelProfile, RateLimitHeaders, Role, RunContext, SelectionMode};
use ric_error::RicError;
use ric_models::ModelRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type ClientKey = (Role, CapabilityTier, String, String, usize);

/// Factory building a raw, unwrapped client for a resolved model profile.
pub trait ClientFactory: Send + Sync {
    /// Build a fresh client for `profile`.
    fn build(&self, profile: &ModelProfile) -> Arc<dyn LlmClient>;
}

impl<F> ClientFactory for F
where
    F: Fn(&ModelProfile) -> Arc<dyn LlmClient> + Send + Sync,
{
    fn build(&self, profile: &ModelProfile) -> Arc<dyn LlmClient> {
        (self)(profile)
    }
}

/// Resolves a call's requested `(role, capability, provider?, model?)`
/// against a [`ModelRegistry`], dispatching to a cached, rate-limited
/// client and falling back to `inner` when the context requests no
/// selection at all.
///
/// The per-key client cache is guarded by a `Mutex`; a lookup miss builds
/// exactly one client per key even under concurrent callers, per §5's
/// check-then-insert rule.
pub struct ModelSelectClient {
    inner: Arc<dyn LlmClient>,
    registry: Arc<Mutex<ModelRegistry>>,
    factory: Arc<dyn ClientFactory>,
    cache: Mutex<HashMap<ClientKey, Arc<dyn LlmClient>>>,
}

impl ModelSelectClient {
    /// Wrap `inner` as the fallback used when no model selection is present
    /// in the context.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, registry: Arc<Mutex<ModelRegistry>>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            inner,
            registry,
            factory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolved_client(&self, ctx: &RunContext) -> Result<Option<Arc<dyn LlmClient>>, RicError> {
        let Some(selection) = ctx.model_selection() else {
            return Ok(None);
        };

        let registry = self.registry.lock().expect("model registry mutex poisoned");
        let (provider, model) = registry.resolve(
            selection.role,
            selection.capability,
            selection.provider.as_deref(),
            selection.model.as_deref(),
        )?;

        let profile = registry
            .profile(&provider, &model)
            .cloned()
            .ok_or_else(|| RicError::ModelNotRegistered {
                provider: provider.clone(),
                model: model.clone(),
            })?;

        let key: ClientKey = (selection.role, selection.capability, provider.clone(), model.clone(), profile.max_tokens as usize);

        if ctx.selection_mode() == SelectionMode::PreferAvailable {
            if let Some(best) = self.best_available(&registry, selection.role, selection.capability) {
                return Ok(Some(self.cached_or_build(key, &best)));
            }
        }

        Ok(Some(self.cached_or_build(key, &profile)))
    }

    fn best_available(&self, registry: &ModelRegistry, role: Role, tier: CapabilityTier) -> Option<ModelProfile> {
        let cache = self.cache.lock().expect("client cache mutex poisoned");
        cache
            .iter()
            .filter(|((r, t, _, _, _), _)| *r == role && *t == tier)
            .filter_map(|(key, client)| {
                client
                    .last_headers()
                    .and_then(|h: RateLimitHeaders| h.availability_score())
                    .map(|score| (score, key.clone()))
            })
            .max_by_key(|(score, _)| *score)
            .and_then(|(_, (_, _, provider, model, _))| registry.profile(&provider, &model).cloned())
    }

    fn cached_or_build(&self, key: ClientKey, profile: &ModelProfile) -> Arc<dyn LlmClient> {
        let mut cache = self.cache.lock().expect("client cache mutex poisoned");
        if let Some(existing) = cache.get(&key) {
            return existing.clone();
        }
        let raw = self.factory.build(profile);
        let registry = self.registry.lock().expect("model registry mutex poisoned");
        let wrapped = registry.build_client(&profile.provider, &profile.model, raw);
        cache.insert(key, wrapped.clone());
        wrapped
    }

    /// Close every distinct cached client exactly once, then the fallback.
    pub async fn close_all(&self) {
        let clients: Vec<Arc<dyn LlmClient>> = {
            let cache = self.cache.lock().expect("client cache mutex poisoned");
            cache.values().cloned().collect()
        };
        for client in clients {
            client.close().await;
        }
        self.inner.close().await;
    }
}

#[async_trait]
impl LlmClient for ModelSelectClient {
    async fn generate_json(&self, ctx: &RunContext, prompt: &str, input: &Value) -> Result<String, RicError> {
        match self.resolved_client(ctx)? {
            Some(client) => client.generate_json(ctx, prompt, input).await,
            None => self.inner.generate_json(ctx, prompt, input).await,
        }
    }

    async fn generate_json_stream(
        &self,
        ctx: &RunContext,
        prompt: &str,
        input: &Value,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, RicError> {
        match self.resolved_client(ctx)? {
            Some(client) => client.generate_json_stream(ctx, prompt, input, on_chunk).await,
            None => self.inner.generate_json_stream(ctx, prompt, input, on_chunk).await,
        }
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.count_tokens(text)
    }

    fn token_capacity(&self) -> usize {
        self.inner.token_capacity()
    }

    fn name(&self) -> &str {
        "model-select"
    }

    async fn close(&self) {
        self.close_all().await;
    }

    fn last_headers(&self) -> Option<RateLimitHeaders> {
        self.inner.last_headers()
    }
}

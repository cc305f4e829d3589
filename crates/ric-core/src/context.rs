// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-run context carrier (§9 "Context as a carrier").
//!
//! `RunContext` is immutable with respect to previously set values: every
//! `with_*` method consumes `self` and returns a new context, so a
//! middleware can enrich the context for its inner layers without ever
//! affecting what its caller sees.

use crate::capability::{EventEmitter, Hook, InteractionWaiter};
use crate::model::{CapabilityTier, Role, SelectionMode};
use ric_cancel::CancellationToken;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What a worker is asking the model-select middleware to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    /// Requested role.
    pub role: Role,
    /// Requested capability tier.
    pub capability: CapabilityTier,
    /// Explicit provider override, if any.
    pub provider: Option<String>,
    /// Explicit model override, if any.
    pub model: Option<String>,
}

/// Immutable, cheaply-cloneable carrier for everything middlewares and
/// workers need beyond their direct function arguments.
#[derive(Clone)]
pub struct RunContext {
    worker_key: String,
    run_id: Uuid,
    cancellation: CancellationToken,
    credits: Option<Arc<AtomicI64>>,
    hook: Option<Arc<dyn Hook>>,
    model_selection: Option<ModelSelection>,
    selection_mode: SelectionMode,
    emitter: Option<Arc<dyn EventEmitter>>,
    interaction_waiter: Option<Arc<dyn InteractionWaiter>>,
}

impl RunContext {
    /// Start a fresh context for `run_id`, not yet scoped to any worker.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            worker_key: String::new(),
            run_id,
            cancellation: CancellationToken::new(),
            credits: None,
            hook: None,
            model_selection: None,
            selection_mode: SelectionMode::Fixed,
            emitter: None,
            interaction_waiter: None,
        }
    }

    /// Return a new context scoped to `worker`.
    #[must_use]
    pub fn with_worker_key(mut self, worker: impl Into<String>) -> Self {
        self.worker_key = worker.into();
        self
    }

    /// Return a new context carrying `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Return a new context with `n` credits available for consumption.
    #[must_use]
    pub fn with_credits(mut self, n: i64) -> Self {
        self.credits = Some(Arc::new(AtomicI64::new(n)));
        self
    }

    /// Return a new context carrying `hook`.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Return a new context requesting `selection` at the given `mode`.
    #[must_use]
    pub fn with_model_selection(mut self, selection: ModelSelection, mode: SelectionMode) -> Self {
        self.model_selection = Some(selection);
        self.selection_mode = mode;
        self
    }

    /// Return a new context carrying `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Return a new context carrying `waiter`.
    #[must_use]
    pub fn with_interaction_waiter(mut self, waiter: Arc<dyn InteractionWaiter>) -> Self {
        self.interaction_waiter = Some(waiter);
        self
    }

    /// The worker key this context is currently scoped to.
    #[must_use]
    pub fn worker_key(&self) -> &str {
        &self.worker_key
    }

    /// The run this context belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The cancellation token scoping every suspension point (§5).
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// `true` once the outer request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The requested model selection, if any.
    #[must_use]
    pub fn model_selection(&self) -> Option<&ModelSelection> {
        self.model_selection.as_ref()
    }

    /// The active selection mode.
    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    /// The attached hook, if any.
    #[must_use]
    pub fn hook(&self) -> Option<&Arc<dyn Hook>> {
        self.hook.as_ref()
    }

    /// The attached event emitter, if any.
    #[must_use]
    pub fn emitter(&self) -> Option<&Arc<dyn EventEmitter>> {
        self.emitter.as_ref()
    }

    /// The attached interaction waiter, if any.
    #[must_use]
    pub fn interaction_waiter(&self) -> Option<&Arc<dyn InteractionWaiter>> {
        self.interaction_waiter.as_ref()
    }

    /// Atomically consume one credit. Returns `false` when exhausted or when
    /// no credits were reserved for this context; unused credits are never
    /// refunded (§4.5).
    pub fn take_credit(&self) -> bool {
        let Some(counter) = &self.credits else {
            return false;
        };
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current <= 0 {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Remaining credits, for diagnostics and tests.
    #[must_use]
    pub fn remaining_credits(&self) -> i64 {
        self.credits
            .as_ref()
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

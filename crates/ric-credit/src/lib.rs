// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use ric_core::RunContext;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A pool of consumable call credits, shared across concurrent runs.
///
/// Reservation is a lock-free `compare_exchange_weak` loop on an
/// `AtomicI64`, mirroring `RunContext::take_credit`'s own decrement so the
/// broker-to-context hand-off uses the same lock-free idiom end to end.
#[derive(Debug)]
pub struct CreditBroker {
    remaining: AtomicI64,
}

impl CreditBroker {
    /// Create a broker starting with `total` credits available.
    #[must_use]
    pub fn new(total: i64) -> Self {
        Self {
            remaining: AtomicI64::new(total.max(0)),
        }
    }

    /// Credits not yet reserved.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Reserve `n` credits, returning a [`CreditLease`] for them, or `None`
    /// if fewer than `n` remain in the pool.
    #[must_use]
    pub fn reserve(&self, n: i64) -> Option<CreditLease> {
        if n <= 0 {
            return Some(CreditLease { amount: 0 });
        }
        let mut current = self.remaining.load(Ordering::SeqCst);
        loop {
            if current < n {
                return None;
            }
            match self.remaining.compare_exchange_weak(
                current,
                current - n,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(CreditLease { amount: n }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Return `n` unused credits to the pool, e.g. after a run that never
    /// consumed its full lease.
    pub fn release(&self, n: i64) {
        if n > 0 {
            self.remaining.fetch_add(n, Ordering::SeqCst);
        }
    }
}

/// A reservation of `amount` credits drawn from a [`CreditBroker`], not yet
/// attached to any [`RunContext`].
#[derive(Debug, Clone, Copy)]
pub struct CreditLease {
    amount: i64,
}

impl CreditLease {
    /// Number of credits this lease carries.
    #[must_use]
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Attach this lease to `ctx`, returning a new context that permits
    /// exactly `amount` further LLM calls (§4.5, P8).
    #[must_use]
    pub fn attach(self, ctx: RunContext) -> RunContext {
        ctx.with_credits(self.amount)
    }
}

/// Shared handle to a [`CreditBroker`], cheap to clone across workers.
pub type SharedCreditBroker = Arc<CreditBroker>;

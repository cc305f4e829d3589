// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use ric_cancel::CancellationToken;
use ric_core::RateLimitConfig;
use ric_error::RicError;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Default number of tokens a single call is assumed to consume against a
/// tokens-per-minute limiter, when the caller doesn't supply an estimate.
pub const DEFAULT_TOKEN_ESTIMATE: u32 = 1000;

/// A refilling token bucket. Acquiring blocks until a token is available or
/// the supplied [`CancellationToken`] fires.
///
/// Tokens are posted by a background task on a fixed period, queued on a
/// channel bounded to the bucket's burst capacity, and pre-filled to
/// capacity at construction so the first `burst` calls never wait.
#[derive(Debug)]
pub struct TokenBucket {
    rx: Mutex<mpsc::Receiver<()>>,
    refill_task: JoinHandle<()>,
}

impl TokenBucket {
    /// Build a bucket refilling at `rps` tokens/second with room for
    /// `burst` tokens, or `None` if `rps` is not positive (a nil limiter).
    #[must_use]
    pub fn new(rps: f64, burst: u32) -> Option<Self> {
        if rps <= 0.0 || burst == 0 {
            return None;
        }
        let capacity = burst as usize;
        let (tx, rx) = mpsc::channel(capacity);
        for _ in 0..capacity {
            // Pre-fill to capacity; the channel can never overflow here.
            let _ = tx.try_send(());
        }
        let refill_period = Duration::from_secs_f64(1.0 / rps);
        let refill_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refill_period);
            interval.tick().await; // first tick fires immediately, skip it
            loop {
                interval.tick().await;
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        });
        Some(Self { rx: Mutex::new(rx), refill_task })
    }

    /// Wait for a single token, or for `token` to be cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RicError::RateCreditExhausted`] if `token` is cancelled
    /// before a token becomes available.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<(), RicError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            maybe = rx.recv() => maybe.ok_or(RicError::RateCreditExhausted),
            () = token.cancelled() => Err(RicError::RateCreditExhausted),
        }
    }

    /// Wait for `n` tokens in sequence, or for `token` to be cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RicError::RateCreditExhausted`] if `token` is cancelled
    /// before all `n` tokens become available.
    pub async fn acquire_n(&self, n: u32, token: &CancellationToken) -> Result<(), RicError> {
        for _ in 0..n {
            self.acquire(token).await?;
        }
        Ok(())
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.refill_task.abort();
    }
}

/// Composes the rps/rpm/rpd/tpm buckets named by a [`RateLimitConfig`]. A
/// bucket absent from the config (zero or unset) is skipped; every bucket
/// that is present must admit the call.
#[derive(Debug)]
pub struct MultiLimiter {
    rps: Option<TokenBucket>,
    rpm: Option<TokenBucket>,
    rpd: Option<TokenBucket>,
    tpm: Option<TokenBucket>,
    token_estimate: u32,
}

impl MultiLimiter {
    /// Build the composed limiter from a [`RateLimitConfig`], estimating
    /// `token_estimate` tokens consumed per call against the TPM bucket.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig, token_estimate: u32) -> Self {
        let token_estimate = token_estimate.max(1);
        let rps = TokenBucket::new(f64::from(config.rps), config.burst.max(1));
        let rpm = (config.rpm > 0)
            .then(|| TokenBucket::new(f64::from(config.rpm) / 60.0, 1))
            .flatten();
        let rpd = (config.rpd > 0)
            .then(|| TokenBucket::new(f64::from(config.rpd) / 86_400.0, 1))
            .flatten();
        let tpm = (config.tpm > 0)
            .then(|| TokenBucket::new(f64::from(config.tpm) / 60.0, token_estimate))
            .flatten();
        Self { rps, rpm, rpd, tpm, token_estimate }
    }

    /// `true` if every configured bucket is absent, i.e. this limiter never
    /// blocks a call.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.rps.is_none() && self.rpm.is_none() && self.rpd.is_none() && self.tpm.is_none()
    }

    /// Acquire admission from every configured bucket, in rps/rpm/rpd/tpm
    /// order. Each bucket must admit the call; the first cancellation or
    /// exhaustion short-circuits the rest.
    ///
    /// # Errors
    ///
    /// Propagates [`RicError::RateCreditExhausted`] from the first bucket
    /// that fails to admit the call.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<(), RicError> {
        if let Some(b) = &self.rps {
            b.acquire(token).await?;
        }
        if let Some(b) = &self.rpm {
            b.acquire(token).await?;
        }
        if let Some(b) = &self.rpd {
            b.acquire(token).await?;
        }
        if let Some(b) = &self.tpm {
            b.acquire_n(self.token_estimate, token).await?;
        }
        Ok(())
    }
}

/// Read a [`RateLimitConfig`] from the environment per §6: for each prefix
/// in `prefixes`, in order, check `<PREFIX>_RPS`; the first prefix with a
/// non-empty value wins and its full set of variables
/// (`<PREFIX>_{RPS,BURST,RPM,RPD,TPM}`) is used. If no prefix has a
/// non-empty `_RPS` value, the returned config is disabled (all zero).
#[must_use]
pub fn config_from_env(prefixes: &[String]) -> RateLimitConfig {
    for prefix in prefixes {
        let rps_var = format!("{prefix}_RPS");
        match std::env::var(&rps_var) {
            Ok(v) if !v.trim().is_empty() => {
                return RateLimitConfig {
                    rps: v.trim().parse().unwrap_or(0),
                    burst: env_u32(&format!("{prefix}_BURST")).unwrap_or(1),
                    rpm: env_u32(&format!("{prefix}_RPM")).unwrap_or(0),
                    rpd: env_u32(&format!("{prefix}_RPD")).unwrap_or(0),
                    tpm: env_u32(&format!("{prefix}_TPM")).unwrap_or(0),
                    tpd: 0,
                };
            }
            _ => continue,
        }
    }
    RateLimitConfig::default()
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn nil_limiter_never_blocks() {
        let bucket = TokenBucket::new(0.0, 10);
        assert!(bucket.is_none());
    }

    #[tokio::test]
    async fn burst_calls_admit_without_delay_per_p7() {
        let bucket = TokenBucket::new(5.0, 3).unwrap();
        let token = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            bucket.acquire(&token).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn call_after_burst_waits_roughly_one_period_per_p7() {
        let bucket = TokenBucket::new(20.0, 1).unwrap();
        let token = CancellationToken::new();
        bucket.acquire(&token).await.unwrap(); // drains the pre-filled token
        let start = Instant::now();
        bucket.acquire(&token).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "elapsed was {elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_aborts_acquire() {
        let bucket = TokenBucket::new(1.0, 1).unwrap();
        let token = CancellationToken::new();
        // Drain the only token then cancel; the next acquire must not hang.
        bucket.acquire(&token).await.unwrap();
        token.cancel();
        let result = bucket.acquire(&token).await;
        assert!(matches!(result, Err(RicError::RateCreditExhausted)));
    }

    #[tokio::test]
    async fn multi_limiter_is_noop_with_default_config() {
        let limiter = MultiLimiter::from_config(&RateLimitConfig::default(), DEFAULT_TOKEN_ESTIMATE);
        assert!(limiter.is_noop());
        let token = CancellationToken::new();
        limiter.acquire(&token).await.unwrap();
    }

    #[tokio::test]
    async fn multi_limiter_requires_every_configured_bucket_to_admit() {
        let config = RateLimitConfig {
            rps: 0,
            burst: 1,
            rpm: 120,
            rpd: 0,
            tpm: 0,
            tpd: 0,
        };
        let limiter = MultiLimiter::from_config(&config, DEFAULT_TOKEN_ESTIMATE);
        assert!(!limiter.is_noop());
        let token = CancellationToken::new();
        limiter.acquire(&token).await.unwrap();
    }

    #[test]
    fn config_from_env_picks_first_prefix_with_non_empty_rps() {
        std::env::remove_var("RICTEST_A_RPS");
        std::env::set_var("RICTEST_B_RPS", "7");
        std::env::set_var("RICTEST_B_BURST", "4");
        let config = config_from_env(&["RICTEST_A".to_string(), "RICTEST_B".to_string()]);
        std::env::remove_var("RICTEST_B_RPS");
        std::env::remove_var("RICTEST_B_BURST");
        assert_eq!(config.rps, 7);
        assert_eq!(config.burst, 4);
    }

    #[test]
    fn config_from_env_disabled_when_no_prefix_matches() {
        std::env::remove_var("RICTEST_Z_RPS");
        let config = config_from_env(&["RICTEST_Z".to_string()]);
        assert!(config.is_disabled());
    }
}

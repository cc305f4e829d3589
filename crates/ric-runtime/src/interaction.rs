// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bootstrap/interaction loop (§4.7): `greeting -> awaiting_input ->
//! replying -> (awaiting_input | completed)`.

use ric_core::{BootstrapContext, BootstrapPipeline, BootstrapState, InteractionWaiter, RunContext};
use ric_error::RicError;
use std::future::Future;
use uuid::Uuid;

fn advance(current: BootstrapState, next: BootstrapState) -> Result<BootstrapState, RicError> {
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(RicError::Configuration(format!("invalid bootstrap transition {current:?} -> {next:?}")))
    }
}

/// Drive the bootstrap state machine: the first turn replies to
/// `bootstrap.user_input` as supplied by the caller without blocking on
/// `waiter`; every subsequent turn blocks on [`InteractionWaiter::wait_for_input`]
/// first. Cancellation and exhausting `max_turns` both end the loop
/// gracefully (returning the last turn's pipeline), not as an error — only
/// a genuine `turn` or waiter failure propagates.
///
/// # Errors
///
/// Returns whatever error `turn` produces, or a waiter failure other than
/// cancellation.
pub async fn run_bootstrap<T, F, Fut>(
    ctx: &RunContext,
    waiter: &dyn InteractionWaiter,
    run_id: Uuid,
    mut bootstrap: BootstrapContext,
    max_turns: u32,
    mut turn: F,
) -> Result<BootstrapPipeline<T>, RicError>
where
    F: FnMut(&BootstrapContext) -> Fut,
    Fut: Future<Output = Result<BootstrapPipeline<T>, RicError>>,
{
    let mut state = BootstrapState::Greeting;
    let mut turns: u32 = 0;

    loop {
        state = advance(state, BootstrapState::AwaitingInput)?;
        state = advance(state, BootstrapState::Replying)?;
        turns += 1;

        let pipeline = turn(&bootstrap).await?;

        if !pipeline.need_more_input {
            advance(state, BootstrapState::Completed)?;
            return Ok(pipeline);
        }

        state = advance(state, BootstrapState::AwaitingInput)?;

        if turns >= max_turns || ctx.is_cancelled() {
            return Ok(pipeline);
        }

        match waiter.wait_for_input(ctx, run_id).await {
            Ok(next) => bootstrap.user_input = next.trim().to_string(),
            Err(RicError::InteractionCancelled) => return Ok(pipeline),
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedWaiter {
        turns: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InteractionWaiter for ScriptedWaiter {
        async fn wait_for_input(&self, _ctx: &RunContext, _run_id: Uuid) -> Result<String, RicError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(RicError::InteractionCancelled);
            }
            Ok(turns.remove(0))
        }

        async fn publish_output(&self, _ctx: &RunContext, _run_id: Uuid, _interaction_id: &str, _message: &str) -> Result<(), RicError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_turn_replies_without_waiting_per_scenario_6() {
        let waiter = ScriptedWaiter { turns: Mutex::new(Vec::new()) };
        let ctx = RunContext::new(Uuid::nil());
        let bootstrap = BootstrapContext::new("scan", "", "fastapi");

        let result = run_bootstrap(&ctx, &waiter, Uuid::nil(), bootstrap, 5, |b: &BootstrapContext| {
            let input = b.user_input.clone();
            async move {
                Ok::<_, RicError>(BootstrapPipeline {
                    result: json!({ "echo": input }),
                    need_more_input: false,
                })
            }
        })
        .await
        .unwrap();

        assert!(!result.need_more_input);
        assert_eq!(result.result, json!({ "echo": "fastapi" }));
    }

    #[tokio::test]
    async fn loops_until_need_more_input_false() {
        let waiter = ScriptedWaiter {
            turns: Mutex::new(vec!["second".to_string(), "third".to_string()]),
        };
        let ctx = RunContext::new(Uuid::nil());
        let bootstrap = BootstrapContext::new("", "", "first");
        let seen = Mutex::new(Vec::<String>::new());
        let call_count = AtomicUsize::new(0);

        let result = run_bootstrap(&ctx, &waiter, Uuid::nil(), bootstrap, 5, |b: &BootstrapContext| {
            seen.lock().unwrap().push(b.user_input.clone());
            let n = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, RicError>(BootstrapPipeline {
                    result: Value::Null,
                    need_more_input: n < 2,
                })
            }
        })
        .await
        .unwrap();

        assert!(!result.need_more_input);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn cancellation_mid_wait_ends_gracefully_not_as_error() {
        let waiter = ScriptedWaiter { turns: Mutex::new(Vec::new()) };
        let ctx = RunContext::new(Uuid::nil());
        let bootstrap = BootstrapContext::new("", "", "only");

        let result = run_bootstrap(&ctx, &waiter, Uuid::nil(), bootstrap, 10, |_: &BootstrapContext| async move {
            Ok::<_, RicError>(BootstrapPipeline {
                result: Value::Null,
                need_more_input: true,
            })
        })
        .await;

        assert!(result.is_ok());
        assert!(result.unwrap().need_more_input);
    }

    #[tokio::test]
    async fn max_turns_exhaustion_ends_gracefully() {
        let waiter = ScriptedWaiter {
            turns: Mutex::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
        };
        let ctx = RunContext::new(Uuid::nil());
        let bootstrap = BootstrapContext::new("", "", "start");

        let result = run_bootstrap(&ctx, &waiter, Uuid::nil(), bootstrap, 2, |_: &BootstrapContext| async move {
            Ok::<_, RicError>(BootstrapPipeline {
                result: Value::Null,
                need_more_input: true,
            })
        })
        .await
        .unwrap();

        assert!(result.need_more_input, "loop stopped due to cap, not because the worker completed");
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod emitter;
mod executor;
mod interaction;
mod runtime;
mod tool_loop;
mod worker;

pub use emitter::ChannelEventEmitter;
pub use executor::{apply_run_params, Executor};
pub use interaction::run_bootstrap;
pub use runtime::Runtime;
pub use tool_loop::{parse_envelope, run_tool_loop, Action, ActionEnvelope};
pub use worker::Worker;

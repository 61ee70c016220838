//! Tapline - capture proxy for generative-AI API traffic.
//!
//! This crate holds the operator-facing pieces of the `tapline` binary:
//!
//! - Command parsing for the interactive prompt
//! - The console loop that drives a running [`tapline_proxy::Pipeline`]

pub mod commands;
pub mod console;

pub use commands::{Command, HELP};
pub use console::{Console, Outcome, Overrides};

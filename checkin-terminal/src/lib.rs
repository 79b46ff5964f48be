//! Operator console for the check-in engine.
//!
//! Reads decoded badge text line by line, shows a notice for every decision
//! and keeps pending check-ins flowing to the roster authority in the
//! background.

pub mod config;
pub mod input;
pub mod notice;
pub mod runtime;

pub use config::{CliOverrides, TerminalConfig};
pub use runtime::{RunSummary, TerminalRuntime};

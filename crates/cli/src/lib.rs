//! chainpilot command-line interface
//!
//! Parses arguments, wires configuration into the execution layer and the
//! Olas service manager, and prints command results as JSON.

pub mod args;
pub mod commands;
pub mod context;

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

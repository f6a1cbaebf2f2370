//! CLI Module Organization
//!
//! - args: argument structures
//! - commands: command execution
//! - config_layer: layered configuration loading

pub mod args;
pub mod commands;
pub mod config_layer;

pub use args::*;
pub use commands::*;

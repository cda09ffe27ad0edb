//! forwagent: Command-line interface
//!
//! Provides the `forwagent` binary that runs either endpoint and manages
//! the local key material.

pub mod commands;
pub mod output;

//! Command-line interface for rollcall.

pub mod args;
pub mod commands;

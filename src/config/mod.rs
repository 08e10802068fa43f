//! Configuration management for rollcall.
//!
//! This module handles loading and saving configuration from `~/.rollcall/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{Config, GeneralConfig, ProgressConfig, QueueConfig, RemoteConfig};

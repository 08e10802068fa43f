//! rollcall - offline sync for volunteer coordination
//!
//! This crate queues uploads and downloads of volunteer, event and
//! attendance records while the remote spreadsheet service is unreachable,
//! and drains them in order once it is back.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::RollcallError;
pub use features::progress::ProgressTracker;
pub use features::sync::{OperationRequest, SyncQueue, Synchronizer};

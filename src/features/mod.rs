//! Feature implementations for rollcall.
//!
//! - Sync queue and synchronizers
//! - Progress tracking

pub mod progress;
pub mod sync;

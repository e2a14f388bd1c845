//! Core types and abstractions for Tandem synchronization endpoints.
//!
//! This crate holds what the diff engine and every endpoint agree on: the
//! node and change-event model, the endpoint traits, the watch session handle,
//! the error type, and configuration.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod watch;

pub use config::TandemConfig;
pub use error::{Result, TandemError};
pub use traits::*;
pub use types::*;
pub use watch::{SessionHandles, WatchSession, WatchState};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, TandemError};
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use crate::watch::{WatchSession, WatchState};
}

//! CLI command implementations

pub mod backends;
pub mod decode;
#[cfg(feature = "serve")]
pub mod jobs;
pub mod reporting;
pub mod run;
#[cfg(feature = "serve")]
pub mod serve;

use anyhow::{Context, Result};

/// Single-threaded runtime for commands that only talk to one peer.
pub(crate) fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Multi-threaded runtime for commands that host a scheduler.
pub(crate) fn scheduler_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

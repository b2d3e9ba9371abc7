//! spicerun CLI library.
//!
//! Command implementations, configuration loading and, with the `serve`
//! feature, the WebSocket job server and its remote client.

pub mod commands;
pub mod config;
pub mod logging;

#[cfg(feature = "serve")]
pub mod remote;

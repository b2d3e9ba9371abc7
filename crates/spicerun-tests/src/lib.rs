//! spicerun End-to-End Test Infrastructure
//!
//! Integration tests for the job pipeline:
//!
//! - **Pipeline**: submit -> netlist resolution -> process launch ->
//!   artifact monitoring -> raw decoding -> fetch
//! - **Serve**: the same job interface over the WebSocket server
//! - **Decoding**: property tests on the raw waveform decoder
//!
//! Simulator backends are stood in for by `/bin/sh` scripts that copy a
//! prepared waveform into place, so the pipeline tests run on any Unix host
//! without a SPICE installation.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p spicerun-tests
//! ```

pub mod fixtures;

pub use fixtures::{
    rc_netlist, rc_plot, rc_raw_bytes, registry_with, scheduler_config, script_backend,
    write_rc_raw, ScriptBackend,
};

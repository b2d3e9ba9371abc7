//! spicerun simulator backends
//!
//! This crate turns one job attempt into one simulator process and a decoded
//! result. It knows nothing about queues or retries; the scheduler calls it
//! through the [`SimulationRunner`] trait.
//!
//! # Backends
//!
//! | Id | Simulator | Netlist handling |
//! |----|-----------|------------------|
//! | `ltspice` | LTspice XVII / 24 | runs schematics directly, exports with `-netlist` |
//! | `ltspice-wine` | LTspice under Wine | as `ltspice`, paths translated to `Z:\` |
//! | `ngspice` | ngspice batch mode | netlists only |
//! | `qspice` | QSPICE | netlists only |
//!
//! Further backends are registered as command templates (see
//! [`InvocationStyle::Script`](spicerun_spec::InvocationStyle::Script)).
//!
//! # Executable lookup
//!
//! Each backend searches for its simulator in:
//!
//! 1. An explicit path from configuration
//! 2. The backend's environment variable (`LTSPICE_PATH`, `NGSPICE_PATH`, ...)
//! 3. System PATH
//! 4. Common installation locations
//!
//! # Completion
//!
//! A run is complete when the log and waveform files exist, not when the
//! process exits. See [`monitor`].
//!
//! # Crate Structure
//!
//! - [`registry`] - Backend descriptors and validation
//! - [`netlist`] - Netlist reuse, export and manual fallback
//! - [`overrides`] - Input staging and parameter substitution
//! - [`launcher`] - Command lines and process supervision
//! - [`monitor`] - Artifact polling
//! - [`runner`] - The end-to-end run of one attempt
//! - [`workspace`] - Per-job working directories
//! - [`error`] - Registry errors

pub mod error;
pub mod executable;
pub mod launcher;
pub mod logfile;
pub mod monitor;
pub mod netlist;
pub mod overrides;
pub mod registry;
pub mod runner;
pub mod text;
pub mod workspace;

pub use error::{RegistryError, RegistryResult};
pub use executable::{find_executable, resolve_executable};
pub use launcher::{ArtifactPaths, LaunchMode, LaunchPlan, RunningProcess};
pub use monitor::{await_artifacts, Completion, PollTimeout};
pub use netlist::NetlistPlan;
pub use registry::{BackendRegistry, RegistryBuilder, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
pub use runner::{
    NoProgress, ProcessRunner, ProgressReporter, RunOutput, RunPhase, RunRequest, SimulationRunner,
};
pub use workspace::{sweep_stale, JobWorkspace, RootLock};

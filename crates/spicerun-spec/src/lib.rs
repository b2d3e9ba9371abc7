//! spicerun data model
//!
//! This crate holds the types shared by every other spicerun crate: jobs and
//! their state machine, backend descriptors, parameter overrides, decoded
//! waveform traces, results, and the job error taxonomy.
//!
//! # Example
//!
//! ```
//! use spicerun_spec::{parse_overrides, JobStatus, SimulationJob};
//!
//! let overrides = parse_overrides("R1=20n,L1=1m").unwrap();
//! let mut job = SimulationJob::new("circuits/rc.asc", overrides, "ltspice");
//! assert_eq!(job.status(), JobStatus::Queued);
//!
//! job.transition(JobStatus::Dispatched).unwrap();
//! assert!(job.transition(JobStatus::Completed).is_err());
//! ```
//!
//! # Modules
//!
//! - [`backend`]: Backend descriptors and capability flags
//! - [`error`]: Job error taxonomy and the [`JobFailure`] reporting trait
//! - [`job`]: Jobs, ids, snapshots and the status state machine
//! - [`netlist`]: Netlist artifacts
//! - [`overrides`]: Component parameter overrides
//! - [`result`]: Simulation results and launcher diagnostics
//! - [`trace`]: Waveform traces

pub mod backend;
pub mod error;
pub mod job;
pub mod netlist;
pub mod overrides;
pub mod result;
pub mod switches;
pub mod trace;

pub use backend::{
    BackendDescriptor, Capabilities, CompatibilityShim, ExecutableResolution, InvocationStyle,
    PollingPolicy, RawDialect,
};
pub use error::{JobError, JobFailure, JobResult, NetlistFailureKind, RetryClass};
pub use job::{JobId, JobSnapshot, JobStatus, JobTimestamps, SimulationJob, TransitionError};
pub use netlist::{is_netlist_path, GenerationMethod, NetlistArtifact};
pub use overrides::{
    parse_override_args, parse_overrides, split_instance_key, OverrideError, ParameterOverrides,
};
pub use result::{LaunchDiagnostics, SimulationResult};
pub use switches::{validate_switches, SwitchError};
pub use trace::{ensure_unique_names, Sample, SampleValue, TraceError, WaveformTrace};

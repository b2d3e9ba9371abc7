//! Simulation results.

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::netlist::NetlistArtifact;
use crate::trace::{ensure_unique_names, TraceError, WaveformTrace};

/// What the launcher observed about the backend process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDiagnostics {
    /// Exit code, if the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal on unix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// The artifacts were confirmed while the process was still running.
    #[serde(default)]
    pub detached: bool,
    /// Tail of the process's stderr.
    #[serde(default)]
    pub stderr_tail: String,
    /// Wall time from launch to artifact confirmation.
    pub elapsed_ms: u64,
}

/// Decoded output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub job_id: JobId,
    pub backend: String,
    pub plot_name: String,
    traces: Vec<WaveformTrace>,
    pub log_excerpt: String,
    pub diagnostics: LaunchDiagnostics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlist: Option<NetlistArtifact>,
}

impl SimulationResult {
    /// Creates a result, rejecting duplicate trace names.
    pub fn new(
        job_id: JobId,
        backend: impl Into<String>,
        plot_name: impl Into<String>,
        traces: Vec<WaveformTrace>,
        log_excerpt: impl Into<String>,
        diagnostics: LaunchDiagnostics,
    ) -> Result<Self, TraceError> {
        ensure_unique_names(&traces)?;
        Ok(Self {
            job_id,
            backend: backend.into(),
            plot_name: plot_name.into(),
            traces,
            log_excerpt: log_excerpt.into(),
            diagnostics,
            netlist: None,
        })
    }

    /// Attaches the netlist the job ran from.
    pub fn with_netlist(mut self, netlist: Option<NetlistArtifact>) -> Self {
        self.netlist = netlist;
        self
    }

    pub fn traces(&self) -> &[WaveformTrace] {
        &self.traces
    }

    /// Looks up a trace by name, ignoring ASCII case.
    pub fn trace(&self, name: &str) -> Option<&WaveformTrace> {
        self.traces
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Trace names in file order.
    pub fn trace_names(&self) -> Vec<&str> {
        self.traces.iter().map(|t| t.name()).collect()
    }
}

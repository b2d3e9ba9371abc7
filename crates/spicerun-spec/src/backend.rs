//! Backend descriptors: what a simulator can do and how to invoke it.
//!
//! Backends are described as data. The set of invocation conventions is a
//! closed enum ([`InvocationStyle`]); everything else (capabilities, polling,
//! executable lookup) is configuration, so adding a backend never requires
//! new code paths.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw waveform dialect written by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawDialect {
    /// LTspice: UTF-16LE header, f64 axis and f32 values for real data
    /// unless the `double` flag is set.
    Ltspice,
    /// SPICE3 / ngspice: ASCII header, f64 everywhere.
    Spice3,
}

/// How a backend's command line is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum InvocationStyle {
    /// `<exe> -Run -b <input>`; netlist export via `<exe> -netlist <input>`.
    Ltspice,
    /// `<exe> -b -r <raw> -o <log> <input>`.
    Ngspice,
    /// `<exe> -binary -o <log> -r <raw> <input>`.
    Qspice,
    /// Argument templates with `{input}`, `{stem}`, `{raw}`, `{log}`,
    /// `{netlist}` and `{workdir}` placeholders.
    Script {
        run: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        export: Option<Vec<String>>,
    },
}

/// Where to look for a backend executable.
///
/// Resolution order: explicit path, environment variable, `PATH` lookup of
/// each name, then the common installation paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub common_paths: Vec<PathBuf>,
}

impl ExecutableResolution {
    /// Resolution from an explicit path only.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: Some(path.into()),
            ..Default::default()
        }
    }

    /// Resolution from an environment variable, falling back to `PATH`.
    pub fn from_env(var: impl Into<String>, names: &[&str]) -> Self {
        Self {
            env_var: Some(var.into()),
            names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Adds common installation paths.
    pub fn with_common_paths(mut self, paths: &[&str]) -> Self {
        self.common_paths.extend(paths.iter().map(PathBuf::from));
        self
    }

    /// Returns a short description of the lookup order for diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(path) = &self.explicit {
            parts.push(format!("explicit path {}", path.display()));
        }
        if let Some(var) = &self.env_var {
            parts.push(format!("${}", var));
        }
        if !self.names.is_empty() {
            parts.push(format!("PATH ({})", self.names.join(", ")));
        }
        if !self.common_paths.is_empty() {
            parts.push(format!("{} common install path(s)", self.common_paths.len()));
        }
        if parts.is_empty() {
            "nothing".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A compatibility layer the backend executable has to run under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityShim {
    /// Where to find the shim program (e.g. `wine`).
    pub program: ExecutableResolution,
    /// Translate absolute host paths to `Z:\...` form.
    #[serde(default)]
    pub translate_paths: bool,
}

/// What a backend can and cannot do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The backend can simulate a schematic without a netlist.
    #[serde(default)]
    pub supports_direct_execution: bool,
    /// The backend only accepts netlists.
    #[serde(default)]
    pub requires_netlist_pre_generation: bool,
    /// The backend can be invoked to export a netlist from a schematic.
    #[serde(default)]
    pub supports_netlist_export: bool,
    /// The executable has to be routed through a [`CompatibilityShim`].
    #[serde(default)]
    pub requires_compatibility_shim: bool,
}

/// Artifact polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingPolicy {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl PollingPolicy {
    /// Creates a policy from durations.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Base polling interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Total time to wait for artifacts.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Upper bound for the backed-off polling interval.
    pub fn max_interval(&self) -> Duration {
        self.interval() * 4
    }
}

/// Immutable description of one simulator backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub executable: ExecutableResolution,
    pub invocation: InvocationStyle,
    pub capabilities: Capabilities,
    pub polling: PollingPolicy,
    pub dialect: RawDialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shim: Option<CompatibilityShim>,
}

impl BackendDescriptor {
    /// Short label used in logs and CLI output.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    /// Human-readable capability summary.
    pub fn capability_summary(&self) -> String {
        let caps = &self.capabilities;
        let mut parts = Vec::new();
        if caps.supports_direct_execution {
            parts.push("direct");
        }
        if caps.requires_netlist_pre_generation {
            parts.push("netlist-only");
        }
        if caps.supports_netlist_export {
            parts.push("export");
        }
        if caps.requires_compatibility_shim {
            parts.push("shim");
        }
        parts.join(",")
    }
}

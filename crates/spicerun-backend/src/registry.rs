//! Backend capability registry.
//!
//! The registry is built once, validated, and then only read. It is shared
//! between the scheduler and the runner as an `Arc<BackendRegistry>`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use spicerun_spec::{
    BackendDescriptor, Capabilities, CompatibilityShim, ExecutableResolution, InvocationStyle,
    JobError, JobResult, PollingPolicy, RawDialect,
};

use crate::error::{RegistryError, RegistryResult};

/// Default artifact polling interval for GUI simulators.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default artifact timeout (10 minutes).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// Immutable set of registered backends.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<String, BackendDescriptor>,
}

impl BackendRegistry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding the stock backends.
    pub fn builtin() -> Self {
        Self {
            backends: builtin_descriptors()
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        }
    }

    /// Looks up a backend by id.
    pub fn lookup(&self, id: &str) -> JobResult<&BackendDescriptor> {
        self.backends.get(id).ok_or_else(|| JobError::BackendUnknown {
            backend: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered descriptors ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Builder for [`BackendRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<BackendDescriptor>,
    polling: HashMap<String, PollingPolicy>,
}

impl RegistryBuilder {
    /// Adds a backend.
    pub fn register(mut self, descriptor: BackendDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds the stock backends.
    pub fn with_builtins(mut self) -> Self {
        self.descriptors.extend(builtin_descriptors());
        self
    }

    /// Replaces the polling policy of a backend before the registry is frozen.
    pub fn polling_override(mut self, id: impl Into<String>, policy: PollingPolicy) -> Self {
        self.polling.insert(id.into(), policy);
        self
    }

    /// Validates every descriptor and freezes the registry.
    pub fn build(self) -> RegistryResult<BackendRegistry> {
        let mut backends = BTreeMap::new();
        for descriptor in self.descriptors {
            validate(&descriptor)?;
            if backends.contains_key(&descriptor.id) {
                return Err(RegistryError::Duplicate(descriptor.id));
            }
            backends.insert(descriptor.id.clone(), descriptor);
        }
        for (id, policy) in self.polling {
            let descriptor = backends
                .get_mut(&id)
                .ok_or_else(|| RegistryError::UnknownOverride(id.clone()))?;
            descriptor.polling = policy;
            validate(descriptor)?;
        }
        Ok(BackendRegistry { backends })
    }
}

/// Checks that a descriptor's flags agree with each other and with its
/// invocation style.
pub fn validate(descriptor: &BackendDescriptor) -> RegistryResult<()> {
    let id = descriptor.id.as_str();
    if id.trim().is_empty() {
        return Err(RegistryError::EmptyId);
    }
    let caps = &descriptor.capabilities;
    if caps.supports_direct_execution == caps.requires_netlist_pre_generation {
        return Err(RegistryError::inconsistent(
            id,
            "exactly one of supports_direct_execution and requires_netlist_pre_generation must be set",
        ));
    }
    if caps.requires_compatibility_shim != descriptor.shim.is_some() {
        return Err(RegistryError::inconsistent(
            id,
            "requires_compatibility_shim must be set exactly when a shim is configured",
        ));
    }
    let can_export = match &descriptor.invocation {
        InvocationStyle::Ltspice => true,
        InvocationStyle::Ngspice | InvocationStyle::Qspice => false,
        InvocationStyle::Script { export, .. } => export.is_some(),
    };
    if caps.supports_netlist_export && !can_export {
        return Err(RegistryError::inconsistent(
            id,
            "supports_netlist_export is set but the invocation has no export mode",
        ));
    }
    if let InvocationStyle::Script { run, .. } = &descriptor.invocation {
        if !run.iter().any(|arg| arg.contains("{input}")) {
            return Err(RegistryError::inconsistent(
                id,
                "script run template never references {input}",
            ));
        }
    }
    if descriptor.polling.timeout_ms == 0 {
        return Err(RegistryError::inconsistent(id, "polling timeout must be positive"));
    }
    Ok(())
}

fn ltspice_resolution() -> ExecutableResolution {
    let names: &[&str] = if cfg!(windows) {
        &["LTspice.exe", "XVIIx64.exe"]
    } else {
        &["ltspice", "LTspice"]
    };
    let common: &[&str] = if cfg!(windows) {
        &[
            "C:\\Program Files\\ADI\\LTspice\\LTspice.exe",
            "C:\\Program Files\\LTC\\LTspiceXVII\\XVIIx64.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/Applications/LTspice.app/Contents/MacOS/LTspice"]
    } else {
        &[]
    };
    ExecutableResolution::from_env("LTSPICE_PATH", names).with_common_paths(common)
}

/// Descriptors of the stock backends.
pub fn builtin_descriptors() -> Vec<BackendDescriptor> {
    let gui_polling = PollingPolicy::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT);
    let batch_polling = PollingPolicy::new(Duration::from_millis(100), DEFAULT_POLL_TIMEOUT);

    vec![
        BackendDescriptor {
            id: "ltspice".to_string(),
            display_name: "LTspice".to_string(),
            executable: ltspice_resolution(),
            invocation: InvocationStyle::Ltspice,
            capabilities: Capabilities {
                supports_direct_execution: true,
                requires_netlist_pre_generation: false,
                supports_netlist_export: true,
                requires_compatibility_shim: false,
            },
            polling: gui_polling,
            dialect: RawDialect::Ltspice,
            shim: None,
        },
        BackendDescriptor {
            id: "ltspice-wine".to_string(),
            display_name: "LTspice (wine)".to_string(),
            executable: ExecutableResolution::from_env("LTSPICE_PATH", &[]).with_common_paths(&[
                "~/.wine/drive_c/Program Files/ADI/LTspice/LTspice.exe",
                "~/.wine/drive_c/Program Files/LTC/LTspiceXVII/XVIIx64.exe",
            ]),
            invocation: InvocationStyle::Ltspice,
            capabilities: Capabilities {
                supports_direct_execution: true,
                requires_netlist_pre_generation: false,
                supports_netlist_export: true,
                requires_compatibility_shim: true,
            },
            polling: gui_polling,
            dialect: RawDialect::Ltspice,
            shim: Some(CompatibilityShim {
                program: ExecutableResolution::from_env("WINE_PATH", &["wine"])
                    .with_common_paths(&["/opt/homebrew/bin/wine", "/usr/local/bin/wine"]),
                translate_paths: true,
            }),
        },
        BackendDescriptor {
            id: "ngspice".to_string(),
            display_name: "ngspice".to_string(),
            executable: ExecutableResolution::from_env("NGSPICE_PATH", &["ngspice"]),
            invocation: InvocationStyle::Ngspice,
            capabilities: Capabilities {
                supports_direct_execution: false,
                requires_netlist_pre_generation: true,
                supports_netlist_export: false,
                requires_compatibility_shim: false,
            },
            polling: batch_polling,
            dialect: RawDialect::Spice3,
            shim: None,
        },
        BackendDescriptor {
            id: "qspice".to_string(),
            display_name: "QSPICE".to_string(),
            executable: ExecutableResolution::from_env("QSPICE_PATH", &["QSPICE64.exe"])
                .with_common_paths(&["C:\\Program Files\\QSPICE\\QSPICE64.exe"]),
            invocation: InvocationStyle::Qspice,
            capabilities: Capabilities {
                supports_direct_execution: false,
                requires_netlist_pre_generation: true,
                supports_netlist_export: false,
                requires_compatibility_shim: false,
            },
            polling: gui_polling,
            dialect: RawDialect::Ltspice,
            shim: None,
        },
    ]
}

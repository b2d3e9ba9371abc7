//! Netlist artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extensions treated as netlists rather than schematics.
pub const NETLIST_EXTENSIONS: &[&str] = &["net", "cir", "sp", "spice", "spi"];

/// How the netlist for a job was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMethod {
    /// An existing, up-to-date netlist was used.
    Reused,
    /// The backend exported the netlist from the schematic.
    AutoExported,
    /// A human has to export the netlist; only ever reported in errors.
    ManualRequired,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Reused => "reused",
            GenerationMethod::AutoExported => "auto-exported",
            GenerationMethod::ManualRequired => "manual-required",
        }
    }
}

/// A netlist resolved for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetlistArtifact {
    pub schematic: PathBuf,
    pub netlist: PathBuf,
    pub method: GenerationMethod,
}

/// Returns true if the path has a netlist extension.
pub fn is_netlist_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            NETLIST_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

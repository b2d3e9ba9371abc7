//! Backends command implementation
//!
//! Lists the registered backends, their capabilities, and whether their
//! executables (and compatibility shims) can be found on this machine.

use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::process::ExitCode;

use spicerun_backend::{find_executable, BackendRegistry};
use spicerun_spec::{BackendDescriptor, PollingPolicy};

use super::reporting;
use crate::config::{build_registry, FileConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub id: String,
    pub name: String,
    pub capabilities: String,
    pub executable: Option<String>,
    pub shim: Option<String>,
    /// Executable and shim (if any) were both found.
    pub available: bool,
    pub polling: PollingPolicy,
    pub fallback: Option<String>,
}

/// List backends.
///
/// # Arguments
/// * `config_path` - Optional config file (polling overrides, fallbacks)
/// * `json` - Whether to output machine-readable JSON
pub fn run(config_path: Option<&str>, json: bool) -> Result<ExitCode> {
    let config = FileConfig::load(config_path)?.scheduler_config();
    let registry = build_registry(&config)?;
    let statuses = collect(&registry, |id| config.fallback_for(id).map(String::from));

    if json {
        reporting::print_json(&statuses)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Backends".cyan().bold());
    println!();
    for status in &statuses {
        let marker = if status.available {
            "ok".green()
        } else {
            "--".dimmed()
        };
        println!(
            "  {} {:<14} {} [{}]",
            marker,
            status.id,
            status.name.dimmed(),
            status.capabilities
        );
        match &status.executable {
            Some(path) => println!("       {}", path),
            None => println!("       {}", "executable not found".yellow()),
        }
        if let Some(shim) = &status.shim {
            println!("       shim {}", shim);
        }
        println!(
            "       poll every {} ms, timeout {} ms",
            status.polling.interval_ms, status.polling.timeout_ms
        );
        if let Some(fallback) = &status.fallback {
            println!("       falls back to {}", fallback.cyan());
        }
    }

    let available = statuses.iter().filter(|s| s.available).count();
    println!();
    println!("{}/{} backends available", available, statuses.len());
    Ok(ExitCode::SUCCESS)
}

/// Resolves every descriptor in `registry`, sorted by id.
pub fn collect(
    registry: &BackendRegistry,
    fallback_for: impl Fn(&str) -> Option<String>,
) -> Vec<BackendStatus> {
    let mut statuses: Vec<_> = registry
        .iter()
        .map(|d| status_of(d, fallback_for(&d.id)))
        .collect();
    statuses.sort_by(|a, b| a.id.cmp(&b.id));
    statuses
}

fn status_of(descriptor: &BackendDescriptor, fallback: Option<String>) -> BackendStatus {
    let executable = find_executable(&descriptor.executable);
    let shim = descriptor
        .shim
        .as_ref()
        .map(|shim| find_executable(&shim.program));
    let shim_ok = !matches!(shim, Some(None));
    BackendStatus {
        id: descriptor.id.clone(),
        name: descriptor.label().to_string(),
        capabilities: descriptor.capability_summary(),
        available: executable.is_some() && shim_ok,
        executable: executable.map(|p| p.display().to_string()),
        shim: shim.flatten().map(|p| p.display().to_string()),
        polling: descriptor.polling,
        fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_lists_builtins_sorted() {
        let registry = BackendRegistry::builtin();
        let statuses = collect(&registry, |_| None);
        assert_eq!(statuses.len(), registry.len());
        let ids: Vec<_> = statuses.iter().map(|s| s.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"ltspice"));
    }

    #[test]
    fn test_collect_reports_fallbacks() {
        let registry = BackendRegistry::builtin();
        let statuses = collect(&registry, |id| {
            (id == "ltspice").then(|| "ltspice-wine".to_string())
        });
        let ltspice = statuses.iter().find(|s| s.id == "ltspice").unwrap();
        assert_eq!(ltspice.fallback.as_deref(), Some("ltspice-wine"));
        assert!(statuses
            .iter()
            .filter(|s| s.id != "ltspice")
            .all(|s| s.fallback.is_none()));
    }
}

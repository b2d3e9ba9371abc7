//! Netlist resolution.
//!
//! Decides per job whether an existing netlist can be reused, whether the
//! backend can run the schematic directly, whether the netlist can be
//! exported automatically, or whether a human has to export it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use spicerun_spec::{
    is_netlist_path, BackendDescriptor, GenerationMethod, JobError, JobResult, NetlistArtifact,
    NetlistFailureKind,
};

use crate::launcher::{self, ArtifactPaths, LaunchMode};
use crate::monitor;

/// What has to happen before the backend can simulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetlistPlan {
    /// Run this existing netlist.
    Reuse(PathBuf),
    /// Run the schematic itself.
    Direct,
    /// Export a netlist from the schematic first.
    Export,
}

/// Resolves the plan for `schematic` on `descriptor`.
pub fn plan(schematic: &Path, descriptor: &BackendDescriptor) -> JobResult<NetlistPlan> {
    if !schematic.is_file() {
        return Err(JobError::netlist(
            NetlistFailureKind::SchematicMissing,
            format!("schematic {} does not exist", schematic.display()),
        ));
    }
    if is_netlist_path(schematic) {
        return Ok(NetlistPlan::Reuse(schematic.to_path_buf()));
    }
    if let Some(sibling) = fresh_sibling_netlist(schematic) {
        return Ok(NetlistPlan::Reuse(sibling));
    }

    let caps = &descriptor.capabilities;
    if caps.supports_direct_execution {
        Ok(NetlistPlan::Direct)
    } else if caps.supports_netlist_export {
        Ok(NetlistPlan::Export)
    } else {
        Err(JobError::manual_export_required(manual_instructions(
            schematic, descriptor,
        )))
    }
}

/// A `<stem>.net` next to the schematic that is at least as new as it.
fn fresh_sibling_netlist(schematic: &Path) -> Option<PathBuf> {
    let sibling = schematic.with_extension("net");
    let modified = |p: &Path| -> Option<SystemTime> { std::fs::metadata(p).ok()?.modified().ok() };
    let (netlist_time, schematic_time) = (modified(&sibling)?, modified(schematic)?);
    (netlist_time >= schematic_time).then_some(sibling)
}

/// Steps a human has to take when the backend cannot produce a netlist.
pub fn manual_instructions(schematic: &Path, descriptor: &BackendDescriptor) -> String {
    let netlist = schematic.with_extension("net");
    format!(
        "{} cannot simulate {} directly and cannot export a netlist. \
         Open the schematic in LTspice and export it (View > SPICE Netlist, or \
         `LTspice -netlist {}`), save it as {}, then resubmit the job. \
         The netlist is reused as long as it is newer than the schematic.",
        descriptor.label(),
        schematic.display(),
        schematic.display(),
        netlist.display()
    )
}

/// Runs the backend in export mode on a staged schematic and waits for the
/// netlist to appear in the workspace.
pub async fn auto_export(
    staged_schematic: &Path,
    source_schematic: &Path,
    descriptor: &BackendDescriptor,
) -> JobResult<NetlistArtifact> {
    let paths = ArtifactPaths::for_input(staged_schematic);
    let plan = launcher::prepare(descriptor, LaunchMode::Export, &paths, &[])?;
    tracing::info!(
        target: "spicerun::netlist",
        backend = %descriptor.id,
        schematic = %source_schematic.display(),
        "exporting netlist"
    );

    let mut process = launcher::spawn(&plan)?;
    let waited = monitor::await_artifacts(
        &mut process,
        std::slice::from_ref(&paths.netlist),
        &descriptor.polling,
        |_| {},
    )
    .await;
    let diagnostics = process.finish(false).await;

    match waited {
        Ok(_) => Ok(NetlistArtifact {
            schematic: source_schematic.to_path_buf(),
            netlist: paths.netlist,
            method: GenerationMethod::AutoExported,
        }),
        Err(timeout) => {
            let mut message = format!(
                "{} did not produce {} within {} ms",
                descriptor.label(),
                timeout.missing_names(),
                timeout.timeout.as_millis()
            );
            if let Some(code) = diagnostics.exit_code {
                message.push_str(&format!(" (exit status {code})"));
            }
            if !diagnostics.stderr_tail.is_empty() {
                message.push_str(&format!(": {}", diagnostics.stderr_tail));
            }
            Err(JobError::netlist(NetlistFailureKind::ExportTimeout, message))
        }
    }
}

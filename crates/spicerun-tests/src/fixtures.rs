//! Fixture circuits, waveforms and script-driven backends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use spicerun_backend::BackendRegistry;
use spicerun_raw::{encode_raw, EncodeOptions, RawPlot};
use spicerun_scheduler::SchedulerConfig;
use spicerun_spec::{
    BackendDescriptor, Capabilities, ExecutableResolution, InvocationStyle, PollingPolicy,
    RawDialect, WaveformTrace,
};

/// RC time constant of the fixture circuit (1k * 1u).
pub const RC_TAU: f64 = 1e-3;

/// Writes a first-order RC netlist to `dir/rc.cir`.
pub fn rc_netlist(dir: &Path) -> PathBuf {
    let path = dir.join("rc.cir");
    std::fs::write(
        &path,
        "* RC step response\n\
         V1 in 0 PULSE(0 1 0 1n 1n 10m 20m)\n\
         R1 in out 1k\n\
         C1 out 0 1u\n\
         .tran 5m\n\
         .end\n",
    )
    .expect("Failed to write netlist fixture");
    path
}

/// Step response of the fixture circuit, sampled every 0.25 ms.
pub fn rc_plot() -> RawPlot {
    let axis: Vec<f64> = (0..=20).map(|i| i as f64 * 0.25e-3).collect();
    let v_out: Vec<f64> = axis.iter().map(|t| 1.0 - (-t / RC_TAU).exp()).collect();
    let i_r1: Vec<f64> = v_out.iter().map(|v| (1.0 - v) / 1e3).collect();
    let traces = vec![
        WaveformTrace::from_real("V(out)", "V", &axis, &v_out).expect("valid trace"),
        WaveformTrace::from_real("I(R1)", "A", &axis, &i_r1).expect("valid trace"),
    ];
    RawPlot::new("Transient Analysis", "time", "time", axis, traces).expect("valid plot")
}

/// The fixture plot encoded in `dialect`, with double-precision samples.
pub fn rc_raw_bytes(dialect: RawDialect) -> Vec<u8> {
    let options = match dialect {
        RawDialect::Ltspice => EncodeOptions::ltspice(),
        RawDialect::Spice3 => EncodeOptions::spice3(),
    };
    encode_raw(&rc_plot(), &options.double()).expect("Failed to encode fixture plot")
}

/// Writes the encoded fixture plot to `dir/fixture.raw`.
pub fn write_rc_raw(dir: &Path, dialect: RawDialect) -> PathBuf {
    let path = dir.join("fixture.raw");
    std::fs::write(&path, rc_raw_bytes(dialect)).expect("Failed to write raw fixture");
    path
}

/// What a script backend does with the staged netlist.
#[derive(Debug, Clone)]
pub enum ScriptBackend {
    /// Writes a log and copies `raw` next to the input, like a simulator.
    CopyRaw { raw: PathBuf },
    /// Like `CopyRaw`, but exits 9 unless the staged input contains `line`.
    RequireLine { line: String, raw: PathBuf },
    /// Writes a log and exits 0 without a waveform.
    Silent,
    /// Sleeps for `secs` seconds, then behaves like `CopyRaw`.
    Slow { secs: u32, raw: PathBuf },
}

impl ScriptBackend {
    fn script(&self) -> String {
        let copy = |raw: &Path| {
            format!(
                "stem=\"${{1%.*}}\"; echo 'Total elapsed time: 0.01 seconds.' > \"$stem.log\"; cp '{}' \"$stem.raw\"",
                raw.display()
            )
        };
        match self {
            ScriptBackend::CopyRaw { raw } => copy(raw),
            ScriptBackend::RequireLine { line, raw } => {
                format!("grep -q '{}' \"$1\" || exit 9; {}", line, copy(raw))
            }
            ScriptBackend::Silent => "echo 'simulation done' > \"${1%.*}.log\"".to_string(),
            ScriptBackend::Slow { secs, raw } => format!("sleep {}; {}", secs, copy(raw)),
        }
    }
}

/// A netlist-only backend driven by `/bin/sh`.
pub fn script_backend(id: &str, behavior: &ScriptBackend, timeout: Duration) -> BackendDescriptor {
    BackendDescriptor {
        id: id.to_string(),
        display_name: format!("script ({})", id),
        executable: ExecutableResolution::explicit("/bin/sh"),
        invocation: InvocationStyle::Script {
            run: vec![
                "-c".to_string(),
                behavior.script(),
                "sim".to_string(),
                "{input}".to_string(),
            ],
            export: None,
        },
        capabilities: Capabilities {
            requires_netlist_pre_generation: true,
            ..Capabilities::default()
        },
        polling: PollingPolicy::new(Duration::from_millis(10), timeout),
        dialect: RawDialect::Spice3,
        shim: None,
    }
}

/// A registry holding exactly `descriptors`.
pub fn registry_with(descriptors: Vec<BackendDescriptor>) -> Arc<BackendRegistry> {
    let builder = descriptors
        .into_iter()
        .fold(BackendRegistry::builder(), |b, d| b.register(d));
    Arc::new(builder.build().expect("Invalid fixture registry"))
}

/// Scheduler settings tuned for tests: no persistence, millisecond backoff.
pub fn scheduler_config(workspace_root: &Path, concurrency: usize) -> SchedulerConfig {
    SchedulerConfig {
        concurrency,
        max_retries: 2,
        retry_backoff_ms: 1,
        retry_backoff_max_ms: 10,
        result_ttl_secs: 3600,
        workspace_root: workspace_root.to_path_buf(),
        state_file: None,
        fallbacks: BTreeMap::new(),
        poll_overrides: BTreeMap::new(),
    }
}

//! Process launcher.
//!
//! Builds the command line for a backend from its [`InvocationStyle`], routes
//! it through a compatibility shim when the backend needs one, and spawns it
//! inside the job workspace. The child is killed when its handle is dropped.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use spicerun_spec::{BackendDescriptor, InvocationStyle, JobError, JobResult, LaunchDiagnostics};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::executable::resolve_executable;

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 4096;

/// How long to wait for the stderr reader once the process is done.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Whether the backend should simulate or only export a netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Run,
    Export,
}

/// File names a backend run reads and writes, all inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub input: PathBuf,
    pub stem: String,
    pub raw: PathBuf,
    pub log: PathBuf,
    pub netlist: PathBuf,
    pub workdir: PathBuf,
}

impl ArtifactPaths {
    /// Derives `<stem>.raw`, `<stem>.log` and `<stem>.net` next to `input`.
    pub fn for_input(input: &Path) -> Self {
        let workdir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            input: input.to_path_buf(),
            raw: workdir.join(format!("{stem}.raw")),
            log: workdir.join(format!("{stem}.log")),
            netlist: workdir.join(format!("{stem}.net")),
            stem,
            workdir,
        }
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub workdir: PathBuf,
}

impl LaunchPlan {
    /// The command line as one string, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Translates an absolute host path to the `Z:\...` form wine maps the host
/// root to.
pub fn to_wine_path(path: &Path) -> String {
    let text = path.display().to_string();
    if path.is_absolute() && text.starts_with('/') {
        format!("Z:{}", text.replace('/', "\\"))
    } else {
        text
    }
}

fn expand_template(
    template: &str,
    paths: &ArtifactPaths,
    switches: &[String],
    show: &dyn Fn(&Path) -> String,
) -> String {
    template
        .replace("{switches}", &switches.join(" "))
        .replace("{input}", &show(&paths.input))
        .replace("{stem}", &paths.stem)
        .replace("{raw}", &show(&paths.raw))
        .replace("{log}", &show(&paths.log))
        .replace("{netlist}", &show(&paths.netlist))
        .replace("{workdir}", &show(&paths.workdir))
}

/// Expands a script template. A token that is exactly `{switches}` becomes
/// one argument per switch.
fn expand_script(
    templates: &[String],
    paths: &ArtifactPaths,
    switches: &[String],
    show: &dyn Fn(&Path) -> String,
) -> Vec<String> {
    templates
        .iter()
        .flat_map(|t| {
            if t == "{switches}" {
                switches.to_vec()
            } else {
                vec![expand_template(t, paths, switches, show)]
            }
        })
        .collect()
}

/// Backend arguments for a mode, before any shim is applied. `switches` are
/// extra run switches; export ignores them.
pub fn backend_args(
    descriptor: &BackendDescriptor,
    mode: LaunchMode,
    paths: &ArtifactPaths,
    switches: &[String],
) -> JobResult<Vec<String>> {
    let translate = descriptor
        .shim
        .as_ref()
        .map(|s| s.translate_paths)
        .unwrap_or(false);
    let show = |p: &Path| {
        if translate {
            to_wine_path(p)
        } else {
            p.display().to_string()
        }
    };
    let no_export = || {
        JobError::manual_export_required(format!(
            "backend '{}' has no netlist export mode",
            descriptor.id
        ))
    };

    let switches: &[String] = match mode {
        LaunchMode::Run => switches,
        LaunchMode::Export => &[],
    };

    let args = match (&descriptor.invocation, mode) {
        (InvocationStyle::Ltspice, LaunchMode::Run) => {
            let mut args = vec!["-Run".to_string(), "-b".to_string(), show(&paths.input)];
            args.extend_from_slice(switches);
            args
        }
        (InvocationStyle::Ltspice, LaunchMode::Export) => {
            vec!["-netlist".to_string(), show(&paths.input)]
        }
        (InvocationStyle::Ngspice, LaunchMode::Run) => {
            let mut args = vec![
                "-b".to_string(),
                "-r".to_string(),
                show(&paths.raw),
                "-o".to_string(),
                show(&paths.log),
            ];
            args.extend_from_slice(switches);
            args.push(show(&paths.input));
            args
        }
        (InvocationStyle::Qspice, LaunchMode::Run) => {
            let mut args = vec![
                "-binary".to_string(),
                "-o".to_string(),
                show(&paths.log),
                "-r".to_string(),
                show(&paths.raw),
            ];
            args.extend_from_slice(switches);
            args.push(show(&paths.input));
            args
        }
        (InvocationStyle::Ngspice | InvocationStyle::Qspice, LaunchMode::Export) => {
            return Err(no_export())
        }
        (InvocationStyle::Script { run, .. }, LaunchMode::Run) => {
            expand_script(run, paths, switches, &show)
        }
        (InvocationStyle::Script { export, .. }, LaunchMode::Export) => {
            expand_script(export.as_ref().ok_or_else(no_export)?, paths, switches, &show)
        }
    };
    Ok(args)
}

/// Resolves executables and builds the command line for a mode.
pub fn prepare(
    descriptor: &BackendDescriptor,
    mode: LaunchMode,
    paths: &ArtifactPaths,
    switches: &[String],
) -> JobResult<LaunchPlan> {
    let executable = resolve_executable(&descriptor.executable)?;
    let args = backend_args(descriptor, mode, paths, switches)?;

    let plan = match &descriptor.shim {
        Some(shim) if descriptor.capabilities.requires_compatibility_shim => {
            let program = resolve_executable(&shim.program)?;
            let exe = if shim.translate_paths {
                to_wine_path(&executable)
            } else {
                executable.display().to_string()
            };
            LaunchPlan {
                program,
                args: std::iter::once(exe).chain(args).map(OsString::from).collect(),
                workdir: paths.workdir.clone(),
            }
        }
        _ => LaunchPlan {
            program: executable,
            args: args.into_iter().map(OsString::from).collect(),
            workdir: paths.workdir.clone(),
        },
    };
    Ok(plan)
}

/// Returns true if a spawn failure is worth retrying.
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) {
        return true;
    }
    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return matches!(
                code,
                libc::EAGAIN | libc::EMFILE | libc::ENFILE | libc::ENOMEM | libc::EBUSY | libc::ETXTBSY
            );
        }
    }
    false
}

/// A spawned backend process.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    program: String,
    started: Instant,
    exit: Option<ExitStatus>,
    stderr: Option<JoinHandle<String>>,
}

/// Spawns a plan. The child inherits nothing from the terminal and is killed
/// when the returned handle is dropped.
pub fn spawn(plan: &LaunchPlan) -> JobResult<RunningProcess> {
    let program = plan
        .program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| plan.program.display().to_string());

    let mut child = Command::new(&plan.program)
        .args(&plan.args)
        .current_dir(&plan.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| JobError::ProcessLaunchFailed {
            program: program.clone(),
            message: e.to_string(),
            transient: is_transient(&e),
        })?;

    tracing::debug!(
        target: "spicerun::launcher",
        pid = child.id(),
        command = %plan.display(),
        "spawned backend"
    );

    let stderr = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut tail = Vec::new();
            let mut chunk = [0u8; 1024];
            while let Ok(n) = pipe.read(&mut chunk).await {
                if n == 0 {
                    break;
                }
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        })
    });

    Ok(RunningProcess {
        child,
        program,
        started: Instant::now(),
        exit: None,
        stderr,
    })
}

impl RunningProcess {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Exit status, if the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Checks for exit without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit)
    }

    /// Waits for exit. Cancel safe.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Kills the process if it is still running.
    pub async fn kill(&mut self) {
        if self.exit.is_none() {
            if let Err(e) = self.child.kill().await {
                tracing::warn!(target: "spicerun::launcher", program = %self.program, error = %e, "failed to kill backend");
            }
            self.exit = self.child.try_wait().ok().flatten();
        }
    }

    /// Collects launcher diagnostics. Kills the process if it is still
    /// running so the stderr pipe closes.
    pub async fn finish(mut self, detached: bool) -> LaunchDiagnostics {
        let elapsed_ms = self.elapsed().as_millis() as u64;
        self.kill().await;
        let stderr_tail = match self.stderr.take() {
            Some(handle) => tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default(),
            None => String::new(),
        };
        diagnostics(self.exit, detached, stderr_tail, elapsed_ms)
    }
}

fn diagnostics(
    exit: Option<ExitStatus>,
    detached: bool,
    stderr_tail: String,
    elapsed_ms: u64,
) -> LaunchDiagnostics {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        exit.and_then(|s| s.signal())
    };
    #[cfg(not(unix))]
    let signal = None;

    LaunchDiagnostics {
        exit_code: exit.and_then(|s| s.code()),
        signal,
        detached,
        stderr_tail: stderr_tail.trim_end().to_string(),
        elapsed_ms,
    }
}

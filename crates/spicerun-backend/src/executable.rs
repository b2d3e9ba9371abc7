//! Executable lookup.

use std::path::{Path, PathBuf};

use spicerun_spec::{ExecutableResolution, JobError, JobResult};

/// Finds an executable following the resolution order: explicit path,
/// environment variable, `PATH` lookup, then common installation paths.
pub fn resolve_executable(resolution: &ExecutableResolution) -> JobResult<PathBuf> {
    find_executable(resolution).ok_or_else(|| JobError::ProcessLaunchFailed {
        program: program_name(resolution),
        message: format!("executable not found (looked in {})", resolution.describe()),
        transient: false,
    })
}

/// Like [`resolve_executable`] but returns `None` instead of an error.
pub fn find_executable(resolution: &ExecutableResolution) -> Option<PathBuf> {
    if let Some(ref path) = resolution.explicit {
        if path.exists() {
            return Some(path.clone());
        }
    }

    if let Some(ref var) = resolution.env_var {
        if let Ok(value) = std::env::var(var) {
            let path = PathBuf::from(value);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(
                target: "spicerun::backend",
                var = %var,
                path = %path.display(),
                "environment override points at a missing file"
            );
        }
    }

    for name in &resolution.names {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    resolution
        .common_paths
        .iter()
        .map(|p| expand_home(p))
        .find(|p| p.exists())
}

/// Name used for an executable in diagnostics.
pub fn program_name(resolution: &ExecutableResolution) -> String {
    if let Some(name) = resolution.names.first() {
        return name.clone();
    }
    if let Some(path) = &resolution.explicit {
        return path.display().to_string();
    }
    resolution
        .env_var
        .as_ref()
        .map(|v| format!("${v}"))
        .unwrap_or_else(|| "<unresolved>".to_string())
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolution = ExecutableResolution {
            explicit: Some(file.path().to_path_buf()),
            names: vec!["definitely-not-a-simulator-xyz".into()],
            ..Default::default()
        };
        assert_eq!(resolve_executable(&resolution).unwrap(), file.path());
    }

    #[test]
    fn test_env_var_lookup() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let var = "SPICERUN_TEST_EXECUTABLE_ENV_LOOKUP";
        std::env::set_var(var, file.path());
        let resolution = ExecutableResolution::from_env(var, &[]);
        assert_eq!(find_executable(&resolution).as_deref(), Some(file.path()));
        std::env::remove_var(var);
    }

    #[test]
    fn test_common_paths_checked_last() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("LTspice.exe");
        std::fs::write(&exe, b"").unwrap();
        let resolution = ExecutableResolution::default()
            .with_common_paths(&["/nonexistent/LTspice.exe", exe.to_str().unwrap()]);
        assert_eq!(find_executable(&resolution), Some(exe));
    }

    #[test]
    fn test_missing_executable_is_fatal() {
        let resolution = ExecutableResolution::from_env(
            "SPICERUN_TEST_UNSET_VARIABLE",
            &["definitely-not-a-simulator-xyz"],
        );
        match resolve_executable(&resolution).unwrap_err() {
            JobError::ProcessLaunchFailed {
                program,
                message,
                transient,
            } => {
                assert_eq!(program, "definitely-not-a-simulator-xyz");
                assert!(message.contains("$SPICERUN_TEST_UNSET_VARIABLE"));
                assert!(!transient);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! Job table persistence.
//!
//! The table is written as one JSON document, replaced atomically: the new
//! contents go to a temporary file in the same directory which is then
//! renamed over the old one.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spicerun_spec::{SimulationJob, SimulationResult};
use tempfile::NamedTempFile;

use crate::error::{SchedulerError, SchedulerResult};

/// Current state file format version.
pub const STATE_VERSION: u32 = 1;

/// One persisted job with its result, if it completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub job: SimulationJob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SimulationResult>,
}

#[derive(Serialize)]
struct StateOut<'a> {
    version: u32,
    jobs: Vec<PersistedJobRef<'a>>,
}

#[derive(Serialize)]
struct PersistedJobRef<'a> {
    job: &'a SimulationJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a SimulationResult>,
}

#[derive(Deserialize)]
struct StateIn {
    version: u32,
    jobs: Vec<PersistedJob>,
}

/// Location of the persisted job table.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the table. A missing file is an empty table.
    pub fn load(&self) -> SchedulerResult<Vec<PersistedJob>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.load_error(e)),
        };
        let state: StateIn = serde_json::from_str(&text).map_err(|e| self.load_error(e))?;
        if state.version != STATE_VERSION {
            return Err(self.load_error(format!(
                "unsupported version {} (expected {STATE_VERSION})",
                state.version
            )));
        }
        Ok(state.jobs)
    }

    /// Replaces the table with `jobs`.
    pub fn save<'a>(
        &self,
        jobs: impl IntoIterator<Item = (&'a SimulationJob, Option<&'a SimulationResult>)>,
    ) -> SchedulerResult<()> {
        let state = StateOut {
            version: STATE_VERSION,
            jobs: jobs
                .into_iter()
                .map(|(job, result)| PersistedJobRef { job, result })
                .collect(),
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.save_error(e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.save_error(e))?;
        serde_json::to_writer_pretty(&mut file, &state).map_err(|e| self.save_error(e))?;
        file.write_all(b"\n").map_err(|e| self.save_error(e))?;
        file.persist(&self.path).map_err(|e| self.save_error(e.error))?;
        Ok(())
    }

    fn load_error(&self, err: impl std::fmt::Display) -> SchedulerError {
        SchedulerError::StateLoad {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }

    fn save_error(&self, err: impl std::fmt::Display) -> SchedulerError {
        SchedulerError::StateSave {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

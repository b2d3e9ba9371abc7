//! SPICE raw waveform files
//!
//! Decodes the `.raw` files written by LTspice and SPICE3-family simulators
//! (ngspice, Qspice in compatibility mode) into [`WaveformTrace`]s, and
//! writes the same format back out.
//!
//! Decoding is all-or-nothing: a file whose header and data disagree, whose
//! data is truncated, or whose traces violate an invariant yields an error and
//! no traces.
//!
//! ```
//! use spicerun_raw::{decode_raw, encode_raw, EncodeOptions, RawPlot};
//! use spicerun_spec::WaveformTrace;
//!
//! let axis = vec![0.0, 1e-3, 2e-3];
//! let trace = WaveformTrace::from_real("V(out)", "V", &axis, &[0.0, 0.5, 1.0]).unwrap();
//! let plot = RawPlot::new("Transient Analysis", "time", "time", axis, vec![trace]).unwrap();
//!
//! let bytes = encode_raw(&plot, &EncodeOptions::ltspice()).unwrap();
//! let decoded = decode_raw(&bytes).unwrap().into_primary();
//! assert_eq!(decoded.traces(), plot.traces());
//! ```
//!
//! [`WaveformTrace`]: spicerun_spec::WaveformTrace

pub mod decode;
pub mod encode;
pub mod error;
pub mod header;
pub mod plot;

pub use decode::{decode_raw, decode_raw_as};
pub use encode::{encode_raw, write_raw, EncodeOptions};
pub use error::{RawError, RawResult};
pub use header::{unit_for_kind, DataFormat, Flags, RawHeader, TextEncoding, Variable};
pub use plot::{RawFile, RawPlot};

use std::path::Path;

use spicerun_spec::{JobError, RawDialect};

/// Reads and decodes a raw file from disk, mapping failures to
/// [`JobError::ArtifactParseError`]. `None` infers the dialect.
pub fn read_raw_file(path: &Path, dialect: Option<RawDialect>) -> Result<RawFile, JobError> {
    let artifact = path.display().to_string();
    let bytes = std::fs::read(path)
        .map_err(|e| JobError::parse(artifact.clone(), format!("cannot read: {e}")))?;
    let decoded = match dialect {
        Some(dialect) => decode_raw_as(&bytes, dialect),
        None => decode_raw(&bytes),
    };
    decoded.map_err(|e| e.into_job_error(artifact))
}

//! Decoded plots.

use spicerun_spec::{ensure_unique_names, RawDialect, WaveformTrace};

use crate::error::{RawError, RawResult};
use crate::header::{kind_for_unit, DataFormat, Flags, RawHeader, TextEncoding, Variable};

/// One plot of a raw file: the header, the independent axis and one trace
/// per dependent variable.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlot {
    header: RawHeader,
    dialect: RawDialect,
    axis: Vec<f64>,
    traces: Vec<WaveformTrace>,
}

impl RawPlot {
    pub(crate) fn from_parts(
        header: RawHeader,
        dialect: RawDialect,
        axis: Vec<f64>,
        traces: Vec<WaveformTrace>,
    ) -> Self {
        Self {
            header,
            dialect,
            axis,
            traces,
        }
    }

    /// Builds a plot from traces sharing one axis, e.g. for writing a
    /// synthetic raw file.
    pub fn new(
        plot_name: impl Into<String>,
        axis_name: impl Into<String>,
        axis_kind: impl Into<String>,
        axis: Vec<f64>,
        traces: Vec<WaveformTrace>,
    ) -> RawResult<Self> {
        ensure_unique_names(&traces)?;
        for trace in &traces {
            if trace.len() != axis.len() {
                return Err(RawError::Inconsistent(format!(
                    "trace '{}' has {} samples, axis has {}",
                    trace.name(),
                    trace.len(),
                    axis.len()
                )));
            }
            if trace.times().zip(&axis).any(|(t, &a)| t != a) {
                return Err(RawError::Inconsistent(format!(
                    "trace '{}' is not sampled on the plot axis",
                    trace.name()
                )));
            }
        }

        let complex = traces
            .iter()
            .any(|t| t.samples().iter().any(|s| s.value.is_complex()));
        let mut variables = vec![Variable::new(0, axis_name, axis_kind)];
        variables.extend(
            traces
                .iter()
                .enumerate()
                .map(|(i, t)| Variable::new(i + 1, t.name(), kind_for_unit(t.unit()))),
        );

        let header = RawHeader {
            title: "spicerun".to_string(),
            date: String::new(),
            plot_name: plot_name.into(),
            flags: Flags {
                complex,
                ..Flags::default()
            },
            n_points: axis.len(),
            offset: 0.0,
            command: String::new(),
            variables,
            format: DataFormat::Binary,
            encoding: TextEncoding::Utf8,
        };
        Ok(Self::from_parts(header, RawDialect::Spice3, axis, traces))
    }

    pub fn header(&self) -> &RawHeader {
        &self.header
    }

    /// Dialect the plot was decoded as.
    pub fn dialect(&self) -> RawDialect {
        self.dialect
    }

    pub fn plot_name(&self) -> &str {
        &self.header.plot_name
    }

    /// Independent axis values (time or frequency).
    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn traces(&self) -> &[WaveformTrace] {
        &self.traces
    }

    /// Looks up a trace by name, ignoring ASCII case.
    pub fn trace(&self, name: &str) -> Option<&WaveformTrace> {
        self.traces
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn into_traces(self) -> Vec<WaveformTrace> {
        self.traces
    }
}

/// All plots of a raw file, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    plots: Vec<RawPlot>,
}

impl RawFile {
    pub(crate) fn new(plots: Vec<RawPlot>) -> Self {
        Self { plots }
    }

    pub fn plots(&self) -> &[RawPlot] {
        &self.plots
    }

    /// The plot a simulation result is built from: the last one written.
    pub fn primary(&self) -> &RawPlot {
        &self.plots[self.plots.len() - 1]
    }

    pub fn into_primary(mut self) -> RawPlot {
        // A decoded file always holds at least one plot.
        self.plots.swap_remove(self.plots.len() - 1)
    }
}

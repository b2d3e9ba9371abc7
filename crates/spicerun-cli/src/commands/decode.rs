//! Decode command implementation
//!
//! Reads a `.raw` file and prints a summary of every plot in it.

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use spicerun_raw::{read_raw_file, DataFormat, RawFile, RawPlot};
use spicerun_spec::{JobFailure, RawDialect};

use super::reporting::{self, TraceSummary};

#[derive(Debug, Serialize)]
struct DecodeOutput {
    success: bool,
    file: String,
    plots: Vec<PlotSummary>,
}

#[derive(Debug, Serialize)]
struct PlotSummary {
    plot_name: String,
    dialect: RawDialect,
    format: &'static str,
    axis: String,
    points: usize,
    traces: Vec<TraceSummary>,
}

impl PlotSummary {
    fn of(plot: &RawPlot) -> Self {
        let header = plot.header();
        Self {
            plot_name: plot.plot_name().to_string(),
            dialect: plot.dialect(),
            format: match header.format {
                DataFormat::Binary => "binary",
                DataFormat::Ascii => "ascii",
            },
            axis: header.axis().name.clone(),
            points: plot.axis().len(),
            traces: reporting::summarize(plot.traces()),
        }
    }
}

/// Decode a raw waveform file.
///
/// # Arguments
/// * `file` - Path to the `.raw` file
/// * `dialect` - `ltspice` or `spice3`; inferred when absent
/// * `json` - Whether to output machine-readable JSON
pub fn run(file: &str, dialect: Option<&str>, json: bool) -> Result<ExitCode> {
    let dialect = match dialect {
        None => None,
        Some("ltspice") => Some(RawDialect::Ltspice),
        Some("spice3") => Some(RawDialect::Spice3),
        Some(other) => bail!("Unknown dialect '{}'", other),
    };

    let raw = match read_raw_file(Path::new(file), dialect) {
        Ok(raw) => raw,
        Err(e) => {
            if json {
                reporting::print_json(&serde_json::json!({
                    "success": false,
                    "code": e.code(),
                    "message": e.to_string(),
                }))?;
            } else {
                eprintln!("{} [{}] {}", "error".red().bold(), e.code(), e);
            }
            return Ok(ExitCode::from(1));
        }
    };

    if json {
        reporting::print_json(&summarize_file(file, &raw))?;
    } else {
        print_file(file, &raw);
    }
    Ok(ExitCode::SUCCESS)
}

fn summarize_file(file: &str, raw: &RawFile) -> DecodeOutput {
    DecodeOutput {
        success: true,
        file: file.to_string(),
        plots: raw.plots().iter().map(PlotSummary::of).collect(),
    }
}

fn print_file(file: &str, raw: &RawFile) {
    println!("{} {}", "Decoded".cyan().bold(), file);
    let last = raw.plots().len() - 1;
    for (index, plot) in raw.plots().iter().enumerate() {
        let summary = PlotSummary::of(plot);
        println!();
        println!(
            "{} {}{}",
            "Plot".bold(),
            summary.plot_name,
            if index == last {
                " (primary)".dimmed().to_string()
            } else {
                String::new()
            }
        );
        println!(
            "  {} {:?}, {}, axis {}, {} points",
            "format".dimmed(),
            summary.dialect,
            summary.format,
            summary.axis,
            summary.points
        );
        reporting::print_trace_table(&summary.traces);
    }
}

//! Text and JSON rendering shared by the commands.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use spicerun_scheduler::{CancelAck, ClientError, ClientResult};
use spicerun_spec::{JobError, JobFailure, JobSnapshot, JobStatus, SimulationResult, WaveformTrace};

/// Per-trace summary printed instead of the full sample data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub name: String,
    pub unit: String,
    pub points: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TraceSummary {
    /// Summarizes a trace by the real part of its samples.
    pub fn of(trace: &WaveformTrace) -> Self {
        let (min, max) = trace.real_values().fold((None, None), |(lo, hi), v| {
            (
                Some(lo.map_or(v, |lo: f64| lo.min(v))),
                Some(hi.map_or(v, |hi: f64| hi.max(v))),
            )
        });
        Self {
            name: trace.name().to_string(),
            unit: trace.unit().to_string(),
            points: trace.len(),
            min,
            max,
        }
    }
}

pub fn summarize(traces: &[WaveformTrace]) -> Vec<TraceSummary> {
    traces.iter().map(TraceSummary::of).collect()
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

pub fn print_trace_table(summaries: &[TraceSummary]) {
    let width = summaries.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for s in summaries {
        let range = match (s.min, s.max) {
            (Some(min), Some(max)) => format!("{:>12.6e} .. {:<12.6e}", min, max),
            _ => "(empty)".to_string(),
        };
        println!(
            "  {:<width$}  {:<3} {:>7} pts  {}",
            s.name.cyan(),
            s.unit,
            s.points,
            range.dimmed(),
            width = width
        );
    }
}

/// Prints a completed job's result.
pub fn print_result(result: &SimulationResult) {
    println!(
        "{} {} ({}, backend {})",
        "ok".green(),
        result.plot_name.bold(),
        result.job_id.short(),
        result.backend
    );
    if let Some(netlist) = &result.netlist {
        println!(
            "  {} {} ({})",
            "netlist".dimmed(),
            netlist.netlist.display(),
            netlist.method.as_str()
        );
    }
    let diag = &result.diagnostics;
    println!(
        "  {} {} ms{}",
        "elapsed".dimmed(),
        diag.elapsed_ms,
        if diag.detached { " (detached)" } else { "" }
    );
    println!();
    print_trace_table(&summarize(result.traces()));
}

/// Prints one job snapshot.
pub fn print_snapshot(snapshot: &JobSnapshot) {
    println!("{} {}", "Job".cyan().bold(), snapshot.id);
    println!("  {:<10} {}", "status", colored_status(snapshot.status));
    println!("  {:<10} {}", "backend", snapshot.backend);
    println!("  {:<10} {}", "schematic", snapshot.schematic.display());
    println!("  {:<10} {}", "retries", snapshot.retry_count);
    println!(
        "  {:<10} {}",
        "submitted",
        snapshot.timestamps.submitted_at.to_rfc3339()
    );
    if let Some(at) = snapshot.timestamps.completed_at {
        println!("  {:<10} {}", "finished", at.to_rfc3339());
    }
    if let Some(error) = &snapshot.error {
        print_job_error(error);
    }
}

pub fn print_cancel(ack: &CancelAck) {
    if ack.already_terminal {
        println!(
            "{} job {} had already finished ({})",
            "!!".yellow(),
            ack.id,
            colored_status(ack.status)
        );
    } else {
        println!("{} job {} {}", "ok".green(), ack.id, colored_status(ack.status));
    }
}

pub fn print_job_error(error: &JobError) {
    let text = error.to_string();
    let mut lines = text.lines();
    eprintln!(
        "  {} [{}] {}",
        "!!".red(),
        error.code(),
        lines.next().unwrap_or_default()
    );
    // Manual export instructions span several lines.
    for line in lines {
        eprintln!("     {}", line.dimmed());
    }
}

/// Prints a client error, including the job failure detail when present.
pub fn print_client_error(error: &ClientError) {
    eprintln!("{} [{}] {}", "error".red().bold(), error.code(), error);
    if let ClientError::JobFailed { detail, .. } = error {
        print_job_error(detail);
    }
}

#[derive(Serialize)]
struct JsonClientError<'a> {
    success: bool,
    code: &'static str,
    message: String,
    detail: &'a ClientError,
}

/// Prints a client error as JSON on stdout.
pub fn print_client_error_json(error: &ClientError) -> Result<()> {
    print_json(&JsonClientError {
        success: false,
        code: error.code(),
        message: error.message(),
        detail: error,
    })
}

/// Prints the outcome of a fetch and picks the exit code.
pub fn report_fetch(outcome: ClientResult<SimulationResult>, json: bool) -> Result<ExitCode> {
    match outcome {
        Ok(result) => {
            if json {
                print_json(&result)?;
            } else {
                print_result(&result);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_client_error(&e, json)?;
            Ok(ExitCode::from(1))
        }
    }
}

pub fn report_client_error(error: &ClientError, json: bool) -> Result<()> {
    if json {
        print_client_error_json(error)
    } else {
        print_client_error(error);
        Ok(())
    }
}

pub fn colored_status(status: JobStatus) -> colored::ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
        JobStatus::Cancelled => status.as_str().yellow(),
        _ => status.as_str().cyan(),
    }
}

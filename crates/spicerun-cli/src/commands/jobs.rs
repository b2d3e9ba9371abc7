//! Client commands against a running job server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::ExitCode;
use std::time::Duration;

use spicerun_scheduler::{ClientError, JobClient, SubmitRequest};
use spicerun_spec::{parse_override_args, JobId};

use super::reporting;
use crate::remote::RemoteClient;

/// Interval between status polls with `submit --wait`.
const WAIT_POLL: Duration = Duration::from_millis(250);

/// Submit a job, optionally waiting for its result.
pub fn submit(
    url: &str,
    schematic: &str,
    backend: &str,
    params: &[String],
    switches: &[String],
    wait: bool,
    json: bool,
) -> Result<ExitCode> {
    let overrides = parse_override_args(params).context("Invalid --param value")?;
    let request = SubmitRequest::new(schematic, backend)
        .with_overrides(overrides)
        .with_switches(switches.to_vec());

    with_client(url, json, |client| async move {
        let id = match client.submit(request).await {
            Ok(id) => id,
            Err(e) => return fail(&e, json),
        };
        if !wait {
            if json {
                reporting::print_json(&serde_json::json!({ "success": true, "job_id": id }))?;
            } else {
                println!("{} job {}", "Submitted".cyan().bold(), id);
            }
            return Ok(ExitCode::SUCCESS);
        }
        if !json {
            eprintln!("{} job {}, waiting", "Submitted".cyan().bold(), id);
        }
        let outcome = match client.wait_for_terminal(id, WAIT_POLL).await {
            Ok(_) => client.fetch(id).await,
            Err(e) => Err(e),
        };
        reporting::report_fetch(outcome, json)
    })
}

/// Print the status of a job.
pub fn status(url: &str, job_id: &str, json: bool) -> Result<ExitCode> {
    let id = parse_job_id(job_id)?;
    with_client(url, json, |client| async move {
        match client.status(id).await {
            Ok(snapshot) => {
                if json {
                    reporting::print_json(&snapshot)?;
                } else {
                    reporting::print_snapshot(&snapshot);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => fail(&e, json),
        }
    })
}

/// Fetch and print the result of a completed job.
pub fn fetch(url: &str, job_id: &str, json: bool) -> Result<ExitCode> {
    let id = parse_job_id(job_id)?;
    with_client(url, json, |client| async move {
        reporting::report_fetch(client.fetch(id).await, json)
    })
}

/// Cancel a job.
pub fn cancel(url: &str, job_id: &str, json: bool) -> Result<ExitCode> {
    let id = parse_job_id(job_id)?;
    with_client(url, json, |client| async move {
        match client.cancel(id).await {
            Ok(ack) => {
                if json {
                    reporting::print_json(&ack)?;
                } else {
                    reporting::print_cancel(&ack);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => fail(&e, json),
        }
    })
}

fn parse_job_id(job_id: &str) -> Result<JobId> {
    job_id
        .parse()
        .with_context(|| format!("Invalid job id: {}", job_id))
}

/// Connects to `url` and runs `body` on a single-threaded runtime.
fn with_client<F, Fut>(url: &str, json: bool, body: F) -> Result<ExitCode>
where
    F: FnOnce(RemoteClient) -> Fut,
    Fut: std::future::Future<Output = Result<ExitCode>>,
{
    let rt = super::current_thread_runtime()?;
    rt.block_on(async move {
        let client = match RemoteClient::connect(url).await {
            Ok(client) => client,
            Err(e) => return fail(&e, json),
        };
        body(client).await
    })
}

fn fail(error: &ClientError, json: bool) -> Result<ExitCode> {
    reporting::report_client_error(error, json)?;
    Ok(ExitCode::from(1))
}


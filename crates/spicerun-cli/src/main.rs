//! spicerun CLI - run SPICE simulations and collect their waveforms
//!
//! This binary runs simulations in process, decodes raw waveform files, and
//! hosts or talks to the WebSocket job server.

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;

use spicerun_cli::{commands, logging};

mod cli_args;
use cli_args::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(if cli.verbose { "debug" } else { "info" });

    let result = match cli.command {
        Commands::Run {
            schematic,
            backend,
            params,
            switches,
            config,
            json,
        } => commands::run::run(
            &schematic,
            &backend,
            &params,
            &switches,
            config.as_deref(),
            json,
        ),
        Commands::Decode {
            file,
            dialect,
            json,
        } => commands::decode::run(&file, dialect.as_deref(), json),
        Commands::Backends { config, json } => commands::backends::run(config.as_deref(), json),
        #[cfg(feature = "serve")]
        Commands::Serve { port, config } => commands::serve::run(
            port.unwrap_or(commands::serve::DEFAULT_PORT),
            config.as_deref(),
        ),
        #[cfg(feature = "serve")]
        Commands::Submit {
            schematic,
            backend,
            params,
            switches,
            url,
            wait,
            json,
        } => commands::jobs::submit(&url, &schematic, &backend, &params, &switches, wait, json),
        #[cfg(feature = "serve")]
        Commands::Status { job_id, url, json } => commands::jobs::status(&url, &job_id, json),
        #[cfg(feature = "serve")]
        Commands::Fetch { job_id, url, json } => commands::jobs::fetch(&url, &job_id, json),
        #[cfg(feature = "serve")]
        Commands::Cancel { job_id, url, json } => commands::jobs::cancel(&url, &job_id, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

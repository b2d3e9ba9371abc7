//! CLI argument definitions for the spicerun command-line interface.
//!
//! All `#[derive(Parser)]` and `#[derive(Subcommand)]` types are defined here,
//! keeping `main.rs` focused on dispatch logic.

use clap::{Parser, Subcommand};

/// spicerun - Circuit simulation job runner
#[derive(Parser)]
#[command(name = "spicerun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run one simulation in process and print its traces
    Run {
        /// Schematic (.asc, .qsch) or netlist (.net, .cir, .sp) to simulate
        schematic: String,

        /// Backend id (see `spicerun backends`)
        #[arg(short, long, default_value = "ltspice")]
        backend: String,

        /// Parameter overrides, e.g. `R1=2k,C1=10n` (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Extra backend switch, e.g. `--switch=-ascii` (repeatable)
        #[arg(long = "switch", allow_hyphen_values = true)]
        switches: Vec<String>,

        /// Path to a JSON config file
        #[arg(long)]
        config: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Decode a .raw waveform file and summarize its traces
    Decode {
        /// Path to the .raw file
        file: String,

        /// Force a dialect instead of inferring it from the file
        #[arg(long, value_parser = ["ltspice", "spice3"])]
        dialect: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// List configured backends and whether their executables are installed
    Backends {
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Start the WebSocket job server
    #[cfg(feature = "serve")]
    Serve {
        /// Port to listen on (default: 9124)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to a JSON config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Submit a job to a running server
    #[cfg(feature = "serve")]
    Submit {
        /// Schematic or netlist path, as seen by the server
        schematic: String,

        /// Backend id
        #[arg(short, long, default_value = "ltspice")]
        backend: String,

        /// Parameter overrides, e.g. `R1=2k,C1=10n` (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Extra backend switch, e.g. `--switch=-ascii` (repeatable)
        #[arg(long = "switch", allow_hyphen_values = true)]
        switches: Vec<String>,

        /// Server URL
        #[arg(long, default_value = spicerun_cli::remote::DEFAULT_URL)]
        url: String,

        /// Wait for the job to finish and print its result
        #[arg(long)]
        wait: bool,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Show the status of a job on a running server
    #[cfg(feature = "serve")]
    Status {
        /// Job id
        job_id: String,

        /// Server URL
        #[arg(long, default_value = spicerun_cli::remote::DEFAULT_URL)]
        url: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Fetch the result of a completed job from a running server
    #[cfg(feature = "serve")]
    Fetch {
        /// Job id
        job_id: String,

        /// Server URL
        #[arg(long, default_value = spicerun_cli::remote::DEFAULT_URL)]
        url: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Cancel a job on a running server
    #[cfg(feature = "serve")]
    Cancel {
        /// Job id
        job_id: String,

        /// Server URL
        #[arg(long, default_value = spicerun_cli::remote::DEFAULT_URL)]
        url: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },
}

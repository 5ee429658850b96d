use std::path::PathBuf;

use checkpoint_service::{BackendKind, ServiceType};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "checkpoint background job manager")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Use this backend instead of detecting one
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install (or reinstall) a background job and activate it
    Install {
        /// Logical service name, e.g. `myproj-watcher`
        name: String,

        /// Executable the job runs
        #[arg(long)]
        script: PathBuf,

        /// Project directory the job works in
        #[arg(long)]
        project_dir: PathBuf,

        /// Human-readable project name
        #[arg(long)]
        project_name: String,

        /// watcher | daemon | watchdog
        #[arg(long = "type", value_name = "TYPE")]
        service_type: ServiceType,
    },
    /// Remove a job under every naming scheme (no-op when absent)
    Uninstall { name: String },
    /// Start an installed job (Exit 0 = success, 1 = failed)
    Start { name: String },
    /// Stop an installed job (Exit 0 = success, 1 = failed)
    Stop { name: String },
    /// Restart an installed job (Exit 0 = success, 1 = failed)
    Restart { name: String },
    /// Check job status (Exit 0 = running, 1 = stopped)
    Status { name: String },
    /// Print raw backend rows of checkpoint services, or rows containing PATTERN
    List {
        /// Plain substring match; without it, current and legacy identities are listed
        pattern: Option<String>,

        /// Print logical service names instead of raw rows
        #[arg(long)]
        names: bool,
    },
    /// Print the detected backend
    Detect,
}

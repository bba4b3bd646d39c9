//! Command-line flags baked into the instance bootstrap script.

use std::path::PathBuf;

use clap::Parser;

/// Claim and run spotline tasks until the queue is empty.
#[derive(Debug, Clone, Parser)]
#[command(name = "spotline-worker", version, about)]
pub struct Cli {
    /// Minutes between progress reports; 0 disables them.
    #[arg(short, long, default_value_t = 0)]
    pub progress: u32,

    /// Signed callback URL used to claim work and report progress.
    #[arg(short, long)]
    pub callback: String,

    /// Directory commands run in. Must hold no files at claim time.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Identifier reported to the controller. Defaults to the instance id.
    #[arg(long)]
    pub worker_id: Option<String>,
}

//! `spotline-worker` -- task runner for provisioned instances.
//!
//! Started by the instance bootstrap script with the task's signed
//! callback URL. Claims tasks until the queue is empty, then exits so the
//! script can shut the host down.
//!
//! # Flags
//!
//! | Flag           | Required | Default        | Description                         |
//! |----------------|----------|----------------|-------------------------------------|
//! | `--callback`   | yes      | --             | Signed callback URL                 |
//! | `--progress`   | no       | `0`            | Minutes between heartbeats, 0 = off |
//! | `--work-dir`   | no       | `.`            | Directory commands run in           |
//! | `--worker-id`  | no       | instance id    | Identifier reported to the controller |

use clap::Parser;
use spotline_cloud::metadata::{self, InstanceMetadata};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotline_worker::activity::ActivitySampler;
use spotline_worker::cli::Cli;
use spotline_worker::client::CallbackClient;
use spotline_worker::preemption::{MetadataWatch, NoPreemption, PreemptionWatch};
use spotline_worker::runner::Runner;
use spotline_worker::supervisor::{Supervisor, SupervisorConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotline_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // --- Identity ---
    let metadata = InstanceMetadata::new(metadata::DEFAULT_ENDPOINT).ok();
    let instance_id = match &metadata {
        Some(metadata) => metadata.instance_id().await.ok().flatten(),
        None => None,
    };
    let worker_id = cli
        .worker_id
        .clone()
        .or_else(|| instance_id.clone())
        .unwrap_or_else(|| format!("local-{}", std::process::id()));

    let watch: Box<dyn PreemptionWatch> = match (metadata, &instance_id) {
        (Some(metadata), Some(_)) => Box::new(MetadataWatch::new(metadata)),
        _ => {
            tracing::info!("Not on an EC2 instance, preemption checks disabled");
            Box::new(NoPreemption)
        }
    };

    tracing::info!(
        worker_id = %worker_id,
        progress_minutes = cli.progress,
        work_dir = %cli.work_dir.display(),
        "Starting spotline-worker",
    );

    let client = CallbackClient::new(&cli.callback, worker_id).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    });

    let sampler = ActivitySampler::capture();
    tracing::debug!(baseline = sampler.baseline_len(), "Captured process baseline");
    let supervisor = Supervisor::new(
        SupervisorConfig::with_progress_minutes(cli.progress),
        watch,
        sampler,
    );
    let mut runner = Runner::new(client, cli.work_dir, supervisor);

    match runner.run().await {
        Ok(summary) => {
            tracing::info!(
                completed = summary.completed,
                failed = summary.failed,
                preempted = summary.preempted,
                "Runner finished",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Runner stopped");
            std::process::exit(1);
        }
    }
}

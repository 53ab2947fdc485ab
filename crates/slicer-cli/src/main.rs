//! slicer CLI
//!
//! Command-line interface for interacting with the slicer daemon.

mod commands;

use clap::{Parser, Subcommand};
use slicer_core::WorkloadRef;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// slicerctl - inspect and drive a slicer daemon
#[derive(Parser, Debug)]
#[command(name = "slicerctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:9090", env = "SLICER_API", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List nodes and their slice usage
    Nodes,

    /// List allocations across all nodes
    Allocations,

    /// List workloads
    Ps,

    /// Submit a workload requesting one slice
    Submit {
        /// Workload reference, <namespace>/<name>
        workload: WorkloadRef,

        /// Slice profile (e.g., 1g.5gb)
        #[arg(long)]
        profile: String,

        /// CPU request (e.g., 500m)
        #[arg(long)]
        cpu: Option<String>,

        /// Memory request (e.g., 1Gi)
        #[arg(long)]
        memory: Option<String>,
    },

    /// Request deletion of a workload
    Delete {
        /// Workload reference, <namespace>/<name>
        workload: WorkloadRef,
    },

    /// Show system status, or one workload and its allocation
    Status {
        /// Workload reference, <namespace>/<name>
        workload: Option<WorkloadRef>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Nodes => commands::nodes(&client).await?,
        Commands::Allocations => commands::allocations(&client).await?,
        Commands::Ps => commands::ps(&client).await?,
        Commands::Submit {
            workload,
            profile,
            cpu,
            memory,
        } => {
            commands::submit(&client, workload, profile, cpu, memory).await?;
        }
        Commands::Delete { workload } => commands::delete(&client, workload).await?,
        Commands::Status { workload } => commands::status(&client, workload).await?,
    }

    Ok(())
}

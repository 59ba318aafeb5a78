//! Rigging CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rigging")]
#[command(about = "Assemble and apply declarative resource graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an application definition
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "rigging.kdl")]
        path: String,
    },
    /// Print the staged operation list as JSON
    Synth {
        /// Path to the configuration file
        #[arg(default_value = "rigging.kdl")]
        path: String,
        /// Deployed state to plan against
        #[arg(long, env = "RIGGING_STATE")]
        state: Option<String>,
        /// Write the synthesis to a file instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
    /// Summarize what an apply would do
    Plan {
        /// Path to the configuration file
        #[arg(default_value = "rigging.kdl")]
        path: String,
        /// Deployed state to plan against
        #[arg(long, env = "RIGGING_STATE")]
        state: Option<String>,
    },
    /// Apply the operation list stage by stage (dry run)
    Apply {
        /// Path to the configuration file
        #[arg(default_value = "rigging.kdl")]
        path: String,
        /// Deployed state to plan against and update
        #[arg(long, env = "RIGGING_STATE")]
        state: Option<String>,
        /// Maximum operations provisioned at once within a stage
        #[arg(long, default_value = "4")]
        concurrency: usize,
        /// Per-operation timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so synth output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Synth { path, state, out } => {
            commands::synth::synth(&path, state.as_deref(), out.as_deref())?;
        }
        Commands::Plan { path, state } => {
            commands::synth::plan(&path, state.as_deref())?;
        }
        Commands::Apply {
            path,
            state,
            concurrency,
            timeout_secs,
        } => {
            commands::apply::apply(&path, state.as_deref(), concurrency, timeout_secs).await?;
        }
    }

    Ok(())
}

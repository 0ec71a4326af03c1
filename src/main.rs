//! jobsync - declarative job-queue reconciliation.
//!
//! Usage:
//!   jobsync apply <PATH> [--prune]  Reconcile each desired set against its queue
//!   jobsync plan <PATH>             Show what apply would change
//!   jobsync validate <PATH>         Check desired sets without touching a queue

use clap::{Parser, Subcommand};
use jobsync::{BackendConnector, DesiredSet, YamlLoader, validate};
use std::path::PathBuf;
use tracing::{error, info};

/// jobsync - keep job queues in line with declared job sets
#[derive(Parser)]
#[command(name = "jobsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile queues against desired-set files
    Apply {
        /// Desired-set file, or a directory of them
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Delete stored jobs absent from the desired set
        #[arg(long)]
        prune: bool,
    },

    /// Print the reconciliation plan without applying it
    Plan {
        /// Desired-set file, or a directory of them
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Validate desired sets without connecting to any queue
    Validate {
        /// Desired-set file, or a directory of them
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply { path, prune } => {
            apply(path, prune).await?;
        }
        Commands::Plan { path } => {
            plan(path).await?;
        }
        Commands::Validate { path } => {
            validate_sets(path)?;
        }
    }

    Ok(())
}

fn describe(set: &DesiredSet) -> String {
    match &set.source {
        Some(path) => format!("{} ({})", set.queue, path.display()),
        None => set.queue.clone(),
    }
}

/// Reconcile every desired set under `path`.
async fn apply(path: PathBuf, prune: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sets = YamlLoader::load_path(&path)?;
    let connector = BackendConnector::new();

    for set in sets {
        let label = describe(&set);
        let prune = prune || set.prune;
        info!(queue = %set.queue, prune, "Applying desired set {}", label);

        let summary =
            jobsync::reconcile(&connector, &set.queue, &set.store, set.jobs, prune).await?;
        println!("{}: {}", label, summary);
    }

    Ok(())
}

/// Print the plan of every desired set under `path`.
async fn plan(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let sets = YamlLoader::load_path(&path)?;
    let connector = BackendConnector::new();

    for set in sets {
        let label = describe(&set);
        let plan =
            jobsync::plan(&connector, &set.queue, &set.store, set.jobs, set.prune).await?;

        println!("{}:", label);
        if plan.is_noop() {
            println!("  no changes ({} up to date)", plan.to_skip.len());
            continue;
        }
        for registration in &plan.repeatables_to_remove {
            println!(
                "  - repeatable {} ({})",
                registration.id, registration.interval
            );
        }
        for id in &plan.to_delete {
            println!("  - delete {}", id);
        }
        for job in &plan.to_create {
            println!("  + create {}", job.id);
        }
        for job in &plan.to_update {
            println!("  ~ update {}", job.id);
        }
        for job in &plan.to_skip {
            println!("  = keep {}", job.id);
        }
    }

    Ok(())
}

/// Validate every desired set under `path`.
fn validate_sets(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating desired sets in: {}", path.display());

    let sets = YamlLoader::load_path(&path)?;
    for set in sets {
        let label = describe(&set);
        match validate(set.jobs) {
            Ok(jobs) => info!("  - {}: {} job(s) OK", label, jobs.len()),
            Err(e) => {
                error!("Validation failed for {}: {}", label, e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

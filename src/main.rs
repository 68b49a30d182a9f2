//! Library Circulation CLI
//!
//! Seeds an in-memory circulation ledger from CSV files, runs the background
//! reconciliation loop, and writes the resulting fines to stdout as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --students students.csv --books books.csv --loans loans.csv > fines.csv
//! cargo run -- --loans loans.csv --now 2024-01-10T08:00:00Z --passes 1 > fines.csv
//! RUST_LOG=debug cargo run -- --loans loans.csv --interval-ms 1000 --passes 0
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (seed file not readable, report could not be written, etc.)

use library_circulation::cli::{self, CliArgs};
use library_circulation::core::{
    CirculationEngine, Clock, ManualClock, MemoryLedger, ReconciliationLoop, SystemClock,
};
use library_circulation::io::{load_seed, write_fines_csv};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PASS_POLL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    if let Err(e) = run(args).await {
        error!(error = %e, "Circulation run failed");
        process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), String> {
    let clock: Arc<dyn Clock> = match args.now {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let engine = CirculationEngine::new(Arc::new(MemoryLedger::new()), clock);
    let seeded = load_seed(&engine, &args.seed_files())?;

    let reconciler = ReconciliationLoop::new(engine.clone());
    reconciler
        .start(args.to_loop_config())
        .map_err(|e| e.to_string())?;

    if args.passes == 0 {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;
        info!("Interrupted, stopping");
    } else {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping");
                    break;
                }
                _ = tokio::time::sleep(PASS_POLL) => {
                    if reconciler.status().passes >= args.passes {
                        break;
                    }
                }
            }
        }
    }
    reconciler.stop().await;

    let status = reconciler.status();
    info!(
        passes = status.passes,
        last_run_at = ?status.last_run_at,
        "Reconciliation finished"
    );

    let mut fines = Vec::new();
    for student in &seeded.student_ids {
        fines.extend(
            engine
                .get_fines(student.as_str(), None, false)
                .map_err(|e| e.to_string())?,
        );
    }

    let mut output = std::io::stdout();
    write_fines_csv(&fines, &mut output)
}

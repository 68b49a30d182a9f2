use crate::core::LoopConfig;
use crate::io::SeedFiles;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Run the library circulation engine over seed data
#[derive(Parser, Debug)]
#[command(name = "library-circulation")]
#[command(
    about = "Seed a circulation ledger, reconcile overdue fines and report them",
    long_about = None
)]
pub struct CliArgs {
    /// Students seed file (columns: id,name)
    #[arg(long = "students", value_name = "CSV")]
    pub students: Option<PathBuf>,

    /// Books seed file (columns: code,title,status)
    #[arg(long = "books", value_name = "CSV")]
    pub books: Option<PathBuf>,

    /// Loans seed file (columns: student_id,book_code,borrowed_at,due_date,admin)
    #[arg(long = "loans", value_name = "CSV")]
    pub loans: Option<PathBuf>,

    /// Milliseconds between reconciliation passes
    #[arg(
        long = "interval-ms",
        value_name = "MS",
        help = "Milliseconds between reconciliation passes (default: 5000)"
    )]
    pub interval_ms: Option<u64>,

    /// Number of passes to run before exiting; 0 runs until Ctrl-C
    #[arg(long = "passes", value_name = "COUNT", default_value_t = 1)]
    pub passes: u64,

    /// Freeze the clock at this RFC 3339 instant instead of using wall time
    #[arg(long = "now", value_name = "TIMESTAMP")]
    pub now: Option<DateTime<Utc>>,
}

impl CliArgs {
    /// Create a LoopConfig from CLI arguments
    ///
    /// Falls back to the default interval when none is given; a zero
    /// interval is replaced by the default with a warning.
    pub fn to_loop_config(&self) -> LoopConfig {
        match self.interval_ms {
            Some(interval_ms) => LoopConfig::new(interval_ms),
            None => LoopConfig::default(),
        }
    }

    pub fn seed_files(&self) -> SeedFiles<'_> {
        SeedFiles {
            students: self.students.as_deref(),
            books: self.books.as_deref(),
            loans: self.loans.as_deref(),
        }
    }
}

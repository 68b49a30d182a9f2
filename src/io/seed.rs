//! Seeding a ledger from CSV files
//!
//! Students and books are inserted one row per unit. Loans are committed
//! through the transactor at their recorded borrow time, so they pass the
//! same availability and cap checks as a live borrow. Rows that fail are
//! logged and counted; loading continues.

use std::path::Path;
use tracing::{info, warn};

use super::csv_format::{convert_book_row, convert_loan_row, BookRow, LoanRow, StudentRow};
use super::sync_reader::SeedReader;
use crate::core::{commit_borrow, CirculationEngine, LedgerStore};
use crate::types::StudentId;

/// Seed file locations; any of them may be omitted
#[derive(Debug, Clone, Default)]
pub struct SeedFiles<'a> {
    pub students: Option<&'a Path>,
    pub books: Option<&'a Path>,
    pub loans: Option<&'a Path>,
}

/// How many rows of each file were loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub student_ids: Vec<StudentId>,
    pub students: usize,
    pub books: usize,
    pub loans: usize,
    pub skipped: usize,
}

/// Load every given seed file into the engine's ledger
///
/// # Returns
///
/// * `Ok(SeedReport)` - Counts of loaded and skipped rows
/// * `Err(String)` - A seed file could not be opened
pub fn load_seed<S: LedgerStore>(
    engine: &CirculationEngine<S>,
    files: &SeedFiles<'_>,
) -> Result<SeedReport, String> {
    let mut report = SeedReport::default();

    if let Some(path) = files.students {
        for row in SeedReader::<StudentRow>::new(path)? {
            let loaded = row.and_then(|row| {
                engine
                    .add_student(&row.id, &row.name)
                    .map_err(|e| e.to_string())
            });
            if let Ok(student) = &loaded {
                report.student_ids.push(student.id.clone());
            }
            tally(&mut report.students, &mut report.skipped, path, loaded);
        }
    }

    if let Some(path) = files.books {
        for row in SeedReader::<BookRow>::new(path)? {
            let loaded = row.and_then(|row: BookRow| {
                let status = convert_book_row(&row)?;
                engine
                    .add_book(&row.code, &row.title, status)
                    .map_err(|e| e.to_string())
            });
            tally(&mut report.books, &mut report.skipped, path, loaded);
        }
    }

    if let Some(path) = files.loans {
        for row in SeedReader::<LoanRow>::new(path)? {
            let loaded = row.and_then(convert_loan_row).and_then(|loan| {
                engine
                    .store()
                    .transaction(|tx| {
                        commit_borrow(
                            tx,
                            &loan.student_id,
                            std::slice::from_ref(&loan.book_code),
                            &loan.admin,
                            loan.due_date,
                            loan.borrowed_at,
                        )
                    })
                    .map_err(|e| e.to_string())
            });
            tally(&mut report.loans, &mut report.skipped, path, loaded);
        }
    }

    info!(
        students = report.students,
        books = report.books,
        loans = report.loans,
        skipped = report.skipped,
        "Seed data loaded"
    );
    Ok(report)
}

fn tally<T>(loaded: &mut usize, skipped: &mut usize, path: &Path, result: Result<T, String>) {
    match result {
        Ok(_) => *loaded += 1,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Skipping seed row");
            *skipped += 1;
        }
    }
}

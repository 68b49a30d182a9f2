//! CSV format handling for seed files and the fine report
//!
//! This module centralizes all CSV format concerns, providing:
//! - Row structures for the students, books and loans seed files
//! - Conversion from raw rows to validated domain values
//! - Fine report serialization
//!
//! All functions are pure (no I/O) for easy testing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;

use crate::types::{AdminId, BookStatus, Fine, StudentId};

/// Row of the students seed file: `id,name`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StudentRow {
    pub id: String,
    pub name: String,
}

/// Row of the books seed file: `code,title,status`
///
/// `status` may be left empty for an available copy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BookRow {
    pub code: String,
    pub title: String,
    pub status: Option<String>,
}

/// Row of the loans seed file: `student_id,book_code,borrowed_at,due_date,admin`
///
/// Timestamps are RFC 3339. An empty `due_date` uses the policy period.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoanRow {
    pub student_id: String,
    pub book_code: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub admin: String,
}

/// Validated loan ready to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub student_id: StudentId,
    pub book_code: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub admin: AdminId,
}

/// Parse the optional status column of a book row
///
/// # Returns
///
/// * `Ok(BookStatus)` - Parsed status, `Available` when the column is empty
/// * `Err(String)` - Error message naming the offending code
pub fn convert_book_row(row: &BookRow) -> Result<BookStatus, String> {
    if row.code.trim().is_empty() {
        return Err("Book code is required".to_string());
    }
    match row.status.as_deref().map(str::trim) {
        None | Some("") => Ok(BookStatus::Available),
        Some(raw) => match raw.parse::<BookStatus>() {
            Ok(BookStatus::Borrowed) => Err(format!(
                "Book {} cannot be seeded as borrowed; list it in the loans file",
                row.code
            )),
            Ok(status) => Ok(status),
            Err(_) => Err(format!("Invalid status '{}' for book {}", raw, row.code)),
        },
    }
}

/// Validate a loan row
pub fn convert_loan_row(row: LoanRow) -> Result<Loan, String> {
    let student_id = StudentId::parse(&row.student_id).map_err(|e| e.to_string())?;
    if row.admin.trim().is_empty() {
        return Err(format!(
            "Loan of {} to {} has no admin",
            row.book_code, student_id
        ));
    }
    Ok(Loan {
        student_id,
        book_code: row.book_code.trim().to_string(),
        borrowed_at: row.borrowed_at,
        due_date: row.due_date,
        admin: AdminId::new(row.admin.trim()),
    })
}

/// Write fines to CSV format
///
/// Writes columns: student, transaction, fine_amount, paid_amount,
/// days_overdue, fine_date, status. Fines are sorted by student, then
/// transaction, for deterministic output.
pub fn write_fines_csv(fines: &[Fine], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "student",
            "transaction",
            "fine_amount",
            "paid_amount",
            "days_overdue",
            "fine_date",
            "status",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = fines.to_vec();
    sorted.sort_by(|a, b| {
        a.student_id
            .cmp(&b.student_id)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    for fine in sorted {
        writer
            .write_record(&[
                fine.student_id.to_string(),
                fine.transaction_id.to_string(),
                format!("{:.2}", fine.fine_amount),
                format!("{:.2}", fine.paid_amount),
                fine.days_overdue.to_string(),
                fine.fine_date.to_string(),
                fine.status.to_string(),
            ])
            .map_err(|e| format!("Failed to write fine record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

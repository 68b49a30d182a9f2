//! Semester tracker
//!
//! Each student has at most one active semester window. The window is opened
//! lazily by the first borrow and counts every book committed in it. A window
//! whose end has passed is completed by the next borrow, which opens a fresh
//! one.

use chrono::{DateTime, Months, Utc};
use tracing::info;

use super::policy::Policy;
use super::traits::{LedgerTx, StoreResult};
use crate::types::{
    CirculationError, NewSemesterTracking, SemesterStatus, SemesterTracking, StudentId,
};

/// Return the student's active semester, opening one at `now` if absent
/// or if the active one has ended
pub fn ensure_active_semester(
    tx: &mut dyn LedgerTx,
    student: &StudentId,
    policy: &Policy,
    now: DateTime<Utc>,
) -> StoreResult<SemesterTracking> {
    if let Some(mut active) = tx.active_semester(student)? {
        if now < active.semester_end {
            return Ok(active);
        }
        active.status = SemesterStatus::Completed;
        tx.update_semester(&active)?;
        info!(
            student = %student,
            semester = %active.id,
            books = active.books_borrowed_count,
            "Completed semester"
        );
    }

    let semester_end = now
        .checked_add_months(Months::new(policy.semester_duration_months))
        .ok_or_else(|| {
            CirculationError::store(format!(
                "Semester end out of range ({} months after {})",
                policy.semester_duration_months, now
            ))
        })?;

    let semester = tx.insert_semester(NewSemesterTracking {
        student_id: student.clone(),
        semester_start: now,
        semester_end,
        books_required: policy.books_required_per_semester,
    })?;
    info!(
        student = %student,
        semester = %semester.id,
        end = %semester.semester_end,
        "Opened semester"
    );
    Ok(semester)
}

/// Add `count` committed books to the active semester
pub fn record_borrowed(
    tx: &mut dyn LedgerTx,
    mut semester: SemesterTracking,
    count: u32,
) -> StoreResult<SemesterTracking> {
    semester.books_borrowed_count = semester.books_borrowed_count.saturating_add(count);
    tx.update_semester(&semester)?;
    Ok(semester)
}

/// All semester rows of a student, newest first
pub fn get_semester_tracking(
    tx: &dyn LedgerTx,
    student: &StudentId,
) -> StoreResult<Vec<SemesterTracking>> {
    let mut semesters = tx.semesters_for_student(student)?;
    semesters.sort_by(|a, b| {
        b.semester_start
            .cmp(&a.semester_start)
            .then_with(|| b.id.cmp(&a.id))
    });
    Ok(semesters)
}

/// Rebuild the borrowed count of every active semester from the transactions
///
/// The count becomes the number of the student's transactions borrowed inside
/// the window, returned or not. Returns how many rows changed.
pub fn recalculate_semester_counts(tx: &mut dyn LedgerTx) -> StoreResult<usize> {
    let mut updated = 0;
    for mut semester in tx.active_semesters()? {
        let count = tx
            .transactions_for_student(&semester.student_id)?
            .iter()
            .filter(|t| {
                t.borrowed_at >= semester.semester_start && t.borrowed_at < semester.semester_end
            })
            .count();
        let count = u32::try_from(count).unwrap_or(u32::MAX);

        if semester.books_borrowed_count != count {
            semester.books_borrowed_count = count;
            tx.update_semester(&semester)?;
            updated += 1;
        }
    }
    if updated > 0 {
        info!(updated, "Recalculated semester counts");
    }
    Ok(updated)
}

//! Payment processor
//!
//! Records fine payments and waivers. Payments are append-only rows; the fine
//! row carries the running `paid_amount`, which never exceeds the fine
//! amount because each payment is clamped to the outstanding balance.
//!
//! Settling a fine in full also returns its book when the transaction is
//! still open, inside the same unit of work.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use super::borrowing_status;
use super::fine_calculator::refresh_student_fines;
use super::traits::{LedgerTx, StoreResult};
use super::transactor::commit_return;
use crate::types::{
    AdminId, BookCopy, CirculationError, EntityKind, Fine, FineId, FinePayment, FineStatus,
    NewFinePayment, PaymentMethod, StudentId, TransactionId,
};

/// Result of a single payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentResult {
    pub payment: FinePayment,
    pub fine: Fine,
    /// Book returned because the payment settled the fine
    pub returned_book: Option<BookCopy>,
}

/// Result of settling every unpaid fine of a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayAllResult {
    pub paid_count: usize,
    pub returned_book_count: usize,
    pub total_amount: Decimal,
}

fn unpaid_fine(tx: &dyn LedgerTx, fine_id: FineId) -> StoreResult<Fine> {
    let fine = tx
        .get_fine(fine_id)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Fine, fine_id))?;
    if fine.status != FineStatus::Unpaid {
        return Err(CirculationError::conflict(format!(
            "Fine {} is already {}",
            fine_id, fine.status
        )));
    }
    Ok(fine)
}

/// Apply `applied` to `fine`, marking it paid once nothing is outstanding
fn settle(
    tx: &mut dyn LedgerTx,
    fine: &mut Fine,
    applied: Decimal,
    method: PaymentMethod,
    admin: &AdminId,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> StoreResult<FinePayment> {
    let payment = tx.insert_payment(NewFinePayment {
        fine_id: fine.id,
        amount: applied,
        method,
        received_by: admin.clone(),
        paid_at: now,
        notes,
    })?;

    fine.paid_amount += applied;
    if fine.outstanding() <= Decimal::ZERO {
        fine.status = FineStatus::Paid;
        fine.paid_date = Some(now);
    }
    tx.update_fine(fine)?;
    Ok(payment)
}

/// Return the fine's transaction if it still holds a book
fn open_transaction(tx: &dyn LedgerTx, fine: &Fine) -> StoreResult<Option<TransactionId>> {
    Ok(tx
        .get_transaction(fine.transaction_id)?
        .filter(|t| t.status.is_open())
        .map(|t| t.id))
}

/// Record a payment against one fine
///
/// # Arguments
///
/// * `fine_id` - Fine being paid; must be unpaid
/// * `amount` - Amount tendered; must be positive, applied up to the balance
/// * `method` - How the money was received
/// * `admin` - Admin receiving the payment
/// * `notes` - Free-text remark stored on the payment row
/// * `now` - Payment instant
pub fn pay_fine(
    tx: &mut dyn LedgerTx,
    fine_id: FineId,
    amount: Decimal,
    method: PaymentMethod,
    admin: &AdminId,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> StoreResult<PaymentResult> {
    if amount <= Decimal::ZERO {
        return Err(CirculationError::validation(format!(
            "Payment amount must be positive, got {}",
            amount
        )));
    }
    let mut fine = unpaid_fine(tx, fine_id)?;

    let applied = amount.min(fine.outstanding());
    let payment = settle(tx, &mut fine, applied, method, admin, notes, now)?;

    let mut returned_book = None;
    if fine.status == FineStatus::Paid {
        if let Some(transaction) = open_transaction(tx, &fine)? {
            let returned = commit_return(tx, &[transaction], admin, now)?;
            returned_book = returned.returned_books.into_iter().next();
        }
    }
    borrowing_status::recompute(tx, &fine.student_id, now)?;

    info!(
        fine = %fine_id,
        student = %fine.student_id,
        applied = %applied,
        status = %fine.status,
        "Fine payment recorded"
    );
    Ok(PaymentResult {
        payment,
        fine,
        returned_book,
    })
}

/// Refresh, pay and close out every unpaid fine of a student in one unit
///
/// Each fine is paid its full outstanding balance in cash and every book
/// still held by a fined transaction is returned.
pub fn pay_all_unpaid(
    tx: &mut dyn LedgerTx,
    student: &StudentId,
    admin: &AdminId,
    now: DateTime<Utc>,
) -> StoreResult<PayAllResult> {
    if tx.get_student(student)?.is_none() {
        return Err(CirculationError::not_found(EntityKind::Student, student));
    }
    refresh_student_fines(tx, student, now)?;

    let unpaid: Vec<Fine> = tx
        .fines_for_student(student)?
        .into_iter()
        .filter(|f| f.status == FineStatus::Unpaid)
        .collect();

    let mut total_amount = Decimal::ZERO;
    let mut to_return = Vec::new();
    for mut fine in unpaid.iter().cloned() {
        let balance = fine.outstanding();
        settle(
            tx,
            &mut fine,
            balance,
            PaymentMethod::Cash,
            admin,
            Some("Settled with all unpaid fines".to_string()),
            now,
        )?;
        total_amount += balance;
        if let Some(transaction) = open_transaction(tx, &fine)? {
            to_return.push(transaction);
        }
    }

    let returned_book_count = if to_return.is_empty() {
        0
    } else {
        commit_return(tx, &to_return, admin, now)?.returned_books.len()
    };
    borrowing_status::recompute(tx, student, now)?;

    let result = PayAllResult {
        paid_count: unpaid.len(),
        returned_book_count,
        total_amount,
    };
    info!(
        student = %student,
        paid = result.paid_count,
        returned = result.returned_book_count,
        total = %result.total_amount,
        "Settled all unpaid fines"
    );
    Ok(result)
}

/// Forgive an unpaid fine
pub fn waive_fine(
    tx: &mut dyn LedgerTx,
    fine_id: FineId,
    admin: &AdminId,
    reason: &str,
    now: DateTime<Utc>,
) -> StoreResult<Fine> {
    if reason.trim().is_empty() {
        return Err(CirculationError::validation("A waiver reason is required"));
    }
    let mut fine = unpaid_fine(tx, fine_id)?;
    fine.status = FineStatus::Waived;
    tx.update_fine(&fine)?;
    borrowing_status::recompute(tx, &fine.student_id, now)?;

    info!(
        fine = %fine_id,
        student = %fine.student_id,
        admin = %admin,
        reason = reason.trim(),
        "Fine waived"
    );
    Ok(fine)
}

/// Payments recorded against a fine, oldest first
pub fn payment_history(tx: &dyn LedgerTx, fine_id: FineId) -> StoreResult<Vec<FinePayment>> {
    if tx.get_fine(fine_id)?.is_none() {
        return Err(CirculationError::not_found(EntityKind::Fine, fine_id));
    }
    let mut payments = tx.payments_for_fine(fine_id)?;
    payments.sort_by_key(|p| (p.paid_at, p.id));
    Ok(payments)
}

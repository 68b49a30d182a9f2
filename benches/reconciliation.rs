//! Benchmark suite for the reconciliation pass and the borrow path
//!
//! Uses the divan benchmarking framework. Ledgers are generated in memory
//! with one overdue loan per student, so a pass touches every row.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```

use chrono::{Duration, TimeZone, Utc};
use divan::Bencher;
use library_circulation::core::{
    commit_borrow, CirculationEngine, LedgerStore, ManualClock, MemoryLedger,
};
use library_circulation::types::{AdminId, BookStatus, StudentId};
use std::sync::Arc;

fn main() {
    divan::main();
}

/// Ledger with `loans` students, each holding one book borrowed 10 days ago
fn overdue_engine(loans: usize) -> CirculationEngine<MemoryLedger> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let engine = CirculationEngine::new(Arc::new(MemoryLedger::new()), clock.clone());
    let admin = AdminId::new("bench");

    for n in 0..loans {
        let student = format!("B{:02}-{:04}", n / 10_000, n % 10_000);
        let code = format!("BK-{:06}", n);
        engine.add_student(&student, "Bench Student").expect("student");
        engine
            .add_book(&code, "Bench Title", BookStatus::Available)
            .expect("book");
        let student = StudentId::parse(&student).expect("student id");
        engine
            .store()
            .transaction(|tx| {
                commit_borrow(tx, &student, &[code.clone()], &admin, None, start)
            })
            .expect("borrow");
    }

    clock.advance(Duration::days(10));
    engine
}

/// First pass: every row creates a fine
#[divan::bench(args = [100, 1_000, 10_000])]
fn first_pass(bencher: Bencher, loans: usize) {
    bencher
        .with_inputs(|| overdue_engine(loans))
        .bench_values(|engine| engine.process_all_overdue().expect("pass"));
}

/// Repeat pass at the same instant: every row is unchanged
#[divan::bench(args = [100, 1_000, 10_000])]
fn idempotent_pass(bencher: Bencher, loans: usize) {
    bencher
        .with_inputs(|| {
            let engine = overdue_engine(loans);
            engine.process_all_overdue().expect("pass");
            engine
        })
        .bench_values(|engine| engine.process_all_overdue().expect("pass"));
}

/// Validate then commit a three-book borrow against a large catalogue
#[divan::bench]
fn validate_and_commit_borrow(bencher: Bencher) {
    bencher
        .with_inputs(|| {
            let engine = overdue_engine(0);
            engine.add_student("C22-0044", "Ana Cruz").expect("student");
            for n in 0..10_000 {
                engine
                    .add_book(&format!("BK-{:06}", n), "Bench Title", BookStatus::Available)
                    .expect("book");
            }
            engine
        })
        .bench_values(|engine| {
            let codes: Vec<String> = ["BK-000001", "BK-005000", "BK-009999"]
                .iter()
                .map(|c| c.to_string())
                .collect();
            let admin = AdminId::new("bench");
            let eligibility = engine.validate_borrow("C22-0044", &codes).expect("validate");
            assert!(eligibility.ok);
            engine
                .commit_borrow("C22-0044", &codes, &admin, None)
                .expect("borrow")
        });
}

//! I/O module
//!
//! Handles CSV seed files and report output.
//!
//! # Components
//!
//! - `csv_format` - Seed row types, row conversion, fine report serialization
//! - `sync_reader` - Streaming CSV reader with iterator interface
//! - `seed` - Loading seed files into a ledger

pub mod csv_format;
pub mod seed;
pub mod sync_reader;

pub use csv_format::{
    convert_book_row, convert_loan_row, write_fines_csv, BookRow, Loan, LoanRow, StudentRow,
};
pub use seed::{load_seed, SeedFiles, SeedReport};
pub use sync_reader::SeedReader;

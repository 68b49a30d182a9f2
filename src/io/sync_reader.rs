//! Streaming CSV reader for seed files
//!
//! Provides an iterator over the rows of any seed file whose row type
//! implements `Deserialize`. Format concerns (what a row means) stay in the
//! csv_format module.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `Err` items so the caller can skip
//!   them and keep going
//! - Line numbers (counting the header as line 1) are included in messages

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

/// Row-by-row CSV reader
///
/// ```no_run
/// use library_circulation::io::{SeedReader, StudentRow};
/// use std::path::Path;
///
/// let reader = SeedReader::<StudentRow>::new(Path::new("students.csv")).unwrap();
/// let rows: Vec<_> = reader.filter_map(Result::ok).collect();
/// println!("Read {} students", rows.len());
/// ```
#[derive(Debug)]
pub struct SeedReader<T> {
    reader: csv::Reader<File>,
    line_num: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> SeedReader<T> {
    /// Open `path` for streaming
    ///
    /// The CSV reader trims whitespace from all fields and tolerates rows
    /// with missing trailing optional columns.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
            _row: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for SeedReader<T> {
    type Item = Result<T, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = self.reader.deserialize::<T>();
        let row = rows.next()?;
        self.line_num += 1;
        Some(row.map_err(|e| format!("Line {}: CSV parse error: {}", self.line_num, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::{BookRow, LoanRow, StudentRow};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = SeedReader::<StudentRow>::new(Path::new("nonexistent.csv"));
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_reads_rows_with_whitespace_and_optional_columns() {
        let file = create_temp_csv(
            "code,title,status\n  BK-0001 , Noli Me Tangere ,\nBK-0002,El Filibusterismo,lost\n",
        );
        let rows: Vec<BookRow> = SeedReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "BK-0001");
        assert_eq!(rows[0].title, "Noli Me Tangere");
        assert_eq!(rows[0].status, None);
        assert_eq!(rows[1].status.as_deref(), Some("lost"));
    }

    #[test]
    fn test_bad_row_reports_line_and_reading_continues() {
        let file = create_temp_csv(
            "student_id,book_code,borrowed_at,due_date,admin\n\
             C22-0044,BK-0001,2024-01-01T08:00:00Z,,admin-1\n\
             C22-0044,BK-0002,yesterday,,admin-1\n\
             C22-0045,BK-0003,2024-01-02T08:00:00Z,2024-01-05T08:00:00Z,admin-1\n",
        );
        let rows: Vec<_> = SeedReader::<LoanRow>::new(file.path()).unwrap().collect();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(rows[1].as_ref().unwrap_err().contains("Line 3"));
        let last = rows[2].as_ref().unwrap();
        assert!(last.due_date.is_some());
    }

    #[test]
    fn test_header_only_file_yields_nothing() {
        let file = create_temp_csv("id,name\n");
        let reader = SeedReader::<StudentRow>::new(file.path()).unwrap();
        assert_eq!(reader.count(), 0);
    }
}

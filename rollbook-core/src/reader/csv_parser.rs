//! Comma-delimited text reader

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use super::TableReader;
use crate::error::DecodeError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct CsvReader<'a> {
    bytes: &'a [u8],
}

impl<'a> CsvReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        // Spreadsheet exports often prepend a BOM that would stick to the first header
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        Self { bytes }
    }
}

impl TableReader for CsvReader<'_> {
    fn read_rows(&mut self) -> Result<Vec<Vec<String>>, DecodeError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(self.bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        if rows.is_empty() {
            return Err(DecodeError::EmptyFile);
        }
        debug!(records = rows.len(), "decoded csv");
        Ok(rows)
    }
}

/// Decode comma-delimited bytes into records, header first
pub fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, DecodeError> {
    CsvReader::new(bytes).read_rows()
}

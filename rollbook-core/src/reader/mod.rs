//! Upload decoding: CSV and XLSX into a [`RawTable`]

use std::path::Path;

pub mod csv_parser;
pub mod parser_utils;
pub mod table;
pub mod xlsx_parser;

use self::csv_parser::CsvReader;
use self::xlsx_parser::XlsxReader;
use crate::error::DecodeError;

pub use parser_utils::column_index;
pub use table::{RawTable, cell_at};

/// Trait for tabular format readers
pub trait TableReader {
    /// Every record of the file, header first
    fn read_rows(&mut self) -> Result<Vec<Vec<String>>, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

impl FileKind {
    /// Pick the decoder from the upload's extension, case-insensitively
    pub fn from_file_name(file_name: &str) -> Result<Self, DecodeError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if ext.eq_ignore_ascii_case("csv") {
            Ok(FileKind::Csv)
        } else if ext.eq_ignore_ascii_case("xlsx") {
            Ok(FileKind::Xlsx)
        } else {
            Err(DecodeError::UnsupportedFileType(file_name.to_string()))
        }
    }
}

/// An uploaded file as received from the request layer
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn kind(&self) -> Result<FileKind, DecodeError> {
        FileKind::from_file_name(&self.file_name)
    }
}

/// How many times the upload limit one inflated xlsx member may reach
pub const MAX_INFLATE_RATIO: u64 = 16;

/// Cap on the inflated size of a single xlsx member for an upload limit
pub fn member_limit(upload_limit: u64) -> u64 {
    upload_limit.saturating_mul(MAX_INFLATE_RATIO)
}

/// Decode a whole file into header and data rows.
///
/// `upload_limit` is the byte limit the file was accepted under; xlsx
/// members inflating past [`member_limit`] of it are rejected.
pub fn read_table(kind: FileKind, bytes: &[u8], upload_limit: u64) -> Result<RawTable, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyFile);
    }

    let records = match kind {
        FileKind::Csv => CsvReader::new(bytes).read_rows()?,
        FileKind::Xlsx => XlsxReader::new(bytes, member_limit(upload_limit))?.read_rows()?,
    };
    RawTable::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1024 * 1024;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_file_name("marks.csv").unwrap(), FileKind::Csv);
        assert_eq!(FileKind::from_file_name("Marks.XLSX").unwrap(), FileKind::Xlsx);
        assert!(matches!(
            FileKind::from_file_name("marks.xls"),
            Err(DecodeError::UnsupportedFileType(_))
        ));
        assert!(FileKind::from_file_name("marks").is_err());
    }

    #[test]
    fn test_read_table_empty_bytes() {
        assert!(matches!(
            read_table(FileKind::Xlsx, b"", LIMIT),
            Err(DecodeError::EmptyFile)
        ));
    }

    #[test]
    fn test_read_table_not_a_zip() {
        assert!(matches!(
            read_table(FileKind::Xlsx, b"roll,score\n1,2\n", LIMIT),
            Err(DecodeError::Archive(_))
        ));
    }

    #[test]
    fn test_member_limit_scales_upload_limit() {
        assert_eq!(member_limit(1024), 16 * 1024);
        assert_eq!(member_limit(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_read_table_csv() {
        let table = read_table(FileKind::Csv, b"roll,score\n1,2\n", LIMIT).unwrap();
        assert_eq!(table.headers, vec!["roll", "score"]);
        assert_eq!(table.cell(0, 1), "2");
    }
}

//! Decoded table shared by every file format

use crate::error::DecodeError;

/// Header row plus data rows, every cell already trimmed.
///
/// Data rows may be shorter than the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Split decoded records into header and data rows.
    ///
    /// A file without a single record is an input error.
    pub fn from_records(records: Vec<Vec<String>>) -> Result<Self, DecodeError> {
        let mut records = records.into_iter();
        let headers = records.next().ok_or(DecodeError::EmptyFile)?;
        Ok(Self {
            headers,
            rows: records.collect(),
        })
    }

    /// Cell text at a data row and column, empty when out of range
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .map(|cells| cell_at(cells, col))
            .unwrap_or("")
    }

    /// Data rows paired with their 1-based source row number.
    ///
    /// The header occupies row 1, so the first data row is row 2.
    pub fn numbered_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, cells)| (idx + 2, cells.as_slice()))
    }
}

/// Out-of-range reads yield an empty value
pub fn cell_at(cells: &[String], col: usize) -> &str {
    cells.get(col).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_from_records_splits_header() {
        let table = RawTable::from_records(records(&[&["roll", "name"], &["1", "Asha"]])).unwrap();
        assert_eq!(table.headers, vec!["roll", "name"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_from_records_rejects_empty() {
        assert!(matches!(
            RawTable::from_records(Vec::new()),
            Err(DecodeError::EmptyFile)
        ));
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let table =
            RawTable::from_records(records(&[&["roll", "name", "house"], &["1"]])).unwrap();
        assert_eq!(table.cell(0, 0), "1");
        assert_eq!(table.cell(0, 2), "");
        assert_eq!(table.cell(9, 0), "");
    }

    #[test]
    fn test_numbered_rows_start_after_header() {
        let table = RawTable::from_records(records(&[&["roll"], &["1"], &["2"]])).unwrap();
        let numbers: Vec<usize> = table.numbered_rows().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![2, 3]);
    }
}

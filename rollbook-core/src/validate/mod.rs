//! Row validation and the two commit policies
//!
//! Scores are ingested strict-batch: one bad row rejects the whole file.
//! Students are ingested per-row: each valid row commits on its own and the
//! failures are itemized next to the inserted count.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod convert;
pub mod scores;
pub mod students;

/// A problem with one source row, displayed as `row <n>: <message>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based row number in the file, header included
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

impl Serialize for RowError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Row errors in source order
pub type ErrorReport = Vec<RowError>;

/// Result of one ingestion request
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome<T> {
    /// Every row was valid and committed
    Committed { records: Vec<T> },
    /// At least one row was invalid; nothing was committed
    Rejected { errors: ErrorReport },
    /// Valid rows were committed, failed rows are itemized
    Partial { inserted: Vec<T>, errors: ErrorReport },
}

impl<T> IngestOutcome<T> {
    pub fn inserted(&self) -> usize {
        match self {
            IngestOutcome::Committed { records } => records.len(),
            IngestOutcome::Rejected { .. } => 0,
            IngestOutcome::Partial { inserted, .. } => inserted.len(),
        }
    }

    pub fn errors(&self) -> &[RowError] {
        match self {
            IngestOutcome::Committed { .. } => &[],
            IngestOutcome::Rejected { errors } | IngestOutcome::Partial { errors, .. } => errors,
        }
    }

    pub fn failed(&self) -> usize {
        self.errors().len()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, IngestOutcome::Rejected { .. })
    }

    pub fn records(&self) -> &[T] {
        match self {
            IngestOutcome::Committed { records } => records,
            IngestOutcome::Rejected { .. } => &[],
            IngestOutcome::Partial { inserted, .. } => inserted,
        }
    }
}

/// Response body of a score upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreUploadResponse {
    pub inserted: usize,
    pub errors: ErrorReport,
}

impl<T> From<&IngestOutcome<T>> for ScoreUploadResponse {
    fn from(outcome: &IngestOutcome<T>) -> Self {
        Self {
            inserted: outcome.inserted(),
            errors: outcome.errors().to_vec(),
        }
    }
}

/// Response body of a student bulk upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentUploadResponse {
    pub inserted: usize,
    pub failed: usize,
    pub errors: ErrorReport,
}

impl<T> From<&IngestOutcome<T>> for StudentUploadResponse {
    fn from(outcome: &IngestOutcome<T>) -> Self {
        Self {
            inserted: outcome.inserted(),
            failed: outcome.failed(),
            errors: outcome.errors().to_vec(),
        }
    }
}

/// Cooperative cancellation, checked between rows of a per-row upload
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_display_and_json() {
        let err = RowError::new(3, "invalid roll");
        assert_eq!(err.to_string(), "row 3: invalid roll");
        assert_eq!(serde_json::to_string(&err).unwrap(), "\"row 3: invalid roll\"");
    }

    #[test]
    fn test_outcome_counts() {
        let rejected: IngestOutcome<u32> = IngestOutcome::Rejected {
            errors: vec![RowError::new(2, "missing roll")],
        };
        assert_eq!(rejected.inserted(), 0);
        assert_eq!(rejected.failed(), 1);
        assert!(rejected.is_rejected());

        let partial = IngestOutcome::Partial {
            inserted: vec![1, 2, 3],
            errors: vec![RowError::new(4, "invalid roll_number")],
        };
        let body = StudentUploadResponse::from(&partial);
        assert_eq!((body.inserted, body.failed), (3, 1));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"inserted": 3, "failed": 1, "errors": ["row 4: invalid roll_number"]})
        );
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }
}

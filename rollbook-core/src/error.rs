//! Error types for decoding and ingestion

use crate::store::StoreError;
use thiserror::Error;

/// Fatal problems with the uploaded file itself
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("supported file types: .csv, .xlsx (got {0:?})")]
    UnsupportedFileType(String),

    #[error("file is empty")]
    EmptyFile,

    #[error("failed to parse csv file: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to parse xlsx file: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to parse xlsx file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse xlsx file: xlsx has no worksheets")]
    NoWorksheet,

    #[error("failed to parse xlsx file: shared strings: {0}")]
    SharedStrings(String),

    #[error("failed to parse xlsx file: {member}: {reason}")]
    Worksheet { member: String, reason: String },

    #[error("failed to parse xlsx file: {member} inflates past {limit} bytes")]
    MemberTooLarge { member: String, limit: u64 },
}

/// Errors that abort a whole ingestion request.
///
/// Row-level problems never surface here; they are collected into an
/// [`ErrorReport`](crate::validate::ErrorReport) instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("user is not mapped to a school")]
    MissingTenant,

    #[error("exam not found: {0}")]
    ExamNotFound(String),

    #[error("file is {size} bytes, upload limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("no scores")]
    NoScores,

    #[error("storage failure{}: {source}", at_row(.row))]
    Store {
        /// Source row being processed when the store failed, if any
        row: Option<usize>,
        /// Rows already committed before the failure
        committed: usize,
        #[source]
        source: StoreError,
    },

    #[error("upload cancelled after {committed} committed rows")]
    Cancelled { committed: usize },
}

fn at_row(row: &Option<usize>) -> String {
    row.map(|r| format!(" at row {r}")).unwrap_or_default()
}

impl IngestError {
    /// HTTP status the surrounding request layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::ExamNotFound(_) => 404,
            IngestError::TooLarge { .. } => 413,
            IngestError::Decode(DecodeError::MemberTooLarge { .. }) => 413,
            IngestError::Store { .. } => 500,
            IngestError::Cancelled { .. } => 499,
            _ => 400,
        }
    }

    /// Whether the request was at fault rather than the server
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

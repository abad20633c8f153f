//! Student bulk ingestion: each valid row commits on its own

use chrono::{Datelike, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use super::convert::{parse_admission_year, parse_calendar_date, parse_roll};
use super::{CancelFlag, ErrorReport, IngestOutcome, RowError};
use crate::error::IngestError;
use crate::headers::{AliasTable, Field, HeaderIndex, Target};
use crate::models::{Student, StudentRow};
use crate::reader::RawTable;
use crate::store::{Store, StoreError};

/// Headers a student file cannot do without
pub const REQUIRED_FIELDS: [Field; 4] = [
    Field::FullName,
    Field::ClassLabel,
    Field::RollNumber,
    Field::DateOfBirth,
];

const DUPLICATE_MESSAGE: &str = "duplicate class+roll already exists";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "parent_phone must be 10 digits, {country_code}XXXXXXXXXX, or +{country_code}XXXXXXXXXX"
)]
pub struct InvalidPhone {
    pub country_code: String,
}

fn all_digits(value: &str) -> bool {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS
        .get_or_init(|| Regex::new(r"^[0-9]+$").expect("digits pattern is valid"))
        .is_match(value)
}

/// Normalize a parent phone number.
///
/// Blank is `None`. Ten local digits are kept as-is; `<cc>` plus ten digits,
/// with or without a leading `+`, becomes `+<cc>XXXXXXXXXX`.
pub fn normalize_parent_phone(
    raw: &str,
    country_code: &str,
) -> Result<Option<String>, InvalidPhone> {
    let input = raw.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let invalid = || InvalidPhone {
        country_code: country_code.to_string(),
    };

    if let Some(digits) = input
        .strip_prefix('+')
        .and_then(|rest| rest.strip_prefix(country_code))
    {
        if digits.len() != 10 || !all_digits(digits) {
            return Err(invalid());
        }
        return Ok(Some(format!("+{country_code}{digits}")));
    }

    if input.len() == country_code.len() + 10
        && input.starts_with(country_code)
        && all_digits(input)
    {
        return Ok(Some(format!("+{input}")));
    }

    if input.len() == 10 && all_digits(input) {
        return Ok(Some(input.to_string()));
    }

    Err(invalid())
}

/// Per-request settings for a student upload
#[derive(Debug, Clone)]
pub struct StudentIngest {
    pub tenant_id: String,
    pub aliases: AliasTable,
    /// Admission year used when a row leaves it out
    pub current_year: i32,
    pub phone_country_code: String,
    pub cancel: CancelFlag,
}

impl StudentIngest {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            aliases: AliasTable::defaults(Target::Students),
            current_year: Utc::now().year(),
            phone_country_code: "91".to_string(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn with_phone_country_code(mut self, code: impl Into<String>) -> Self {
        self.phone_country_code = code.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Convert one data row. `Ok(None)` means the row is blank and skipped.
fn validate_student_row(
    index: &HeaderIndex,
    cells: &[String],
    settings: &StudentIngest,
) -> Result<Option<StudentRow>, String> {
    let full_name = index.cell(cells, Field::FullName);
    let class_label = index.cell(cells, Field::ClassLabel);
    let roll_raw = index.cell(cells, Field::RollNumber);
    let dob_raw = index.cell(cells, Field::DateOfBirth);

    if full_name.is_empty() && class_label.is_empty() && roll_raw.is_empty() && dob_raw.is_empty()
    {
        return Ok(None);
    }
    if full_name.is_empty() {
        return Err("missing full_name".to_string());
    }
    if class_label.is_empty() {
        return Err("missing class_label".to_string());
    }
    let roll_number = parse_roll(roll_raw).ok_or("invalid roll_number")?;
    let date_of_birth = parse_calendar_date(dob_raw).ok_or("date_of_birth must be YYYY-MM-DD")?;
    let parent_phone = normalize_parent_phone(
        index.cell(cells, Field::ParentPhone),
        &settings.phone_country_code,
    )
    .map_err(|e| e.to_string())?;
    let admission_year = parse_admission_year(
        index.cell(cells, Field::AdmissionYear),
        settings.current_year,
    )
    .ok_or("invalid admission_year")?;

    let house = Some(index.cell(cells, Field::House))
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    Ok(Some(StudentRow {
        tenant_id: settings.tenant_id.clone(),
        full_name: full_name.to_string(),
        class_label: class_label.to_string(),
        roll_number,
        date_of_birth,
        house,
        parent_phone,
        admission_year,
    }))
}

fn store_failure(row: usize, committed: usize, source: StoreError) -> IngestError {
    warn!(row, committed, error = %source, "student upload stopped by storage failure");
    IngestError::Store {
        row: Some(row),
        committed,
        source,
    }
}

/// Validate and commit student rows one at a time.
///
/// A bad row is recorded and skipped; the next row still runs. Rows are
/// processed in file order so a later duplicate of an earlier row is caught
/// against the committed record.
pub fn ingest_students_table(
    table: &RawTable,
    settings: &StudentIngest,
    store: &dyn Store,
) -> Result<IngestOutcome<Student>, IngestError> {
    let index = HeaderIndex::build(&table.headers, &settings.aliases);
    index.require(&REQUIRED_FIELDS)?;

    let mut inserted = Vec::new();
    let mut errors = ErrorReport::new();

    for (row_number, cells) in table.numbered_rows() {
        if settings.cancel.is_cancelled() {
            debug!(row = row_number, committed = inserted.len(), "student upload cancelled");
            return Err(IngestError::Cancelled {
                committed: inserted.len(),
            });
        }

        let row = match validate_student_row(&index, cells, settings) {
            Ok(Some(row)) => row,
            Ok(None) => continue,
            Err(message) => {
                errors.push(RowError::new(row_number, message));
                continue;
            }
        };

        let existing = store
            .student_by_class_roll(&settings.tenant_id, &row.class_label, row.roll_number)
            .map_err(|source| store_failure(row_number, inserted.len(), source))?;
        if existing.is_some() {
            errors.push(RowError::new(row_number, DUPLICATE_MESSAGE));
            continue;
        }

        match store.create_student(row) {
            Ok(student) => inserted.push(student),
            // Lost a race with another upload for the same class and roll
            Err(StoreError::Conflict(_)) => errors.push(RowError::new(row_number, DUPLICATE_MESSAGE)),
            Err(source) => return Err(store_failure(row_number, inserted.len(), source)),
        }
    }

    debug!(
        inserted = inserted.len(),
        failed = errors.len(),
        "student rows processed"
    );
    if errors.is_empty() {
        Ok(IngestOutcome::Committed { records: inserted })
    } else {
        Ok(IngestOutcome::Partial { inserted, errors })
    }
}

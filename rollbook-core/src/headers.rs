//! Header normalization, alias resolution and score layout detection

use std::collections::HashMap;
use std::fmt;

use crate::error::IngestError;
use crate::reader::cell_at;

/// Canonical column of an ingestion target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    RollNumber,
    StudentName,
    Subject,
    Score,
    MaxScore,
    Grade,
    FullName,
    ClassLabel,
    DateOfBirth,
    House,
    ParentPhone,
    AdmissionYear,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::RollNumber => "roll_number",
            Field::StudentName => "student_name",
            Field::Subject => "subject",
            Field::Score => "score",
            Field::MaxScore => "max_score",
            Field::Grade => "grade",
            Field::FullName => "full_name",
            Field::ClassLabel => "class_label",
            Field::DateOfBirth => "date_of_birth",
            Field::House => "house",
            Field::ParentPhone => "parent_phone",
            Field::AdmissionYear => "admission_year",
        }
    }

    /// Look up a field by its canonical name within a target
    pub fn from_canonical(target: Target, name: &str) -> Option<Field> {
        target.fields().iter().copied().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Scores,
    Students,
}

impl Target {
    pub fn fields(&self) -> &'static [Field] {
        match self {
            Target::Scores => &[
                Field::RollNumber,
                Field::StudentName,
                Field::Subject,
                Field::Score,
                Field::MaxScore,
                Field::Grade,
            ],
            Target::Students => &[
                Field::FullName,
                Field::ClassLabel,
                Field::RollNumber,
                Field::DateOfBirth,
                Field::House,
                Field::ParentPhone,
                Field::AdmissionYear,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Scores => "scores",
            Target::Students => "students",
        }
    }

    fn default_spellings(&self, field: Field) -> &'static [&'static str] {
        match (self, field) {
            (Target::Scores, Field::RollNumber) => &["roll", "roll_no", "roll_number"],
            (Target::Scores, Field::StudentName) => &["name", "student_name", "full_name"],
            (Target::Scores, Field::Subject) => &["subject"],
            (Target::Scores, Field::Score) => &["score", "marks"],
            (Target::Scores, Field::MaxScore) => &["max_score", "max_marks", "out_of"],
            (Target::Scores, Field::Grade) => &["grade"],
            (Target::Students, Field::FullName) => &["full_name", "name", "student_name"],
            (Target::Students, Field::ClassLabel) => &["class_label", "class"],
            (Target::Students, Field::RollNumber) => &["roll_number", "roll", "roll_no"],
            (Target::Students, Field::DateOfBirth) => &["date_of_birth", "dob"],
            (Target::Students, Field::House) => &["house"],
            (Target::Students, Field::ParentPhone) => &["parent_phone", "phone", "parent_mobile"],
            (Target::Students, Field::AdmissionYear) => &["admission_year"],
            _ => &[],
        }
    }
}

/// Lower-case and drop whitespace and underscores: "Roll No" -> "rollno"
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Accepted spellings per canonical field, stored normalized
#[derive(Debug, Clone)]
pub struct AliasTable {
    target: Target,
    spellings: Vec<(Field, Vec<String>)>,
}

impl AliasTable {
    pub fn defaults(target: Target) -> Self {
        let spellings = target
            .fields()
            .iter()
            .map(|&field| {
                let names = target
                    .default_spellings(field)
                    .iter()
                    .map(|s| normalize_header(s))
                    .collect();
                (field, names)
            })
            .collect();
        Self { target, spellings }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Add extra spellings for a field. Fields outside the target are ignored.
    pub fn extend<I, S>(mut self, field: Field, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some((_, names)) = self.spellings.iter_mut().find(|(f, _)| *f == field) {
            for spelling in extra {
                let normalized = normalize_header(spelling.as_ref());
                if !normalized.is_empty() && !names.contains(&normalized) {
                    names.push(normalized);
                }
            }
        }
        self
    }

    /// Canonical field a raw header refers to
    pub fn resolve(&self, raw: &str) -> Option<Field> {
        let normalized = normalize_header(raw);
        if normalized.is_empty() {
            return None;
        }
        self.spellings
            .iter()
            .find(|(_, names)| names.contains(&normalized))
            .map(|(field, _)| *field)
    }
}

/// Column position of each canonical field present in a header row
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<Field, usize>,
    /// Resolved field per header column
    columns: Vec<Option<Field>>,
}

impl HeaderIndex {
    /// Resolve every header; the leftmost column wins when two share a field
    pub fn build(headers: &[String], aliases: &AliasTable) -> Self {
        let mut positions = HashMap::new();
        let columns: Vec<Option<Field>> = headers.iter().map(|h| aliases.resolve(h)).collect();
        for (idx, field) in columns.iter().enumerate() {
            if let Some(field) = field {
                positions.entry(*field).or_insert(idx);
            }
        }
        Self { positions, columns }
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.positions.contains_key(&field)
    }

    /// Field a header column resolved to, if any
    pub fn field_at(&self, col: usize) -> Option<Field> {
        self.columns.get(col).copied().flatten()
    }

    /// Cell for a field in a data row; empty when the column is absent
    pub fn cell<'r>(&self, row: &'r [String], field: Field) -> &'r str {
        self.position(field).map(|col| cell_at(row, col)).unwrap_or("")
    }

    /// Fail with `missing required column: <field>` unless every field is present
    pub fn require(&self, fields: &[Field]) -> Result<(), IngestError> {
        match fields.iter().find(|f| !self.contains(**f)) {
            Some(missing) => Err(IngestError::MissingColumn(missing.as_str())),
            None => Ok(()),
        }
    }
}

/// Header column read as a subject in the wide layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectColumn {
    pub position: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreLayout {
    /// One score per row with subject, score, max score and grade columns
    RowBased,
    /// One student per row, every other column is a subject
    Wide { subjects: Vec<SubjectColumn> },
}

/// Columns that identify the student and are never subjects
pub const WIDE_LAYOUT_EXCLUDED: [Field; 2] = [Field::RollNumber, Field::StudentName];

/// Decide between the row-based and wide score layouts.
///
/// Both need a roll column; the row-based layout also needs a score column.
pub fn detect_score_layout(
    headers: &[String],
    index: &HeaderIndex,
) -> Result<ScoreLayout, IngestError> {
    index.require(&[Field::RollNumber])?;

    if index.contains(Field::Subject) {
        index.require(&[Field::Score])?;
        return Ok(ScoreLayout::RowBased);
    }

    let subjects = headers
        .iter()
        .enumerate()
        .filter(|(_, label)| !label.is_empty())
        .filter(|(idx, _)| {
            !index
                .field_at(*idx)
                .is_some_and(|f| WIDE_LAYOUT_EXCLUDED.contains(&f))
        })
        .map(|(position, label)| SubjectColumn {
            position,
            label: label.clone(),
        })
        .collect();

    Ok(ScoreLayout::Wide { subjects })
}

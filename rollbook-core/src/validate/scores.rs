//! Score ingestion: strict-batch, nothing commits unless every row is valid

use tracing::{debug, warn};

use super::convert::{parse_roll, parse_score};
use super::{ErrorReport, IngestOutcome, RowError};
use crate::error::IngestError;
use crate::headers::{
    AliasTable, Field, HeaderIndex, ScoreLayout, SubjectColumn, detect_score_layout,
};
use crate::models::{Exam, ManualScore, Score, ScoreRow};
use crate::reader::{RawTable, cell_at};
use crate::store::Store;

/// Max score used when the file or form leaves it out
pub const DEFAULT_MAX_SCORE: f64 = 100.0;

/// A row is blank when its roll, name and every score-bearing cell are empty
fn is_blank_row(index: &HeaderIndex, layout: &ScoreLayout, cells: &[String]) -> bool {
    let identity_empty = index.cell(cells, Field::RollNumber).is_empty()
        && index.cell(cells, Field::StudentName).is_empty();
    if !identity_empty {
        return false;
    }
    match layout {
        ScoreLayout::RowBased => {
            index.cell(cells, Field::Subject).is_empty() && index.cell(cells, Field::Score).is_empty()
        }
        ScoreLayout::Wide { subjects } => subjects
            .iter()
            .all(|subject| cell_at(cells, subject.position).is_empty()),
    }
}

fn row_based_score(
    index: &HeaderIndex,
    cells: &[String],
    exam: &Exam,
    student_id: &str,
) -> Result<ScoreRow, &'static str> {
    let subject = index.cell(cells, Field::Subject);
    let score = index.cell(cells, Field::Score);
    if subject.is_empty() || score.is_empty() {
        return Err("subject and score required");
    }
    let score = parse_score(score).ok_or("invalid score")?;

    let max_score = match index.cell(cells, Field::MaxScore) {
        "" => DEFAULT_MAX_SCORE,
        raw => parse_score(raw).ok_or("invalid max_score")?,
    };
    let grade = Some(index.cell(cells, Field::Grade))
        .filter(|g| !g.is_empty())
        .map(str::to_string);

    Ok(ScoreRow {
        exam_id: exam.id.clone(),
        student_id: student_id.to_string(),
        subject: subject.to_string(),
        score,
        max_score,
        grade,
    })
}

fn wide_scores(
    subjects: &[SubjectColumn],
    cells: &[String],
    exam: &Exam,
    student_id: &str,
    row_number: usize,
    scores: &mut Vec<ScoreRow>,
    errors: &mut ErrorReport,
) {
    for subject in subjects {
        let raw = cell_at(cells, subject.position);
        if raw.is_empty() {
            continue;
        }
        match parse_score(raw) {
            Some(score) => scores.push(ScoreRow {
                exam_id: exam.id.clone(),
                student_id: student_id.to_string(),
                subject: subject.label.clone(),
                score,
                max_score: DEFAULT_MAX_SCORE,
                grade: None,
            }),
            None => errors.push(RowError::new(
                row_number,
                format!("invalid score for {}", subject.label),
            )),
        }
    }
}

/// Validate every data row of a score file against one exam.
///
/// Header problems abort with an error before any row is read. Row problems
/// are collected; a storage failure during a lookup aborts.
pub fn validate_scores(
    table: &RawTable,
    aliases: &AliasTable,
    exam: &Exam,
    store: &dyn Store,
) -> Result<(Vec<ScoreRow>, ErrorReport), IngestError> {
    let index = HeaderIndex::build(&table.headers, aliases);
    let layout = detect_score_layout(&table.headers, &index)?;
    debug!(
        exam_id = %exam.id,
        wide = matches!(layout, ScoreLayout::Wide { .. }),
        rows = table.rows.len(),
        "validating score rows"
    );

    let mut scores = Vec::new();
    let mut errors = ErrorReport::new();

    for (row_number, cells) in table.numbered_rows() {
        if is_blank_row(&index, &layout, cells) {
            continue;
        }

        let roll_raw = index.cell(cells, Field::RollNumber);
        if roll_raw.is_empty() {
            errors.push(RowError::new(row_number, "missing roll"));
            continue;
        }
        let Some(roll) = parse_roll(roll_raw) else {
            errors.push(RowError::new(row_number, "invalid roll"));
            continue;
        };

        let student = store
            .student_by_class_roll(&exam.tenant_id, &exam.class_label, roll)
            .map_err(|source| {
                warn!(row = row_number, error = %source, "student lookup failed");
                IngestError::Store {
                    row: Some(row_number),
                    committed: 0,
                    source,
                }
            })?;
        let Some(student) = student else {
            errors.push(RowError::new(row_number, "student not found"));
            continue;
        };

        match &layout {
            ScoreLayout::RowBased => match row_based_score(&index, cells, exam, &student.id) {
                Ok(score) => scores.push(score),
                Err(message) => errors.push(RowError::new(row_number, message)),
            },
            ScoreLayout::Wide { subjects } => wide_scores(
                subjects,
                cells,
                exam,
                &student.id,
                row_number,
                &mut scores,
                &mut errors,
            ),
        }
    }

    Ok((scores, errors))
}

fn commit(store: &dyn Store, exam: &Exam, rows: Vec<ScoreRow>) -> Result<Vec<Score>, IngestError> {
    store
        .create_scores(&exam.tenant_id, &exam.id, rows)
        .map_err(|source| {
            warn!(exam_id = %exam.id, error = %source, "score batch commit failed");
            IngestError::Store {
                row: None,
                committed: 0,
                source,
            }
        })
}

/// Validate a score file and commit it as one batch, or reject it whole
pub fn ingest_scores_table(
    table: &RawTable,
    aliases: &AliasTable,
    exam: &Exam,
    store: &dyn Store,
) -> Result<IngestOutcome<Score>, IngestError> {
    let (rows, errors) = validate_scores(table, aliases, exam, store)?;
    if !errors.is_empty() {
        debug!(exam_id = %exam.id, errors = errors.len(), "score upload rejected");
        return Ok(IngestOutcome::Rejected { errors });
    }

    let records = commit(store, exam, rows)?;
    Ok(IngestOutcome::Committed { records })
}

/// Commit manually entered scores for one exam, all or nothing.
///
/// Entries are numbered from 1 in error messages. A non-positive max score
/// means 100.
pub fn ingest_manual_scores(
    entries: &[ManualScore],
    exam: &Exam,
    store: &dyn Store,
) -> Result<IngestOutcome<Score>, IngestError> {
    if entries.is_empty() {
        return Err(IngestError::NoScores);
    }

    let mut rows = Vec::with_capacity(entries.len());
    let mut errors = ErrorReport::new();
    for (idx, entry) in entries.iter().enumerate() {
        let number = idx + 1;
        let subject = entry.subject.trim();
        if subject.is_empty() || entry.student_id.trim().is_empty() {
            errors.push(RowError::new(number, "student_id and subject required"));
            continue;
        }
        if !entry.score.is_finite() {
            errors.push(RowError::new(number, "invalid score"));
            continue;
        }
        let max_score = if entry.max_score.is_finite() && entry.max_score > 0.0 {
            entry.max_score
        } else {
            DEFAULT_MAX_SCORE
        };
        rows.push(ScoreRow {
            exam_id: exam.id.clone(),
            student_id: entry.student_id.trim().to_string(),
            subject: subject.to_string(),
            score: entry.score,
            max_score,
            grade: entry.grade.clone().filter(|g| !g.trim().is_empty()),
        });
    }

    if !errors.is_empty() {
        return Ok(IngestOutcome::Rejected { errors });
    }
    let records = commit(store, exam, rows)?;
    Ok(IngestOutcome::Committed { records })
}

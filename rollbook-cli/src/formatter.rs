//! Output formatters for ingestion reports

use anyhow::Result;
use colored::*;
use rollbook_core::validate::{ScoreUploadResponse, StudentUploadResponse};
use rollbook_core::{IngestOutcome, RowError, Score, Student};
use serde::Serialize;
use std::path::Path;

use crate::OutputFormat;

/// One header cell and the canonical field it maps to per target
#[derive(Serialize)]
pub struct HeaderReport {
    pub column: usize,
    pub header: String,
    pub scores_field: Option<&'static str>,
    pub students_field: Option<&'static str>,
}

#[derive(Serialize)]
pub struct InspectReport {
    pub file: String,
    pub rows: usize,
    pub headers: Vec<HeaderReport>,
    pub score_layout: String,
    pub subjects: Vec<String>,
}

/// Print any serializable report as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_inspect(report: &InspectReport) {
    println!("{}", format!("Inspecting: {}", report.file).bold());
    println!();
    println!("{} {}", "Data rows:".bold(), report.rows);
    println!();

    println!("{}", "Headers:".bold().underline());
    for header in &report.headers {
        let mapped = |field: Option<&str>| match field {
            Some(name) => name.green().to_string(),
            None => "-".bright_black().to_string(),
        };
        println!(
            "  {:>3}  {:<24} scores: {:<14} students: {}",
            header.column,
            header.header.cyan(),
            mapped(header.scores_field),
            mapped(header.students_field)
        );
    }
    println!();

    println!("{} {}", "Score layout:".bold(), report.score_layout);
    if !report.subjects.is_empty() {
        println!("  {} {}", "Subjects:".bold(), report.subjects.join(", "));
    }
}

fn print_errors(errors: &[RowError]) {
    if errors.is_empty() {
        return;
    }
    println!("{}", "Row errors:".bold().underline());
    for error in errors {
        println!("  {} {}", "ERROR".red().bold(), error);
    }
    println!();
}

pub fn print_scores(format: OutputFormat, file: &Path, outcome: &IngestOutcome<Score>) -> Result<()> {
    let body = ScoreUploadResponse::from(outcome);
    if let OutputFormat::Json = format {
        return print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "inserted": body.inserted,
            "errors": body.errors,
        }));
    }

    println!("{}", format!("Scores: {}", file.display()).bold());
    println!();
    print_errors(&body.errors);

    if outcome.is_rejected() {
        println!(
            "{}",
            format!("✗ Rejected: {} row error(s), nothing saved", body.errors.len())
                .red()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!("✓ Saved {} score(s)", body.inserted).green().bold()
        );
    }
    Ok(())
}

pub fn print_students(
    format: OutputFormat,
    file: &Path,
    outcome: &IngestOutcome<Student>,
) -> Result<()> {
    let body = StudentUploadResponse::from(outcome);
    if let OutputFormat::Json = format {
        return print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "inserted": body.inserted,
            "failed": body.failed,
            "errors": body.errors,
        }));
    }

    println!("{}", format!("Students: {}", file.display()).bold());
    println!();
    print_errors(&body.errors);

    println!("{}", "Summary:".bold().underline());
    println!("  {} {}", "Inserted:".green().bold(), body.inserted);
    if body.failed > 0 {
        println!("  {} {}", "Failed:".red().bold(), body.failed);
    }
    Ok(())
}

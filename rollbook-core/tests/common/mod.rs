#![allow(dead_code)]

use rollbook_core::{Exam, MemoryStore, Principal, Role, Store};
use rollbook_core::models::StudentRow;
use chrono::NaiveDate;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::{CompressionMethod, ZipWriter};
use zip::write::SimpleFileOptions;

pub const TENANT: &str = "school-1";
pub const EXAM_ID: &str = "exam-1";

/// Zip the given members into an in-memory archive
pub fn build_archive(members: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
    let members: Vec<(&str, &[u8])> = members
        .iter()
        .map(|(name, content)| (*name, content.as_bytes()))
        .collect();
    archive_with(&members, CompressionMethod::Stored)
}

/// Zip the given members with deflate, the way spreadsheet tools write them
pub fn build_deflated_archive(members: &[(&str, &[u8])]) -> anyhow::Result<Vec<u8>> {
    archive_with(members, CompressionMethod::Deflated)
}

fn archive_with(members: &[(&str, &[u8])], method: CompressionMethod) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(method);
        for (name, content) in members {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
    }
    Ok(buf)
}

fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Build a minimal workbook holding `grid` in `sheet1.xml`.
///
/// Non-numeric text goes through the shared-string pool, numbers are written
/// as literal values and empty strings are left out of the sheet.
pub fn xlsx_from_grid(grid: &[&[&str]]) -> anyhow::Result<Vec<u8>> {
    let mut pool: Vec<String> = Vec::new();
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    for (r, row) in grid.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{}", column_letters(c), r + 1);
            if value.parse::<f64>().is_ok() {
                sheet.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
            } else {
                let idx = match pool.iter().position(|s| s == value) {
                    Some(idx) => idx,
                    None => {
                        pool.push(value.to_string());
                        pool.len() - 1
                    }
                };
                sheet.push_str(&format!(r#"<c r="{reference}" t="s"><v>{idx}</v></c>"#));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut shared = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
        pool.len()
    );
    for text in &pool {
        shared.push_str(&format!("<si><t>{}</t></si>", escape(text)));
    }
    shared.push_str("</sst>");

    build_archive(&[
        ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#),
        ("xl/workbook.xml", r#"<?xml version="1.0" encoding="UTF-8"?><workbook/>"#),
        ("xl/sharedStrings.xml", &shared),
        ("xl/worksheets/sheet1.xml", &sheet),
    ])
}

pub fn admin() -> Principal {
    Principal::new("staff-7", TENANT, Role::Admin)
}

/// Store holding one exam for class 5A and students with the given rolls
pub fn seeded_store(rolls: &[u32]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_exam(Exam {
            id: EXAM_ID.to_string(),
            tenant_id: TENANT.to_string(),
            class_label: "5A".to_string(),
            title: "Half Yearly".to_string(),
            term: "T2".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 10, 3).unwrap(),
        })
        .unwrap();
    for &roll in rolls {
        store
            .create_student(StudentRow {
                tenant_id: TENANT.to_string(),
                full_name: format!("Student {roll}"),
                class_label: "5A".to_string(),
                roll_number: roll,
                date_of_birth: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
                house: None,
                parent_phone: None,
                admission_year: 2021,
            })
            .unwrap();
    }
    store
}

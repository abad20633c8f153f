//! Minimal XLSX decoder: shared strings and the first worksheet only

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::{Cursor, Read, Seek};
use tracing::debug;
use zip::ZipArchive;

use super::TableReader;
use super::parser_utils::{MAX_COLUMNS, OpenElements, column_index, read_text_node};
use crate::error::DecodeError;

pub const SHARED_STRINGS_MEMBER: &str = "xl/sharedStrings.xml";
pub const FIRST_SHEET_MEMBER: &str = "xl/worksheets/sheet1.xml";
const WORKSHEET_DIR: &str = "xl/worksheets/";

/// Archive members needed for decoding, as (name, bytes)
#[derive(Debug, Default)]
pub struct ArchiveMembers {
    members: Vec<(String, Vec<u8>)>,
}

impl ArchiveMembers {
    /// Inflate the shared-string pool and the selected worksheet.
    ///
    /// Other members are never read. Each inflated member is capped at
    /// `member_limit` bytes.
    pub fn from_bytes(bytes: &[u8], member_limit: u64) -> Result<Self, DecodeError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut wanted = Vec::with_capacity(2);
        if archive.index_for_name(SHARED_STRINGS_MEMBER).is_some() {
            wanted.push(SHARED_STRINGS_MEMBER.to_string());
        }
        if let Some(sheet) = select_worksheet(archive.file_names()) {
            wanted.push(sheet.to_string());
        }

        let mut members = Vec::with_capacity(wanted.len());
        for name in wanted {
            let data = read_member(&mut archive, &name, member_limit)?;
            members.push((name, data));
        }

        Ok(Self { members })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, data)| data.as_slice())
    }
}

fn read_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, DecodeError> {
    let file = archive.by_name(name)?;
    let mut data = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(DecodeError::MemberTooLarge {
            member: name.to_string(),
            limit,
        });
    }
    Ok(data)
}

impl FromIterator<(String, Vec<u8>)> for ArchiveMembers {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

fn is_worksheet_member(name: &str) -> bool {
    name.strip_prefix(WORKSHEET_DIR)
        .is_some_and(|rest| rest.ends_with(".xml") && !rest.contains('/'))
}

/// Pick the worksheet to decode.
///
/// `sheet1.xml` wins when present, otherwise the lexicographically first
/// `xl/worksheets/*.xml` member.
pub fn select_worksheet<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut first: Option<&str> = None;
    for name in names {
        if name == FIRST_SHEET_MEMBER {
            return Some(name);
        }
        if is_worksheet_member(name) && first.is_none_or(|current| name < current) {
            first = Some(name);
        }
    }
    first
}

/// Parse `xl/sharedStrings.xml` into the string pool.
///
/// An entry with direct `<t>` text uses it; otherwise the text of its rich
/// runs is concatenated. Phonetic runs are skipped. Whitespace is preserved.
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut direct = String::new();
    let mut runs = String::new();
    let mut in_run = false;
    let mut in_phonetic = false;
    let mut open = OpenElements::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            // <t> is consumed through its end tag
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                let text = read_text_node(&mut reader)?;
                if in_phonetic {
                    // not visible text
                } else if in_run {
                    runs.push_str(&text);
                } else {
                    direct.push_str(&text);
                }
            }
            Event::Start(e) => {
                open.open(e.local_name().as_ref());
                match e.local_name().as_ref() {
                    b"si" => {
                        direct.clear();
                        runs.clear();
                    }
                    b"r" => in_run = true,
                    b"rPh" => in_phonetic = true,
                    _ => {}
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => {
                open.close();
                match e.local_name().as_ref() {
                    b"si" => {
                        let value = if direct.is_empty() {
                            std::mem::take(&mut runs)
                        } else {
                            std::mem::take(&mut direct)
                        };
                        strings.push(value);
                        direct.clear();
                        runs.clear();
                    }
                    b"r" => in_run = false,
                    b"rPh" => in_phonetic = false,
                    _ => {}
                }
            }
            Event::Eof => {
                open.finish()?;
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    SharedString,
    InlineString,
    Literal,
}

struct CellAttrs {
    reference: Option<String>,
    kind: CellKind,
}

impl CellAttrs {
    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let mut reference = None;
        let mut kind = CellKind::Literal;
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"r" => reference = Some(attr.unescape_value()?.to_string()),
                b"t" => {
                    kind = match attr.value.as_ref() {
                        b"s" => CellKind::SharedString,
                        b"inlineStr" => CellKind::InlineString,
                        _ => CellKind::Literal,
                    }
                }
                _ => {}
            }
        }
        Ok(Self { reference, kind })
    }
}

/// Cells of the row being decoded
#[derive(Default)]
struct RowCells {
    cells: Vec<String>,
    next_col: usize,
}

impl RowCells {
    /// Store a value at its referenced column, or right after the previous
    /// cell when the reference is missing.
    fn place(&mut self, reference: Option<&str>, value: &str) -> Result<()> {
        let col = reference.map(column_index).unwrap_or(self.next_col);
        if col >= MAX_COLUMNS {
            anyhow::bail!(
                "cell {} is beyond the last worksheet column",
                reference.unwrap_or("?")
            );
        }
        if self.cells.len() <= col {
            self.cells.resize(col + 1, String::new());
        }
        self.cells[col] = value.trim().to_string();
        self.next_col = col + 1;
        Ok(())
    }

    fn finish(self) -> Vec<String> {
        self.cells
    }
}

/// Read the content of a `<c>` element up to its end tag and resolve it
fn read_cell_value<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    kind: CellKind,
    shared_strings: &[String],
) -> Result<String> {
    let mut raw = String::new();
    let mut inline = String::new();
    let mut in_inline = false;
    let mut in_phonetic = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => raw = read_text_node(reader)?,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if in_inline => {
                    let text = read_text_node(reader)?;
                    if !in_phonetic {
                        inline.push_str(&text);
                    }
                }
                // Formulas are not evaluated; the cached <v> is what we read
                b"f" => {
                    read_text_node(reader)?;
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => break,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => anyhow::bail!("unexpected end of file inside <c>"),
            _ => {}
        }
        buf.clear();
    }

    let value = match kind {
        CellKind::SharedString => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx))
            .cloned()
            .unwrap_or(raw),
        CellKind::InlineString => inline,
        CellKind::Literal => raw,
    };
    Ok(value)
}

/// Decode worksheet XML into rows of trimmed cell strings.
///
/// Rows are padded with empty strings up to their highest populated column.
/// A `<row>` with no cells yields an empty row.
pub fn parse_worksheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut current: Option<RowCells> = None;
    let mut open = OpenElements::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            // <c> is consumed through its end tag
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let attrs = CellAttrs::from_start(&e)?;
                let value = read_cell_value(&mut reader, attrs.kind, shared_strings)?;
                if let Some(row) = current.as_mut() {
                    row.place(attrs.reference.as_deref(), &value)?;
                }
            }
            Event::Start(e) => {
                open.open(e.local_name().as_ref());
                if e.local_name().as_ref() == b"row" {
                    current = Some(RowCells::default());
                }
            }
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => rows.push(Vec::new()),
                b"c" => {
                    let attrs = CellAttrs::from_start(&e)?;
                    if let Some(row) = current.as_mut() {
                        row.place(attrs.reference.as_deref(), "")?;
                    }
                }
                _ => {}
            },
            Event::End(e) => {
                open.close();
                if e.local_name().as_ref() == b"row" {
                    if let Some(row) = current.take() {
                        rows.push(row.finish());
                    }
                }
            }
            Event::Eof => {
                open.finish()?;
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

pub struct XlsxReader {
    members: ArchiveMembers,
}

impl XlsxReader {
    pub fn new(bytes: &[u8], member_limit: u64) -> Result<Self, DecodeError> {
        Ok(Self {
            members: ArchiveMembers::from_bytes(bytes, member_limit)?,
        })
    }

    pub fn from_members(members: ArchiveMembers) -> Self {
        Self { members }
    }

    fn shared_strings(&self) -> Result<Vec<String>, DecodeError> {
        match self.members.get(SHARED_STRINGS_MEMBER) {
            Some(xml) => {
                parse_shared_strings(xml).map_err(|e| DecodeError::SharedStrings(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

impl TableReader for XlsxReader {
    fn read_rows(&mut self) -> Result<Vec<Vec<String>>, DecodeError> {
        let shared_strings = self.shared_strings()?;
        let member = select_worksheet(self.members.names()).ok_or(DecodeError::NoWorksheet)?;
        let xml = self.members.get(member).ok_or(DecodeError::NoWorksheet)?;

        let rows = parse_worksheet_rows(xml, &shared_strings).map_err(|e| {
            DecodeError::Worksheet {
                member: member.to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!(
            member,
            shared_strings = shared_strings.len(),
            rows = rows.len(),
            "decoded xlsx worksheet"
        );
        Ok(rows)
    }
}

/// Decode an XLSX archive into records, header first.
///
/// `member_limit` caps the inflated size of each member that is read.
pub fn read_xlsx_rows(bytes: &[u8], member_limit: u64) -> Result<Vec<Vec<String>>, DecodeError> {
    XlsxReader::new(bytes, member_limit)?.read_rows()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_worksheet_prefers_sheet1() {
        let names = [
            "[Content_Types].xml",
            "xl/worksheets/sheet2.xml",
            "xl/worksheets/sheet1.xml",
        ];
        assert_eq!(select_worksheet(names), Some(FIRST_SHEET_MEMBER));
    }

    #[test]
    fn test_select_worksheet_falls_back_to_sorted_first() {
        let names = [
            "xl/worksheets/roster.xml",
            "xl/worksheets/_rels/roster.xml.rels",
            "xl/worksheets/marks.xml",
            "xl/workbook.xml",
        ];
        assert_eq!(select_worksheet(names), Some("xl/worksheets/marks.xml"));
    }

    #[test]
    fn test_select_worksheet_none() {
        let names = ["xl/workbook.xml", "xl/sharedStrings.xml"];
        assert_eq!(select_worksheet(names), None);
    }

    #[test]
    fn test_shared_strings_direct_and_runs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
  <si><t>roll</t></si>
  <si><r><rPr><b/></rPr><t>Ravi</t></r><r><t xml:space="preserve"> Kumar</t></r></si>
  <si/>
  <si><t>Science</t><rPh sb="0" eb="1"><t>sci</t></rPh></si>
</sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["roll", "Ravi Kumar", "", "Science"]);
    }

    #[test]
    fn test_shared_strings_malformed() {
        assert!(parse_shared_strings(b"<sst><si><t>x</si></sst>").is_err());
    }

    #[test]
    fn test_shared_strings_truncated_entry() {
        let err = parse_shared_strings(b"<sst><si><t>roll</t></si><si><t>Math</t>").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
        // Cut inside the text node itself
        assert!(parse_shared_strings(b"<sst><si><t>roll</t></si><si><t>Ma").is_err());
        // Every entry closed but the pool itself cut short
        assert!(parse_shared_strings(b"<sst><si><t>roll</t></si>").is_err());
    }

    #[test]
    fn test_worksheet_cell_kinds() {
        let shared = vec!["Math".to_string()];
        let xml = br#"<worksheet><sheetData>
<row r="1">
  <c r="A1" t="s"><v>0</v></c>
  <c r="B1" t="s"><v>7</v></c>
  <c r="C1" t="inlineStr"><is><t> Asha </t></is></c>
  <c r="D1"><v>  42.50 </v></c>
  <c r="E1"><f>SUM(D1:D1)</f><v>42.5</v></c>
</row>
</sheetData></worksheet>"#;
        let rows = parse_worksheet_rows(xml, &shared).unwrap();
        assert_eq!(rows, vec![vec!["Math", "7", "Asha", "42.50", "42.5"]]);
    }

    #[test]
    fn test_worksheet_pads_gaps_and_keeps_empty_rows() {
        let xml = br#"<worksheet><sheetData>
<row r="1"><c r="A1"><v>1</v></c><c r="D1"><v>4</v></c></row>
<row r="2"/>
<row r="3"><c r="B3"/></row>
</sheetData></worksheet>"#;
        let rows = parse_worksheet_rows(xml, &[]).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["1", "", "", "4"]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec!["", ""]);
    }

    #[test]
    fn test_worksheet_cells_without_reference_follow_previous() {
        let xml = br#"<worksheet><sheetData>
<row><c><v>a</v></c><c r="C1"><v>c</v></c><c><v>d</v></c></row>
</sheetData></worksheet>"#;
        let rows = parse_worksheet_rows(xml, &[]).unwrap();
        assert_eq!(rows[0], vec!["a", "", "c", "d"]);
    }

    #[test]
    fn test_worksheet_truncated_row() {
        let xml = br#"<worksheet><sheetData><row><c r="A1"><v>roll</v></c></row><row><c r="A2"><v>1</v></c>"#;
        let err = parse_worksheet_rows(xml, &[]).unwrap_err();
        assert_eq!(err.to_string(), "unexpected end of file inside <row>");
    }

    #[test]
    fn test_worksheet_truncated_cell() {
        let xml = br#"<worksheet><sheetData><row><c r="A1" t="inlineStr"><is><t>Asha</t></is>"#;
        assert!(parse_worksheet_rows(xml, &[]).is_err());
        let xml = br#"<worksheet><sheetData><row><c r="A1"><v>4"#;
        assert!(parse_worksheet_rows(xml, &[]).is_err());
    }

    #[test]
    fn test_worksheet_rejects_columns_past_limit() {
        let xml = br#"<worksheet><sheetData><row><c r="ZZZZ1"><v>x</v></c></row></sheetData></worksheet>"#;
        assert!(parse_worksheet_rows(xml, &[]).is_err());
    }

    #[test]
    fn test_reader_from_members_uses_shared_strings() {
        let members: ArchiveMembers = vec![
            (
                SHARED_STRINGS_MEMBER.to_string(),
                b"<sst><si><t>roll</t></si></sst>".to_vec(),
            ),
            (
                "xl/worksheets/sheet3.xml".to_string(),
                br#"<worksheet><sheetData><row><c r="A1" t="s"><v>0</v></c></row></sheetData></worksheet>"#
                    .to_vec(),
            ),
        ]
        .into_iter()
        .collect();

        let rows = XlsxReader::from_members(members).read_rows().unwrap();
        assert_eq!(rows, vec![vec!["roll"]]);
    }

    #[test]
    fn test_reader_without_worksheet() {
        let members: ArchiveMembers = vec![("xl/workbook.xml".to_string(), b"<workbook/>".to_vec())]
            .into_iter()
            .collect();
        assert!(matches!(
            XlsxReader::from_members(members).read_rows(),
            Err(DecodeError::NoWorksheet)
        ));
    }
}

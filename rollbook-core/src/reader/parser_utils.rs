//! Common parsing utilities shared by the xlsx decoder

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Highest column count a worksheet may address (column `XFD`)
pub const MAX_COLUMNS: usize = 16_384;

/// Convert a cell reference like "C7" into a 0-based column index.
///
/// Only the leading letters are read, case-insensitively, as a base-26 numeral
/// with A=1..Z=26; scanning stops at the first non-letter. A reference with no
/// leading letters maps to column 0.
pub fn column_index(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for ch in cell_ref.chars() {
        if !ch.is_ascii_alphabetic() {
            break;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
        col = col.saturating_mul(26).saturating_add(digit);
    }
    col.saturating_sub(1)
}

/// Read the text content of the current element up to its end tag.
///
/// Whitespace is kept as-is; callers decide whether to trim.
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => anyhow::bail!("unexpected end of file inside a text element"),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Elements opened but not yet closed while walking a document
#[derive(Debug, Default)]
pub struct OpenElements {
    names: Vec<String>,
}

impl OpenElements {
    pub fn open(&mut self, local_name: &[u8]) {
        self.names.push(String::from_utf8_lossy(local_name).into_owned());
    }

    pub fn close(&mut self) {
        self.names.pop();
    }

    /// Fail when the input ended with an element still open
    pub fn finish(&self) -> Result<()> {
        match self.names.last() {
            Some(name) => anyhow::bail!("unexpected end of file inside <{name}>"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), 0);
        assert_eq!(column_index("Z"), 25);
        assert_eq!(column_index("AA"), 26);
        assert_eq!(column_index("AB"), 27);
        assert_eq!(column_index("C7"), 2);
        assert_eq!(column_index("AB12"), 27);
        assert_eq!(column_index("XFD1048576"), MAX_COLUMNS - 1);
    }

    #[test]
    fn test_column_index_is_case_insensitive() {
        assert_eq!(column_index("ab3"), column_index("AB3"));
        assert_eq!(column_index("z"), 25);
    }

    #[test]
    fn test_column_index_degenerate_refs() {
        assert_eq!(column_index(""), 0);
        assert_eq!(column_index("42"), 0);
        assert_eq!(column_index("$B$2"), 0);
        // Letters after the first digit are ignored
        assert_eq!(column_index("B2C"), 1);
        // Absurd refs saturate instead of overflowing
        assert!(column_index(&"Z".repeat(64)) > MAX_COLUMNS);
    }

    #[test]
    fn test_read_text_node_keeps_whitespace() {
        let mut reader = Reader::from_str("<t xml:space=\"preserve\"> Ravi &amp; Co </t>");
        let mut buf = Vec::new();
        // Consume the start tag
        reader.read_event_into(&mut buf).unwrap();
        assert_eq!(read_text_node(&mut reader).unwrap(), " Ravi & Co ");
    }

    #[test]
    fn test_read_text_node_truncated() {
        let mut reader = Reader::from_str("<t>Ravi");
        let mut buf = Vec::new();
        reader.read_event_into(&mut buf).unwrap();
        assert!(read_text_node(&mut reader).is_err());
    }

    #[test]
    fn test_open_elements_finish() {
        let mut open = OpenElements::default();
        assert!(open.finish().is_ok());

        open.open(b"sst");
        open.open(b"si");
        let err = open.finish().unwrap_err();
        assert_eq!(err.to_string(), "unexpected end of file inside <si>");

        open.close();
        open.close();
        assert!(open.finish().is_ok());
    }
}

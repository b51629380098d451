//! Multi-format text extraction for ingested files.
//!
//! [`FileExtractor`] plugs into the engine as its
//! [`TextExtractor`]. It handles plain text, Markdown, JSON, CSV, PDF, DOCX,
//! and XLSX. Tabular sources (CSV rows, XLSX rows) are rendered one row per
//! line as `a | b | c`, so a header row becomes a chunk line the segmenter
//! recognizes as a table header.
//!
//! Extraction never panics: every failure becomes an
//! [`Error::UnsupportedInput`] that the engine records on the document.

use std::io::Read;
use std::path::Path;

use docsift_core::engine::TextExtractor;
use docsift_core::Error;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error as ThisError;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_JSON: &str = "application/json";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Decompressed size cap for a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;

#[derive(Debug, ThisError)]
pub enum ExtractError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("JSON is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ExtractError> for Error {
    fn from(e: ExtractError) -> Self {
        Error::UnsupportedInput(e.to_string())
    }
}

/// Media type from a file extension. Unknown extensions map to
/// `application/octet-stream`.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => MIME_TEXT,
        "md" | "markdown" => MIME_MARKDOWN,
        "csv" => MIME_CSV,
        "json" => MIME_JSON,
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "xlsx" => MIME_XLSX,
        _ => "application/octet-stream",
    }
}

/// Extract plain text from `bytes` of the given media type.
pub fn extract_text(bytes: &[u8], media_type: &str) -> Result<String, ExtractError> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        MIME_CSV => Ok(csv_to_table(&String::from_utf8_lossy(bytes))),
        MIME_JSON => extract_json(bytes),
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        t if t.starts_with("text/") => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => Err(ExtractError::UnsupportedMediaType(media_type.to_string())),
    }
}

/// [`TextExtractor`] backed by [`extract_text`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl TextExtractor for FileExtractor {
    fn extract(&self, bytes: &[u8], _file_name: &str, media_type: &str) -> docsift_core::Result<String> {
        Ok(extract_text(bytes, media_type)?)
    }
}

fn extract_json(bytes: &[u8]) -> Result<String, ExtractError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let mut out = Vec::new();
    collect_json_strings(&value, &mut out);
    Ok(out.join("\n"))
}

/// String leaves and `key: scalar` pairs, depth first.
fn collect_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                match v {
                    serde_json::Value::String(s) => out.push(format!("{key}: {s}")),
                    serde_json::Value::Number(n) => out.push(format!("{key}: {n}")),
                    serde_json::Value::Bool(b) => out.push(format!("{key}: {b}")),
                    _ => collect_json_strings(v, out),
                }
            }
        }
        _ => {}
    }
}

/// Render CSV as pipe-separated lines. Quoted fields may contain commas,
/// doubled quotes, and newlines. A quote only opens a quoted section as the
/// first character of a field; anywhere else it is literal text.
pub fn csv_to_table(input: &str) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut started = false;
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if !started => {
                in_quotes = true;
                started = true;
            }
            (',', false) => {
                row.push(std::mem::take(&mut field));
                started = false;
            }
            ('\r', false) => {}
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                started = false;
            }
            ('\n', true) => field.push(' '),
            _ => {
                field.push(c);
                started = true;
            }
        }
    }
    if started || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows.into_iter()
        .map(|r| {
            r.iter()
                .map(|f| f.trim())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .filter(|line| line.chars().any(|c| c != '|' && !c.is_whitespace()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!("{name} exceeds size limit")));
    }
    Ok(out)
}

/// Paragraphs (`w:p`) become lines; runs (`w:t`) are concatenated.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;

    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// One `a | b | c` line per row, sheets separated by blank lines.
fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };

    let mut sheets: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|n| {
            let idx = n
                .strip_prefix("xl/worksheets/sheet")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((idx, n.to_string()))
        })
        .collect();
    sheets.sort();

    let mut out = Vec::new();
    for (_, name) in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_entry(&mut archive, &name)?;
        let rows = sheet_rows(&xml, &shared)?;
        if !rows.is_empty() {
            out.push(rows.join("\n"));
        }
    }
    Ok(out.join("\n\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut shared_cell = false;
    let mut in_value = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t"
                            && matches!(a.value.as_ref(), b"s")
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                let raw = t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let value = if shared_cell {
                    raw.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or_default()
                } else {
                    raw.trim().to_string()
                };
                cells.push(value);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"row" => {
                    let line = std::mem::take(&mut cells).join(" | ");
                    if !line.trim().is_empty() {
                        rows.push(line);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("a/b.MD")), MIME_MARKDOWN);
        assert_eq!(media_type_for(Path::new("x.csv")), MIME_CSV);
        assert_eq!(media_type_for(Path::new("x.bin")), "application/octet-stream");
        assert_eq!(media_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(extract_text("报销流程".as_bytes(), MIME_TEXT).unwrap(), "报销流程");
        assert_eq!(extract_text(b"# Title", MIME_MARKDOWN).unwrap(), "# Title");
    }

    #[test]
    fn test_csv_rendered_as_table() {
        let text = csv_to_table("name,amount\n\"Smith, J\",100\r\n\"say \"\"hi\"\"\",5\n");
        assert_eq!(text, "name | amount\nSmith, J | 100\nsay \"hi\" | 5");
    }

    #[test]
    fn test_csv_literal_quotes() {
        assert_eq!(
            csv_to_table("item,size\nmonitor 27\" wide,2\n\"\"\"boxed\"\" set\",1\n\"\"x\",3"),
            "item | size\nmonitor 27\" wide | 2\n\"boxed\" set | 1\nx\" | 3"
        );
    }

    #[test]
    fn test_csv_skips_blank_rows() {
        assert_eq!(csv_to_table("a,b\n,\n\nc,d"), "a | b\nc | d");
    }

    #[test]
    fn test_json_strings_collected() {
        let text = extract_text(br#"{"title":"Travel","items":[{"note":"taxi"}],"n":3}"#, MIME_JSON).unwrap();
        assert!(text.contains("title: Travel"));
        assert!(text.contains("note: taxi"));
        assert!(text.contains("n: 3"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(extract_text(b"{oops", MIME_JSON), Err(ExtractError::Json(_))));
    }

    #[test]
    fn test_docx_paragraphs() {
        let doc = zip_with(&[(
            "word/document.xml",
            r#"<?xml version="1.0"?><w:document xmlns:w="w"><w:body><w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> line</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body></w:document>"#,
        )]);
        assert_eq!(extract_text(&doc, MIME_DOCX).unwrap(), "First line\n\nSecond");
    }

    #[test]
    fn test_xlsx_rows() {
        let book = zip_with(&[
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>Region</t></si><si><t>Revenue</t></si><si><t>North</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData><row><c t="s"><v>0</v></c><c t="s"><v>1</v></c></row><row><c t="s"><v>2</v></c><c><v>42</v></c></row></sheetData></worksheet>"#,
            ),
        ]);
        assert_eq!(extract_text(&book, MIME_XLSX).unwrap(), "Region | Revenue\nNorth | 42");
    }

    #[test]
    fn test_unsupported_maps_to_core_error() {
        let err = FileExtractor
            .extract(b"\x00", "x.bin", "application/octet-stream")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        assert!(matches!(extract_text(b"not a pdf", MIME_PDF), Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn test_invalid_zip_is_error() {
        assert!(matches!(extract_text(b"not a zip", MIME_DOCX), Err(ExtractError::Ooxml(_))));
    }
}

//! Per-format text extraction for office documents.
//!
//! Each supported format gets one stateless [`Extractor`] behind the
//! [`ExtractorRegistry`], keyed by lowercase file extension. Extractors
//! return plain UTF-8 text or an [`ExtractError`]; recovery (skip the file,
//! keep the batch going) is the corpus builder's job, not theirs.

use std::io::Read;
use std::path::Path;

use crate::biff;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Magic number at the start of every OLE compound file.
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Per-file extraction failure. Logged and skipped by the corpus builder;
/// never aborts a batch.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
    Ooxml(String),
    Ole(String),
    Unsupported(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Ole(e) => write!(f, "OLE extraction failed: {}", e),
            ExtractError::Unsupported(ext) => write!(f, "unsupported file extension: {}", ext),
        }
    }
}

impl std::error::Error for ExtractError {}

/// A stateless adapter from a file on disk to a best-effort plain-text
/// rendering. No side effects beyond reading the file.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Maps file extensions to extractors. New formats are added here, not in
/// dispatch logic.
pub struct ExtractorRegistry {
    entries: Vec<(&'static str, Box<dyn Extractor>)>,
}

impl ExtractorRegistry {
    /// Registry covering all recognized extensions:
    /// `.pdf`, `.pptx`, `.txt`, `.hwp`, `.xlsx`, `.xls`.
    pub fn with_defaults() -> Self {
        Self {
            entries: vec![
                ("pdf", Box::new(PdfExtractor)),
                ("pptx", Box::new(SlideDeckExtractor)),
                ("txt", Box::new(PlainTextExtractor)),
                ("hwp", Box::new(HwpExtractor)),
                ("xlsx", Box::new(SpreadsheetExtractor)),
                ("xls", Box::new(LegacySpreadsheetExtractor)),
            ],
        }
    }

    /// Look up the extractor for a lowercase extension.
    pub fn find(&self, ext: &str) -> Option<&dyn Extractor> {
        self.entries
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, x)| x.as_ref())
    }

    pub fn recognized_extensions(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(e, _)| *e).collect()
    }

    /// Extract a file, dispatching on its extension.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let extractor = self
            .find(&ext)
            .ok_or_else(|| ExtractError::Unsupported(ext.clone()))?;
        extractor.extract(path)
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))
}

// ============ Plain text ============

/// Reads the file verbatim as UTF-8. No transformation.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string()))
    }
}

// ============ PDF ============

/// Concatenates per-page extracted text in page order.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

// ============ Slide decks (.pptx) ============

/// Concatenates text-bearing shape content per slide, slide order first,
/// then shape order within the slide. Shapes without text contribute nothing.
pub struct SlideDeckExtractor;

impl Extractor for SlideDeckExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        slide_names.sort_by_key(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });

        let mut out = String::new();
        for name in slide_names {
            let xml = read_zip_entry_bounded(&mut archive, &name)?;
            let text = collect_text_runs(&xml)?;
            if !text.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&text);
            }
        }
        Ok(out)
    }
}

/// Collects the text content of every `t` element (DrawingML `a:t` runs),
/// one run per line.
fn collect_text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut runs: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                let text = te.unescape().unwrap_or_default().into_owned();
                if !text.is_empty() {
                    runs.push(text);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(runs.join("\n"))
}

// ============ Spreadsheets (.xlsx) ============

/// Reads every sheet in workbook order. Each sheet gets a section header
/// naming it, followed by all rows rendered as tab-separated cells (header
/// row included, row index suppressed).
pub struct SpreadsheetExtractor;

impl Extractor for SpreadsheetExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

        let shared_strings = read_shared_strings(&mut archive)?;
        let sheet_titles = read_sheet_titles(&mut archive)?;
        let sheet_files = list_worksheet_files(&mut archive);

        let mut out = String::new();
        for (idx, name) in sheet_files.iter().enumerate() {
            let title = sheet_titles
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("Sheet{}", idx + 1));
            let xml = read_zip_entry_bounded(&mut archive, name)?;
            let rows = render_sheet_rows(&xml, &shared_strings)?;
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[Sheet: {}]\n", title));
            out.push_str(&rows);
        }
        Ok(out)
    }
}

/// Sheet display names from `xl/workbook.xml`, in workbook order.
fn read_sheet_titles(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    if !archive.file_names().any(|n| n == "xl/workbook.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
    let mut titles = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e))
            | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            titles.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(titles)
}

fn list_worksheet_files(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Renders one worksheet as newline-separated rows of tab-separated cells.
/// Shared-string cells are resolved through the string table; other cell
/// values (numbers, booleans, inline strings) are kept as written.
fn render_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_v = false;
    let mut in_inline_t = false;
    let mut cell_is_shared = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    row.clear();
                }
                b"c" if in_row => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" if in_row => in_v = true,
                b"t" if in_row => in_inline_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v || in_inline_t => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if value.is_empty() {
                    // nothing to record
                } else if in_v && cell_is_shared {
                    if let Ok(i) = value.parse::<usize>() {
                        if let Some(s) = shared_strings.get(i) {
                            row.push(s.clone());
                        }
                    }
                } else {
                    row.push(value.to_string());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    if !row.is_empty() {
                        out.push_str(&row.join("\t"));
                        out.push('\n');
                    }
                }
                b"c" => cell_is_shared = false,
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

// ============ Legacy spreadsheets (.xls) ============

/// Best-effort text recovery from BIFF8 workbooks inside an OLE container.
pub struct LegacySpreadsheetExtractor;

impl Extractor for LegacySpreadsheetExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        if !has_ole_signature(&bytes) {
            return Err(ExtractError::Ole(
                "missing OLE compound file signature".to_string(),
            ));
        }
        let mut comp = cfb::CompoundFile::open(std::io::Cursor::new(bytes.as_slice()))
            .map_err(|e| ExtractError::Ole(e.to_string()))?;
        let stream_name = if comp.exists("/Workbook") {
            "/Workbook"
        } else if comp.exists("/Book") {
            "/Book"
        } else {
            return Err(ExtractError::Ole("no Workbook stream".to_string()));
        };
        let mut data = Vec::new();
        comp.open_stream(stream_name)
            .and_then(|mut s| s.read_to_end(&mut data))
            .map_err(|e| ExtractError::Ole(e.to_string()))?;
        biff::render_workbook(&data)
    }
}

// ============ Legacy word processor (.hwp) ============

/// Extracts the `PrvText` preview stream from HWP documents, decoded as
/// UTF-16LE. A container without the stream yields empty text, not an error;
/// so does a file that fails the OLE signature check.
pub struct HwpExtractor;

impl Extractor for HwpExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_bytes(path)?;
        if !has_ole_signature(&bytes) {
            return Ok(String::new());
        }
        let mut comp = cfb::CompoundFile::open(std::io::Cursor::new(bytes.as_slice()))
            .map_err(|e| ExtractError::Ole(e.to_string()))?;
        if !comp.exists("/PrvText") {
            return Ok(String::new());
        }
        let mut data = Vec::new();
        comp.open_stream("/PrvText")
            .and_then(|mut s| s.read_to_end(&mut data))
            .map_err(|e| ExtractError::Ole(e.to_string()))?;
        Ok(decode_utf16le(&data))
    }
}

fn has_ole_signature(bytes: &[u8]) -> bool {
    bytes.len() >= OLE_SIGNATURE.len() && bytes[..OLE_SIGNATURE.len()] == OLE_SIGNATURE
}

/// Best-effort UTF-16LE decode, dropping trailing NULs.
pub(crate) fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let mut text = String::from_utf16_lossy(&units);
    while text.ends_with('\0') {
        text.pop();
    }
    text
}

// ============ Shared ZIP helpers ============

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_recognized_extensions() {
        let registry = ExtractorRegistry::with_defaults();
        for ext in ["pdf", "pptx", "txt", "hwp", "xlsx", "xls"] {
            assert!(registry.find(ext).is_some(), "missing extractor for {}", ext);
        }
        assert!(registry.find("docx").is_none());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry.extract(Path::new("notes.docx")).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn shared_string_cells_are_resolved_by_row() {
        let xml = br#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>42</v></c></row>
        </sheetData></worksheet>"#;
        let shared = vec!["name".to_string(), "hours".to_string()];
        let rows = render_sheet_rows(xml, &shared).unwrap();
        assert_eq!(rows, "name\thours\nhours\t42\n");
    }

    #[test]
    fn text_runs_keep_slide_order() {
        let xml = br#"<sld><sp><a:t>first</a:t></sp><sp><a:t>second</a:t></sp></sld>"#;
        let text = collect_text_runs(xml).unwrap();
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn utf16le_decode_drops_trailing_nuls() {
        let mut bytes = Vec::new();
        for c in "회의록".encode_utf16() {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        assert_eq!(decode_utf16le(&bytes), "회의록");
    }

    #[test]
    fn non_ole_bytes_fail_the_signature_check() {
        assert!(!has_ole_signature(b"plain old text"));
        assert!(has_ole_signature(&[
            0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0x00
        ]));
    }
}

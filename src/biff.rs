//! Best-effort text recovery from BIFF8 (`.xls`) workbook streams.
//!
//! Parses just enough of the binary record format to recover cell text:
//! sheet names from `BOUNDSHEET`, the shared string table from `SST`, and
//! cell values from `LABELSST`, `LABEL`, and `NUMBER` records. Rich-text
//! runs, formatting, formulas, and `CONTINUE`-spanning strings are skipped;
//! completeness is explicitly not guaranteed for this format.

use std::collections::BTreeMap;

use crate::extract::ExtractError;

const REC_BOF: u16 = 0x0809;
const REC_EOF: u16 = 0x000A;
const REC_BOUNDSHEET: u16 = 0x0085;
const REC_SST: u16 = 0x00FC;
const REC_LABELSST: u16 = 0x00FD;
const REC_LABEL: u16 = 0x0204;
const REC_NUMBER: u16 = 0x0203;

/// BOF substream type for worksheets.
const BOF_WORKSHEET: u16 = 0x0010;

/// Renders a raw `Workbook` stream as per-sheet sections of tab-separated
/// rows, mirroring the `.xlsx` spreadsheet rendering.
pub fn render_workbook(stream: &[u8]) -> Result<String, ExtractError> {
    let mut sheet_names: Vec<String> = Vec::new();
    let mut shared_strings: Vec<String> = Vec::new();
    // (BOUNDSHEET index, row -> col -> value) per worksheet substream
    let mut sheets: Vec<(usize, BTreeMap<u16, BTreeMap<u16, String>>)> = Vec::new();
    let mut in_worksheet = false;
    let mut seen_globals_bof = false;
    // Substreams follow BOUNDSHEET order, so every non-globals BOF (chart
    // sheets and macro sheets included) consumes one name slot.
    let mut substream_idx = 0usize;

    for (id, payload) in Records::new(stream) {
        match id {
            REC_BOF => {
                if !seen_globals_bof {
                    seen_globals_bof = true;
                    continue;
                }
                let dt = read_u16(payload, 2).unwrap_or(0);
                in_worksheet = dt == BOF_WORKSHEET;
                if in_worksheet {
                    sheets.push((substream_idx, BTreeMap::new()));
                }
                substream_idx += 1;
            }
            REC_EOF => in_worksheet = false,
            REC_BOUNDSHEET => {
                if let Some(name) = read_short_unicode(payload, 6) {
                    sheet_names.push(name);
                }
            }
            REC_SST => shared_strings = parse_sst(payload),
            REC_LABELSST if in_worksheet => {
                let (Some(row), Some(col), Some(isst)) = (
                    read_u16(payload, 0),
                    read_u16(payload, 2),
                    read_u32(payload, 6),
                ) else {
                    continue;
                };
                if let Some(text) = shared_strings.get(isst as usize) {
                    insert_cell(&mut sheets, row, col, text.clone());
                }
            }
            REC_LABEL if in_worksheet => {
                let (Some(row), Some(col)) = (read_u16(payload, 0), read_u16(payload, 2)) else {
                    continue;
                };
                if let Some((text, _)) = read_unicode_string(payload, 6) {
                    insert_cell(&mut sheets, row, col, text);
                }
            }
            REC_NUMBER if in_worksheet => {
                let (Some(row), Some(col), Some(num)) = (
                    read_u16(payload, 0),
                    read_u16(payload, 2),
                    read_f64(payload, 6),
                ) else {
                    continue;
                };
                insert_cell(&mut sheets, row, col, format_number(num));
            }
            _ => {}
        }
    }

    let mut out = String::new();
    for (nth, (bound_idx, rows)) in sheets.iter().enumerate() {
        let name = sheet_names
            .get(*bound_idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", nth + 1));
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[Sheet: {}]\n", name));
        for cells in rows.values() {
            let line: Vec<&str> = cells.values().map(|s| s.as_str()).collect();
            out.push_str(&line.join("\t"));
            out.push('\n');
        }
    }
    Ok(out)
}

fn insert_cell(
    sheets: &mut [(usize, BTreeMap<u16, BTreeMap<u16, String>>)],
    row: u16,
    col: u16,
    value: String,
) {
    if let Some((_, sheet)) = sheets.last_mut() {
        sheet.entry(row).or_default().insert(col, value);
    }
}

fn format_number(num: f64) -> String {
    if num.fract() == 0.0 && num.abs() < 1e15 {
        format!("{}", num as i64)
    } else {
        format!("{}", num)
    }
}

/// Iterator over (record id, payload) pairs. Stops at the first truncated
/// record header rather than erroring.
struct Records<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 4 > self.data.len() {
            return None;
        }
        let id = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        let len = u16::from_le_bytes([self.data[self.pos + 2], self.data[self.pos + 3]]) as usize;
        let start = self.pos + 4;
        let end = start.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        self.pos = end;
        Some((id, &self.data[start..end]))
    }
}

/// Parses the shared string table. Strings spanning a CONTINUE record are
/// abandoned at the boundary; everything decoded up to that point is kept.
fn parse_sst(payload: &[u8]) -> Vec<String> {
    let Some(unique) = read_u32(payload, 4) else {
        return Vec::new();
    };
    let mut strings = Vec::new();
    let mut pos = 8usize;
    for _ in 0..unique {
        let Some((text, next)) = read_rich_extended_string(payload, pos) else {
            break;
        };
        strings.push(text);
        pos = next;
    }
    strings
}

/// XLUnicodeRichExtendedString: cch u16, flags u8, optional run/ext counts,
/// then compressed (latin-1) or UTF-16LE characters.
fn read_rich_extended_string(data: &[u8], pos: usize) -> Option<(String, usize)> {
    let cch = read_u16(data, pos)? as usize;
    let flags = *data.get(pos + 2)?;
    let mut cursor = pos + 3;

    let rich_runs = if flags & 0x08 != 0 {
        let runs = read_u16(data, cursor)? as usize;
        cursor += 2;
        runs
    } else {
        0
    };
    let ext_bytes = if flags & 0x04 != 0 {
        let ext = read_u32(data, cursor)? as usize;
        cursor += 4;
        ext
    } else {
        0
    };

    let (text, after_chars) = decode_chars(data, cursor, cch, flags & 0x01 != 0)?;
    let end = after_chars
        .checked_add(rich_runs.checked_mul(4)?)?
        .checked_add(ext_bytes)?;
    if end > data.len() {
        return None;
    }
    Some((text, end))
}

/// ShortXLUnicodeString (u8 length), used by BOUNDSHEET.
fn read_short_unicode(data: &[u8], pos: usize) -> Option<String> {
    let cch = *data.get(pos)? as usize;
    let flags = *data.get(pos + 1)?;
    decode_chars(data, pos + 2, cch, flags & 0x01 != 0).map(|(text, _)| text)
}

/// XLUnicodeString (u16 length), used by LABEL.
fn read_unicode_string(data: &[u8], pos: usize) -> Option<(String, usize)> {
    let cch = read_u16(data, pos)? as usize;
    let flags = *data.get(pos + 2)?;
    decode_chars(data, pos + 3, cch, flags & 0x01 != 0)
}

fn decode_chars(data: &[u8], pos: usize, cch: usize, wide: bool) -> Option<(String, usize)> {
    if wide {
        let end = pos.checked_add(cch.checked_mul(2)?)?;
        let bytes = data.get(pos..end)?;
        Some((crate::extract::decode_utf16le(bytes), end))
    } else {
        let end = pos.checked_add(cch)?;
        let bytes = data.get(pos..end)?;
        // Compressed strings are the low bytes of UTF-16 code units (latin-1).
        Some((bytes.iter().map(|&b| b as char).collect(), end))
    }
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_f64(data: &[u8], pos: usize) -> Option<f64> {
    data.get(pos..pos + 8).map(|b| {
        f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn bof(dt: u16) -> Vec<u8> {
        let mut payload = vec![0u8; 16];
        payload[2..4].copy_from_slice(&dt.to_le_bytes());
        record(REC_BOF, &payload)
    }

    fn boundsheet(name: &str) -> Vec<u8> {
        let mut payload = vec![0u8; 6]; // lbPlyPos + flags
        payload.push(name.len() as u8);
        payload.push(0); // compressed chars
        payload.extend_from_slice(name.as_bytes());
        record(REC_BOUNDSHEET, &payload)
    }

    fn sst(strings: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        payload.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            payload.extend_from_slice(&(s.len() as u16).to_le_bytes());
            payload.push(0); // compressed
            payload.extend_from_slice(s.as_bytes());
        }
        record(REC_SST, &payload)
    }

    fn labelsst(row: u16, col: u16, isst: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&row.to_le_bytes());
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes()); // ixfe
        payload.extend_from_slice(&isst.to_le_bytes());
        record(REC_LABELSST, &payload)
    }

    fn number(row: u16, col: u16, num: f64) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&row.to_le_bytes());
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&num.to_le_bytes());
        record(REC_NUMBER, &payload)
    }

    /// Minimal BIFF8 workbook stream: globals with one sheet and two shared
    /// strings, then a worksheet substream with three cells.
    fn sample_stream() -> Vec<u8> {
        let mut stream = Vec::new();
        stream.extend(bof(0x0005));
        stream.extend(boundsheet("Budget"));
        stream.extend(sst(&["item", "office chairs"]));
        stream.extend(record(REC_EOF, &[]));
        stream.extend(bof(BOF_WORKSHEET));
        stream.extend(labelsst(0, 0, 0));
        stream.extend(labelsst(1, 0, 1));
        stream.extend(number(1, 1, 12.0));
        stream.extend(record(REC_EOF, &[]));
        stream
    }

    #[test]
    fn renders_sheet_header_and_rows() {
        let text = render_workbook(&sample_stream()).unwrap();
        assert_eq!(text, "[Sheet: Budget]\nitem\noffice chairs\t12\n");
    }

    #[test]
    fn truncated_stream_yields_partial_text_not_panic() {
        let stream = sample_stream();
        let text = render_workbook(&stream[..stream.len() - 3]).unwrap();
        assert!(text.starts_with("[Sheet: Budget]"));
    }

    #[test]
    fn empty_stream_renders_nothing() {
        assert_eq!(render_workbook(&[]).unwrap(), "");
    }

    #[test]
    fn chart_substream_does_not_shift_sheet_names() {
        // A chart sheet gets its own BOUNDSHEET entry and substream but holds
        // no cells; the worksheet after it must still get its own name.
        let mut stream = Vec::new();
        stream.extend(bof(0x0005));
        stream.extend(boundsheet("Trend"));
        stream.extend(boundsheet("Data"));
        stream.extend(sst(&["headcount"]));
        stream.extend(record(REC_EOF, &[]));
        stream.extend(bof(0x0020)); // chart substream
        stream.extend(record(REC_EOF, &[]));
        stream.extend(bof(BOF_WORKSHEET));
        stream.extend(labelsst(0, 0, 0));
        stream.extend(record(REC_EOF, &[]));

        let text = render_workbook(&stream).unwrap();
        assert_eq!(text, "[Sheet: Data]\nheadcount\n");
    }

    #[test]
    fn wide_sst_strings_decode_as_utf16() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        let s = "예산";
        payload.extend_from_slice(&(s.chars().count() as u16).to_le_bytes());
        payload.push(1); // wide chars
        for unit in s.encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        let strings = parse_sst(&payload);
        assert_eq!(strings, vec!["예산".to_string()]);
    }
}

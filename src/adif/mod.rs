//! ADIF (Amateur Data Interchange Format) record decoding
//!
//! Logging programs (WSJT-X, Log4OM, N1MM...) broadcast each logged QSO as a
//! single UDP datagram containing one ADIF record:
//!
//! ```text
//! <CALL:5>W1ABC<QSO_DATE:8>20240210<TIME_ON:6>143000<BAND:3>20m<eor>
//! ```
//!
//! Each tag is `<NAME:LENGTH>` or `<NAME:LENGTH:TYPE>`, followed by exactly
//! LENGTH bytes of value. Values are not delimiter-terminated, so they may
//! contain `<` and `>`.
//!
//! Reference: <https://adif.org/adif>

use std::collections::HashMap;

/// Upper-cased field name → trimmed value
pub type FieldMap = HashMap<String, String>;

/// Decode one ADIF record into a field map
///
/// Never fails: malformed tags are skipped, and a tag without a closing `>`
/// ends the scan with whatever was captured so far. Tags that carry no
/// length (`<eor>`, `<eoh>`) hold no data and are ignored.
pub fn parse(data: &[u8]) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut i = 0;

    while i < data.len() {
        if data[i] != b'<' {
            i += 1;
            continue;
        }

        let end = match data[i + 1..].iter().position(|&b| b == b'>') {
            Some(offset) => i + 1 + offset,
            None => break,
        };

        let tag = String::from_utf8_lossy(&data[i + 1..end]);
        let mut parts = tag.split(':');
        let name = parts.next().unwrap_or_default().trim();

        let len = match parts.next().map(|l| l.trim().parse::<usize>()) {
            Some(Ok(len)) => len,
            // <eor>, <eoh>, or a non-numeric length
            _ => {
                i = end + 1;
                continue;
            }
        };

        let value_start = end + 1;
        let value_end = value_start.saturating_add(len).min(data.len());
        let value = String::from_utf8_lossy(&data[value_start..value_end]);

        if !name.is_empty() {
            fields.insert(name.to_uppercase(), value.trim().to_string());
        }

        i = value_end;
    }

    fields
}

/// Split an ADIF document (e.g. a log export) into individual record strings
///
/// The header, if any, ends at `<eoh>` and is discarded. Records end at
/// `<eor>`; both markers are matched case-insensitively. Blank pieces are
/// dropped.
pub fn split_records(document: &str) -> Vec<String> {
    let lower = document.to_ascii_lowercase();

    let body_start = lower.find("<eoh>").map(|pos| pos + "<eoh>".len()).unwrap_or(0);
    let body = &document[body_start..];
    let body_lower = &lower[body_start..];

    let mut records = Vec::new();
    let mut start = 0;
    while let Some(offset) = body_lower[start..].find("<eor>") {
        let end = start + offset;
        push_record(&mut records, &body[start..end]);
        start = end + "<eor>".len();
    }
    push_record(&mut records, &body[start..]);

    records
}

fn push_record(records: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        records.push(piece.to_string());
    }
}

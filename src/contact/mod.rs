//! Turning a decoded ADIF record into a `contacts` row
//!
//! Validation is deliberately loose: only `CALL` is required. Date/time
//! values are reformatted when they arrive in ADIF's compact form and passed
//! through otherwise; an unparseable frequency or grid square drops that one
//! field, not the contact.

pub mod types;

use chrono::Utc;
use thiserror::Error;

use crate::adif::FieldMap;
use crate::config::Config;
use crate::locator;
pub use types::ContactRecord;

/// Why a record was not turned into a contact
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no ADIF fields parsed")]
    Empty,
    #[error("missing CALL field in ADIF")]
    MissingCall,
}

/// Build a contact from decoded fields
///
/// `raw` is the datagram text the fields were parsed from; it is stored
/// verbatim on the record.
pub fn build(fields: &FieldMap, raw: &str, config: &Config) -> Result<ContactRecord, Rejection> {
    if fields.is_empty() {
        return Err(Rejection::Empty);
    }

    let contacted_callsign = match fields.get("CALL").filter(|c| !c.is_empty()) {
        Some(call) => call.clone(),
        None => return Err(Rejection::MissingCall),
    };

    // The logging station may come from the record; the operator never does
    let callsign = config
        .operator
        .callsign
        .clone()
        .or_else(|| fields.get("STATION_CALLSIGN").cloned())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let operator_callsign = config
        .operator
        .callsign
        .clone()
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let now = Utc::now();
    let qso_date = normalize_date(
        &fields
            .get("QSO_DATE")
            .cloned()
            .unwrap_or_else(|| now.format("%Y%m%d").to_string()),
    );
    let time_on = normalize_time(
        &fields
            .get("TIME_ON")
            .cloned()
            .unwrap_or_else(|| now.format("%H%M%S").to_string()),
    );

    let frequency = fields.get("FREQ").and_then(|f| f.parse::<f64>().ok());

    let gridsquare = fields.get("GRIDSQUARE").cloned();
    let location = gridsquare
        .as_deref()
        .and_then(locator::to_point)
        .map(|p| p.to_wkt());

    let my_gridsquare = fields.get("MY_GRIDSQUARE").cloned();
    let my_location = my_gridsquare
        .as_deref()
        .and_then(locator::to_point)
        .map(|p| p.to_wkt());

    let qso_key = config.delivery.idempotency_key.then(|| {
        ContactRecord::qso_key_for(&callsign, &qso_date, &time_on, &contacted_callsign)
    });

    Ok(ContactRecord {
        callsign,
        contacted_callsign,
        qso_date,
        time_on,
        operator_callsign,
        band: fields.get("BAND").cloned(),
        mode: fields.get("MODE").cloned(),
        frequency,
        rst_sent: fields.get("RST_SENT").cloned(),
        rst_rcvd: fields.get("RST_RCVD").cloned(),
        gridsquare,
        location,
        my_gridsquare,
        my_location,
        qso_key,
        raw_adif: raw.to_string(),
    })
}

/// `YYYYMMDD` → `YYYY-MM-DD`
pub fn normalize_date(date: &str) -> String {
    if date.len() == 8 && is_digits(date) {
        format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
    } else {
        date.to_string()
    }
}

/// `HHMMSS[..]` → `HH:MM:SS`, `HHMM` → `HH:MM:00`
pub fn normalize_time(time: &str) -> String {
    if !is_digits(time) {
        return time.to_string();
    }
    match time.len() {
        n if n >= 6 => format!("{}:{}:{}", &time[..2], &time[2..4], &time[4..6]),
        4 => format!("{}:{}:00", &time[..2], &time[2..4]),
        _ => time.to_string(),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

//! Maidenhead grid locator → latitude/longitude
//!
//! A locator is built from character pairs, each pair refining the
//! longitude/latitude cell of the previous one:
//!
//! | pair | chars | lon step | lat step |
//! |------|-------|----------|----------|
//! | field | A–R  | 20°      | 10°      |
//! | square | 0–9 | 2°       | 1°       |
//! | subsquare | A–X | 5'    | 2.5'     |
//! | extended | 0–9 | 30"    | 15"      |
//!
//! The returned point is the centre of the smallest cell described.

use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Well-known-text point; longitude comes first
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.lon, self.lat)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LocatorError {
    #[error("locator must have 4, 6 or 8 characters, got {0}")]
    BadLength(usize),
    #[error("character {ch:?} at position {pos} is out of range")]
    BadChar { ch: char, pos: usize },
}

/// Per-pair (first char, last char, lon step°, lat step°)
const PAIRS: [(u8, u8, f64, f64); 4] = [
    (b'A', b'R', 20.0, 10.0),
    (b'0', b'9', 2.0, 1.0),
    (b'A', b'X', 5.0 / 60.0, 2.5 / 60.0),
    (b'0', b'9', 0.5 / 60.0, 0.25 / 60.0),
];

/// Decode a locator to the centre of its cell
pub fn decode(locator: &str) -> Result<GeoPoint, LocatorError> {
    let chars: Vec<u8> = locator.trim().bytes().map(|b| b.to_ascii_uppercase()).collect();

    if chars.len() < 4 || chars.len() > 8 || chars.len() % 2 != 0 {
        return Err(LocatorError::BadLength(chars.len()));
    }

    let mut lon = -180.0;
    let mut lat = -90.0;
    let mut lon_step = 0.0;
    let mut lat_step = 0.0;

    for (n, (pair, (lo, hi, lon_unit, lat_unit))) in chars.chunks(2).zip(PAIRS).enumerate() {
        let lon_idx = index_of(pair[0], lo, hi, 2 * n)?;
        let lat_idx = index_of(pair[1], lo, hi, 2 * n + 1)?;
        lon += lon_idx * lon_unit;
        lat += lat_idx * lat_unit;
        lon_step = lon_unit;
        lat_step = lat_unit;
    }

    Ok(GeoPoint {
        lat: lat + lat_step / 2.0,
        lon: lon + lon_step / 2.0,
    })
}

fn index_of(c: u8, lo: u8, hi: u8, pos: usize) -> Result<f64, LocatorError> {
    if (lo..=hi).contains(&c) {
        Ok(f64::from(c - lo))
    } else {
        Err(LocatorError::BadChar { ch: c as char, pos })
    }
}

/// Convert a locator, logging and swallowing any failure
pub fn to_point(locator: &str) -> Option<GeoPoint> {
    match decode(locator) {
        Ok(point) => Some(point),
        Err(e) => {
            warn!("Failed to geocode grid square {:?}: {}", locator, e);
            None
        }
    }
}

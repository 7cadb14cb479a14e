//! Row shape for the `contacts` table

use serde::Serialize;
use uuid::Uuid;

/// Namespace for contact idempotency keys
const QSO_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x7c1f_2d5e_9a4b_4e61_b0d3_5f8a_2c6e_91d4);

/// A validated, enriched contact ready to be inserted
///
/// Field names match the backend's `contacts` columns. Optional fields are
/// omitted from the JSON body entirely so the database defaults apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRecord {
    /// Station that logged the contact
    pub callsign: String,
    /// Station that was worked
    pub contacted_callsign: String,
    /// `YYYY-MM-DD` when received in compact form
    pub qso_date: String,
    /// `HH:MM:SS` when received in compact form
    pub time_on: String,
    pub operator_callsign: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// MHz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rst_sent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rst_rcvd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gridsquare: Option<String>,
    /// `POINT(lon lat)` of the worked station
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_gridsquare: Option<String>,
    /// `POINT(lon lat)` of the logging station
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_location: Option<String>,
    /// Dedup key for retried inserts; see [`ContactRecord::qso_key_for`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qso_key: Option<Uuid>,
    /// Datagram as received
    pub raw_adif: String,
}

impl ContactRecord {
    /// Stable key for one QSO as seen by one operator
    ///
    /// Two broadcasts of the same contact map to the same key, so the
    /// endpoint can ignore the second insert.
    pub fn qso_key_for(operator: &str, date: &str, time: &str, contacted: &str) -> Uuid {
        let name = format!(
            "{}|{}|{}|{}",
            operator.to_uppercase(),
            date,
            time,
            contacted.to_uppercase()
        );
        Uuid::new_v5(&QSO_KEY_NAMESPACE, name.as_bytes())
    }

    /// Short description for log lines
    pub fn summary(&self) -> String {
        format!(
            "{} on {} {}",
            self.contacted_callsign,
            self.band.as_deref().unwrap_or("?"),
            self.mode.as_deref().unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContactRecord {
        ContactRecord {
            callsign: "N1XYZ".to_string(),
            contacted_callsign: "W1ABC".to_string(),
            qso_date: "2024-02-10".to_string(),
            time_on: "14:30:00".to_string(),
            operator_callsign: "N1XYZ".to_string(),
            band: Some("20m".to_string()),
            mode: None,
            frequency: Some(14.25),
            rst_sent: None,
            rst_rcvd: None,
            gridsquare: None,
            location: None,
            my_gridsquare: None,
            my_location: None,
            qso_key: None,
            raw_adif: "<CALL:5>W1ABC<eor>".to_string(),
        }
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_value(record()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["contacted_callsign"], "W1ABC");
        assert_eq!(obj["frequency"], 14.25);
        assert!(!obj.contains_key("mode"));
        assert!(!obj.contains_key("location"));
        assert!(!obj.contains_key("qso_key"));
    }

    #[test]
    fn test_qso_key_is_stable_and_case_insensitive() {
        let a = ContactRecord::qso_key_for("N1XYZ", "2024-02-10", "14:30:00", "W1ABC");
        let b = ContactRecord::qso_key_for("n1xyz", "2024-02-10", "14:30:00", "w1abc");
        let c = ContactRecord::qso_key_for("N1XYZ", "2024-02-10", "14:31:00", "W1ABC");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_summary() {
        assert_eq!(record().summary(), "W1ABC on 20m ?");
    }
}

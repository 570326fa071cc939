//! Report rendering.
//!
//! Turns [`DeviceReport`] rows into either a fixed-width text table or a
//! JSON document. The core crate defines no output format; this is the only
//! place one exists.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use pairwatch_core::{DeviceReport, ReportFormat, ReportOrder};
use serde::Serialize;
use thiserror::Error;

/// Report rendering errors.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The JSON encoder failed.
    #[error("Failed to encode report as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON envelope for one report.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    /// When the report was produced (RFC 3339, UTC).
    pub generated_at_utc: String,

    /// Row ordering.
    pub order: ReportOrder,

    /// Number of rows.
    pub device_count: usize,

    /// The rows.
    pub devices: &'a [DeviceReport],
}

/// Render `rows` in the requested format.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn render(
    format: ReportFormat,
    rows: &[DeviceReport],
    order: ReportOrder,
    generated_at: DateTime<Utc>,
) -> Result<String, ReportError> {
    match format {
        ReportFormat::Table => Ok(render_table(rows, order)),
        ReportFormat::Json => render_json(rows, order, generated_at),
    }
}

/// Render `rows` as a JSON document.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn render_json(
    rows: &[DeviceReport],
    order: ReportOrder,
    generated_at: DateTime<Utc>,
) -> Result<String, ReportError> {
    let document = ReportDocument {
        generated_at_utc: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        order,
        device_count: rows.len(),
        devices: rows,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Render `rows` as a text table.
#[must_use]
pub fn render_table(rows: &[DeviceReport], order: ReportOrder) -> String {
    let mut out = String::new();
    let title = match order {
        ReportOrder::SignalStrength => "Devices ordered by RSSI (descending)",
        ReportOrder::Recency => "Devices ordered by time since last observation",
    };
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{title}: {} device(s)", rows.len());
    let _ = writeln!(
        out,
        "{:>10}  {:<16}  {:>4}  {:>12}",
        "DEVICE ID", "NAME", "RSSI", "LAST SEEN"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:>10}  {:<16}  {:>4}  {:>12}",
            row.device_id,
            row.device_name,
            row.rssi,
            format_age(row.age_ms)
        );
    }
    out
}

/// Human readable time since last observation.
#[must_use]
pub fn format_age(age_ms: u64) -> String {
    if age_ms < 1_000 {
        format!("{age_ms} ms ago")
    } else {
        format!("{}.{:03} s ago", age_ms / 1_000, age_ms % 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(device_id: u32, name: &str, rssi: u8, age_ms: u64) -> DeviceReport {
        DeviceReport {
            device_id,
            device_name: name.to_string(),
            rssi,
            rf_address: device_id,
            last_seen_ms: 10_000 - age_ms,
            age_ms,
        }
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(0), "0 ms ago");
        assert_eq!(format_age(999), "999 ms ago");
        assert_eq!(format_age(1_005), "1.005 s ago");
        assert_eq!(format_age(61_250), "61.250 s ago");
    }

    #[test]
    fn test_table_lists_rows_in_order() {
        let rows = vec![row(3, "pair_03", 80, 15), row(1, "pair_01", 50, 2_500)];
        let table = render_table(&rows, ReportOrder::SignalStrength);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Devices ordered by RSSI"));
        assert!(lines[0].ends_with("2 device(s)"));
        assert!(lines[2].contains("pair_03") && lines[2].contains("15 ms ago"));
        assert!(lines[3].contains("pair_01") && lines[3].contains("2.500 s ago"));
    }

    #[test]
    fn test_empty_table_has_header() {
        let table = render_table(&[], ReportOrder::Recency);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("0 device(s)"));
    }

    #[test]
    fn test_json_document() {
        let rows = vec![row(9, "pump", 77, 120)];
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 3, 30, 0).unwrap();
        let json = render(ReportFormat::Json, &rows, ReportOrder::Recency, at).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["generated_at_utc"], "2025-01-15T03:30:00.000Z");
        assert_eq!(value["order"], "recency");
        assert_eq!(value["device_count"], 1);
        assert_eq!(value["devices"][0]["device_name"], "pump");
        assert_eq!(value["devices"][0]["age_ms"], 120);
    }
}

//! Tolerant decoding of `$indexStats` output.
//!
//! Counters arrive as Int32, Int64 or Double depending on the server and the
//! driver, and `accesses.since` is a BSON datetime on the wire but shows up
//! wrapped in an extended JSON `{"$date": ...}` envelope when documents went
//! through a relaxed JSON round-trip. Shapes that match none of these decode
//! to zero values; stats are informational and never abort a report.

use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};

use crate::types::report::IndexStatsEntry;

pub fn decode_index_stats(document: &Document) -> IndexStatsEntry {
    let accesses = document.get_document("accesses").ok();

    IndexStatsEntry {
        name: read_string(document.get("name")),
        accesses: read_i64(accesses.and_then(|accesses| accesses.get("ops"))),
        since: read_datetime(accesses.and_then(|accesses| accesses.get("since"))),
        host: read_string(document.get("host")),
        building: read_bool(document.get("building")),
    }
}

pub fn read_string(value: Option<&Bson>) -> String {
    match value {
        Some(Bson::String(s)) => s.clone(),
        _ => String::new(),
    }
}

pub fn read_i64(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) if n.is_finite() => *n as i64,
        Some(Bson::String(s)) => s.parse().unwrap_or_default(),
        Some(Bson::Document(envelope)) => match envelope.get("$numberLong").or_else(|| envelope.get("$numberInt")) {
            Some(Bson::String(s)) => s.parse().unwrap_or_default(),
            _ => 0,
        },
        _ => 0,
    }
}

pub fn read_bool(value: Option<&Bson>) -> bool {
    matches!(value, Some(Bson::Boolean(true)))
}

/// Missing or unrecognised values decode to the Unix epoch.
pub fn read_datetime(value: Option<&Bson>) -> DateTime<Utc> {
    let decoded = match value {
        Some(Bson::DateTime(datetime)) => Some(datetime.to_chrono()),
        Some(Bson::Timestamp(timestamp)) => DateTime::from_timestamp(i64::from(timestamp.time), 0),
        Some(Bson::String(s)) => parse_rfc3339(s),
        Some(Bson::Document(envelope)) => match envelope.get("$date") {
            Some(Bson::String(s)) => parse_rfc3339(s),
            Some(Bson::DateTime(datetime)) => Some(datetime.to_chrono()),
            Some(millis @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Document(_))) => {
                DateTime::from_timestamp_millis(read_i64(Some(millis)))
            }
            _ => None,
        },
        _ => None,
    };
    decoded.unwrap_or_default()
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|datetime| datetime.with_timezone(&Utc))
}

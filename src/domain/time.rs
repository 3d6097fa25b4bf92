//! Timestamp helpers enforcing that every datetime carries a timezone.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

/// Attach UTC to a naive datetime read from storage or an external payload.
pub fn coerce_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    debug!(%naive, "datetime has no timezone, assuming UTC");
    naive.and_utc()
}

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 one which is taken as UTC.
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(coerce_utc)
}

/// serde adapter for `DateTime<Utc>` fields that may arrive without an offset.
pub mod utc_datetime {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        dt.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc(&raw).ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
    }
}

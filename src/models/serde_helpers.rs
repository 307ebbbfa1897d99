//! Serde adapters for PocketBase record quirks.
//!
//! PocketBase renders timestamps as `2024-05-01 10:11:12.123Z` and leaves unset
//! text/select fields as `""`. These helpers only deserialize through
//! `Option<String>`/`String` so the same models stay bincode-compatible for the
//! sled backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use std::fmt::Display;
use std::str::FromStr;

const POCKETBASE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.fZ";

/// Parse either RFC 3339 or PocketBase's space-separated UTC format
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, POCKETBASE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Required timestamp field
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

/// Optional timestamp field; `""` means unset
pub mod opt_timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
        }
    }
}

/// Optional string-like value (plain text or a strum enum); `""` means unset
pub mod opt_text {
    use super::*;

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// Required string-like value that falls back to `T::default()` on `""`
pub mod text_or_default {
    use super::*;

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
        T::Err: Display,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Ok(T::default());
        }
        raw.parse::<T>().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[derive(Debug, Deserialize)]
    struct Stamped {
        #[serde(with = "timestamp")]
        created: DateTime<Utc>,
        #[serde(default, with = "opt_timestamp")]
        resolved_at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_parse_pocketbase_timestamp() {
        let dt = parse_timestamp("2024-05-01 10:11:12.123Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let dt = parse_timestamp("2024-05-01T10:11:12Z").unwrap();
        assert_eq!(dt.minute(), 11);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_required_timestamp_rejects_empty() {
        let err = serde_json::from_str::<Stamped>(r#"{"created": ""}"#).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));

        let stamped: Stamped =
            serde_json::from_str(r#"{"created": "2024-05-01 10:11:12.123Z", "resolved_at": ""}"#)
                .unwrap();
        assert_eq!(stamped.created.year(), 2024);
        assert!(stamped.resolved_at.is_none());
    }
}

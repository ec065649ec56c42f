//! Canonical records shared by the backend clients, the caches and the routes.
//!
//! Backend payloads are loose about types (ids as strings or numbers, approval
//! as a bool or 0/1, two timestamp formats). The [`lenient`] helpers accept all
//! of them once, at the boundary; everything past it uses these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// A guest photo as the backend records it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: String,
    pub url: String,
    pub category_id: Option<String>,
    pub approved: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselImage {
    pub id: String,
    pub url: String,
}

pub mod lenient {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    fn id_from_value<E: de::Error>(value: Value) -> Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s.trim().to_string())),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(E::custom(format!("expected a string or numeric id, got {other}"))),
        }
    }

    /// Id given as a string or a number.
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        id_from_value(Value::deserialize(d)?)?.ok_or_else(|| de::Error::custom("id is empty"))
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        id_from_value(Value::deserialize(d)?)
    }

    /// `true`/`false`, `1`/`0`, or their string forms. Absent or null is `None`.
    pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            Value::Number(n) => Ok(Some(n.as_f64().unwrap_or(0.0) != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" | "" => Ok(Some(false)),
                other => Err(de::Error::custom(format!("invalid approval flag: {other}"))),
            },
            other => Err(de::Error::custom(format!("invalid approval flag: {other}"))),
        }
    }

    /// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC. Unparseable values are dropped.
    pub fn opt_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => return Ok(None),
        };
        Ok(parse_timestamp(&raw))
    }

    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::lenient;
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "lenient::id")]
        id: String,
        #[serde(default, deserialize_with = "lenient::opt_flag")]
        flag: Option<bool>,
        #[serde(default, deserialize_with = "lenient::opt_timestamp")]
        at: Option<chrono::DateTime<Utc>>,
    }

    fn sample(v: serde_json::Value) -> Sample {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        assert_eq!(sample(serde_json::json!({"id": 42})).id, "42");
        assert_eq!(sample(serde_json::json!({"id": " 7 "})).id, "7");
        assert!(serde_json::from_value::<Sample>(serde_json::json!({"id": ""})).is_err());
    }

    #[test]
    fn flags_accept_bools_and_numbers() {
        assert_eq!(sample(serde_json::json!({"id": 1, "flag": 1})).flag, Some(true));
        assert_eq!(sample(serde_json::json!({"id": 1, "flag": 0})).flag, Some(false));
        assert_eq!(sample(serde_json::json!({"id": 1, "flag": "true"})).flag, Some(true));
        assert_eq!(sample(serde_json::json!({"id": 1})).flag, None);
    }

    #[test]
    fn timestamps_accept_both_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap();
        assert_eq!(
            sample(serde_json::json!({"id": 1, "at": "2024-06-01T14:30:00Z"})).at,
            Some(expected)
        );
        assert_eq!(
            sample(serde_json::json!({"id": 1, "at": "2024-06-01 14:30:00"})).at,
            Some(expected)
        );
        assert_eq!(sample(serde_json::json!({"id": 1, "at": "yesterday"})).at, None);
    }
}

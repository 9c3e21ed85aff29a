use axum::http::HeaderMap;
use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Wall-clock format of every record, one-second precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// One captured request, one JSON line in the identity's log
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RequestRecord {
    pub ip: String,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(with = "second_precision")]
    pub timestamp: NaiveDateTime,
}

impl RequestRecord {
    // Build a record from request parts, stamped with the current local time
    pub fn capture(ip: &str, method: &str, path: &str, headers: &HeaderMap) -> Self {
        Self::capture_at(ip, method, path, headers, Local::now().naive_local())
    }

    pub fn capture_at(
        ip: &str,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        at: NaiveDateTime,
    ) -> Self {
        // later duplicates overwrite earlier ones
        let mut header_map = BTreeMap::new();
        for (name, value) in headers {
            header_map.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        Self {
            ip: ip.to_string(),
            user_agent,
            method: method.to_string(),
            path: path.to_string(),
            headers: header_map,
            timestamp: truncate_to_second(at),
        }
    }

    // Bucket key used by the scanner
    pub fn second(&self) -> NaiveDateTime {
        truncate_to_second(self.timestamp)
    }
}

pub fn truncate_to_second(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

// serde adapter for "YYYY-MM-DD HH:MM:SS"
mod second_precision {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&at.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

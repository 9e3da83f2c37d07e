//! Row-level helpers. Queries hand out `refuge_types` models directly; the
//! only row type kept apart is `UserRow`, which carries the password hash.
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use refuge_types::models::User;

pub struct UserRow {
    pub user: User,
    pub password: String,
}

/// Timestamps are written fixed-width so lexical order is chronological.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Accepts our own format, any RFC 3339 value, and SQLite's
/// `datetime('now')` output ("YYYY-MM-DD HH:MM:SS", implicitly UTC).
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Typed column accessors for values stored as text.
pub(crate) trait RowExt {
    fn uuid(&self, idx: usize) -> rusqlite::Result<Uuid>;
    fn opt_uuid(&self, idx: usize) -> rusqlite::Result<Option<Uuid>>;
    fn ts(&self, idx: usize) -> rusqlite::Result<DateTime<Utc>>;
    fn opt_ts(&self, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>>;
    fn label<T>(&self, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static;
    fn json<T: DeserializeOwned>(&self, idx: usize) -> rusqlite::Result<Option<T>>;
}

impl RowExt for Row<'_> {
    fn uuid(&self, idx: usize) -> rusqlite::Result<Uuid> {
        let raw: String = self.get(idx)?;
        Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
    }

    fn opt_uuid(&self, idx: usize) -> rusqlite::Result<Option<Uuid>> {
        let raw: Option<String> = self.get(idx)?;
        raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
            .transpose()
    }

    fn ts(&self, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = self.get(idx)?;
        parse_ts(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
    }

    fn opt_ts(&self, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self.get(idx)?;
        raw.map(|s| {
            parse_ts(&s).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", s)))
        })
            .transpose()
    }

    fn label<T>(&self, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = self.get(idx)?;
        raw.parse().map_err(|e| conversion_error(idx, e))
    }

    fn json<T: DeserializeOwned>(&self, idx: usize) -> rusqlite::Result<Option<T>> {
        let raw: Option<String> = self.get(idx)?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
            .transpose()
    }
}

/// Serializes an optional value into a nullable JSON text column.
pub(crate) fn to_json<T: serde::Serialize>(value: Option<&T>) -> anyhow::Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

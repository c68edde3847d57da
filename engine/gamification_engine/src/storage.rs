//! # Storage
//!
//! Encoding helpers for handing a [`Snapshot`] to the key-value persistence
//! collaborator. The collaborator itself has no logic: it stores one string
//! under one fixed key.
//!
//! | Key                   | Value                         |
//! |-----------------------|-------------------------------|
//! | [`STORAGE_KEY`]       | JSON-encoded [`Snapshot`]     |
//!
//! ## Fallback
//!
//! Persisted data is never trusted to be well formed. [`decode_or_default`]
//! turns a missing, unreadable or malformed value into the empty default
//! snapshot and logs a warning; callers never see the error.
//!
//! ## Legacy notifications
//!
//! Older clients stored notifications in two other shapes:
//!
//! - bare strings, migrated to `info` notifications stamped with the load time;
//! - `{ type, message, date }` objects, where `type` is `info`, `xp` or
//!   `desconto` and `date` is a `dd/mm/yyyy, hh:mm:ss` local time string. The
//!   date is read as UTC; an unreadable date is replaced by the load time.
//!
//! Object entries matching neither shape are dropped.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{Notification, NotificationKind, Snapshot};
use crate::{EngineError, Result};

/// Fixed key the snapshot is stored under.
pub const STORAGE_KEY: &str = "gamification-state";

const LEGACY_DATE_FORMATS: &[&str] = &["%d/%m/%Y, %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

#[derive(Deserialize)]
struct LegacyNotification {
    #[serde(rename = "type")]
    kind: NotificationKind,
    message: String,
    #[serde(default)]
    date: Option<String>,
}

impl LegacyNotification {
    fn into_notification(self, now: DateTime<Utc>) -> Notification {
        let timestamp = self
            .date
            .as_deref()
            .and_then(parse_legacy_date)
            .unwrap_or(now);
        Notification {
            kind: self.kind,
            message: self.message,
            timestamp,
        }
    }
}

fn parse_legacy_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    LEGACY_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn encode(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string(snapshot).map_err(|e| EngineError::Encode(e.to_string()))
}

/// Strict decode. Fails with [`EngineError::CorruptPersistedState`].
pub fn try_decode(raw: &str, now: DateTime<Utc>) -> Result<Snapshot> {
    let mut value: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::CorruptPersistedState(e.to_string()))?;
    let Value::Object(fields) = &mut value else {
        return Err(EngineError::CorruptPersistedState(
            "snapshot is not a JSON object".into(),
        ));
    };
    migrate_notifications(fields, now);
    serde_json::from_value(value).map_err(|e| EngineError::CorruptPersistedState(e.to_string()))
}

/// Decode whatever the collaborator returned, falling back to a fresh
/// snapshot on any problem.
pub fn decode_or_default(raw: Option<&str>, now: DateTime<Utc>) -> Snapshot {
    let Some(raw) = raw else {
        debug!("no persisted snapshot, starting fresh");
        return Snapshot::default();
    };
    match try_decode(raw, now) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("discarding persisted snapshot: {e}");
            Snapshot::default()
        }
    }
}

fn migrate_notifications(fields: &mut Map<String, Value>, now: DateTime<Utc>) {
    let Some(Value::Array(entries)) = fields.get_mut("notifications") else {
        return;
    };
    let migrated: Vec<Value> = entries
        .drain(..)
        .filter_map(|entry| match entry {
            Value::String(message) => serde_json::to_value(Notification {
                kind: NotificationKind::Info,
                message,
                timestamp: now,
            })
            .ok(),
            other => {
                let notification = match serde_json::from_value::<Notification>(other.clone()) {
                    Ok(notification) => notification,
                    Err(_) => match serde_json::from_value::<LegacyNotification>(other) {
                        Ok(legacy) => legacy.into_notification(now),
                        Err(e) => {
                            debug!("dropping unreadable notification: {e}");
                            return None;
                        }
                    },
                };
                serde_json::to_value(notification).ok()
            }
        })
        .collect();
    *entries = migrated;
}

//! Raw Telegram widget payload parsing and freshness checks.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// User data delivered by the Telegram login widget.
///
/// The widget and the various backend variants disagree on field casing
/// (`first_name` vs `firstName`), so deserialization accepts both spellings;
/// serialization always emits the camelCase form the backend expects. This is
/// the single place field-name normalization happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub id: i64,
    #[serde(alias = "first_name")]
    pub first_name: String,
    #[serde(default, alias = "last_name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "photo_url")]
    pub photo_url: Option<String>,
    #[serde(alias = "auth_date")]
    pub auth_date: i64,
    pub hash: String,
}

impl LoginPayload {
    /// Parse a raw widget payload, accepting either field casing.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPayload`] when required fields (`id`,
    /// `first_name`, `auth_date`, `hash`) are missing or mistyped.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, AuthError> {
        serde_json::from_value(raw.clone())
            .map_err(|err| AuthError::InvalidPayload(err.to_string()))
    }

    /// When the payload was signed, per its `auth_date` claim.
    pub fn signed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.auth_date, 0).single()
    }

    /// Age of the payload relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        match self.signed_at() {
            Some(at) => now - at,
            // An unrepresentable auth_date is treated as infinitely old.
            None => Duration::MAX,
        }
    }

    /// Whether the payload was signed within the staleness window.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }
}

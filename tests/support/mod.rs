#![allow(dead_code)]

use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use tglogin::error::AuthError;
use tglogin::token_store::{StoredCredentials, TokenStore};

/// Token store recording every save, for asserting at-most-once semantics.
#[derive(Default)]
pub struct InMemoryTokenStore {
    saves: Mutex<Vec<(String, StoredCredentials)>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().expect("store lock poisoned").len()
    }

    pub fn last(&self) -> Option<StoredCredentials> {
        self.saves
            .lock()
            .expect("store lock poisoned")
            .last()
            .map(|(_, credentials)| credentials.clone())
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self, profile: &str) -> Result<Option<StoredCredentials>, AuthError> {
        Ok(self
            .saves
            .lock()
            .expect("store lock poisoned")
            .iter()
            .rev()
            .find(|(stored, _)| stored == profile)
            .map(|(_, credentials)| credentials.clone()))
    }

    fn save(&self, profile: &str, credentials: &StoredCredentials) -> Result<(), AuthError> {
        self.saves
            .lock()
            .expect("store lock poisoned")
            .push((profile.to_string(), credentials.clone()));
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), AuthError> {
        self.saves
            .lock()
            .expect("store lock poisoned")
            .retain(|(stored, _)| stored != profile);
        Ok(())
    }
}

/// A fresh widget payload signed `age_secs` ago.
pub fn login_payload(age_secs: i64) -> Value {
    json!({
        "id": 99,
        "first_name": "Ada",
        "username": "ada",
        "auth_date": Utc::now().timestamp() - age_secs,
        "hash": "deadbeef"
    })
}

/// Confirm/widget-auth body for a granted sign-in.
pub fn granted_body() -> Value {
    json!({
        "isSuccess": true,
        "tokens": { "accessToken": "access-1", "refreshToken": "refresh-1" },
        "user": { "id": "u1", "username": "ada", "firstName": "Ada" }
    })
}

/// Confirm body for a still-pending session.
pub fn pending_body() -> Value {
    json!({ "isSuccess": false })
}

/// Confirm body demanding a second factor.
pub fn two_factor_body() -> Value {
    json!({
        "isSuccess": false,
        "requiresTwoFactor": true,
        "twoFactorMethods": [
            { "id": "m-email", "type": "email", "destination": "a***@b.c" }
        ]
    })
}

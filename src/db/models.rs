use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub failed_attempts: i64,
    pub lock_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PasswordResetRow {
    pub id: i64,
    pub user_id: i64,
    pub selector: String,
    pub verifier_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetRow {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct UploadRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub original_name: String,
    pub stored_name: String,
    pub thumb_name: String,
    pub mime: String,
    pub width: i64,
    pub height: i64,
    pub bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `uploads`; `id` and `created_at` are assigned by storage.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: Option<i64>,
    pub original_name: String,
    pub stored_name: String,
    pub thumb_name: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

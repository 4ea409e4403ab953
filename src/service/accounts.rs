use crate::auth::{hash_password, random_hex, validate, verify_password_or_dummy};
use crate::config::AuthConfig;
use crate::db::{SessionRow, Storage, UserRow};
use crate::error::TollgateError;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Public view of a user; never carries the hash or lockout state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<&UserRow> for UserView {
    fn from(u: &UserRow) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    storage: Storage,
    cfg: AuthConfig,
}

impl AccountService {
    pub fn new(storage: Storage, cfg: AuthConfig) -> Self {
        Self { storage, cfg }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.cfg.session_ttl_hours)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRow, TollgateError> {
        let username = username.trim();
        let email = email.trim();
        let errors: Vec<_> = [
            validate::username(username),
            validate::email(email),
            validate::password(password, self.cfg.min_password_len),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();
        if !errors.is_empty() {
            return Err(TollgateError::ValidationFailed(errors));
        }

        let hash = hash_password(password).await?;
        let user = self.storage.create_user(username, email, &hash).await?;
        info!(user_id = user.id, username = %user.username, "registered user");
        Ok(user)
    }

    /// Check credentials, maintaining the failed-attempt counter and lockout.
    /// Unknown identifiers and wrong passwords are indistinguishable.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<UserRow, TollgateError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(TollgateError::InvalidCredentials);
        }

        let user = self.storage.find_user_by_login(identifier).await?;
        let now = Utc::now();

        if let Some(u) = &user
            && u.is_locked(now)
        {
            warn!(user_id = u.id, "login attempt on locked account");
            return Err(TollgateError::AccountLocked);
        }

        let ok = verify_password_or_dummy(password, user.as_ref().map(|u| u.password_hash.as_str()))
            .await;
        let Some(user) = user else {
            warn!("login failed for unknown identifier");
            return Err(TollgateError::InvalidCredentials);
        };

        if !ok {
            let updated = self
                .storage
                .record_failed_login(
                    user.id,
                    self.cfg.max_failed_attempts,
                    Duration::minutes(self.cfg.lockout_minutes),
                )
                .await?;
            if updated.is_locked(now) {
                warn!(
                    user_id = user.id,
                    lockout_minutes = self.cfg.lockout_minutes,
                    "too many failed logins; account locked"
                );
                return Err(TollgateError::AccountLocked);
            }
            warn!(user_id = user.id, failed_attempts = updated.failed_attempts, "login failed");
            return Err(TollgateError::InvalidCredentials);
        }

        if user.failed_attempts > 0 || user.lock_until.is_some() {
            self.storage.reset_failed_logins(user.id).await?;
        }
        Ok(user)
    }

    /// Issue a fresh session id, dropping the caller's previous one so a
    /// pre-login id can never be carried into the authenticated session.
    pub async fn start_session(
        &self,
        user_id: i64,
        previous: Option<&str>,
    ) -> Result<SessionRow, TollgateError> {
        if let Some(old) = previous {
            self.storage.delete_session(old).await?;
        }
        let session = self
            .storage
            .create_session(&random_hex(32), user_id, self.session_ttl())
            .await?;
        info!(user_id, "session started");
        Ok(session)
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), TollgateError> {
        self.storage.delete_session(session_id).await
    }

    /// User behind a live session id, if any.
    pub async fn resolve_session(&self, session_id: &str) -> Result<Option<UserRow>, TollgateError> {
        let Some(session) = self.storage.find_session(session_id).await? else {
            return Ok(None);
        };
        self.storage.find_user_by_id(session.user_id).await
    }
}

use crate::auth::{ResetToken, hash_password, validate};
use crate::config::AuthConfig;
use crate::db::{Storage, UserRow};
use crate::error::TollgateError;
use crate::service::mailer::{Mailer, OutgoingMail};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct PasswordResetService {
    storage: Storage,
    cfg: AuthConfig,
    base_url: String,
    mailer: Arc<dyn Mailer>,
}

impl PasswordResetService {
    pub fn new(
        storage: Storage,
        cfg: AuthConfig,
        base_url: impl Into<String>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            storage,
            cfg,
            base_url: base_url.into(),
            mailer,
        }
    }

    fn reset_link(&self, token: &ResetToken) -> String {
        format!(
            "{}/reset-password?token={}",
            self.base_url.trim_end_matches('/'),
            token.encode()
        )
    }

    /// Start a reset for `email`. Succeeds whether or not the address is
    /// registered, or even well formed; a mail is only sent to a known one.
    pub async fn request(&self, email: &str) -> Result<(), TollgateError> {
        let email = email.trim();
        if validate::email(email).is_err() {
            info!("password reset requested for malformed address");
            return Ok(());
        }

        let Some(user) = self.storage.find_user_by_email(email).await? else {
            info!("password reset requested for unknown address");
            return Ok(());
        };

        self.storage.invalidate_user_resets(user.id).await?;

        let token = ResetToken::generate();
        let expires_at = Utc::now() + Duration::minutes(self.cfg.reset_token_ttl_minutes);
        self.storage
            .create_password_reset(user.id, &token.selector, &token.verifier_hash(), expires_at)
            .await?;

        let mail = OutgoingMail {
            to: user.email.clone(),
            subject: "Password reset".to_string(),
            body: format!(
                "Hello {},\n\nUse the link below to choose a new password. It expires in {} minutes.\n\n{}\n\nIf you did not ask for this, ignore this message.\n",
                user.username,
                self.cfg.reset_token_ttl_minutes,
                self.reset_link(&token)
            ),
        };
        // Delivery failure must not reveal that the account exists.
        if let Err(e) = self.mailer.send(mail).await {
            error!(user_id = user.id, error = %e, "failed to send password reset mail");
        } else {
            info!(user_id = user.id, "password reset mail sent");
        }
        Ok(())
    }

    /// Redeem a token and set a new password. Every way a token can be bad
    /// yields the same `InvalidToken`.
    pub async fn confirm(&self, raw_token: &str, new_password: &str) -> Result<UserRow, TollgateError> {
        let token = ResetToken::parse(raw_token).ok_or(TollgateError::InvalidToken)?;
        let row = self
            .storage
            .find_password_reset(&token.selector)
            .await?
            .ok_or(TollgateError::InvalidToken)?;

        let now = Utc::now();
        if !token.matches(&row.verifier_hash) || !row.is_usable(now) {
            warn!(reset_id = row.id, "rejected password reset token");
            return Err(TollgateError::InvalidToken);
        }

        validate::password(new_password, self.cfg.min_password_len)
            .map_err(|e| TollgateError::ValidationFailed(vec![e]))?;
        let hash = hash_password(new_password).await?;

        let Some(revoked) = self
            .storage
            .complete_password_reset(row.id, row.user_id, &hash, now)
            .await?
        else {
            warn!(reset_id = row.id, "password reset token raced and lost");
            return Err(TollgateError::InvalidToken);
        };
        info!(user_id = row.user_id, revoked_sessions = revoked, "password reset completed");

        self.storage
            .find_user_by_id(row.user_id)
            .await?
            .ok_or_else(|| TollgateError::UnexpectedError("reset user vanished".to_string()))
    }
}

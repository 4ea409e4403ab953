use crate::db::models::{NewUpload, PasswordResetRow, SessionRow, UploadRow, UserRow};
use crate::db::schema::SQLITE_INIT;
use crate::error::TollgateError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

/// Fixed-width RFC3339 so stored timestamps compare correctly as text.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, TollgateError> {
        let connect_opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every in-memory connection is its own database; keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), TollgateError> {
        // sqlx::query runs a single statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- users ----

    /// Insert a user. Returns `Conflict` if the username or email is taken.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow, TollgateError> {
        let now = Utc::now();
        let res = sqlx::query(
            r#"INSERT INTO users (username, email, password_hash, failed_attempts, created_at)
               VALUES (?, ?, ?, 0, ?)"#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(ts(now))
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) => self.find_user_by_id(done.last_insert_rowid()).await?.ok_or_else(|| {
                TollgateError::UnexpectedError("inserted user not found".to_string())
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                TollgateError::Conflict("username or email already registered".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRow>, TollgateError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, password_hash, failed_attempts, lock_until, created_at
               FROM users WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Look a user up by username or (case-insensitive) email.
    pub async fn find_user_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<UserRow>, TollgateError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, password_hash, failed_attempts, lock_until, created_at
               FROM users WHERE username = ? OR email = ? COLLATE NOCASE
               LIMIT 1"#,
        )
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, TollgateError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, password_hash, failed_attempts, lock_until, created_at
               FROM users WHERE email = ? COLLATE NOCASE"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Bump the failure counter; once it reaches `max_attempts` the account is
    /// locked for `lockout` and the counter starts over. Returns the updated row.
    pub async fn record_failed_login(
        &self,
        id: i64,
        max_attempts: i64,
        lockout: Duration,
    ) -> Result<UserRow, TollgateError> {
        let lock_until = ts(Utc::now() + lockout);
        sqlx::query(
            r#"UPDATE users SET
                 lock_until = CASE WHEN failed_attempts + 1 >= ? THEN ? ELSE lock_until END,
                 failed_attempts = CASE WHEN failed_attempts + 1 >= ? THEN 0 ELSE failed_attempts + 1 END
               WHERE id = ?"#,
        )
        .bind(max_attempts)
        .bind(lock_until)
        .bind(max_attempts)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| TollgateError::UnexpectedError(format!("user {id} vanished")))
    }

    pub async fn reset_failed_logins(&self, id: i64) -> Result<(), TollgateError> {
        sqlx::query("UPDATE users SET failed_attempts = 0, lock_until = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- sessions ----

    pub async fn create_session(
        &self,
        id: &str,
        user_id: i64,
        ttl: Duration,
    ) -> Result<SessionRow, TollgateError> {
        let now = Utc::now();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(user_id)
            .bind(ts(now + ttl))
            .bind(ts(now))
            .execute(&self.pool)
            .await?;
        Ok(SessionRow {
            id: id.to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        })
    }

    /// Fetch a live session; expired rows are treated as absent.
    pub async fn find_session(&self, id: &str) -> Result<Option<SessionRow>, TollgateError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(ts(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), TollgateError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, TollgateError> {
        let done = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(ts(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    // ---- password resets ----

    pub async fn create_password_reset(
        &self,
        user_id: i64,
        selector: &str,
        verifier_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, TollgateError> {
        let done = sqlx::query(
            r#"INSERT INTO password_resets (user_id, selector, verifier_hash, expires_at, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(user_id)
        .bind(selector)
        .bind(verifier_hash)
        .bind(ts(expires_at))
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(done.last_insert_rowid())
    }

    pub async fn find_password_reset(
        &self,
        selector: &str,
    ) -> Result<Option<PasswordResetRow>, TollgateError> {
        let row = sqlx::query_as::<_, PasswordResetRow>(
            r#"SELECT id, user_id, selector, verifier_hash, expires_at, used_at, created_at
               FROM password_resets WHERE selector = ?"#,
        )
        .bind(selector)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Redeem a reset token: mark it used, store the new hash, clear the
    /// lockout state and revoke every session, all in one transaction.
    ///
    /// Returns `None` when the token was already used or has expired (nothing
    /// is written), otherwise the number of sessions revoked.
    pub async fn complete_password_reset(
        &self,
        reset_id: i64,
        user_id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, TollgateError> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"UPDATE password_resets SET used_at = ?
               WHERE id = ? AND user_id = ? AND used_at IS NULL AND expires_at > ?"#,
        )
        .bind(ts(now))
        .bind(reset_id)
        .bind(user_id)
        .bind(ts(now))
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE users SET password_hash = ?, failed_attempts = 0, lock_until = NULL WHERE id = ?",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(revoked.rows_affected()))
    }

    /// Retire every outstanding token of a user.
    pub async fn invalidate_user_resets(&self, user_id: i64) -> Result<u64, TollgateError> {
        let done = sqlx::query(
            "UPDATE password_resets SET used_at = ? WHERE user_id = ? AND used_at IS NULL",
        )
        .bind(ts(Utc::now()))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    // ---- uploads ----

    pub async fn insert_upload(&self, upload: NewUpload) -> Result<UploadRow, TollgateError> {
        let now = Utc::now();
        let done = sqlx::query(
            r#"INSERT INTO uploads (
                   user_id, original_name, stored_name, thumb_name, mime,
                   width, height, bytes, created_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(upload.user_id)
        .bind(&upload.original_name)
        .bind(&upload.stored_name)
        .bind(&upload.thumb_name)
        .bind(&upload.mime)
        .bind(i64::from(upload.width))
        .bind(i64::from(upload.height))
        .bind(upload.bytes as i64)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(UploadRow {
            id: done.last_insert_rowid(),
            user_id: upload.user_id,
            original_name: upload.original_name,
            stored_name: upload.stored_name,
            thumb_name: upload.thumb_name,
            mime: upload.mime,
            width: i64::from(upload.width),
            height: i64::from(upload.height),
            bytes: upload.bytes as i64,
            created_at: now,
        })
    }

    pub async fn list_uploads(&self, user_id: i64) -> Result<Vec<UploadRow>, TollgateError> {
        let rows = sqlx::query_as::<_, UploadRow>(
            r#"SELECT id, user_id, original_name, stored_name, thumb_name, mime,
                      width, height, bytes, created_at
               FROM uploads WHERE user_id = ? ORDER BY id DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> Storage {
        Storage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_user_is_a_conflict() {
        let db = storage().await;
        db.create_user("alice", "alice@example.com", "h").await.unwrap();
        let err = db
            .create_user("alice2", "ALICE@example.com", "h")
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_lookup_matches_username_or_email() {
        let db = storage().await;
        let user = db.create_user("bob", "bob@example.com", "h").await.unwrap();
        assert_eq!(db.find_user_by_login("bob").await.unwrap().unwrap().id, user.id);
        assert_eq!(
            db.find_user_by_login("BOB@example.com").await.unwrap().unwrap().id,
            user.id
        );
        assert!(db.find_user_by_login("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_logins_lock_after_threshold() {
        let db = storage().await;
        let user = db.create_user("dave", "dave@example.com", "h").await.unwrap();
        let lockout = Duration::minutes(15);

        let row = db.record_failed_login(user.id, 3, lockout).await.unwrap();
        assert_eq!(row.failed_attempts, 1);
        assert!(!row.is_locked(Utc::now()));
        db.record_failed_login(user.id, 3, lockout).await.unwrap();
        let row = db.record_failed_login(user.id, 3, lockout).await.unwrap();
        assert!(row.is_locked(Utc::now()));
        assert_eq!(row.failed_attempts, 0);

        db.reset_failed_logins(user.id).await.unwrap();
        let row = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(row.lock_until.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let db = storage().await;
        let user = db.create_user("erin", "erin@example.com", "h").await.unwrap();
        db.create_session("live", user.id, Duration::hours(1)).await.unwrap();
        db.create_session("dead", user.id, Duration::seconds(-5)).await.unwrap();

        assert!(db.find_session("live").await.unwrap().is_some());
        assert!(db.find_session("dead").await.unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().await.unwrap(), 1);
        assert!(db.find_session("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lock_lapses_once_lock_until_has_passed() {
        let db = storage().await;
        let user = db.create_user("dora", "dora@example.com", "h").await.unwrap();
        let row = db.record_failed_login(user.id, 1, Duration::minutes(15)).await.unwrap();
        assert!(row.is_locked(Utc::now()));

        sqlx::query("UPDATE users SET lock_until = ? WHERE id = ?")
            .bind(ts(Utc::now() - Duration::seconds(1)))
            .bind(user.id)
            .execute(&db.pool)
            .await
            .unwrap();
        let row = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!row.is_locked(Utc::now()));
    }

    #[tokio::test]
    async fn completing_a_reset_applies_every_write_once() {
        let db = storage().await;
        let user = db.create_user("fay", "fay@example.com", "old").await.unwrap();
        db.record_failed_login(user.id, 1, Duration::minutes(15)).await.unwrap();
        db.create_session("s1", user.id, Duration::hours(1)).await.unwrap();
        db.create_session("s2", user.id, Duration::hours(1)).await.unwrap();
        let id = db
            .create_password_reset(user.id, "sel", "hash", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();

        let revoked = db
            .complete_password_reset(id, user.id, "new", Utc::now())
            .await
            .unwrap();
        assert_eq!(revoked, Some(2));

        let row = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(row.password_hash, "new");
        assert_eq!(row.failed_attempts, 0);
        assert!(row.lock_until.is_none());
        assert!(db.find_session("s1").await.unwrap().is_none());
        assert!(db.find_password_reset("sel").await.unwrap().unwrap().used_at.is_some());

        db.create_session("s3", user.id, Duration::hours(1)).await.unwrap();
        let again = db
            .complete_password_reset(id, user.id, "newer", Utc::now())
            .await
            .unwrap();
        assert_eq!(again, None);
        let row = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(row.password_hash, "new");
        assert!(db.find_session("s3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_reset_token_writes_nothing() {
        let db = storage().await;
        let user = db.create_user("gus", "gus@example.com", "old").await.unwrap();
        db.create_session("s1", user.id, Duration::hours(1)).await.unwrap();
        let id = db
            .create_password_reset(user.id, "old", "hash", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let res = db
            .complete_password_reset(id, user.id, "new", Utc::now())
            .await
            .unwrap();
        assert_eq!(res, None);
        let row = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(row.password_hash, "old");
        assert!(db.find_session("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn uploads_are_listed_per_user() {
        let db = storage().await;
        let user = db.create_user("hal", "hal@example.com", "h").await.unwrap();
        db.insert_upload(NewUpload {
            user_id: Some(user.id),
            original_name: "cat.png".to_string(),
            stored_name: "abc.png".to_string(),
            thumb_name: "abc.png".to_string(),
            mime: "image/png".to_string(),
            width: 10,
            height: 20,
            bytes: 300,
        })
        .await
        .unwrap();

        let rows = db.list_uploads(user.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].width, 10);
        assert!(db.list_uploads(user.id + 1).await.unwrap().is_empty());
    }
}

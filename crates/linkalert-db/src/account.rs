use chrono::{DateTime, NaiveDate, Utc};
use linkalert_core::error::AppError;
use linkalert_core::models::ProfileNames;
use linkalert_core::traits::AccountStore;
use sqlx::{PgPool, Pool, Postgres};

const NOT_INITIALIZED: &str = "Account not initialized. Run `linkalert init` first.";

/// Snapshot of the account preferences, read fresh from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub emails: Vec<String>,
    pub last_checked: Option<NaiveDate>,
    pub profiles: ProfileNames,
    pub updated_at: DateTime<Utc>,
}

/// Repository for the single account row and its tracked profiles.
///
/// Nothing is cached: every read hits the database, and every mutation
/// returns the state as it is after the write.
#[derive(Clone)]
pub struct AccountRepository {
    pool: Pool<Postgres>,
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct AccountRow {
    emails: Vec<String>,
    last_checked: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the account, or replace the stored refresh token if it exists.
    ///
    /// Preferences and the checkpoint of an existing account are kept.
    pub async fn initialize(&self, refresh_token: &str) -> Result<Account, AppError> {
        sqlx::query(
            r#"
            INSERT INTO account (id, refresh_token)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE
            SET refresh_token = EXCLUDED.refresh_token, updated_at = NOW()
            "#,
        )
        .bind(refresh_token)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        self.require_snapshot().await
    }

    /// Current account state, or `None` before `initialize`.
    pub async fn snapshot(&self) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT emails, last_checked, updated_at FROM account WHERE id = 1"#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let profiles = self.load_profiles().await?;
        Ok(Some(Account {
            emails: row.emails,
            last_checked: row.last_checked,
            profiles,
            updated_at: row.updated_at,
        }))
    }

    /// The stored OAuth refresh token, if the account exists.
    pub async fn refresh_token(&self) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT refresh_token FROM account WHERE id = 1"#)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(|(token,)| token))
    }

    /// Replace the subscriber list.
    pub async fn set_emails(&self, emails: &[String]) -> Result<Account, AppError> {
        let result = sqlx::query(
            r#"UPDATE account SET emails = $1, updated_at = NOW() WHERE id = 1"#,
        )
        .bind(emails)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConfigError(NOT_INITIALIZED.into()));
        }
        self.require_snapshot().await
    }

    /// Start tracking a profile, or rename it if already tracked.
    pub async fn upsert_profile(&self, profile_id: &str, name: &str) -> Result<Account, AppError> {
        // Fail before writing when there is no account to attach the profile to.
        self.require_snapshot().await?;

        sqlx::query(
            r#"
            INSERT INTO tracked_profiles (profile_id, name)
            VALUES ($1, $2)
            ON CONFLICT (profile_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(profile_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        self.touch().await?;
        self.require_snapshot().await
    }

    /// Stop tracking a profile. Its seen links are kept.
    pub async fn remove_profile(&self, profile_id: &str) -> Result<Account, AppError> {
        sqlx::query(r#"DELETE FROM tracked_profiles WHERE profile_id = $1"#)
            .bind(profile_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        self.touch().await?;
        self.require_snapshot().await
    }

    /// Move the checkpoint.
    pub async fn update_checkpoint(&self, date: NaiveDate) -> Result<Account, AppError> {
        let result = sqlx::query(
            r#"UPDATE account SET last_checked = $1, updated_at = NOW() WHERE id = 1"#,
        )
        .bind(date)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConfigError(NOT_INITIALIZED.into()));
        }
        self.require_snapshot().await
    }

    /// Remove credentials, preferences, and tracked profiles.
    ///
    /// Seen links survive so a later setup does not re-report old referrers.
    pub async fn delete(&self) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        sqlx::query(r#"DELETE FROM tracked_profiles"#)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        sqlx::query(r#"DELETE FROM account WHERE id = 1"#)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn require_snapshot(&self) -> Result<Account, AppError> {
        self.snapshot()
            .await?
            .ok_or_else(|| AppError::ConfigError(NOT_INITIALIZED.into()))
    }

    async fn touch(&self) -> Result<(), AppError> {
        sqlx::query(r#"UPDATE account SET updated_at = NOW() WHERE id = 1"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn load_profiles(&self) -> Result<ProfileNames, AppError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT profile_id, name FROM tracked_profiles ORDER BY profile_id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().collect())
    }
}

// -- Trait implementation --

impl AccountStore for AccountRepository {
    async fn get_checkpoint(&self) -> Result<Option<NaiveDate>, AppError> {
        let row: Option<(Option<NaiveDate>,)> =
            sqlx::query_as(r#"SELECT last_checked FROM account WHERE id = 1"#)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.and_then(|(date,)| date))
    }

    async fn set_checkpoint(&self, date: NaiveDate) -> Result<(), AppError> {
        self.update_checkpoint(date).await.map(|_| ())
    }

    async fn get_profiles(&self) -> Result<ProfileNames, AppError> {
        self.load_profiles().await
    }

    async fn get_emails(&self) -> Result<Vec<String>, AppError> {
        let row: Option<(Vec<String>,)> =
            sqlx::query_as(r#"SELECT emails FROM account WHERE id = 1"#)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(|(emails,)| emails).unwrap_or_default())
    }
}

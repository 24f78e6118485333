use std::collections::HashSet;

use linkalert_core::error::AppError;
use linkalert_core::fingerprint::fingerprint;
use linkalert_core::traits::SeenLinkStore;
use sqlx::{PgPool, Pool, Postgres};

/// PostgreSQL-backed seen-link set.
///
/// One row per (profile, URL) fingerprint; rows are inserted once and never
/// touched again. Keys already carry the profile id, so a single table serves
/// every profile.
#[derive(Clone)]
pub struct SeenLinkRepository {
    pool: Pool<Postgres>,
}

impl SeenLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of links recorded for a profile.
    pub async fn count_for_profile(&self, profile_id: &str) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM seen_links WHERE profile_id = $1"#)
                .bind(profile_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}

impl SeenLinkStore for SeenLinkRepository {
    async fn exists(&self, profile_id: &str, url: &str) -> Result<bool, AppError> {
        let (found,): (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM seen_links WHERE fingerprint = $1)"#)
                .bind(fingerprint(profile_id, url).as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(found)
    }

    async fn filter_new(&self, profile_id: &str, urls: &[String]) -> Result<Vec<String>, AppError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = urls
            .iter()
            .map(|url| fingerprint(profile_id, url).into_string())
            .collect();

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT fingerprint FROM seen_links WHERE fingerprint = ANY($1::text[])"#,
        )
        .bind(&keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let seen: HashSet<String> = rows.into_iter().map(|(fp,)| fp).collect();

        Ok(urls
            .iter()
            .zip(&keys)
            .filter(|(_, key)| !seen.contains(*key))
            .map(|(url, _)| url.clone())
            .collect())
    }

    async fn record(&self, profile_id: &str, urls: &[String]) -> Result<u64, AppError> {
        if urls.is_empty() {
            return Ok(0);
        }

        let mut batch = HashSet::with_capacity(urls.len());
        let keys: Vec<String> = urls
            .iter()
            .map(|url| fingerprint(profile_id, url).into_string())
            .filter(|key| batch.insert(key.clone()))
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO seen_links (fingerprint, profile_id)
            SELECT key, $2::varchar FROM UNNEST($1::text[]) AS batch(key)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
        )
        .bind(&keys)
        .bind(profile_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(
            %profile_id,
            submitted = keys.len(),
            inserted = result.rows_affected(),
            "Recorded seen links"
        );

        Ok(result.rows_affected())
    }
}

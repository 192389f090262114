//! Certificate registry backed by PostgreSQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

use super::identity::RollNumber;
use super::locator::AccessPurpose;

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct CertificateRecord {
    #[schema(value_type = String)]
    pub roll_number: RollNumber,
    pub has_certificate: bool,
    pub download_count: i64,
    pub last_downloaded: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DownloadLogEntry {
    pub roll_number: RollNumber,
    pub email: String,
    pub purpose: AccessPurpose,
    pub downloaded_at: DateTime<Utc>,
}

/// Relational store for certificate availability and access bookkeeping.
#[async_trait]
pub trait CertificateRegistry: Send + Sync {
    async fn get_certificate_record(
        &self,
        roll_number: &RollNumber,
    ) -> Result<Option<CertificateRecord>>;

    /// Insert or update availability, keeping download statistics.
    async fn upsert_certificate(&self, roll_number: &RollNumber, has_certificate: bool)
    -> Result<()>;

    async fn append_download_log(
        &self,
        roll_number: &RollNumber,
        email: &str,
        purpose: AccessPurpose,
    ) -> Result<()>;

    async fn increment_download_count(&self, roll_number: &RollNumber) -> Result<()>;

    /// Log a completed download and bump its counter.
    async fn record_download(&self, roll_number: &RollNumber, email: &str) -> Result<()> {
        self.append_download_log(roll_number, email, AccessPurpose::Download)
            .await?;
        self.increment_download_count(roll_number).await
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>>;

    /// Returns `false` when there was nothing to delete.
    async fn remove_certificate(&self, roll_number: &RollNumber) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply `sql/schema.sql`; every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if a statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<CertificateRecord> {
    let raw: String = row.get("roll_number");
    let roll_number = RollNumber::parse(&raw)
        .with_context(|| format!("invalid roll number stored in registry: {raw}"))?;
    Ok(CertificateRecord {
        roll_number,
        has_certificate: row.get("has_certificate"),
        download_count: row.get("download_count"),
        last_downloaded: row.get("last_downloaded"),
        created_at: row.get("created_at"),
    })
}

async fn insert_download_log<'e, E>(
    executor: E,
    roll_number: &RollNumber,
    email: &str,
    purpose: AccessPurpose,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = "INSERT INTO download_logs (roll_number, email, purpose) VALUES ($1, $2, $3)";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(roll_number.as_str())
        .bind(email)
        .bind(purpose.as_str())
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to append download log")?;
    Ok(())
}

async fn bump_download_count<'e, E>(executor: E, roll_number: &RollNumber) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = r"
        UPDATE certificates
        SET download_count = download_count + 1,
            last_downloaded = NOW()
        WHERE roll_number = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(roll_number.as_str())
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to increment download count")?;
    Ok(())
}

#[async_trait]
impl CertificateRegistry for PgRegistry {
    async fn get_certificate_record(
        &self,
        roll_number: &RollNumber,
    ) -> Result<Option<CertificateRecord>> {
        let query = r"
            SELECT roll_number, has_certificate, download_count, last_downloaded, created_at
            FROM certificates
            WHERE roll_number = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(roll_number.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup certificate record")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert_certificate(
        &self,
        roll_number: &RollNumber,
        has_certificate: bool,
    ) -> Result<()> {
        let query = r"
            INSERT INTO certificates (roll_number, has_certificate)
            VALUES ($1, $2)
            ON CONFLICT (roll_number)
            DO UPDATE SET has_certificate = EXCLUDED.has_certificate
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(roll_number.as_str())
            .bind(has_certificate)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert certificate")?;
        Ok(())
    }

    async fn append_download_log(
        &self,
        roll_number: &RollNumber,
        email: &str,
        purpose: AccessPurpose,
    ) -> Result<()> {
        insert_download_log(&self.pool, roll_number, email, purpose).await
    }

    async fn increment_download_count(&self, roll_number: &RollNumber) -> Result<()> {
        bump_download_count(&self.pool, roll_number).await
    }

    async fn record_download(&self, roll_number: &RollNumber, email: &str) -> Result<()> {
        // Log row and counter commit together or not at all.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin download bookkeeping transaction")?;

        insert_download_log(&mut *tx, roll_number, email, AccessPurpose::Download).await?;
        bump_download_count(&mut *tx, roll_number).await?;

        tx.commit()
            .await
            .context("commit download bookkeeping transaction")?;
        Ok(())
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>> {
        let query = r"
            SELECT roll_number, has_certificate, download_count, last_downloaded, created_at
            FROM certificates
            ORDER BY created_at DESC, roll_number ASC
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list certificates")?;

        rows.iter().map(record_from_row).collect()
    }

    async fn remove_certificate(&self, roll_number: &RollNumber) -> Result<bool> {
        let query = "DELETE FROM certificates WHERE roll_number = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(roll_number.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete certificate")?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

/// Split a schema file into statements on trailing `;`.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_create_statements() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert!(statements.len() >= 3);
        assert!(statements.iter().all(|s| s.ends_with(';')));
        assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS certificates")));
        assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS download_logs")));
    }

    #[test]
    fn split_keeps_trailing_statement_without_semicolon() {
        let statements = split_sql_statements("-- comment\nSELECT 1;\n\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }
}

//! SQLite audit trail.
//!
//! Two append-only tables record what was indexed and what was asked:
//!
//! - `ingestions`: one row per successful document ingestion
//! - `queries`: one row per question, answered or not
//!
//! Timestamps are Unix seconds. Sources are stored as a JSON array.

use anyhow::Result;
use async_trait::async_trait;
use condo_rag_core::audit::{AuditSink, IngestionEvent, QueryEvent};
use condo_rag_core::namespace::Namespace;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

/// A stored query row, as listed by `crag history`.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub asked_at: i64,
    pub question: String,
    pub query_class: String,
    pub mode: String,
    pub success: bool,
    pub confidence: f64,
    pub sources: Vec<String>,
}

pub struct SqliteAudit {
    pool: SqlitePool,
}

impl SqliteAudit {
    /// Open (creating if missing) the audit database and its tables.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let audit = Self { pool };
        audit.migrate().await?;
        Ok(audit)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestions (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                document_id TEXT NOT NULL,
                title TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                stored_count INTEGER NOT NULL,
                skipped_count INTEGER NOT NULL,
                ingested_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queries (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                question TEXT NOT NULL,
                query_class TEXT NOT NULL,
                mode TEXT NOT NULL,
                success INTEGER NOT NULL,
                confidence REAL NOT NULL,
                sources_json TEXT NOT NULL DEFAULT '[]',
                asked_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queries_namespace ON queries(namespace, asked_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent questions asked in `ns`, newest first.
    pub async fn recent_queries(&self, ns: &Namespace, limit: i64) -> Result<Vec<QueryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT asked_at, question, query_class, mode, success, confidence, sources_json
            FROM queries
            WHERE namespace = ?
            ORDER BY asked_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(ns.key())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let sources_json: String = row.get("sources_json");
                Ok(QueryRecord {
                    asked_at: row.get("asked_at"),
                    question: row.get("question"),
                    query_class: row.get("query_class"),
                    mode: row.get("mode"),
                    success: row.get::<i64, _>("success") != 0,
                    confidence: row.get("confidence"),
                    sources: serde_json::from_str(&sources_json)?,
                })
            })
            .collect()
    }

    /// Number of ingestion rows recorded for `ns`.
    pub async fn ingestion_count(&self, ns: &Namespace) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingestions WHERE namespace = ?")
            .bind(ns.key())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AuditSink for SqliteAudit {
    async fn record_ingestion(&self, event: &IngestionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestions
                (id, namespace, document_id, title, doc_type, chunk_count, stored_count, skipped_count, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(event.namespace.key())
        .bind(&event.document_id)
        .bind(&event.title)
        .bind(&event.doc_type)
        .bind(event.chunk_count as i64)
        .bind(event.stored_count as i64)
        .bind(event.skipped_count as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_query(&self, event: &QueryEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queries
                (id, namespace, question, query_class, mode, success, confidence, sources_json, asked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(event.namespace.key())
        .bind(&event.question)
        .bind(event.query_class.as_str())
        .bind(event.mode.as_str())
        .bind(event.success as i64)
        .bind(event.confidence as f64)
        .bind(serde_json::to_string(&event.sources)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condo_rag_core::models::{QueryClass, SearchMode};
    use condo_rag_core::namespace::resolve;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_query_rows_are_namespaced() {
        let tmp = TempDir::new().unwrap();
        let audit = SqliteAudit::open(&tmp.path().join("nested/audit.sqlite"))
            .await
            .unwrap();

        for (ns, question) in [(resolve(1, 1), "pool hours?"), (resolve(1, 2), "pets?")] {
            audit
                .record_query(&QueryEvent {
                    namespace: ns,
                    question: question.to_string(),
                    query_class: QueryClass::General,
                    mode: SearchMode::CondoOnly,
                    success: true,
                    confidence: 0.8,
                    sources: vec!["Pool Rules".to_string()],
                })
                .await
                .unwrap();
        }

        let rows = audit.recent_queries(&resolve(1, 1), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].question, "pool hours?");
        assert_eq!(rows[0].mode, "condo_only");
        assert_eq!(rows[0].sources, vec!["Pool Rules"]);
        assert!(rows[0].success);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.sqlite");
        let audit = SqliteAudit::open(&path).await.unwrap();
        audit
            .record_ingestion(&IngestionEvent {
                namespace: resolve(3, 1),
                document_id: "bylaws".to_string(),
                title: "Bylaws".to_string(),
                doc_type: "bylaws".to_string(),
                chunk_count: 4,
                stored_count: 4,
                skipped_count: 0,
            })
            .await
            .unwrap();
        drop(audit);

        let audit = SqliteAudit::open(&path).await.unwrap();
        assert_eq!(audit.ingestion_count(&resolve(3, 1)).await.unwrap(), 1);
        assert_eq!(audit.ingestion_count(&resolve(3, 2)).await.unwrap(), 0);
    }
}

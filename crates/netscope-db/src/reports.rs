//! Report operations.
//!
//! A report is the persisted snapshot of one completed job's aggregate
//! result, stored as JSON so it can be re-read without loss.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use netscope_core::ScanType;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// A persisted aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier for the report
    pub id: String,
    /// `Scan Report - <target>`
    pub title: String,
    /// `Scan type: <type>`
    pub description: String,
    /// Scan category the job requested
    pub scan_type: ScanType,
    /// Scan target
    pub target: String,
    /// Aggregate result document
    pub results: JsonValue,
    /// Owning user
    pub owner_id: String,
    /// When the report was written
    pub created_at: DateTime<Utc>,
}

/// Create a report for `target` owned by `owner_id`.
pub async fn create_report(
    pool: &Pool<Sqlite>,
    scan_type: ScanType,
    target: &str,
    results: JsonValue,
    owner_id: &str,
) -> Result<Report> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now();
    let title = format!("Scan Report - {target}");
    let description = format!("Scan type: {scan_type}");
    let results_json = serde_json::to_string(&results)?;

    sqlx::query(
        "INSERT INTO reports (id, title, description, scan_type, target, results, owner_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&title)
    .bind(&description)
    .bind(scan_type.as_str())
    .bind(target)
    .bind(&results_json)
    .bind(owner_id)
    .bind(created_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(report_id = %id, "Created report");

    Ok(Report {
        id,
        title,
        description,
        scan_type,
        target: target.to_string(),
        results,
        owner_id: owner_id.to_string(),
        created_at,
    })
}

/// Fetch one report.
pub async fn get_report(pool: &Pool<Sqlite>, report_id: &str) -> Result<Report> {
    let row = sqlx::query(
        "SELECT id, title, description, scan_type, target, results, owner_id, created_at
         FROM reports WHERE id = ?",
    )
    .bind(report_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFoundWithMessage(format!("Report '{report_id}' not found")))?;

    report_from_row(&row)
}

/// All reports of one owner, newest first.
pub async fn list_reports(pool: &Pool<Sqlite>, owner_id: &str) -> Result<Vec<Report>> {
    let rows = sqlx::query(
        "SELECT id, title, description, scan_type, target, results, owner_id, created_at
         FROM reports WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(report_from_row).collect()
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let scan_type: String = row.try_get("scan_type")?;
    let scan_type = scan_type.parse::<ScanType>().map_err(|e| {
        DatabaseError::Decode(format!("Invalid scan_type '{scan_type}' in reports table: {e}"))
    })?;

    let results: String = row.try_get("results")?;
    let results: JsonValue = serde_json::from_str(&results)?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("Invalid created_at '{created_at}': {e}")))?;

    Ok(Report {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        scan_type,
        target: row.try_get("target")?,
        results,
        owner_id: row.try_get("owner_id")?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use serde_json::json;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:").await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    #[tokio::test]
    async fn test_create_report_formats_title() {
        let db = setup_test_db().await;
        let results = json!({"target": "10.0.0.5", "status": "completed", "results": {}});

        let report = create_report(db.pool(), ScanType::Full, "10.0.0.5", results.clone(), "user-1")
            .await
            .expect("create report");

        assert_eq!(report.title, "Scan Report - 10.0.0.5");
        assert_eq!(report.description, "Scan type: full");

        let fetched = get_report(db.pool(), &report.id).await.expect("get report");
        assert_eq!(fetched.results, results);
        assert_eq!(fetched.scan_type, ScanType::Full);
    }

    #[tokio::test]
    async fn test_list_reports_by_owner() {
        let db = setup_test_db().await;
        for owner in ["alice", "bob", "alice"] {
            create_report(db.pool(), ScanType::Network, "10.0.0.5", json!({}), owner)
                .await
                .expect("create report");
        }

        let reports = list_reports(db.pool(), "alice").await.expect("list");
        assert_eq!(reports.len(), 2);
        assert!(list_reports(db.pool(), "carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_report() {
        let db = setup_test_db().await;
        assert!(matches!(
            get_report(db.pool(), "missing").await,
            Err(DatabaseError::NotFoundWithMessage(_))
        ));
    }
}

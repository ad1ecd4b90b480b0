//! Scan job records and their guarded status transitions.
//!
//! The `pending → running → completed | failed` state machine is enforced in
//! the `UPDATE` itself: a row only changes when its stored status is a valid
//! predecessor of the requested one, so two writers can never both finish
//! the same job.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use netscope_core::{ScanOptions, ScanStatus, ScanType};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// A persisted scan request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    /// Unique identifier for the scan job
    pub id: String,
    /// Current lifecycle status
    pub status: ScanStatus,
    /// Requested scan category
    pub scan_type: ScanType,
    /// Scan target as submitted
    pub target: String,
    /// Request parameters
    pub parameters: ScanOptions,
    /// Owning user
    pub owner_id: String,
    /// When the job was accepted
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Report produced by a completed job
    pub report_id: Option<String>,
    /// Failure text of a failed job
    pub error_message: Option<String>,
}

/// Fields supplied when a job is created.
#[derive(Debug, Clone)]
pub struct NewScanJob {
    /// Requested scan category
    pub scan_type: ScanType,
    /// Scan target
    pub target: String,
    /// Request parameters
    pub parameters: ScanOptions,
    /// Owning user
    pub owner_id: String,
}

/// Extra columns written alongside a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate<'a> {
    /// Report link, set on completion
    pub report_id: Option<&'a str>,
    /// Failure text, set on failure
    pub error_message: Option<&'a str>,
}

const COLUMNS: &str = "id, status, scan_type, target, parameters, owner_id,
                       started_at, completed_at, report_id, error_message";

/// Create a job in `pending`.
///
/// # Errors
/// Returns an error if the parameters cannot be encoded or the insert fails.
pub async fn create_scan_job(pool: &Pool<Sqlite>, new: NewScanJob) -> Result<ScanJob> {
    let id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let status = ScanStatus::Pending;
    let parameters = serde_json::to_string(&new.parameters)?;

    sqlx::query(
        "INSERT INTO scan_jobs (id, status, scan_type, target, parameters, owner_id, started_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(status.as_str())
    .bind(new.scan_type.as_str())
    .bind(&new.target)
    .bind(&parameters)
    .bind(&new.owner_id)
    .bind(started_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(job_id = %id, scan_type = %new.scan_type, "Created scan job");

    Ok(ScanJob {
        id,
        status,
        scan_type: new.scan_type,
        target: new.target,
        parameters: new.parameters,
        owner_id: new.owner_id,
        started_at,
        completed_at: None,
        report_id: None,
        error_message: None,
    })
}

/// Fetch one job.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` if no job has this id.
pub async fn get_scan_job(pool: &Pool<Sqlite>, job_id: &str) -> Result<ScanJob> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM scan_jobs WHERE id = ?"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFoundWithMessage(format!("Scan job '{job_id}' not found")))?;

    job_from_row(&row)
}

/// All jobs of one owner, newest first.
pub async fn list_scan_jobs(pool: &Pool<Sqlite>, owner_id: &str) -> Result<Vec<ScanJob>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM scan_jobs WHERE owner_id = ? ORDER BY started_at DESC"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Move a job to `status`, writing the report link or failure text with it.
///
/// Terminal statuses also stamp `completed_at`.
///
/// # Errors
/// Returns `DatabaseError::InvalidTransition` if the stored status may not
/// move to `status`, and `DatabaseError::NotFoundWithMessage` if the job
/// does not exist.
pub async fn update_scan_job_status(
    pool: &Pool<Sqlite>,
    job_id: &str,
    status: ScanStatus,
    update: StatusUpdate<'_>,
) -> Result<ScanJob> {
    let predecessors = ScanStatus::predecessors(status);
    if predecessors.is_empty() {
        let current = get_scan_job(pool, job_id).await?;
        return Err(DatabaseError::InvalidTransition {
            id: job_id.to_string(),
            from: current.status,
            to: status,
        });
    }

    let placeholders = vec!["?"; predecessors.len()].join(", ");
    let sql = format!(
        "UPDATE scan_jobs
         SET status = ?,
             report_id = COALESCE(?, report_id),
             error_message = COALESCE(?, error_message),
             completed_at = COALESCE(?, completed_at)
         WHERE id = ? AND status IN ({placeholders})"
    );

    let completed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
    let mut query = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(update.report_id)
        .bind(update.error_message)
        .bind(completed_at)
        .bind(job_id);
    for predecessor in predecessors {
        query = query.bind(predecessor.as_str());
    }

    let result = query.execute(pool).await?;

    if result.rows_affected() == 0 {
        let current = get_scan_job(pool, job_id).await?;
        tracing::warn!(
            job_id = %job_id,
            from = %current.status,
            to = %status,
            "Rejected scan job transition"
        );
        return Err(DatabaseError::InvalidTransition {
            id: job_id.to_string(),
            from: current.status,
            to: status,
        });
    }

    get_scan_job(pool, job_id).await
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("Invalid {column} '{value}': {e}")))
}

fn job_from_row(row: &SqliteRow) -> Result<ScanJob> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<ScanStatus>()
        .map_err(|e| DatabaseError::Decode(format!("Invalid status '{status}' in scan_jobs table: {e}")))?;

    let scan_type: String = row.try_get("scan_type")?;
    let scan_type = scan_type.parse::<ScanType>().map_err(|e| {
        DatabaseError::Decode(format!("Invalid scan_type '{scan_type}' in scan_jobs table: {e}"))
    })?;

    let parameters: String = row.try_get("parameters")?;
    let parameters: ScanOptions = serde_json::from_str(&parameters)?;

    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(ScanJob {
        id: row.try_get("id")?,
        status,
        scan_type,
        target: row.try_get("target")?,
        parameters,
        owner_id: row.try_get("owner_id")?,
        started_at: parse_timestamp(&started_at, "started_at")?,
        completed_at: completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, "completed_at"))
            .transpose()?,
        report_id: row.try_get("report_id")?,
        error_message: row.try_get("error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:").await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    fn new_job(owner: &str) -> NewScanJob {
        NewScanJob {
            scan_type: ScanType::Network,
            target: "10.0.0.5".to_string(),
            parameters: ScanOptions::new().with("ports", "1-100"),
            owner_id: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_scan_job() {
        let db = setup_test_db().await;

        let job = create_scan_job(db.pool(), new_job("user-1"))
            .await
            .expect("create scan job");
        assert_eq!(job.status, ScanStatus::Pending);

        let fetched = get_scan_job(db.pool(), &job.id).await.expect("get job");
        assert_eq!(fetched.target, "10.0.0.5");
        assert_eq!(fetched.scan_type, ScanType::Network);
        assert_eq!(fetched.parameters.get_str("ports").as_deref(), Some("1-100"));
        assert!(fetched.completed_at.is_none());
        assert!(fetched.report_id.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_job() {
        let db = setup_test_db().await;
        let result = get_scan_job(db.pool(), "nope").await;
        match result {
            Err(DatabaseError::NotFoundWithMessage(msg)) => {
                assert!(msg.contains("Scan job 'nope' not found"));
            }
            other => panic!("Expected NotFoundWithMessage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_to_completed() {
        let db = setup_test_db().await;
        let job = create_scan_job(db.pool(), new_job("user-1"))
            .await
            .expect("create scan job");

        let running = update_scan_job_status(
            db.pool(),
            &job.id,
            ScanStatus::Running,
            StatusUpdate::default(),
        )
        .await
        .expect("pending -> running");
        assert_eq!(running.status, ScanStatus::Running);
        assert!(running.completed_at.is_none());

        let done = update_scan_job_status(
            db.pool(),
            &job.id,
            ScanStatus::Completed,
            StatusUpdate {
                report_id: Some("report-1"),
                error_message: None,
            },
        )
        .await
        .expect("running -> completed");
        assert_eq!(done.status, ScanStatus::Completed);
        assert_eq!(done.report_id.as_deref(), Some("report-1"));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let db = setup_test_db().await;
        let job = create_scan_job(db.pool(), new_job("user-1"))
            .await
            .expect("create scan job");

        update_scan_job_status(
            db.pool(),
            &job.id,
            ScanStatus::Failed,
            StatusUpdate {
                report_id: None,
                error_message: Some("unknown scanner kind: bogus"),
            },
        )
        .await
        .expect("pending -> failed");

        for next in [ScanStatus::Running, ScanStatus::Completed, ScanStatus::Pending] {
            let result =
                update_scan_job_status(db.pool(), &job.id, next, StatusUpdate::default()).await;
            assert!(matches!(
                result,
                Err(DatabaseError::InvalidTransition {
                    from: ScanStatus::Failed,
                    ..
                })
            ));
        }

        let job = get_scan_job(db.pool(), &job.id).await.expect("get job");
        assert_eq!(job.status, ScanStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("unknown scanner kind: bogus")
        );
    }

    #[tokio::test]
    async fn test_pending_cannot_complete() {
        let db = setup_test_db().await;
        let job = create_scan_job(db.pool(), new_job("user-1"))
            .await
            .expect("create scan job");

        let result = update_scan_job_status(
            db.pool(),
            &job.id,
            ScanStatus::Completed,
            StatusUpdate::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_scan_jobs_by_owner() {
        let db = setup_test_db().await;
        create_scan_job(db.pool(), new_job("alice")).await.unwrap();
        create_scan_job(db.pool(), new_job("alice")).await.unwrap();
        create_scan_job(db.pool(), new_job("bob")).await.unwrap();

        let jobs = list_scan_jobs(db.pool(), "alice").await.expect("list");
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.owner_id == "alice"));
    }

    #[tokio::test]
    async fn test_invalid_status_in_row() {
        let db = setup_test_db().await;
        sqlx::query(
            "INSERT INTO scan_jobs (id, status, scan_type, target, parameters, owner_id, started_at)
             VALUES ('bad', 'pending', 'teleport', '10.0.0.5', '{}', 'u', '2026-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .expect("insert job");

        match get_scan_job(db.pool(), "bad").await {
            Err(DatabaseError::Decode(msg)) => assert!(msg.contains("Invalid scan_type 'teleport'")),
            other => panic!("Expected Decode error, got {other:?}"),
        }
    }
}

//! Persistence seam used by the job driver.

use async_trait::async_trait;
use netscope_core::ScanStatus;
use netscope_db::{reports, scan_jobs, Database, NewScanJob, Report, ScanJob, StatusUpdate};
use netscope_scanner::AggregateResult;

/// Job and report storage the driver depends on.
///
/// The driver owns its own handle to the store, independent of whatever
/// request created the job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `pending` job.
    async fn create_job(&self, new: NewScanJob) -> netscope_db::Result<ScanJob>;

    /// Fetch a job.
    async fn get_job(&self, job_id: &str) -> netscope_db::Result<ScanJob>;

    /// Apply a guarded status transition.
    async fn update_job_status(
        &self,
        job_id: &str,
        status: ScanStatus,
        update: StatusUpdate<'_>,
    ) -> netscope_db::Result<ScanJob>;

    /// Persist `aggregate` as the report of `job`.
    async fn create_report(
        &self,
        job: &ScanJob,
        aggregate: &AggregateResult,
    ) -> netscope_db::Result<Report>;

    /// Fetch a report.
    async fn get_report(&self, report_id: &str) -> netscope_db::Result<Report>;
}

#[async_trait]
impl JobStore for Database {
    async fn create_job(&self, new: NewScanJob) -> netscope_db::Result<ScanJob> {
        scan_jobs::create_scan_job(self.pool(), new).await
    }

    async fn get_job(&self, job_id: &str) -> netscope_db::Result<ScanJob> {
        scan_jobs::get_scan_job(self.pool(), job_id).await
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: ScanStatus,
        update: StatusUpdate<'_>,
    ) -> netscope_db::Result<ScanJob> {
        scan_jobs::update_scan_job_status(self.pool(), job_id, status, update).await
    }

    async fn create_report(
        &self,
        job: &ScanJob,
        aggregate: &AggregateResult,
    ) -> netscope_db::Result<Report> {
        let results = serde_json::to_value(aggregate)?;
        reports::create_report(self.pool(), job.scan_type, &job.target, results, &job.owner_id)
            .await
    }

    async fn get_report(&self, report_id: &str) -> netscope_db::Result<Report> {
        reports::get_report(self.pool(), report_id).await
    }
}

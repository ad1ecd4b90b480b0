//! Background driver that advances scan jobs through their lifecycle.
//!
//! One driver task runs per job. It moves the job to `running`, runs the
//! scanner batch, caches the aggregate for early readers, persists it as a
//! report and finishes the job as `completed` (with the report link) or
//! `failed` (with the error text). Queries read job state from the store
//! and never see a partial aggregate.

use crate::cache::ResultCache;
use crate::error::{JobError, Result};
use crate::request::ScanRequest;
use crate::store::JobStore;
use netscope_core::{AppConfig, ScanStatus};
use netscope_db::{DatabaseError, NewScanJob, ScanJob, StatusUpdate};
use netscope_scanner::{AggregateResult, ScannerManager, ToolRunner};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A submitted job and a handle on its driver task.
#[derive(Debug)]
pub struct JobHandle {
    /// The job as created, in `pending`
    pub job: ScanJob,
    /// Resolves to the job's final state once the driver finishes
    pub completion: JoinHandle<Result<ScanJob>>,
}

/// What a results query returns.
///
/// Until a job has completed only its status (and failure text) is visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultsView {
    /// Job not completed, or failed
    Status {
        /// Current job status
        status: ScanStatus,
        /// Failure text of a failed job
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Full aggregate of a completed job
    Completed(AggregateResult),
}

struct Inner {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn ToolRunner>,
    config: AppConfig,
    cache: ResultCache,
    active: Mutex<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Inner {
    fn active(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unregister(&self, job_id: &str) {
        self.active().remove(job_id);
    }

    async fn finish(
        &self,
        job_id: &str,
        status: ScanStatus,
        update: StatusUpdate<'_>,
    ) -> Result<ScanJob> {
        Ok(self.store.update_job_status(job_id, status, update).await?)
    }

    async fn fail(&self, job_id: &str, message: &str) -> Result<ScanJob> {
        self.finish(
            job_id,
            ScanStatus::Failed,
            StatusUpdate {
                report_id: None,
                error_message: Some(message),
            },
        )
        .await
    }
}

/// Owns job drivers, the result cache and the active-run registry.
///
/// Cloning is cheap and every clone drives the same set of jobs.
#[derive(Clone)]
pub struct JobDriver {
    inner: Arc<Inner>,
}

impl JobDriver {
    /// Driver persisting through `store` and running tools with `runner`.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, runner: Arc<dyn ToolRunner>, config: AppConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                runner,
                config,
                cache: ResultCache::new(),
                active: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Accept a request: create the job, build its scanners and start it.
    ///
    /// Invalid requests are rejected before a job is created. A job whose
    /// scanners cannot be built is marked `failed`.
    pub async fn submit(&self, request: &ScanRequest, owner_id: &str) -> Result<JobHandle> {
        let plan = request.plan()?;

        let job = self
            .inner
            .store
            .create_job(NewScanJob {
                scan_type: plan.scan_type,
                target: plan.target.to_string(),
                parameters: plan.parameters.clone(),
                owner_id: owner_id.to_string(),
            })
            .await?;
        tracing::info!(job_id = %job.id, scan_type = %job.scan_type, "Accepted scan job");

        let mut manager = ScannerManager::new(
            plan.target.clone(),
            plan.parameters.clone(),
            self.inner.runner.clone(),
        )
        .with_config(&self.inner.config);

        for (kind, options) in plan.scanners {
            if let Err(e) = manager.add_scanner(kind.as_str(), options) {
                tracing::error!(job_id = %job.id, error = %e, "Failed to build scanners");
                self.inner.fail(&job.id, &e.to_string()).await?;
                return Err(e.into());
            }
        }

        let completion = self.start(&job.id, manager).await?;
        Ok(JobHandle { job, completion })
    }

    /// Spawn the driver task for a `pending` job.
    ///
    /// # Errors
    /// `AlreadyRunning` if the job already has an active driver,
    /// `JobNotFound` if it does not exist, and an `InvalidTransition`
    /// database error if it is not `pending`.
    pub async fn start(
        &self,
        job_id: &str,
        manager: ScannerManager,
    ) -> Result<JoinHandle<Result<ScanJob>>> {
        let cancel = {
            let mut active = self.inner.active();
            if active.contains_key(job_id) {
                return Err(JobError::AlreadyRunning(job_id.to_string()));
            }
            let token = self.inner.shutdown.child_token();
            active.insert(job_id.to_string(), token.clone());
            token
        };

        let job = match self.job(job_id).await {
            Ok(job) if job.status == ScanStatus::Pending => job,
            Ok(job) => {
                self.inner.unregister(job_id);
                return Err(JobError::Database(DatabaseError::InvalidTransition {
                    id: job.id,
                    from: job.status,
                    to: ScanStatus::Running,
                }));
            }
            Err(e) => {
                self.inner.unregister(job_id);
                return Err(e);
            }
        };

        let inner = self.inner.clone();
        Ok(self
            .inner
            .tasks
            .spawn(async move { drive(inner, job, manager, cancel).await }))
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: &str) -> Result<ScanStatus> {
        Ok(self.job(job_id).await?.status)
    }

    /// The job record.
    pub async fn job(&self, job_id: &str) -> Result<ScanJob> {
        self.inner
            .store
            .get_job(job_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound | DatabaseError::NotFoundWithMessage(_) => {
                    JobError::JobNotFound(job_id.to_string())
                }
                other => JobError::Database(other),
            })
    }

    /// Results of a job: the full aggregate once completed, else its status.
    pub async fn results(&self, job_id: &str) -> Result<ResultsView> {
        let job = self.job(job_id).await?;
        if job.status != ScanStatus::Completed {
            return Ok(ResultsView::Status {
                status: job.status,
                error: job.error_message,
            });
        }

        if let Some(aggregate) = self.inner.cache.get(job_id).await {
            return Ok(ResultsView::Completed(aggregate));
        }

        let Some(report_id) = job.report_id else {
            return Ok(ResultsView::Status {
                status: job.status,
                error: None,
            });
        };
        let report = self.inner.store.get_report(&report_id).await?;
        let aggregate: AggregateResult =
            serde_json::from_value(report.results).map_err(DatabaseError::Serialization)?;
        Ok(ResultsView::Completed(aggregate))
    }

    /// Cancel a job's active run. Returns whether one was running.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.inner.active().get(job_id) {
            Some(token) => {
                tracing::info!(job_id = %job_id, "Cancelling scan job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a job has an active driver.
    #[must_use]
    pub fn is_active(&self, job_id: &str) -> bool {
        self.inner.active().contains_key(job_id)
    }

    /// Number of jobs with an active driver.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active().len()
    }

    /// Cancel every active run and wait for their drivers to finish.
    pub async fn shutdown(&self) {
        tracing::info!(active = self.active_count(), "Shutting down job driver");
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

impl std::fmt::Debug for JobDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDriver")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

async fn drive(
    inner: Arc<Inner>,
    job: ScanJob,
    manager: ScannerManager,
    cancel: CancellationToken,
) -> Result<ScanJob> {
    let job_id = job.id.clone();
    let outcome = execute(&inner, job, manager, cancel).await;

    inner.cache.remove(&job_id).await;
    inner.unregister(&job_id);

    match &outcome {
        Ok(job) => tracing::info!(job_id = %job_id, status = %job.status, "Scan job finished"),
        Err(e) => tracing::error!(job_id = %job_id, error = %e, "Scan job driver failed"),
    }
    outcome
}

async fn execute(
    inner: &Inner,
    job: ScanJob,
    manager: ScannerManager,
    cancel: CancellationToken,
) -> Result<ScanJob> {
    let job = match inner
        .finish(&job.id, ScanStatus::Running, StatusUpdate::default())
        .await
    {
        Ok(job) => job,
        Err(e) => {
            // never leave a job pending once its driver gave up
            let message = format!("Failed to start scan job: {e}");
            if let Err(fail_err) = inner.fail(&job.id, &message).await {
                tracing::warn!(job_id = %job.id, error = %fail_err, "Could not mark job failed");
            }
            return Err(e);
        }
    };
    tracing::info!(job_id = %job.id, scan_target = %job.target, "Scan job running");

    let aggregate = manager.run_all(cancel).await;
    inner.cache.insert(&job.id, aggregate.clone()).await;

    if aggregate.status == ScanStatus::Failed {
        let message = aggregate
            .error
            .clone()
            .unwrap_or_else(|| "scan batch failed".to_string());
        return inner.fail(&job.id, &message).await;
    }

    let report = match inner.store.create_report(&job, &aggregate).await {
        Ok(report) => report,
        Err(e) => {
            let message = format!("Failed to persist report: {e}");
            inner.fail(&job.id, &message).await?;
            return Err(e.into());
        }
    };

    inner
        .finish(
            &job.id,
            ScanStatus::Completed,
            StatusUpdate {
                report_id: Some(&report.id),
                error_message: None,
            },
        )
        .await
}

//! In-memory aggregate results, keyed by job id.
//!
//! Each entry is written by its job's driver once the batch finishes and
//! evicted after the report is persisted. Queries read it concurrently. The
//! cache is advisory: after a restart only persisted jobs and reports remain.

use netscope_scanner::AggregateResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Concurrency-safe map from job id to its finished aggregate.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, AggregateResult>>,
}

impl ResultCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the aggregate for `job_id`.
    pub async fn insert(&self, job_id: &str, aggregate: AggregateResult) {
        self.entries
            .write()
            .await
            .insert(job_id.to_string(), aggregate);
    }

    /// Copy of the aggregate for `job_id`, if cached.
    pub async fn get(&self, job_id: &str) -> Option<AggregateResult> {
        self.entries.read().await.get(job_id).cloned()
    }

    /// Evict `job_id`.
    pub async fn remove(&self, job_id: &str) -> Option<AggregateResult> {
        self.entries.write().await.remove(job_id)
    }

    /// Number of cached jobs.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

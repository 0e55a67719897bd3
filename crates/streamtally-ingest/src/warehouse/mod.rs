//! Warehouse loader
//!
//! Bulk-loads a staged artifact into the destination table, waits for the
//! load job to finish, and then has the staging store delete the artifact.
//! A successful load is the only thing that triggers that cleanup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::IngestConfig;
use crate::models::{ArtifactRef, TableRef};
use crate::staging::StagingStore;

pub mod auth;
pub mod bigquery;

pub use bigquery::BigQueryClient;

/// How the warehouse should read the artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub source_format: &'static str,
    /// Header lines to skip
    pub skip_leading_rows: u32,
    /// Infer the schema from the data
    pub autodetect: bool,
    pub write_disposition: &'static str,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            source_format: "CSV",
            skip_leading_rows: 1,
            autodetect: true,
            write_disposition: "WRITE_APPEND",
        }
    }
}

/// Handle to a submitted load job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub job: LoadJob,
    pub table: TableRef,
    pub rows: usize,
    pub elapsed: Duration,
}

/// Bulk-load capability of the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn start_load(&self, source_uri: &str, table: &TableRef, options: &LoadOptions) -> Result<LoadJob>;

    async fn job_state(&self, job: &LoadJob) -> Result<JobState>;
}

pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    options: LoadOptions,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            warehouse,
            options: LoadOptions::default(),
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(warehouse: Arc<dyn Warehouse>, config: &IngestConfig) -> Self {
        Self::new(warehouse, config.poll_interval(), config.load_timeout())
    }

    /// Load `artifact` into `table`, blocking until the job completes, then
    /// unstage it. A failed or timed-out job leaves the artifact in place.
    #[instrument(skip(self, staging), fields(uri = %artifact.uri(), table = %table))]
    pub async fn load(&self, artifact: &ArtifactRef, table: &TableRef, staging: &StagingStore) -> Result<LoadResult> {
        let started = Instant::now();
        let uri = artifact.uri();

        let job = self
            .warehouse
            .start_load(&uri, table, &self.options)
            .await
            .with_context(|| format!("Failed to start load of {}", uri))?;

        self.wait_for(&job, started).await?;
        info!("CSV data from {} loaded into table {}", uri, table);

        staging.unstage(artifact).await?;

        Ok(LoadResult {
            job,
            table: table.clone(),
            rows: artifact.rows,
            elapsed: started.elapsed(),
        })
    }

    async fn wait_for(&self, job: &LoadJob, started: Instant) -> Result<()> {
        loop {
            match self.warehouse.job_state(job).await? {
                JobState::Done => return Ok(()),
                JobState::Failed(reason) => anyhow::bail!("Load job {} failed: {}", job.job_id, reason),
                state => debug!(job_id = %job.job_id, ?state, "Load job not finished"),
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    anyhow::bail!("Load job {} did not finish within {:?}", job.job_id, timeout);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

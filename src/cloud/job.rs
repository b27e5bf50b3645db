//! Asynchronous job polling
//!
//! Long-running operations (RDS create, resize, volume enlargement, delete)
//! return a job id. [`JobPoller::wait`] polls the job until it reaches a
//! terminal status or the poll budget runs out.

use super::client::ServiceClient;
use crate::error::{ProviderError, Result};
use crate::resource::extract::path_str;
use std::time::{Duration, Instant};

/// Status of a remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted or in progress
    Running,
    Completed,
    /// Failed with the reason the API reported
    Failed(String),
    /// A status string this client does not know; polling continues
    Unknown(String),
}

impl JobStatus {
    pub fn from_api(status: &str, fail_reason: Option<String>) -> Self {
        match status {
            "Running" | "Pending" | "Init" => Self::Running,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed(fail_reason.unwrap_or_else(|| "unknown reason".to_string())),
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Poll timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before the first poll
    pub delay: Duration,
    pub interval: Duration,
    /// Total budget; exceeding it fails with [`ProviderError::JobTimeout`]
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Polls `GET v3/{project_id}/jobs?id=<job_id>` on an RDS service client
pub struct JobPoller<'a> {
    client: &'a ServiceClient,
    config: PollConfig,
}

impl<'a> JobPoller<'a> {
    pub fn new(client: &'a ServiceClient) -> Self {
        Self {
            client,
            config: client.poll_config().clone(),
        }
    }

    /// Current status of one job
    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let path = format!("v3/{{project_id}}/jobs?id={}", urlencoding::encode(job_id));
        let body = self.client.get(&path).await.map_err(|e| {
            e.with_context(format!("error retrieving job {}", job_id))
        })?;

        let status = path_str(&body, "job.status").unwrap_or_default();
        Ok(JobStatus::from_api(&status, path_str(&body, "job.fail_reason")))
    }

    /// Poll until the job completes; failure and timeout are errors
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        let started = Instant::now();
        tracing::info!("Waiting for job {}", job_id);

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        loop {
            match self.status(job_id).await? {
                JobStatus::Completed => {
                    tracing::info!(
                        "Job {} completed after {}s",
                        job_id,
                        started.elapsed().as_secs()
                    );
                    return Ok(());
                }
                JobStatus::Failed(reason) => {
                    tracing::error!("Job {} failed: {}", job_id, reason);
                    return Err(ProviderError::JobFailed {
                        job_id: job_id.to_string(),
                        reason,
                    });
                }
                JobStatus::Unknown(status) => {
                    tracing::warn!("Job {} reported unknown status {:?}", job_id, status);
                }
                JobStatus::Running => {
                    tracing::debug!("Job {} still running", job_id);
                }
            }

            let waited = started.elapsed();
            if waited >= self.config.timeout {
                return Err(ProviderError::JobTimeout {
                    job_id: job_id.to_string(),
                    waited,
                });
            }
            let remaining = self.config.timeout - waited;
            tokio::time::sleep(self.config.interval.min(remaining)).await;
        }
    }
}

//! Tracks an external scrape job to a terminal state.
//!
//! Each poll returns quickly; the loop sleeps on the tokio timer between
//! polls instead of occupying a thread. Backoff engages only while the
//! provider reports rate-limiting and resets to the base interval on the next
//! successful poll. A hard window cap bounds total wait.

use super::domain::AttemptId;
use crate::store::activity::{ActivityLog, LogStatus};
use async_trait::async_trait;
use std::time::Duration;

/// Opaque handle for an externally running scrape job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

/// One observation of a running job, already mapped from the provider's own
/// status vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    Running,
    RateLimited,
    Succeeded(serde_json::Value),
    Failed(String),
}

impl JobPoll {
    /// Map a provider status string to the pipeline's vocabulary. Rate limits
    /// arrive as transport-level 429s, not statuses, so they are not mapped
    /// here.
    pub fn from_provider_status(status: &str, payload: Option<serde_json::Value>) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "READY" | "RUNNING" => JobPoll::Running,
            "SUCCEEDED" => JobPoll::Succeeded(payload.unwrap_or(serde_json::Value::Null)),
            other => JobPoll::Failed(format!("provider reported {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("scrape provider error: {0}")]
pub struct ProviderError(pub String);

/// Seam to the external scraping provider.
#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    async fn submit(&self, profile_url: &str) -> Result<JobHandle, ProviderError>;
    async fn status(&self, job: &JobHandle) -> Result<JobPoll, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("scrape failed: {0}")]
    Failed(String),
    #[error("scrape timed out after {windows} polling windows")]
    TimedOut { windows: u32 },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Cadence policy: fixed base interval, exponential backoff capped at a
/// maximum while rate-limited, hard cap on total polling windows.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub max_windows: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(80),
            max_windows: 30,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScrapeJobPoller {
    policy: PollPolicy,
}

impl ScrapeJobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Poll `job` until the provider reports a terminal state, returning the
    /// completed payload on success. Every rate-limited retry is recorded in
    /// the activity log so an operator can trace the full cadence.
    pub async fn poll_to_completion(
        &self,
        provider: &dyn ScrapeProvider,
        job: &JobHandle,
        log: &ActivityLog,
        attempt_id: AttemptId,
    ) -> Result<serde_json::Value, PollError> {
        let mut delay = self.policy.base_interval;

        for window in 0..self.policy.max_windows {
            match provider.status(job).await? {
                JobPoll::Succeeded(payload) => return Ok(payload),
                JobPoll::Failed(message) => return Err(PollError::Failed(message)),
                JobPoll::Running => {
                    delay = self.policy.base_interval;
                }
                JobPoll::RateLimited => {
                    delay = (delay * 2).min(self.policy.max_interval);
                    log.append(
                        Some(attempt_id),
                        None,
                        "scrape_poll",
                        LogStatus::Info,
                        format!(
                            "provider rate-limited on window {window}, backing off {}s",
                            delay.as_secs()
                        ),
                    );
                }
            }

            tokio::time::sleep(delay).await;
        }

        Err(PollError::TimedOut {
            windows: self.policy.max_windows,
        })
    }
}

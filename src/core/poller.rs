use crate::domain::model::{JobId, QueryResultId};
use crate::domain::ports::RefreshApi;
use crate::utils::error::{RefreshError, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// 固定間隔輪詢；次數上限與（可選的）總時限先到者為準
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
        }
    }
}

pub struct JobPoller<'a, A: RefreshApi + ?Sized> {
    api: &'a A,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a, A: RefreshApi + ?Sized> JobPoller<'a, A> {
    pub fn new(api: &'a A, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self { api, policy, cancel }
    }

    /// 查詢 job 狀態直到出現非 0 的 query_result_id
    pub async fn poll(&self, job_id: &JobId) -> Result<QueryResultId> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RefreshError::Cancelled);
            }

            attempts += 1;
            let job = self.api.job_status(&job_id.0).await?.job;

            if let Some(result_id) = job.result_id() {
                tracing::debug!(
                    "Job {} finished with result {} after {} checks",
                    job_id,
                    result_id,
                    attempts
                );
                return Ok(result_id);
            }

            let state = job.state();
            if state.is_terminal_failure() {
                return Err(RefreshError::JobFailedError {
                    job_id: job_id.to_string(),
                    status: job.status.unwrap_or(0),
                    message: job
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| format!("{:?}", state)),
                });
            }

            let elapsed = started.elapsed();
            let deadline_hit = self
                .policy
                .deadline
                .is_some_and(|deadline| elapsed + self.policy.interval > deadline);

            if attempts >= self.policy.max_attempts || deadline_hit {
                return Err(RefreshError::TimeoutError {
                    job_id: job_id.to_string(),
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            tracing::info!(
                "⏳ Job {} has no result yet ({:?}), checking again in {:?} ({}/{})",
                job_id,
                state,
                self.policy.interval,
                attempts,
                self.policy.max_attempts
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RefreshError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::community_reports_errors::CommunityReportError;
use crate::community_reports_logging::{report_log, truncate_for_log, ReportLogLevel, ReportLogOption};
use crate::configuration::CommunityReportsConfig;
use crate::llm::base::{ChatMessage, CompletionLLM, GenerationConfig};

use super::governor::ConcurrencyGovernor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub time_unit: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CommunityReportsConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            time_unit: config.time_unit,
        }
    }

    /// Time-units to wait after a failed 0-indexed `attempt`, or `None` when the error is
    /// not worth retrying.
    pub fn backoff_units(error: &CommunityReportError, attempt: u32) -> Option<u64> {
        let exponent = 2u64.saturating_pow(attempt);
        match error {
            CommunityReportError::AttemptTimeout(_) => Some(exponent),
            CommunityReportError::TransientService(_) => Some(5u64.saturating_mul(exponent).min(30)),
            CommunityReportError::RateLimit(_) => Some(10u64.saturating_mul(exponent).min(60)),
            _ => None,
        }
    }

    pub fn backoff_delay(&self, units: u64) -> Duration {
        self.time_unit.saturating_mul(units.min(u32::MAX as u64) as u32)
    }
}

/// Runs one prompt against the service with a per-attempt timeout and classified backoff.
/// A governor slot is held only while an attempt is in flight.
pub struct InvocationEngine {
    llm: Arc<dyn CompletionLLM>,
    governor: ConcurrencyGovernor,
    policy: RetryPolicy,
}

impl InvocationEngine {
    pub fn new(llm: Arc<dyn CompletionLLM>, governor: ConcurrencyGovernor, policy: RetryPolicy) -> Self {
        InvocationEngine { llm, governor, policy }
    }

    pub async fn invoke(
        &self,
        community_id: &str,
        prompt: &str,
        history: &[ChatMessage],
        gen_conf: &GenerationConfig,
    ) -> Result<String, CommunityReportError> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.attempt(prompt, history, gen_conf).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let has_attempts_left = attempt + 1 < self.policy.max_attempts;
            match RetryPolicy::backoff_units(&error, attempt) {
                Some(units) if has_attempts_left => {
                    report_log(
                        ReportLogOption::Invocation,
                        ReportLogLevel::Warn,
                        &format!(
                            "Community {} attempt {} failed: {}. Retrying in {:?}",
                            community_id,
                            attempt + 1,
                            truncate_for_log(&error.to_string(), 100),
                            self.policy.backoff_delay(units)
                        ),
                    );
                    tokio::time::sleep(self.policy.backoff_delay(units)).await;
                    attempt += 1;
                }
                Some(_) => {
                    report_log(
                        ReportLogOption::Invocation,
                        ReportLogLevel::Error,
                        &format!(
                            "Community {} failed after {} attempts: {}",
                            community_id,
                            self.policy.max_attempts,
                            truncate_for_log(&error.to_string(), 100)
                        ),
                    );
                    return Err(error);
                }
                None => {
                    report_log(
                        ReportLogOption::Invocation,
                        ReportLogLevel::Error,
                        &format!(
                            "Community {} failed with non-retryable error: {}",
                            community_id,
                            truncate_for_log(&error.to_string(), 100)
                        ),
                    );
                    return Err(error);
                }
            }
        }
    }

    /// A single attempt. The call runs on its own task so an expired timeout can abort it
    /// without touching the retry loop.
    async fn attempt(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        gen_conf: &GenerationConfig,
    ) -> Result<String, CommunityReportError> {
        let _permit = self
            .governor
            .acquire()
            .await
            .map_err(|e| CommunityReportError::FatalService(format!("concurrency governor closed: {}", e)))?;

        let llm = Arc::clone(&self.llm);
        let prompt = prompt.to_string();
        let history = history.to_vec();
        let gen_conf = gen_conf.clone();
        let mut worker = tokio::spawn(async move { llm.chat(&prompt, &history, &gen_conf).await });

        match tokio::time::timeout(self.policy.attempt_timeout, &mut worker).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(llm_error))) => Err(llm_error.into()),
            Ok(Err(join_error)) => Err(join_error.into()),
            Err(_) => {
                worker.abort();
                Err(CommunityReportError::AttemptTimeout(self.policy.attempt_timeout))
            }
        }
    }
}

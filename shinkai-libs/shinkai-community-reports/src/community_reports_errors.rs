use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

use crate::llm::base::LLMError;

/// Markers that identify an infrastructure hiccup on the service side. Checked against the
/// lowercased error message.
pub const TRANSIENT_ERROR_MARKERS: [&str; 6] = ["auth_subrequest_error", "internal_error", "500", "502", "503", "504"];

/// Markers that identify throttling or exhausted quota. Checked after the transient markers.
pub const RATE_LIMIT_ERROR_MARKERS: [&str; 2] = ["rate_limit", "quota"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommunityReportError {
    #[error("Attempt timed out after {0:?}")]
    AttemptTimeout(Duration),
    #[error("Transient service error: {0}")]
    TransientService(String),
    #[error("Rate limit reached: {0}")]
    RateLimit(String),
    #[error("Non-retryable service error: {0}")]
    FatalService(String),
    #[error("Failed extracting JSON object from response: {0}")]
    ResponseFormat(String),
    #[error("Response failed validation: {0}")]
    ResponseValidation(String),
    #[error("Entity not found in graph: {0}")]
    UnknownEntity(String),
    #[error("Failed building prompt tables: {0}")]
    Prompt(String),
    #[error("Worker task failed: {0}")]
    TaskJoin(String),
}

impl CommunityReportError {
    /// Classifies a raw service error message the same way for every provider.
    pub fn from_service_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if TRANSIENT_ERROR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            CommunityReportError::TransientService(message.to_string())
        } else if RATE_LIMIT_ERROR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            CommunityReportError::RateLimit(message.to_string())
        } else {
            CommunityReportError::FatalService(message.to_string())
        }
    }
}

impl From<LLMError> for CommunityReportError {
    fn from(error: LLMError) -> Self {
        CommunityReportError::from_service_message(&error.to_string())
    }
}

impl From<csv::Error> for CommunityReportError {
    fn from(error: csv::Error) -> Self {
        CommunityReportError::Prompt(error.to_string())
    }
}

impl From<JoinError> for CommunityReportError {
    fn from(error: JoinError) -> Self {
        CommunityReportError::TaskJoin(error.to_string())
    }
}

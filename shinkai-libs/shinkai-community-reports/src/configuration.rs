use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_COMMUNITIES: usize = 3;
pub const DEFAULT_COMMUNITY_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT_UNITS: u64 = 150;
pub const DEFAULT_BATCH_PAUSE_UNITS: u64 = 1;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_REPORT_LENGTH: usize = 1500;

/// Knobs for a community report run. Every duration is expressed in `time_unit`s so the
/// whole schedule can be scaled at once.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityReportsConfig {
    /// Global cap on simultaneously in-flight service calls.
    pub max_concurrent_communities: usize,
    /// Number of communities started together before waiting on all of them.
    pub batch_size: usize,
    pub max_attempts: u32,
    pub attempt_timeout_units: u64,
    pub batch_pause_units: u64,
    pub time_unit: Duration,
    pub temperature: f32,
    pub max_report_length: usize,
}

impl Default for CommunityReportsConfig {
    fn default() -> Self {
        CommunityReportsConfig {
            max_concurrent_communities: DEFAULT_MAX_CONCURRENT_COMMUNITIES,
            batch_size: DEFAULT_COMMUNITY_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_units: DEFAULT_ATTEMPT_TIMEOUT_UNITS,
            batch_pause_units: DEFAULT_BATCH_PAUSE_UNITS,
            time_unit: Duration::from_secs(1),
            temperature: DEFAULT_TEMPERATURE,
            max_report_length: DEFAULT_MAX_REPORT_LENGTH,
        }
    }
}

impl CommunityReportsConfig {
    /// Defaults overridden by `MAX_CONCURRENT_COMMUNITIES` and `COMMUNITY_BATCH_SIZE`.
    pub fn from_env() -> Self {
        let max_concurrent_communities = env::var("MAX_CONCURRENT_COMMUNITIES")
            .unwrap_or(DEFAULT_MAX_CONCURRENT_COMMUNITIES.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_MAX_CONCURRENT_COMMUNITIES);

        let batch_size = env::var("COMMUNITY_BATCH_SIZE")
            .unwrap_or(DEFAULT_COMMUNITY_BATCH_SIZE.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_COMMUNITY_BATCH_SIZE);

        CommunityReportsConfig {
            max_concurrent_communities,
            batch_size,
            ..Default::default()
        }
        .normalized()
    }

    /// Zero limits would stall the governor or the scheduler forever, so they become 1.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_communities = self.max_concurrent_communities.max(1);
        self.batch_size = self.batch_size.max(1);
        self.max_attempts = self.max_attempts.max(1);
        self
    }

    pub fn units(&self, units: u64) -> Duration {
        self.time_unit.saturating_mul(units.min(u32::MAX as u64) as u32)
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.units(self.attempt_timeout_units)
    }

    pub fn batch_pause(&self) -> Duration {
        self.units(self.batch_pause_units)
    }
}

//! Configuration for the reduction scheduler

use std::env;

/// Configuration for the reduction scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Listings processed concurrently within one cycle; small on
    /// purpose, the marketplace rate limit is per minute
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: env::var("SCHEDULER_MAX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }
}

impl SchedulerConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

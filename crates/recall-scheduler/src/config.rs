//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default timezone for jobs (IANA name). Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// How long shutdown waits for running jobs, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured timezone.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}

#[cfg(feature = "jobs")]
impl From<&recall_types::SchedulerSettings> for SchedulerConfig {
    fn from(settings: &recall_types::SchedulerSettings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }
}

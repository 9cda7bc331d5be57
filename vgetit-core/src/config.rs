use std::time::Duration;
use tracing::warn;

pub const RATE_LIMIT_ENV: &str = "VGETIT_SCRAPE_RATE_LIMIT";
pub const SWEEP_INTERVAL_ENV: &str = "VGETIT_SWEEP_INTERVAL";

const DEFAULT_MIN_INTERVAL_SECS: u64 = 5;
const DEFAULT_SWEEP_SECS: u64 = 10;

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum spacing between two extraction starts, across all targets.
    pub min_interval: Duration,
    /// How often the background sweep looks for deferred jobs.
    pub sweep_every: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(DEFAULT_MIN_INTERVAL_SECS),
            sweep_every: Duration::from_secs(DEFAULT_SWEEP_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by `VGETIT_SCRAPE_RATE_LIMIT` and
    /// `VGETIT_SWEEP_INTERVAL` (whole seconds).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            min_interval: seconds_from(&lookup, RATE_LIMIT_ENV).unwrap_or(defaults.min_interval),
            sweep_every: seconds_from(&lookup, SWEEP_INTERVAL_ENV)
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.sweep_every),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_sweep_every(mut self, sweep_every: Duration) -> Self {
        self.sweep_every = sweep_every;
        self
    }
}

fn seconds_from<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

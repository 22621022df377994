use std::env;
use std::time::Duration;

const DEFAULT_TICK_MS: u64 = 1_000;
const MIN_TICK_MS: u64 = 100;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Scheduler cadence and fetch deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub tick: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_values(None, None)
    }
}

impl PollSettings {
    /// Reads `STATUSBOARD_TICK_MS` and `STATUSBOARD_FETCH_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_values(
            env_u64("STATUSBOARD_TICK_MS"),
            env_u64("STATUSBOARD_FETCH_TIMEOUT_SECS"),
        )
    }

    pub fn from_values(tick_ms: Option<u64>, fetch_timeout_secs: Option<u64>) -> Self {
        let tick_ms = tick_ms.unwrap_or(DEFAULT_TICK_MS).max(MIN_TICK_MS);
        let timeout_secs = fetch_timeout_secs
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
            .max(1);

        PollSettings {
            tick: Duration::from_millis(tick_ms),
            fetch_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|raw| raw.trim().parse::<u64>().ok())
}

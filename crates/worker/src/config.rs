use std::time::Duration;

use crate::retry::StoreRetryPolicy;

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> T {
    std::env::var(key)
        .unwrap_or_else(|_| default.into())
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a valid number"))
}

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running jobs.
    pub pool_size: usize,
    /// Default per-job deadline; `None` disables it.
    pub job_timeout: Option<Duration>,
    /// How often a running job's record is touched.
    pub heartbeat_interval: Duration,
    /// How long a timed-out executor may keep running after cancellation
    /// before it is aborted.
    pub cancel_grace: Duration,
    /// Minimum progress step forwarded to the store.
    pub progress_granularity: u8,
    pub retry: StoreRetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            job_timeout: Some(Duration::from_secs(900)),
            heartbeat_interval: Duration::from_secs(15),
            cancel_grace: Duration::from_secs(10),
            progress_granularity: 5,
            retry: StoreRetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_POOL_SIZE`        | `4`     |
    /// | `JOB_TIMEOUT_SECS`        | `900`   |
    /// | `HEARTBEAT_INTERVAL_SECS` | `15`    |
    /// | `CANCEL_GRACE_SECS`       | `10`    |
    /// | `PROGRESS_GRANULARITY`    | `5`     |
    /// | `STORE_RETRY_ATTEMPTS`    | `5`     |
    /// | `STORE_RETRY_INITIAL_MS`  | `100`   |
    ///
    /// `JOB_TIMEOUT_SECS=0` disables the default deadline.
    pub fn from_env() -> Self {
        let pool_size: usize = env_or("WORKER_POOL_SIZE", "4");
        assert!(pool_size > 0, "WORKER_POOL_SIZE must be at least 1");

        let timeout_secs: u64 = env_or("JOB_TIMEOUT_SECS", "900");
        let heartbeat_secs: u64 = env_or("HEARTBEAT_INTERVAL_SECS", "15");
        let grace_secs: u64 = env_or("CANCEL_GRACE_SECS", "10");
        let progress_granularity: u8 = env_or("PROGRESS_GRANULARITY", "5");
        let retry_attempts: u32 = env_or("STORE_RETRY_ATTEMPTS", "5");
        let retry_initial_ms: u64 = env_or("STORE_RETRY_INITIAL_MS", "100");

        Self {
            pool_size,
            job_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            heartbeat_interval: Duration::from_secs(heartbeat_secs.max(1)),
            cancel_grace: Duration::from_secs(grace_secs),
            progress_granularity,
            retry: StoreRetryPolicy {
                max_attempts: retry_attempts,
                initial_delay: Duration::from_millis(retry_initial_ms),
                ..Default::default()
            },
        }
    }
}

/// Reconciliation sweep configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// A running job not updated for this long is considered orphaned.
    pub staleness: Duration,
    pub interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(600),
            interval: Duration::from_secs(60),
        }
    }
}

impl ReconcileConfig {
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `STALE_JOB_THRESHOLD_SECS` | `600`   |
    /// | `RECONCILE_INTERVAL_SECS`  | `60`    |
    pub fn from_env() -> Self {
        let staleness_secs: u64 = env_or("STALE_JOB_THRESHOLD_SECS", "600");
        let interval_secs: u64 = env_or("RECONCILE_INTERVAL_SECS", "60");

        Self {
            staleness: Duration::from_secs(staleness_secs),
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }
}

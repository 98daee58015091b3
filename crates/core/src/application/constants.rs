// Agent constants (No magic values)
use std::time::Duration;

/// Resource sampler tick period (1s)
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// How long the runner waits for the sampler to stop before giving up (3s)
pub const DEFAULT_SAMPLER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum jobs executing at the same time; further jobs wait for a permit
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 8;

/// Terminal jobs stay in the registry this long before eviction (1h)
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(60 * 60);

/// Retention sweep period (60s)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Result directory timestamp prefix, e.g. `20250123_105003`
pub const RESULT_DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of a rendered RESULT_DIR_TIMESTAMP_FORMAT
pub const RESULT_DIR_TIMESTAMP_LEN: usize = 15;

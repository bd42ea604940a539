use std::time::Duration;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SystemConfig {
    pub routing: RoutingConfig,
    pub refresh: RefreshConfig,
    pub dial: DialConfig,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RoutingConfig {
    /// Node capacity per leaf bucket, `k` in the original paper.
    pub bucket_size: usize,

    /// Overflow capacity per leaf bucket for contacts discovered once the
    /// bucket is full.
    pub bucket_replacement_size: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bucket_size: 20,
            bucket_replacement_size: 5,
        }
    }
}

/// Backoff bounds for the bucket-refresh maintenance loop.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RefreshConfig {
    pub initial_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(3),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// How often the reconnect loop scans for unconnected records.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DialConfig {
    pub interval: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

//! Software executor configuration.
//!
//! Explicit configuration goes through the bon builder; [`SoftConfig::from_env`] fills every field
//! from the environment with the same defaults.

use std::time::Duration;

use bon::bon;

/// Configuration of a [`SoftDriver`](crate::SoftDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftConfig {
    /// Number of virtual devices exposed.
    pub devices: usize,
    /// Worker pool size; `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Hold submissions until `flush`, `finish`, a blocking call or a wait.
    pub deferred: bool,
    /// Delay before an asynchronous build reports completion.
    pub build_latency: Duration,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self { devices: 1, threads: None, deferred: false, build_latency: Duration::ZERO }
    }
}

#[bon]
impl SoftConfig {
    #[builder]
    pub fn new(
        #[builder(default = 1)] devices: usize,
        threads: Option<usize>,
        #[builder(default = false)] deferred: bool,
        #[builder(default = 0)] build_latency_ms: u64,
    ) -> Self {
        Self { devices, threads, deferred, build_latency: Duration::from_millis(build_latency_ms) }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `FERROCL_SOFT_DEVICES` - Number of virtual devices (default: 1)
    /// * `FERROCL_SOFT_THREADS` - Worker threads (default: rayon's choice)
    /// * `FERROCL_SOFT_DEFERRED` - Hold submissions until flushed if set to `1` or `true`
    /// * `FERROCL_SOFT_BUILD_LATENCY_MS` - Asynchronous build latency (default: 0)
    pub fn from_env() -> Self {
        let devices = std::env::var("FERROCL_SOFT_DEVICES").ok().and_then(|s| s.parse().ok()).unwrap_or(1);
        let threads = std::env::var("FERROCL_SOFT_THREADS").ok().and_then(|s| s.parse().ok());
        let deferred = std::env::var("FERROCL_SOFT_DEFERRED").is_ok_and(|s| s == "1" || s.eq_ignore_ascii_case("true"));
        let latency = std::env::var("FERROCL_SOFT_BUILD_LATENCY_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(0);

        Self { devices, threads, deferred, build_latency: Duration::from_millis(latency) }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration defaults and validation for the loader pipeline.

use std::time::Duration;

/// Tunables for the dependency-ordered receive engine and fetch chain.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of module fetches allowed to run concurrently.
    /// Default `3`, matching the original reference implementation.
    pub concurrent_downloads: usize,
    /// Poll interval for the continuous-load controller's rebounce stage.
    pub poll_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: 3,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Tunables for the content-addressed cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total cap, in bytes, shared by pinned and unpinned `READY` entries.
    /// Pinned entries are never evicted, so eviction targets unpinned
    /// entries down to `max_size_bytes - currentPinnedSize`.
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 64 MiB; generous enough for a handful of pinned applications
            // plus headroom for superseded-but-not-yet-evicted builds.
            max_size_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Severity of a configuration warning produced by [`validate_loader_config`]
/// or [`validate_cache_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    /// Informational note — not necessarily a problem.
    Info,
    /// Likely unintended, but the loader will still run.
    Warning,
    /// Invalid configuration that will cause problems at runtime.
    Error,
}

/// A single configuration warning.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// Dot-delimited path to the problematic field (e.g. `"cache.max_size_bytes"`).
    pub field: String,
    /// Human-readable description of the issue.
    pub message: String,
    /// How severe this issue is.
    pub severity: WarningSeverity,
}

/// Validate a [`LoaderConfig`], returning any warnings (never panics).
#[must_use]
pub fn validate_loader_config(config: &LoaderConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    if config.concurrent_downloads == 0 {
        warnings.push(ConfigWarning {
            field: "concurrent_downloads".into(),
            message: "concurrent_downloads is 0; no module will ever fetch".into(),
            severity: WarningSeverity::Error,
        });
    }
    if config.poll_interval.is_zero() {
        warnings.push(ConfigWarning {
            field: "poll_interval".into(),
            message: "poll_interval is 0; the continuous controller will busy-loop".into(),
            severity: WarningSeverity::Warning,
        });
    }
    warnings
}

/// Validate a [`CacheConfig`], returning any warnings (never panics).
#[must_use]
pub fn validate_cache_config(config: &CacheConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    if config.max_size_bytes == 0 {
        warnings.push(ConfigWarning {
            field: "max_size_bytes".into(),
            message: "max_size_bytes is 0; every getOrPut will hit CacheFull".into(),
            severity: WarningSeverity::Error,
        });
    }
    warnings
}

//! Configuration for the cache, units, and the device supervisor.
//!
//! This module defines all configuration structures used to parameterize the device. It
//! provides:
//! 1. **Defaults:** baseline sizing constants (cache capacity, motor timeout).
//! 2. **Structures:** hierarchical config for the cache and per-unit defaults.
//!
//! Configuration is supplied via JSON (`serde_json`) or `Config::default()` for the common case.

use serde::Deserialize;
use std::time::Duration;

/// Default configuration constants.
///
/// These values define the baseline configuration when not explicitly overridden.
mod defaults {
    /// Default cache capacity in bytes (4 MiB — room for roughly 16 HD tracks).
    pub const CACHE_MAX_BYTES: usize = 4 * 1024 * 1024;

    /// Motor auto-off delay in milliseconds.
    pub const MOTOR_TIMEOUT_MS: u64 = 2_500;

    /// Whether newly inserted media are cached by default.
    pub const CACHE_ENABLED: bool = true;
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use trackfile_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.cache.max_bytes, 4 * 1024 * 1024);
/// assert!(config.unit.cache_enabled);
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use trackfile_core::config::Config;
///
/// let json = r#"{
///     "cache": { "max_bytes": 1048576 },
///     "unit": { "cache_enabled": false, "motor_timeout_ms": 5000 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.cache.max_bytes, 1_048_576);
/// assert!(!config.unit.cache_enabled);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shared track-cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-unit defaults applied to newly created units.
    #[serde(default)]
    pub unit: UnitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            unit: UnitConfig::default(),
        }
    }
}

/// Shared track-cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum bytes the cache may hold across all units combined.
    ///
    /// Rounded down to a whole number of track-sized entries at construction time. A value of
    /// `0` disables the cache entirely.
    #[serde(default = "CacheConfig::default_max_bytes")]
    pub max_bytes: usize,
}

impl CacheConfig {
    /// Returns the default cache capacity in bytes.
    const fn default_max_bytes() -> usize {
        defaults::CACHE_MAX_BYTES
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: defaults::CACHE_MAX_BYTES,
        }
    }
}

/// Per-unit default configuration, applied when a unit is created.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    /// Whether this unit participates in the shared track cache.
    #[serde(default = "UnitConfig::default_cache_enabled")]
    pub cache_enabled: bool,

    /// Motor auto-off delay, in milliseconds, after the last command completes.
    #[serde(default = "UnitConfig::default_motor_timeout_ms")]
    pub motor_timeout_ms: u64,
}

impl UnitConfig {
    /// Returns whether caching is enabled for new units by default.
    const fn default_cache_enabled() -> bool {
        defaults::CACHE_ENABLED
    }

    /// Returns the default motor auto-off delay in milliseconds.
    const fn default_motor_timeout_ms() -> u64 {
        defaults::MOTOR_TIMEOUT_MS
    }

    /// The motor timeout as a [`Duration`].
    #[must_use]
    pub const fn motor_timeout(&self) -> Duration {
        Duration::from_millis(self.motor_timeout_ms)
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            cache_enabled: defaults::CACHE_ENABLED,
            motor_timeout_ms: defaults::MOTOR_TIMEOUT_MS,
        }
    }
}

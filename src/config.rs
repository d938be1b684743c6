//! Configuration for dispatch and connection pooling.
//!
//! Values are plain structs with defaults; loading them from files or the
//! environment is left to the embedding application.

use std::time::Duration;

use crate::{OpError, OpResult};

/// Default streaming buffer: 64 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default bound of concurrently borrowed connections per authority.
pub const DEFAULT_MAX_PER_AUTHORITY: usize = 4;

/// Default idle time after which a pooled connection is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wait of a blocked borrower.
pub const DEFAULT_BORROW_TIMEOUT: Duration = Duration::from_secs(30);

/// What a borrow does when an authority already lends `max_per_authority`
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExhaustedPolicy {
    /// Wait for a returned connection, up to `timeout`.
    Block {
        /// Maximum wait.
        timeout: Duration,
    },
    /// Open an extra connection beyond the bound.
    Grow,
    /// Fail immediately with `PoolExhausted`.
    Fail,
}

impl Default for ExhaustedPolicy {
    fn default() -> Self {
        ExhaustedPolicy::Block {
            timeout: DEFAULT_BORROW_TIMEOUT,
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum connections lent out per authority.
    pub max_per_authority: usize,
    /// Idle connections older than this are closed by eviction.
    pub idle_timeout: Duration,
    /// Behavior when the bound is reached.
    pub when_exhausted: ExhaustedPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_authority: DEFAULT_MAX_PER_AUTHORITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            when_exhausted: ExhaustedPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// [`OpError::InvalidArgument`] if `max_per_authority` is zero.
    pub fn validate(&self) -> OpResult<()> {
        if self.max_per_authority == 0 {
            return Err(OpError::invalid_argument(
                "pool.max_per_authority must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatchConfig {
    /// Buffer size of streaming copies.
    pub buffer_size: usize,
    /// Pool settings handed to backends registered with
    /// [`DispatcherBuilder::pooled_provider`](crate::DispatcherBuilder::pooled_provider).
    pub pool: PoolConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            pool: PoolConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// [`OpError::InvalidArgument`] for a zero buffer or invalid pool settings.
    pub fn validate(&self) -> OpResult<()> {
        if self.buffer_size == 0 {
            return Err(OpError::invalid_argument("buffer_size must be positive"));
        }
        self.pool.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DispatchConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let config = DispatchConfig {
            buffer_size: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pool_bound_is_rejected() {
        let pool = PoolConfig {
            max_per_authority: 0,
            ..PoolConfig::default()
        };
        assert!(pool.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_uses_defaults() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{ "buffer_size": 1024, "pool": { "when_exhausted": "Grow" } }"#)
                .unwrap();
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.pool.when_exhausted, ExhaustedPolicy::Grow);
        assert_eq!(config.pool.max_per_authority, DEFAULT_MAX_PER_AUTHORITY);
    }
}

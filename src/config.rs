/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AuthLockError, AuthLockResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// A holder that has not released after this long is considered
    /// abandoned and is reclaimed automatically
    pub lock_timeout: Duration,
    /// Default wait timeout for queued acquisitions
    pub default_wait_timeout: Duration,
    /// Default priority for queued acquisitions (higher is served first)
    pub default_priority: i32,
    /// Number of grant retries during a drain before giving up
    pub drain_retry_count: u32,
    /// Base delay between drain grant retries
    pub drain_retry_delay: Duration,
    /// Jitter added to the drain retry delay, in milliseconds
    pub drain_retry_jitter_ms: u64,
    /// Sweep interval of the expiry watchdog
    pub watchdog_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            default_wait_timeout: Duration::from_secs(10),
            default_priority: 0,
            drain_retry_count: 3,
            drain_retry_delay: Duration::from_millis(10),
            drain_retry_jitter_ms: 5,
            watchdog_interval: Duration::from_secs(1),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_default_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.default_wait_timeout = wait_timeout;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_drain_retry(mut self, count: u32, delay: Duration) -> Self {
        self.drain_retry_count = count;
        self.drain_retry_delay = delay;
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn validate(&self) -> AuthLockResult<()> {
        if self.lock_timeout.is_zero() {
            return Err(AuthLockError::ConfigError(
                "lock_timeout must be greater than zero".to_string(),
            ));
        }
        if self.default_wait_timeout.is_zero() {
            return Err(AuthLockError::ConfigError(
                "default_wait_timeout must be greater than zero".to_string(),
            ));
        }
        if self.drain_retry_delay.is_zero() {
            return Err(AuthLockError::ConfigError(
                "drain_retry_delay must be greater than zero".to_string(),
            ));
        }
        if self.watchdog_interval.is_zero() {
            return Err(AuthLockError::ConfigError(
                "watchdog_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let config = CoordinatorConfig::default().with_lock_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(AuthLockError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_retry_delay_rejected() {
        let config = CoordinatorConfig::default().with_drain_retry(3, Duration::ZERO);
        assert!(config.validate().is_err());
    }
}

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
mod blocking;
mod non_blocking;
mod queue;
mod state;

pub use blocking::*;
pub use non_blocking::*;

pub(crate) use queue::{WaitEntry, WaitQueue};
pub(crate) use state::LockState;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// === Current holder snapshot ===
#[derive(Debug, Clone)]
pub struct OwnerInfo {
    pub owner: String,
    pub acquired_at: Instant,
    pub expires_at: Instant,
}

impl OwnerInfo {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cooperative cancellation flag for blocking waiters. The waiter observes
/// the flag on each condvar wakeup slice.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let shared = flag.clone();
        shared.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_owner_info_remaining() {
        let now = Instant::now();
        let info = OwnerInfo {
            owner: "a".to_string(),
            acquired_at: now,
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!info.is_expired());
        assert!(info.remaining() <= Duration::from_secs(30));

        let stale = OwnerInfo {
            owner: "b".to_string(),
            acquired_at: now - Duration::from_secs(60),
            expires_at: now - Duration::from_secs(30),
        };
        assert!(stale.is_expired());
        assert_eq!(stale.remaining(), Duration::ZERO);
    }
}

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
use std::time::{Duration, Instant};

/// === Lock ownership state ===
///
/// Invariant: `held == false` implies `owner_id == None`; at most one owner
/// at any instant. Mutated only under the coordinator's state mutex.
pub(crate) struct LockState {
    held: bool,
    owner_id: Option<String>,
    acquired_at: Instant,
}

impl LockState {
    pub fn new() -> Self {
        Self {
            held: false,
            owner_id: None,
            acquired_at: Instant::now(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn is_owned_by(&self, id: &str) -> bool {
        self.held && self.owner_id.as_deref() == Some(id)
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Grants the lock if it is free, or confirms ownership if `id` already
    /// holds it. Self-grant is idempotent, not reentrant: it does not count
    /// and leaves `acquired_at` untouched.
    pub fn try_grant(&mut self, id: &str, now: Instant) -> bool {
        if !self.held {
            self.held = true;
            self.owner_id = Some(id.to_string());
            self.acquired_at = now;
            return true;
        }
        self.owner_id.as_deref() == Some(id)
    }

    /// Owner-gated release. A non-owner cannot release another holder's lock.
    pub fn release(&mut self, id: &str) -> bool {
        if self.is_owned_by(id) {
            self.clear();
            true
        } else {
            false
        }
    }

    /// Unconditionally clears ownership, returning the evicted owner if any.
    pub fn force_clear(&mut self) -> Option<String> {
        let evicted = self.owner_id.take();
        self.held = false;
        evicted
    }

    pub fn is_expired(&self, now: Instant, lock_timeout: Duration) -> bool {
        self.held && now.duration_since(self.acquired_at) > lock_timeout
    }

    /// Reclaims an abandoned lock. Returns the evicted owner when the lock
    /// was expired, `None` otherwise.
    pub fn reclaim_if_expired(
        &mut self,
        now: Instant,
        lock_timeout: Duration,
    ) -> Option<String> {
        if self.is_expired(now, lock_timeout) {
            self.force_clear()
        } else {
            None
        }
    }

    fn clear(&mut self) {
        self.held = false;
        self.owner_id = None;
    }
}

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
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::coordinator::{CancelFlag, Coordinated, ExpiryWatchdog, LockState, OwnerInfo, WaitQueue};
use crate::errors::AuthLockResult;
use crate::util::num_milliseconds;

/// Wakeup slice for waiting threads, so cancellation and holder expiry are
/// observed promptly even without a notification
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Options for a blocking queued acquisition
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Personal wait deadline; independent of the holder expiry timeout
    pub timeout: Duration,
    /// Higher priority is served first; ties are first-in-first-out
    pub priority: i32,
    /// Optional cooperative cancellation flag
    pub cancel: Option<CancelFlag>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            priority: 0,
            cancel: None,
        }
    }
}

impl AcquireOptions {
    pub fn new(timeout: Duration, priority: i32) -> Self {
        Self {
            timeout,
            priority,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

struct Inner {
    state: LockState,
    queue: WaitQueue<()>,
    closed: bool,
}

struct Shared {
    config: CoordinatorConfig,
    inner: Mutex<Inner>,
    condvar: Condvar,
}

/// === LockCoordinator (blocking exclusive-access coordinator) ===
///
/// Threaded counterpart of [`AsyncLockCoordinator`]: the same state model
/// guarded by a mutex and condition variable. Waiters serve themselves: on
/// each wakeup the head of the queue takes the freed lock, which keeps the
/// grant path inside the waiting thread and the release path non-blocking.
///
/// [`AsyncLockCoordinator`]: crate::AsyncLockCoordinator
pub struct LockCoordinator {
    shared: Arc<Shared>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::from_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> AuthLockResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: CoordinatorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    state: LockState::new(),
                    queue: WaitQueue::new(),
                    closed: false,
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub fn default_options(&self) -> AcquireOptions {
        AcquireOptions::new(
            self.shared.config.default_wait_timeout,
            self.shared.config.default_priority,
        )
    }

    /// Immediate, non-blocking acquisition attempt. Idempotent for the
    /// current owner.
    pub fn try_acquire(&self, id: &str) -> bool {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        if inner.closed {
            return false;
        }
        let granted = inner.state.try_grant(id, Instant::now());
        if granted {
            debug!("Lock acquired by {}", id);
        }
        granted
    }

    /// Queued acquisition. Blocks until the lock is granted (true), the
    /// personal timeout elapses (false) or the cancel flag fires (false).
    ///
    /// Grant beats cancellation deterministically: the waiter re-checks its
    /// queue position under the state mutex before declaring timeout or
    /// cancellation, so a grant that was already applied always wins.
    pub fn acquire_queued(&self, id: &str, options: AcquireOptions) -> bool {
        let deadline = Instant::now() + options.timeout;
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        if inner.closed {
            return false;
        }
        if inner.state.try_grant(id, Instant::now()) {
            debug!("Lock acquired by {}", id);
            return true;
        }

        let entry_id = inner
            .queue
            .push(id, options.priority, options.timeout, ());
        debug!(
            "{} queued for lock (priority {}, timeout {} ms)",
            id,
            options.priority,
            num_milliseconds(&options.timeout)
        );

        loop {
            // The entry stays queued for the whole wait; every exit path
            // below removes it exactly once
            debug_assert!(inner.queue.contains(entry_id));

            if inner.closed {
                inner.queue.remove(entry_id);
                return false;
            }

            // Self-service grant: the head of the queue takes the freed lock
            if !inner.state.is_held() && inner.queue.head_id() == Some(entry_id) {
                inner.queue.remove(entry_id);
                let granted = inner.state.try_grant(id, Instant::now());
                debug_assert!(granted);
                debug!("Lock granted to queued waiter {}", id);
                return granted;
            }

            if options
                .cancel
                .as_ref()
                .is_some_and(|cancel| cancel.is_cancelled())
            {
                inner.queue.remove(entry_id);
                self.shared.condvar.notify_all();
                debug!("Wait entry of {} cancelled", id);
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                inner.queue.remove(entry_id);
                self.shared.condvar.notify_all();
                debug!("Wait entry of {} timed out", id);
                return false;
            }

            // Reclaim an abandoned holder from inside the wait loop, then
            // wake everyone so the head can take the lock
            if self.reclaim_locked(&mut inner) {
                continue;
            }

            let slice = deadline.saturating_duration_since(now).min(WAIT_SLICE);
            let _ = self.shared.condvar.wait_for(&mut inner, slice);
        }
    }

    /// Owner-gated release. Waiters are notified and complete the ownership
    /// transfer on their own threads after this call returns.
    pub fn release(&self, id: &str) -> bool {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        if inner.state.release(id) {
            debug!("Lock released by {}", id);
            self.shared.condvar.notify_all();
            true
        } else {
            false
        }
    }

    /// Unconditionally clears ownership and wakes the queue. Emergency
    /// recovery only.
    pub fn force_release(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let evicted = inner.state.force_clear();
        if let Some(owner) = &evicted {
            warn!("Force release evicted holder {}", owner);
        }
        self.shared.condvar.notify_all();
        evicted.is_some()
    }

    /// Reclaims the lock if the holder's expiry timeout has elapsed.
    pub fn reclaim_expired(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner)
    }

    pub fn has_lock(&self, id: &str) -> bool {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.state.is_owned_by(id)
    }

    pub fn is_held(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.state.is_held()
    }

    pub fn active_owner(&self) -> Option<String> {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.state.owner().map(str::to_string)
    }

    pub fn queue_length(&self) -> usize {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.queue.len()
    }

    pub fn owner_info(&self) -> Option<OwnerInfo> {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.state.owner().map(|owner| OwnerInfo {
            owner: owner.to_string(),
            acquired_at: inner.state.acquired_at(),
            expires_at: inner.state.acquired_at() + self.shared.config.lock_timeout,
        })
    }

    /// Denies every queued waiter and refuses further acquisitions.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        inner.closed = true;
        if !inner.queue.is_empty() {
            debug!("Coordinator shut down, denying {} waiters", inner.queue.len());
        }
        self.shared.condvar.notify_all();
    }

    /// Starts a background sweeper thread that reclaims an abandoned holder
    /// even when no caller traffic would otherwise trigger the expiry check.
    pub fn start_watchdog(&self) -> AuthLockResult<ExpiryWatchdog> {
        let mut watchdog = ExpiryWatchdog::new();
        let coordinator = self.clone();
        watchdog.start(self.shared.config.watchdog_interval, move || {
            coordinator.sweep()
        })?;
        Ok(watchdog)
    }

    fn sweep(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return false;
        }
        self.reclaim_locked(&mut inner);
        true
    }

    fn reclaim_locked(&self, inner: &mut Inner) -> bool {
        match inner
            .state
            .reclaim_if_expired(Instant::now(), self.shared.config.lock_timeout)
        {
            Some(evicted) => {
                warn!(
                    "Lock expired after {:?}, reclaimed from abandoned holder {}",
                    self.shared.config.lock_timeout, evicted
                );
                self.shared.condvar.notify_all();
                true
            }
            None => false,
        }
    }
}

impl Clone for LockCoordinator {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinated for LockCoordinator {
    fn try_acquire(&self, id: &str) -> bool {
        LockCoordinator::try_acquire(self, id)
    }

    fn acquire_queued(&self, id: &str, options: AcquireOptions) -> bool {
        LockCoordinator::acquire_queued(self, id, options)
    }

    fn release(&self, id: &str) -> bool {
        LockCoordinator::release(self, id)
    }

    fn force_release(&self) -> bool {
        LockCoordinator::force_release(self)
    }

    fn has_lock(&self, id: &str) -> bool {
        LockCoordinator::has_lock(self, id)
    }

    fn is_held(&self) -> bool {
        LockCoordinator::is_held(self)
    }

    fn active_owner(&self) -> Option<String> {
        LockCoordinator::active_owner(self)
    }

    fn queue_length(&self) -> usize {
        LockCoordinator::queue_length(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn fast_expiry_coordinator() -> LockCoordinator {
        let config = CoordinatorConfig::default()
            .with_lock_timeout(Duration::from_millis(50))
            .with_watchdog_interval(Duration::from_millis(20));
        LockCoordinator::with_config(config).unwrap()
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let coordinator = LockCoordinator::new();
        let active = Arc::new(AtomicUsize::new(0));
        let granted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let coordinator = coordinator.clone();
            let active = active.clone();
            let granted = granted.clone();
            handles.push(thread::spawn(move || {
                let id = format!("thread-{i}");
                assert!(coordinator
                    .acquire_queued(&id, AcquireOptions::new(Duration::from_secs(5), 0)));
                let concurrent = active.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(concurrent, 1, "two holders at once");
                granted.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                assert!(coordinator.release(&id));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::SeqCst), 8);
        assert!(!coordinator.is_held());
        assert_eq!(coordinator.queue_length(), 0);
    }

    #[test]
    fn test_idempotent_self_acquire() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("a"));
        let first = coordinator.owner_info().unwrap();

        thread::sleep(Duration::from_millis(10));
        assert!(coordinator.try_acquire("a"));
        assert!(coordinator.acquire_queued("a", coordinator.default_options()));
        assert_eq!(coordinator.owner_info().unwrap().acquired_at, first.acquired_at);

        // Not reentrant: one release frees the lock
        assert!(coordinator.release("a"));
        assert!(!coordinator.is_held());
    }

    #[test]
    fn test_release_requires_ownership() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("a"));
        assert!(!coordinator.release("b"));
        assert!(coordinator.has_lock("a"));
        assert!(coordinator.release("a"));
    }

    #[test]
    fn test_priority_grant_order() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("holder"));

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for (name, priority) in [("w1", 1), ("w2", 5), ("w3", 1)] {
            let coordinator = coordinator.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                let options = AcquireOptions::new(Duration::from_secs(5), priority);
                assert!(coordinator.acquire_queued(name, options));
                order.lock().push(name.to_string());
                thread::sleep(Duration::from_millis(5));
                assert!(coordinator.release(name));
            }));
            // Distinct enqueue instants keep the FIFO tie deterministic
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(coordinator.queue_length(), 3);

        assert!(coordinator.release("holder"));
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), vec!["w2", "w1", "w3"]);
    }

    #[test]
    fn test_wait_timeout() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("holder"));

        let started = Instant::now();
        let granted = coordinator
            .acquire_queued("late", AcquireOptions::new(Duration::from_millis(50), 0));
        let elapsed = started.elapsed();

        assert!(!granted);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(coordinator.queue_length(), 0);
        assert!(coordinator.has_lock("holder"));
    }

    #[test]
    fn test_cancellation_removes_waiter() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("holder"));

        let cancel = CancelFlag::new();
        let handle = {
            let coordinator = coordinator.clone();
            let options =
                AcquireOptions::new(Duration::from_secs(5), 0).with_cancel(cancel.clone());
            thread::spawn(move || coordinator.acquire_queued("w", options))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(coordinator.queue_length(), 1);

        cancel.cancel();
        assert!(!handle.join().unwrap());
        assert_eq!(coordinator.queue_length(), 0);
        assert!(coordinator.has_lock("holder"));
    }

    #[test]
    fn test_expiry_deadlock_recovery() {
        let coordinator = fast_expiry_coordinator();
        assert!(coordinator.try_acquire("abandoned"));

        thread::sleep(Duration::from_millis(80));
        assert!(coordinator.try_acquire("rescuer"));
        assert!(coordinator.has_lock("rescuer"));
    }

    #[test]
    fn test_waiter_survives_abandoned_holder() {
        // The waiter itself reclaims the expired holder from its wait loop
        let coordinator = fast_expiry_coordinator();
        assert!(coordinator.try_acquire("abandoned"));

        let granted = coordinator
            .acquire_queued("patient", AcquireOptions::new(Duration::from_secs(2), 0));
        assert!(granted);
        assert!(coordinator.has_lock("patient"));
    }

    #[test]
    fn test_end_to_end_scenario() {
        let coordinator = LockCoordinator::new();

        assert!(coordinator.try_acquire("A"));
        assert!(!coordinator.try_acquire("B"));

        let b = {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                coordinator.acquire_queued("B", AcquireOptions::new(Duration::from_millis(1000), 0))
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(coordinator.queue_length(), 1);

        assert!(coordinator.release("A"));
        assert!(b.join().unwrap());
        assert_eq!(coordinator.active_owner(), Some("B".to_string()));
    }

    #[test]
    fn test_force_release() {
        let coordinator = LockCoordinator::new();
        assert!(!coordinator.force_release());
        assert!(coordinator.try_acquire("stuck"));
        assert!(coordinator.force_release());
        assert!(!coordinator.is_held());
    }

    #[test]
    fn test_shutdown_denies_waiters() {
        let coordinator = LockCoordinator::new();
        assert!(coordinator.try_acquire("holder"));

        let handle = {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                coordinator.acquire_queued("w", AcquireOptions::new(Duration::from_secs(5), 0))
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(coordinator.queue_length(), 1);

        coordinator.shutdown();
        assert!(!handle.join().unwrap());
        assert!(!coordinator.try_acquire("late"));
        assert!(!coordinator.acquire_queued("late", AcquireOptions::default()));
    }

    #[test]
    fn test_watchdog_reclaims() {
        let coordinator = fast_expiry_coordinator();
        assert!(coordinator.try_acquire("abandoned"));

        let mut watchdog = coordinator.start_watchdog().unwrap();
        thread::sleep(Duration::from_millis(150));
        watchdog.stop();

        assert!(!coordinator.is_held());
    }
}

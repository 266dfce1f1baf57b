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

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::coordinator::{AsyncCoordinated, AsyncExpiryWatchdog, LockState, OwnerInfo, WaitEntry, WaitQueue};
use crate::errors::AuthLockResult;
use crate::util::{jitter_delay, num_milliseconds};

/// Options for a queued acquisition
#[derive(Debug, Clone)]
pub struct AsyncAcquireOptions {
    /// Personal wait deadline; independent of the holder expiry timeout
    pub timeout: Duration,
    /// Higher priority is served first; ties are first-in-first-out
    pub priority: i32,
    /// Optional cooperative cancellation handle
    pub cancel: Option<CancellationToken>,
}

impl Default for AsyncAcquireOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            priority: 0,
            cancel: None,
        }
    }
}

impl AsyncAcquireOptions {
    pub fn new(timeout: Duration, priority: i32) -> Self {
        Self {
            timeout,
            priority,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Completion handle of an async waiter: the one-shot grant channel plus
/// the timeout/cancel timer task, aborted on any terminal resolution.
pub(crate) struct AsyncWaiter {
    tx: Option<oneshot::Sender<bool>>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    state: LockState,
    queue: WaitQueue<AsyncWaiter>,
    closed: bool,
}

struct Shared {
    config: CoordinatorConfig,
    inner: Mutex<Inner>,
}

/// === AsyncLockCoordinator (asynchronous exclusive-access coordinator) ===
///
/// Serializes access to one shared external resource: at most one holder at
/// any instant, (priority, FIFO)-ordered waiters, automatic reclamation of
/// abandoned holders, per-waiter timeouts and cooperative cancellation.
///
/// All state lives behind one mutex that is never held across an await, so
/// a clone of the coordinator can be used freely from any task or thread.
pub struct AsyncLockCoordinator {
    shared: Arc<Shared>,
}

impl AsyncLockCoordinator {
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
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Queued-acquisition options filled in from the coordinator's config
    pub fn default_options(&self) -> AsyncAcquireOptions {
        AsyncAcquireOptions::new(
            self.shared.config.default_wait_timeout,
            self.shared.config.default_priority,
        )
    }

    /// Immediate, non-blocking acquisition attempt. Idempotent for the
    /// current owner (returns true without touching the acquisition time).
    pub fn try_acquire(&self, id: &str) -> bool {
        let granted = {
            let mut inner = self.shared.inner.lock();
            self.reclaim_locked(&mut inner);
            if inner.closed {
                return false;
            }
            inner.state.try_grant(id, Instant::now())
        };
        if granted {
            debug!("Lock acquired by {}", id);
        }
        granted
    }

    /// Queued acquisition. Resolves true when the lock is granted, false
    /// when the personal timeout elapses or the cancel token fires first.
    ///
    /// Tie-break with a concurrent grant is deterministic: whichever side
    /// removes the wait entry from the queue first owns its resolution, so
    /// a grant that lands before the cancellation is processed wins.
    pub async fn acquire_queued(&self, id: &str, options: AsyncAcquireOptions) -> bool {
        let (tx, rx) = oneshot::channel();

        // One critical section for the fast path and the enqueue, so a
        // release cannot slip in between and strand the new entry.
        let entry_id = {
            let mut inner = self.shared.inner.lock();
            self.reclaim_locked(&mut inner);
            if inner.closed {
                return false;
            }
            if inner.state.try_grant(id, Instant::now()) {
                debug!("Lock acquired by {}", id);
                return true;
            }
            inner.queue.push(
                id,
                options.priority,
                options.timeout,
                AsyncWaiter {
                    tx: Some(tx),
                    timer: None,
                },
            )
        };
        debug!(
            "{} queued for lock (priority {}, timeout {} ms)",
            id,
            options.priority,
            num_milliseconds(&options.timeout)
        );

        // Timer task: resolves the entry false on deadline or cancellation
        let deadline = TokioInstant::now() + options.timeout;
        let shared = Arc::clone(&self.shared);
        let cancel = options.cancel.clone();
        let timer = tokio::spawn(async move {
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = token.cancelled() => {}
                    }
                }
                None => tokio::time::sleep_until(deadline).await,
            }
            abort_entry(&shared, entry_id);
        });

        // Attach the timer to the entry; if the entry was already resolved
        // in the meantime the timer has nothing left to do.
        {
            let mut inner = self.shared.inner.lock();
            match inner.queue.get_mut(entry_id) {
                Some(entry) => entry.signal.timer = Some(timer),
                None => timer.abort(),
            }
        }

        // A dropped sender (coordinator torn down mid-wait) counts as denial
        rx.await.unwrap_or(false)
    }

    /// Owner-gated release. Draining is handed to a spawned task so this
    /// call returns before ownership transfer completes.
    pub fn release(&self, id: &str) -> bool {
        let released = {
            let mut inner = self.shared.inner.lock();
            self.reclaim_locked(&mut inner);
            inner.state.release(id)
        };
        if released {
            debug!("Lock released by {}", id);
            schedule_drain(&self.shared);
        }
        released
    }

    /// Unconditionally clears ownership and drains the queue. This bypasses
    /// the ownership contract; it exists for emergency recovery and tests,
    /// not for normal release paths.
    pub fn force_release(&self) -> bool {
        let evicted = self.shared.inner.lock().state.force_clear();
        if let Some(owner) = &evicted {
            warn!("Force release evicted holder {}", owner);
        }
        schedule_drain(&self.shared);
        evicted.is_some()
    }

    /// Reclaims the lock if the holder's expiry timeout has elapsed.
    /// Returns true when an abandoned holder was evicted.
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

    /// Snapshot of the current holder with its expiry horizon
    pub fn owner_info(&self) -> Option<OwnerInfo> {
        let mut inner = self.shared.inner.lock();
        self.reclaim_locked(&mut inner);
        inner.state.owner().map(|owner| OwnerInfo {
            owner: owner.to_string(),
            acquired_at: inner.state.acquired_at(),
            expires_at: inner.state.acquired_at() + self.shared.config.lock_timeout,
        })
    }

    /// Resolves every queued waiter false and refuses further acquisitions.
    pub fn shutdown(&self) {
        let entries = {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
            inner.queue.drain_all()
        };
        if !entries.is_empty() {
            debug!("Coordinator shut down, denying {} waiters", entries.len());
        }
        for mut entry in entries {
            resolve_entry(&mut entry, false);
        }
    }

    /// Starts a background sweeper that reclaims an abandoned holder even
    /// when no caller traffic would otherwise trigger the expiry check.
    pub async fn start_watchdog(&self) -> AuthLockResult<AsyncExpiryWatchdog> {
        let mut watchdog = AsyncExpiryWatchdog::new();
        let coordinator = self.clone();
        watchdog
            .start(self.shared.config.watchdog_interval, move || {
                let coordinator = coordinator.clone();
                async move { coordinator.sweep() }
            })
            .await?;
        Ok(watchdog)
    }

    /// One watchdog pass; false stops the watchdog (coordinator closed)
    fn sweep(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return false;
        }
        self.reclaim_locked(&mut inner);
        true
    }

    /// Expiry reclamation, run at the top of every public operation so
    /// observers never see a stale abandoned holder.
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
                schedule_drain(&self.shared);
                true
            }
            None => false,
        }
    }
}

impl Clone for AsyncLockCoordinator {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for AsyncLockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncCoordinated for AsyncLockCoordinator {
    fn try_acquire(&self, id: &str) -> bool {
        AsyncLockCoordinator::try_acquire(self, id)
    }

    async fn acquire_queued(&self, id: &str, options: AsyncAcquireOptions) -> bool {
        AsyncLockCoordinator::acquire_queued(self, id, options).await
    }

    fn release(&self, id: &str) -> bool {
        AsyncLockCoordinator::release(self, id)
    }

    fn force_release(&self) -> bool {
        AsyncLockCoordinator::force_release(self)
    }

    fn has_lock(&self, id: &str) -> bool {
        AsyncLockCoordinator::has_lock(self, id)
    }

    fn is_held(&self) -> bool {
        AsyncLockCoordinator::is_held(self)
    }

    fn active_owner(&self) -> Option<String> {
        AsyncLockCoordinator::active_owner(self)
    }

    fn queue_length(&self) -> usize {
        AsyncLockCoordinator::queue_length(self)
    }
}

/// Removes a queue entry on timeout or cancellation and resolves it false.
/// If the entry is already gone a grant won the race; nothing to do.
fn abort_entry(shared: &Arc<Shared>, entry_id: u64) {
    let entry = shared.inner.lock().queue.remove(entry_id);
    if let Some(mut entry) = entry {
        debug!("Wait entry of {} timed out or was cancelled", entry.requester);
        if let Some(tx) = entry.signal.tx.take() {
            let _ = tx.send(false);
        }
    }
}

fn resolve_entry(entry: &mut WaitEntry<AsyncWaiter>, granted: bool) {
    if let Some(tx) = entry.signal.tx.take() {
        let _ = tx.send(granted);
    }
    if let Some(timer) = entry.signal.timer.take() {
        timer.abort();
    }
}

fn schedule_drain(shared: &Arc<Shared>) {
    let shared = Arc::clone(shared);
    tokio::spawn(drain_queue(shared));
}

/// Hands a freed lock to the next eligible waiter. Runs on release,
/// force-release and expiry reclamation. Grant failures are retried with a
/// jittered backoff and bounded by `drain_retry_count`, guarding against a
/// raced `try_acquire` stealing the lock between pops.
async fn drain_queue(shared: Arc<Shared>) {
    loop {
        let mut entry = {
            let mut inner = shared.inner.lock();
            if inner.state.is_held() {
                return;
            }
            match inner.queue.pop_front() {
                Some(entry) => entry,
                None => return,
            }
        };

        // An entry past its own deadline whose timer has not fired yet is
        // resolved false here rather than granted
        if entry.is_expired(Instant::now()) {
            resolve_entry(&mut entry, false);
            continue;
        }

        let mut attempts = 0u32;
        loop {
            let granted = {
                let mut inner = shared.inner.lock();
                let was_free = !inner.state.is_held();
                if inner.state.try_grant(&entry.requester, Instant::now()) {
                    Some(was_free)
                } else {
                    None
                }
            };

            match granted {
                Some(was_free) => {
                    let delivered = entry
                        .signal
                        .tx
                        .take()
                        .map(|tx| tx.send(true).is_ok())
                        .unwrap_or(false);
                    if let Some(timer) = entry.signal.timer.take() {
                        timer.abort();
                    }
                    if delivered {
                        debug!("Lock granted to queued waiter {}", entry.requester);
                        return;
                    }
                    // The waiter dropped its future before the grant landed:
                    // treat it as cancelled and put the lock back
                    if was_free {
                        shared.inner.lock().state.release(&entry.requester);
                    }
                    break;
                }
                None => {
                    attempts += 1;
                    if attempts > shared.config.drain_retry_count {
                        warn!(
                            "Drain could not grant to {} after {} attempts, requeueing",
                            entry.requester, attempts
                        );
                        shared.inner.lock().queue.requeue_front(entry);
                        return;
                    }
                    tokio::time::sleep(jitter_delay(
                        shared.config.drain_retry_delay,
                        shared.config.drain_retry_jitter_ms,
                    ))
                    .await;
                }
            }
        }
    }
}

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

/// === Pending acquisition request ===
///
/// `signal` carries the variant-specific completion handle: a oneshot
/// sender plus timer for the async coordinator, nothing for the blocking
/// one (its waiters sit on the condvar and check the queue themselves).
pub(crate) struct WaitEntry<S> {
    pub entry_id: u64,
    pub requester: String,
    pub priority: i32,
    pub enqueued_at: Instant,
    pub deadline: Instant,
    pub signal: S,
}

impl<S> WaitEntry<S> {
    /// Entry expiry is derived strictly from the deadline recorded on the
    /// entry, never from any timer handle.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Higher priority first; ties broken by enqueue time ascending, then by
/// entry id (monotonic), so equal keys can never reorder.
fn precedes<S>(a: &WaitEntry<S>, b: &WaitEntry<S>) -> bool {
    match a.priority.cmp(&b.priority) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match a.enqueued_at.cmp(&b.enqueued_at) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => a.entry_id < b.entry_id,
        },
    }
}

/// === Wait queue ===
///
/// Ordered multiset of pending requests, kept sorted on insertion.
pub(crate) struct WaitQueue<S> {
    entries: Vec<WaitEntry<S>>,
    next_entry_id: u64,
}

impl<S> WaitQueue<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_entry_id: 0,
        }
    }

    /// Inserts a new entry at its ordered position and returns its id.
    pub fn push(
        &mut self,
        requester: &str,
        priority: i32,
        timeout: Duration,
        signal: S,
    ) -> u64 {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;

        let now = Instant::now();
        let entry = WaitEntry {
            entry_id,
            requester: requester.to_string(),
            priority,
            enqueued_at: now,
            deadline: now + timeout,
            signal,
        };

        let position = self
            .entries
            .iter()
            .position(|existing| precedes(&entry, existing))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        entry_id
    }

    pub fn pop_front(&mut self) -> Option<WaitEntry<S>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Puts a popped head back at the front after a failed grant attempt.
    pub fn requeue_front(&mut self, entry: WaitEntry<S>) {
        self.entries.insert(0, entry);
    }

    pub fn remove(&mut self, entry_id: u64) -> Option<WaitEntry<S>> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.entry_id == entry_id)?;
        Some(self.entries.remove(position))
    }

    pub fn get_mut(&mut self, entry_id: u64) -> Option<&mut WaitEntry<S>> {
        self.entries
            .iter_mut()
            .find(|entry| entry.entry_id == entry_id)
    }

    pub fn head_id(&self) -> Option<u64> {
        self.entries.first().map(|entry| entry.entry_id)
    }

    pub fn contains(&self, entry_id: u64) -> bool {
        self.entries.iter().any(|entry| entry.entry_id == entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the queue, e.g. on coordinator shutdown.
    pub fn drain_all(&mut self) -> Vec<WaitEntry<S>> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn push_entry(queue: &mut WaitQueue<()>, requester: &str, priority: i32) -> u64 {
        queue.push(requester, priority, Duration::from_secs(10), ())
    }

    #[test]
    fn test_priority_then_fifo_ordering() {
        let mut queue = WaitQueue::new();
        push_entry(&mut queue, "w1", 1);
        // Distinct enqueue instants for the FIFO tie
        thread::sleep(Duration::from_millis(2));
        push_entry(&mut queue, "w2", 5);
        thread::sleep(Duration::from_millis(2));
        push_entry(&mut queue, "w3", 1);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front().unwrap().requester, "w2");
        assert_eq!(queue.pop_front().unwrap().requester, "w1");
        assert_eq!(queue.pop_front().unwrap().requester, "w3");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        // Same priority and (potentially) the same instant: the monotonic
        // entry id must keep insertion order stable.
        let mut queue = WaitQueue::new();
        for i in 0..10 {
            push_entry(&mut queue, &format!("w{i}"), 3);
        }
        for i in 0..10 {
            assert_eq!(queue.pop_front().unwrap().requester, format!("w{i}"));
        }
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = WaitQueue::new();
        let a = push_entry(&mut queue, "a", 0);
        let b = push_entry(&mut queue, "b", 0);
        let c = push_entry(&mut queue, "c", 0);

        let removed = queue.remove(b).unwrap();
        assert_eq!(removed.requester, "b");
        assert_eq!(queue.len(), 2);
        assert!(queue.remove(b).is_none());
        assert!(queue.contains(a));
        assert!(queue.contains(c));
        // Remaining order unchanged
        assert_eq!(queue.pop_front().unwrap().requester, "a");
        assert_eq!(queue.pop_front().unwrap().requester, "c");
    }

    #[test]
    fn test_requeue_front() {
        let mut queue = WaitQueue::new();
        push_entry(&mut queue, "a", 0);
        push_entry(&mut queue, "b", 0);

        let head = queue.pop_front().unwrap();
        assert_eq!(head.requester, "a");
        queue.requeue_front(head);
        assert_eq!(queue.pop_front().unwrap().requester, "a");
    }

    #[test]
    fn test_entry_deadline() {
        let mut queue = WaitQueue::new();
        queue.push("a", 0, Duration::from_millis(20), ());
        let entry = queue.pop_front().unwrap();
        assert!(!entry.is_expired(Instant::now()));
        assert!(entry.is_expired(Instant::now() + Duration::from_millis(25)));
    }

    #[test]
    fn test_drain_all() {
        let mut queue = WaitQueue::new();
        push_entry(&mut queue, "a", 0);
        push_entry(&mut queue, "b", 7);
        let drained = queue.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.head_id(), None);
    }
}

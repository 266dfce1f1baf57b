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
use async_trait::async_trait;

mod coordinator;
mod watchdog;

pub use coordinator::*;
pub use watchdog::*;

/// Asynchronous version of the coordinator operations
#[async_trait]
pub trait AsyncCoordinated {
    /// Immediate, non-blocking acquisition attempt
    fn try_acquire(&self, id: &str) -> bool;

    /// Queued acquisition; resolves true on grant, false on timeout or
    /// cancellation
    async fn acquire_queued(&self, id: &str, options: AsyncAcquireOptions) -> bool;

    /// Owner-gated release
    fn release(&self, id: &str) -> bool;

    /// Unconditional release, for emergency recovery only
    fn force_release(&self) -> bool;

    /// Checks whether `id` currently holds the lock
    fn has_lock(&self, id: &str) -> bool;

    /// Checks whether anyone currently holds the lock
    fn is_held(&self) -> bool;

    /// The current holder, if any
    fn active_owner(&self) -> Option<String>;

    /// Number of pending queued requests
    fn queue_length(&self) -> usize;
}

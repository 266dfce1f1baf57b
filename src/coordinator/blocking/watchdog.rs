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
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::{AuthLockError, AuthLockResult};

/// Background sweeper thread that reclaims expired holders on an interval.
/// The sweep function returns false to stop the watchdog.
pub struct ExpiryWatchdog {
    should_stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    epoch: Arc<AtomicU32>,
}

impl ExpiryWatchdog {
    pub fn new() -> Self {
        Self {
            should_stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            epoch: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn start<F>(&mut self, sweep_interval: Duration, sweep_func: F) -> AuthLockResult<()>
    where
        F: Fn() -> bool + Send + 'static,
    {
        if sweep_interval.is_zero() {
            return Err(AuthLockError::WatchdogError(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        // Stop the previous sweeper first
        self.stop();

        self.should_stop.store(false, Ordering::SeqCst);

        // Increment the epoch so a lingering old loop exits quickly
        let current_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let should_stop = self.should_stop.clone();
        let epoch = self.epoch.clone();

        let handle = thread::spawn(move || {
            while !should_stop.load(Ordering::SeqCst) {
                if epoch.load(Ordering::SeqCst) != current_epoch {
                    break;
                }

                if !sweep_func() {
                    break;
                }

                // Sleep in slices so a stop request is observed promptly
                let mut slept = Duration::ZERO;
                while slept < sweep_interval && !should_stop.load(Ordering::SeqCst) {
                    let remaining = sweep_interval - slept;
                    let chunk = remaining.min(Duration::from_millis(100));
                    thread::sleep(chunk);
                    slept += chunk;

                    if epoch.load(Ordering::SeqCst) != current_epoch {
                        break;
                    }
                }

                if epoch.load(Ordering::SeqCst) != current_epoch {
                    break;
                }
            }
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);

        // A new epoch makes any running loop exit at its next check
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        // Reset the stop flag for the next start
        self.should_stop.store(false, Ordering::SeqCst);
    }
}

impl Default for ExpiryWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExpiryWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as TokioMutex};
use tokio::time::interval;

use crate::errors::{AuthLockError, AuthLockResult};

/// Background sweeper that reclaims expired holders on an interval. The
/// sweep function returns false to stop the watchdog.
pub struct AsyncExpiryWatchdog {
    stop_tx: Arc<TokioMutex<Option<watch::Sender<()>>>>,
    task_handle: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AsyncExpiryWatchdog {
    pub fn new() -> Self {
        Self {
            stop_tx: Arc::new(TokioMutex::new(None)),
            task_handle: TokioMutex::new(None),
        }
    }

    pub async fn start<F, Fut>(
        &mut self,
        sweep_interval: Duration,
        sweep_func: F,
    ) -> AuthLockResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if sweep_interval.is_zero() {
            return Err(AuthLockError::WatchdogError(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        // Stop the previous task first
        self.stop().await?;

        // Create a stop notification channel
        let (stop_tx, mut stop_rx) = watch::channel(());
        *self.stop_tx.lock().await = Some(stop_tx);

        let sweep_func = Arc::new(sweep_func);

        let handle = tokio::spawn({
            let sweep_func = sweep_func.clone();
            async move {
                let mut interval = interval(sweep_interval);

                // The first sweep is performed immediately
                if !sweep_func().await {
                    return;
                }

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if !sweep_func().await {
                                break;
                            }
                        }
                        _ = stop_rx.changed() => {
                            break;
                        }
                    }
                }
            }
        });

        *self.task_handle.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&mut self) -> AuthLockResult<()> {
        if let Some(stop_tx) = self.stop_tx.lock().await.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.task_handle.lock().await.take() {
            handle.await?;
        }
        Ok(())
    }
}

impl Default for AsyncExpiryWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

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

use thiserror::Error;

pub type AuthLockResult<T> = std::result::Result<T, AuthLockError>;

/// Faults only. Expected outcomes (lock busy, not the owner, wait timed
/// out, wait cancelled) are communicated as `bool`s, never as errors.
#[derive(Error, Debug)]
pub enum AuthLockError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Watchdog error: {0}")]
    WatchdogError(String),

    #[error("Async runtime error: {0}")]
    AsyncError(String),
}

impl From<tokio::task::JoinError> for AuthLockError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthLockError::AsyncError(err.to_string())
    }
}

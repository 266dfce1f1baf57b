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
use std::time::Duration;
use rand::Rng;
use uuid::Uuid;

/// Generates a unique holder id for callers that have no stable component id
pub fn generate_holder_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn num_milliseconds(duration: &Duration) -> u64 {
    duration.as_millis() as u64
}

/// Base delay plus a random jitter, used between drain grant retries
pub fn jitter_delay(base_delay: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base_delay;
    }
    let mut rng = rand::thread_rng();
    base_delay + Duration::from_millis(rng.gen_range(0..=jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_holder_id_unique() {
        assert_ne!(generate_holder_id(), generate_holder_id());
    }

    #[test]
    fn test_jitter_delay_bounds() {
        let base = Duration::from_millis(10);
        for _ in 0..100 {
            let delay = jitter_delay(base, 5);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_millis(5));
        }
        assert_eq!(jitter_delay(base, 0), base);
    }
}

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
use criterion::{criterion_group, criterion_main, Criterion};
use std::time::Duration;

use authlock::{AcquireOptions, AsyncAcquireOptions, AsyncLockCoordinator, LockCoordinator};

fn bench_blocking_try_acquire(c: &mut Criterion) {
    let coordinator = LockCoordinator::new();
    c.bench_function("blocking_try_acquire_release", |b| {
        b.iter(|| {
            assert!(coordinator.try_acquire("bench"));
            assert!(coordinator.release("bench"));
        })
    });
}

fn bench_blocking_acquire_queued(c: &mut Criterion) {
    let coordinator = LockCoordinator::new();
    c.bench_function("blocking_acquire_queued_uncontended", |b| {
        b.iter(|| {
            assert!(coordinator
                .acquire_queued("bench", AcquireOptions::new(Duration::from_secs(1), 0)));
            assert!(coordinator.release("bench"));
        })
    });
}

fn bench_async_acquire_queued(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let coordinator = AsyncLockCoordinator::new();
    c.bench_function("async_acquire_queued_uncontended", |b| {
        b.iter(|| {
            runtime.block_on(async {
                assert!(
                    coordinator
                        .acquire_queued(
                            "bench",
                            AsyncAcquireOptions::new(Duration::from_secs(1), 0),
                        )
                        .await
                );
                assert!(coordinator.release("bench"));
            })
        })
    });
}

criterion_group!(
    benches,
    bench_blocking_try_acquire,
    bench_blocking_acquire_queued,
    bench_async_acquire_queued
);
criterion_main!(benches);

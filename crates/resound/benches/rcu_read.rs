// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/update latency of the RCU container.

use criterion::{criterion_group, criterion_main, Criterion};
use resound::Rcu;
use std::hint::black_box;

fn bench_read(c: &mut Criterion) {
    let rcu = Rcu::new(vec![0.5f32; 64]);
    rcu.register_current_thread()
        .expect("Failed to register reader");

    c.bench_function("rcu_read_f32x64", |b| {
        b.iter(|| {
            rcu.read(|v| black_box(v[0]))
                .expect("Failed to read")
        })
    });
}

fn bench_update(c: &mut Criterion) {
    let rcu = Rcu::new(vec![0.5f32; 64]);

    c.bench_function("rcu_update_f32x64", |b| {
        b.iter(|| {
            rcu.update(|v| v[0] += 1.0).expect("Failed to update");
        })
    });
}

criterion_group!(benches, bench_read, bench_update);
criterion_main!(benches);

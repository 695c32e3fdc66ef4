use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netpool::base::ring::RingBuffer;
use netpool::{BufferPool, HostRegistry, MemoryStore};
use std::sync::Arc;

/// Benchmark the pure in-memory operations on the pool engine's hot path.
/// No network I/O is involved.
fn benchmark_pool_operations(c: &mut Criterion) {
    // Buffer churn: the acquire/release cycle workers run per exchange.
    let buffers = BufferPool::new();
    c.bench_function("buffer_acquire_release", |b| {
        b.iter(|| {
            let buf = buffers.acquire(black_box(8192), false);
            buffers.release(buf);
        })
    });

    c.bench_function("buffer_acquire_zeroed", |b| {
        b.iter(|| {
            let buf = buffers.acquire(black_box(8192), true);
            buffers.release(buf);
        })
    });

    // Trace-ring push at steady state (overwrite path).
    c.bench_function("ring_push", |b| {
        let mut ring = RingBuffer::new(64);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            ring.push(black_box(i));
        })
    });

    // Registry statistics (pure memory operations).
    let mut registry = HostRegistry::new("bench_hosts.bin", Arc::new(MemoryStore::new()));
    for i in 0..32 {
        registry.get_or_create(&format!("host{i}.example"));
    }
    c.bench_function("registry_stats", |b| {
        b.iter(|| {
            let _ = black_box(registry.connection_count());
            let _ = black_box(registry.idle_connection_count());
            let _ = black_box(registry.pending_request_count());
        })
    });
}

criterion_group!(benches, benchmark_pool_operations);
criterion_main!(benches);

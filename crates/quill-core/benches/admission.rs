//! Benchmarks for the admission hot path.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use quill_core::{
    ChannelConfig, ChannelRegistry, ChannelStateCache, IngestionQueue, LogRecord, Severity,
};

fn registry() -> ChannelRegistry {
    let registry = ChannelRegistry::new(ChannelConfig::default());
    registry
        .register(
            "Gameplay.Combat.Melee",
            ChannelConfig::default().with_rate_limit(1.0e9, 1.0e9),
        )
        .unwrap();
    registry
        .register("Network", ChannelConfig::default().with_enabled(false))
        .unwrap();
    registry
}

fn benchmark_can_log(c: &mut Criterion) {
    let registry = registry();

    c.bench_function("can_log_admitted", |b| {
        b.iter(|| registry.can_log(black_box("Gameplay.Combat.Melee"), Severity::Info));
    });

    c.bench_function("can_log_disabled", |b| {
        b.iter(|| registry.can_log(black_box("Network"), Severity::Critical));
    });

    c.bench_function("can_log_unknown", |b| {
        b.iter(|| registry.can_log(black_box("Nowhere"), Severity::Info));
    });
}

fn benchmark_cached_lookup(c: &mut Criterion) {
    let cache = ChannelStateCache::new(
        Arc::new(registry()),
        quill_core::cache::DEFAULT_CACHE_TTL,
    );

    c.bench_function("cache_admits", |b| {
        b.iter(|| cache.admits(black_box("Gameplay.Combat.Melee"), Severity::Warning));
    });
}

fn benchmark_enqueue(c: &mut Criterion) {
    let queue = IngestionQueue::new(1024);
    let mut batch = Vec::with_capacity(1024);

    c.bench_function("queue_push_drain_64", |b| {
        b.iter(|| {
            for i in 0..64 {
                queue.push(LogRecord::new("Gameplay", Severity::Info, black_box(format!("{i}"))));
            }
            queue.drain_into(&mut batch, 64);
            batch.clear();
        });
    });
}

criterion_group!(
    benches,
    benchmark_can_log,
    benchmark_cached_lookup,
    benchmark_enqueue,
);

criterion_main!(benches);

//! Benchmarks for batch deduplication.
//!
//! Uses the hash-based fallback embedder unless the `fastembed-embeddings`
//! feature is enabled, so numbers mostly reflect engine overhead.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_possible_wrap)]

use chrono::{TimeDelta, Utc};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use newsdedup::{
    CandidateItem, DeduplicationConfig, DeduplicationEngine, FastEmbedEmbedder, InMemoryStore,
};
use std::hint::black_box;
use std::sync::Arc;

const TOPICS: [&str; 6] = [
    "open weights model release",
    "accelerator export controls",
    "robotics startup funding round",
    "benchmark contamination study",
    "inference cost reductions",
    "agent evaluation harness",
];

/// Builds `size` items where roughly a third repeat an earlier story.
fn batch(size: usize) -> Vec<CandidateItem> {
    let now = Utc::now();
    (0..size)
        .map(|i| {
            let story = if i % 3 == 2 { i - 2 } else { i };
            let topic = TOPICS[story % TOPICS.len()];
            CandidateItem::new(
                format!("https://news.example.com/{story}"),
                format!("Story {story}: {topic}"),
                format!("Report number {story} covering {topic} in some detail."),
                "bench",
                now - TimeDelta::minutes(i as i64),
            )
        })
        .collect()
}

fn engine() -> DeduplicationEngine {
    DeduplicationEngine::new(
        Arc::new(FastEmbedEmbedder::new()),
        Arc::new(InMemoryStore::new()),
        DeduplicationConfig::default(),
    )
}

fn bench_check_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_batch");

    for size in [10, 50, 200] {
        let items = batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("fresh_engine", size), &items, |b, items| {
            b.iter_batched(
                engine,
                |engine| engine.check_batch(black_box(items), Utc::now()),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_repeat_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("repeat_batch");

    // Every item is already indexed, so only the URL stage runs.
    let items = batch(200);
    let warm = engine();
    let _ = warm.check_batch(&items, Utc::now());

    group.throughput(Throughput::Elements(items.len() as u64));
    group.bench_function("all_known", |b| {
        b.iter(|| warm.check_batch(black_box(&items), Utc::now()));
    });

    group.finish();
}

criterion_group!(benches, bench_check_batch, bench_repeat_batch);
criterion_main!(benches);

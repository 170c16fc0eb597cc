//! Offset Index Benchmarks
//!
//! ## What We Benchmark
//!
//! ### 1. Point Lookup (`bench_lookup`)
//! - Binary search over tables of 1K, 10K and 100K blobs
//! - Probes spread over the whole id range
//!
//! ### 2. Bucketing (`bench_bucket_offsets`)
//! - Partitions 1K, 10K and 100K unsorted target ids over a 10K-blob table
//! - Dominated by the target sort
//!
//! ### 3. Relation Parsing (`bench_parse_relations`)
//! - Filtered vs unfiltered decode of one block of 8K relations
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench -p nightwatch-pbf
//! cargo bench -p nightwatch-pbf --bench offset_index_bench lookup
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nightwatch_core::{ElementFilter, ElementKind, Member, Tags};
use nightwatch_pbf::{parse_relations, BlockBuilder, IndexedTagFilters, OffsetEntry, OffsetIndex};

/// Blobs of 8000 ids each, like a typical planet extract
fn way_index(blobs: i64) -> OffsetIndex {
    let entries = (0..blobs)
        .map(|i| OffsetEntry::new(i * 8_000 + 1, i * 65_536))
        .collect();
    OffsetIndex::new("bench.pbf", Vec::new(), entries, Vec::new())
}

/// Deterministic spread of ids without pulling in an RNG
fn scattered_ids(count: u64, max: i64) -> Vec<i64> {
    (0..count)
        .map(|i| (i.wrapping_mul(2_654_435_761) % max as u64) as i64)
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for blobs in [1_000i64, 10_000, 100_000] {
        let index = way_index(blobs);
        let queries = scattered_ids(1_024, blobs * 8_000);

        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(blobs), &queries, |b, queries| {
            b.iter(|| {
                for &id in queries {
                    black_box(index.lookup(ElementKind::Way, id));
                }
            });
        });
    }

    group.finish();
}

fn bench_bucket_offsets(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_offsets");
    let index = way_index(10_000);

    for targets in [1_000u64, 10_000, 100_000] {
        let ids = scattered_ids(targets, 10_000 * 8_000);

        group.throughput(Throughput::Elements(targets));
        group.bench_with_input(BenchmarkId::from_parameter(targets), &ids, |b, ids| {
            b.iter(|| black_box(index.bucket_offsets(ids.iter().copied(), ElementKind::Way)));
        });
    }

    group.finish();
}

fn bench_parse_relations(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_relations");

    let mut block = BlockBuilder::new();
    let boundary: Tags = [("boundary", "administrative"), ("admin_level", "8")]
        .into_iter()
        .collect();
    let route: Tags = [("type", "route"), ("route", "bus")].into_iter().collect();
    for id in 0..8_000i64 {
        let members = [
            Member::new(id * 3, "outer", ElementKind::Way),
            Member::new(id * 3 + 1, "inner", ElementKind::Way),
        ];
        block.relation(id, &members, if id % 10 == 0 { &boundary } else { &route });
    }
    let payload = block.encode();

    let filters = IndexedTagFilters::for_kind(
        &[ElementFilter::new(ElementKind::Relation).with_key("boundary")],
        ElementKind::Relation,
    );

    group.throughput(Throughput::Elements(8_000));
    group.bench_function("unfiltered", |b| {
        b.iter(|| black_box(parse_relations(&payload, None, None).unwrap()));
    });
    group.bench_function("boundary_filter", |b| {
        b.iter(|| black_box(parse_relations(&payload, None, filters.as_ref()).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lookup,
    bench_bucket_offsets,
    bench_parse_relations
);
criterion_main!(benches);

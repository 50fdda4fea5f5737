use approx_mpsi::cli_utils::ChannelType;
use approx_mpsi::hash_utils::HashFunction;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::{criterion_group, criterion_main};
mod time_common;
use time_common::approx_fn;

fn bench_approx_channels(c: &mut Criterion) {
    let nparties = 5;
    let hash_count = 4;
    let min_e = 6;
    let max_e = 12;

    let mut group = c.benchmark_group("approx_time");
    for e in min_e..=max_e {
        let size: usize = 1 << e;
        group.throughput(Throughput::Elements(size as u64));
        for channel_type in [ChannelType::Mailbox, ChannelType::CrossBeam, ChannelType::Unix] {
            group.bench_with_input(
                BenchmarkId::new(channel_type.to_string(), size),
                &size,
                approx_fn(nparties, hash_count, HashFunction::Blake3Xof, channel_type),
            );
        }
    }
    group.finish();
}

fn bench_approx_hash_functions(c: &mut Criterion) {
    let nparties = 5;
    let hash_count = 4;
    let size: usize = 1 << 10;

    let mut group = c.benchmark_group("approx_hash_time");
    group.throughput(Throughput::Elements(size as u64));
    for hash in HashFunction::ALL {
        group.bench_with_input(
            BenchmarkId::new(hash.to_string(), size),
            &size,
            approx_fn(nparties, hash_count, hash, ChannelType::Mailbox),
        );
    }
    group.finish();
}

criterion_group!(
    name = time_benches;
    config = Criterion::default().sample_size(10);
    targets = bench_approx_channels, bench_approx_hash_functions
);
criterion_main!(time_benches);

// cargo bench approx_time
// cargo bench approx_hash_time

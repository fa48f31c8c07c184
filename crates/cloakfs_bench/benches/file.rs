//! Encrypted file layer benchmarks.

use cloakfs_bench::pattern_data;
use cloakfs_core::{Volume, VolumeParams};
use cloakfs_storage::MemoryStore;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn bench_volume(block_size: u32, mac_bytes: u32) -> Volume {
    Volume::create(
        &VolumeParams {
            block_size_bytes: block_size,
            block_mac_bytes: mac_bytes,
            kdf_iterations: 1000,
            ..VolumeParams::default()
        },
        b"bench password",
    )
    .expect("volume creation cannot fail with fixed params")
}

/// Benchmark sequential writes through the encrypted view.
fn bench_file_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_write");
    group.sample_size(50);

    for &(block_size, mac_bytes) in [(1024u32, 0u32), (1024, 8), (4096, 8)].iter() {
        let volume = bench_volume(block_size, mac_bytes);
        let data = pattern_data(64 * 1024);

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{block_size}b_mac{mac_bytes}")),
            &data,
            |b, data| {
                b.iter(|| {
                    let file = volume.open_file(Arc::new(MemoryStore::new())).unwrap();
                    file.write(0, black_box(data)).unwrap();
                    file.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark whole-file reads through the encrypted view.
fn bench_file_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read");

    for &(block_size, mac_bytes) in [(1024u32, 0u32), (1024, 8), (4096, 8)].iter() {
        let volume = bench_volume(block_size, mac_bytes);
        let data = pattern_data(64 * 1024);

        let store = Arc::new(MemoryStore::new());
        let file = volume.open_file(store).unwrap();
        file.write(0, &data).unwrap();

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{block_size}b_mac{mac_bytes}")),
            &data.len(),
            |b, &len| {
                let mut buf = vec![0u8; len];
                b.iter(|| {
                    let got = file.read(black_box(0), &mut buf).unwrap();
                    black_box(got);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark small random-offset reads, the FUSE-style access pattern.
fn bench_random_small_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_random_read");

    let volume = bench_volume(1024, 8);
    let data = pattern_data(256 * 1024);
    let store = Arc::new(MemoryStore::new());
    let file = volume.open_file(store).unwrap();
    file.write(0, &data).unwrap();

    group.throughput(Throughput::Bytes(4096));
    group.bench_function("4k_of_256k", |b| {
        let mut buf = [0u8; 4096];
        let mut offset = 0u64;
        b.iter(|| {
            let got = file.read(black_box(offset), &mut buf).unwrap();
            offset = (offset + 37 * 1024) % (252 * 1024);
            black_box(got);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_file_write, bench_file_read, bench_random_small_reads);
criterion_main!(benches);

// Buffer pool performance benchmarks: new-page allocation, get/put
// round-trips, and eviction/migration behavior under DRAM pressure.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spitfire::buffer::{AccessMode, BufferManager};
use spitfire::config::EngineConfigBuilder;
use spitfire::wal::WalWriter;
use std::sync::Arc;
use tempfile::TempDir;

fn buffer_manager(dram_pages: usize) -> (Arc<BufferManager>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = EngineConfigBuilder::new()
        .db_path(dir.path().join("ssd"))
        .nvm_path(dir.path().join("nvm"))
        .dram_buf_num_pages(dram_pages)
        .build()
        .unwrap();
    let wal = Arc::new(WalWriter::open(dir.path().join("wal")).unwrap());
    let manager = Arc::new(BufferManager::new(&config, wal).unwrap());
    (manager, dir)
}

fn bench_new_page_get_put(c: &mut Criterion) {
    let (manager, _dir) = buffer_manager(1000);

    c.bench_function("new_page_get_put", |b| {
        b.iter(|| {
            let pid = manager.new_page().unwrap();
            let mut accessor = manager.get(black_box(pid), AccessMode::IntentWriteFull).unwrap();
            accessor.prepare_for_write(0, 8)[0] = 7;
            manager.put(accessor).unwrap();
        });
    });
}

fn bench_read_after_write(c: &mut Criterion) {
    let (manager, _dir) = buffer_manager(1000);
    let pid = manager.new_page().unwrap();
    let mut accessor = manager.get(pid, AccessMode::IntentWriteFull).unwrap();
    accessor.prepare_for_write(0, 8).copy_from_slice(&42u64.to_le_bytes());
    manager.put(accessor).unwrap();

    c.bench_function("repeated_read", |b| {
        b.iter(|| {
            let accessor = manager.get(black_box(pid), AccessMode::IntentReadFull).unwrap();
            black_box(accessor.prepare_for_read(0, 8));
            manager.put(accessor).unwrap();
        });
    });
}

fn bench_eviction_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction_under_pressure");

    for dram_pages in [8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(dram_pages), &dram_pages, |b, &dram_pages| {
            let (manager, _dir) = buffer_manager(dram_pages);
            b.iter(|| {
                for _ in 0..dram_pages * 4 {
                    let pid = manager.new_page().unwrap();
                    let mut accessor = manager.get(pid, AccessMode::IntentWriteFull).unwrap();
                    accessor.prepare_for_write(0, 8)[0] = 1;
                    manager.put(accessor).unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_access");

    for num_threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(num_threads), &num_threads, |b, &num_threads| {
            let (manager, _dir) = buffer_manager(256);
            b.iter(|| {
                let handles: Vec<_> = (0..num_threads)
                    .map(|_| {
                        let manager = manager.clone();
                        std::thread::spawn(move || {
                            for _ in 0..20 {
                                let pid = manager.new_page().unwrap();
                                let mut accessor = manager.get(pid, AccessMode::IntentWriteFull).unwrap();
                                accessor.prepare_for_write(0, 8)[0] = 3;
                                manager.put(accessor).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_new_page_get_put,
    bench_read_after_write,
    bench_eviction_under_pressure,
    bench_concurrent_access
);
criterion_main!(benches);

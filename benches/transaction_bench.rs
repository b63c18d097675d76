// Transaction management performance benchmarks: begin/commit overhead,
// insert/update throughput through the executors, and contention on a
// single hot key under MVTO.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spitfire::buffer::BufferManager;
use spitfire::config::EngineConfigBuilder;
use spitfire::executors::{Executor, InsertExecutor, PointUpdateExecutor};
use spitfire::heap::{PartitionedHeap, RecordStore};
use spitfire::index::{BTreeMapIndex, OrderedIndex};
use spitfire::txn::{MvtoManager, TupleHeaderStore};
use spitfire::wal::WalWriter;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    index: Arc<dyn OrderedIndex<u64>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let config = EngineConfigBuilder::new()
        .db_path(dir.path().join("ssd"))
        .nvm_path(dir.path().join("nvm"))
        .dram_buf_num_pages(512)
        .build()
        .unwrap();
    let wal = Arc::new(WalWriter::open(dir.path().join("wal")).unwrap());
    let buffer = Arc::new(BufferManager::new(&config, wal.clone()).unwrap());
    let header_store = Arc::new(TupleHeaderStore::new(buffer.clone()));
    let heap: Arc<dyn RecordStore> = Arc::new(PartitionedHeap::new(buffer));
    let mvto = Arc::new(MvtoManager::new(header_store, wal, None));
    let index: Arc<dyn OrderedIndex<u64>> = Arc::new(BTreeMapIndex::new());
    Fixture { index, heap, mvto, _dir: dir }
}

fn bench_begin_commit(c: &mut Criterion) {
    let fx = fixture();

    c.bench_function("begin_commit", |b| {
        b.iter(|| {
            let ctx = fx.mvto.begin();
            black_box(fx.mvto.commit(&ctx).unwrap());
        });
    });
}

fn bench_insert_throughput(c: &mut Criterion) {
    let fx = fixture();
    let mut next_key = 0u64;

    c.bench_function("insert_commit", |b| {
        b.iter(|| {
            let key = next_key;
            next_key += 1;
            let ctx = fx.mvto.begin();
            let exec = InsertExecutor::new(fx.index.clone(), fx.heap.clone(), fx.mvto.clone(), key, b"payload".to_vec());
            exec.execute(&ctx).unwrap();
            fx.mvto.commit(&ctx).unwrap();
        });
    });
}

fn bench_hot_key_update_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("hot_key_update_contention");

    for num_threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(num_threads), &num_threads, |b, &num_threads| {
            let fx = fixture();
            let ctx = fx.mvto.begin();
            InsertExecutor::new(fx.index.clone(), fx.heap.clone(), fx.mvto.clone(), 0u64, 0u64.to_le_bytes().to_vec())
                .execute(&ctx)
                .unwrap();
            fx.mvto.commit(&ctx).unwrap();

            b.iter(|| {
                let handles: Vec<_> = (0..num_threads)
                    .map(|_| {
                        let index = fx.index.clone();
                        let heap = fx.heap.clone();
                        let mvto = fx.mvto.clone();
                        std::thread::spawn(move || {
                            for _ in 0..5 {
                                let ctx = mvto.begin();
                                let update = PointUpdateExecutor::new(index.clone(), heap.clone(), mvto.clone(), 0u64, |old| {
                                    let v = u64::from_le_bytes(old.try_into().unwrap());
                                    (v + 1).to_le_bytes().to_vec()
                                });
                                if update.execute(&ctx).unwrap() {
                                    mvto.commit(&ctx).ok();
                                } else {
                                    mvto.abort(&ctx).ok();
                                }
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

criterion_group!(benches, bench_begin_commit, bench_insert_throughput, bench_hot_key_update_contention);
criterion_main!(benches);

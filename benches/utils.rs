//! 短码生成与内存存储基准测试

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use linkvault::storage::{MemoryStorage, NewUrl, Storage};
use linkvault::utils::{CodeGenerator, RandomCodeGenerator, generate_random_code};

// ============== generate_random_code 基准测试 ==============

fn bench_generate_random_code(c: &mut Criterion) {
    let mut group = c.benchmark_group("utils/generate_random_code");

    for length in [5usize, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &len| {
            b.iter(|| black_box(generate_random_code(len)));
        });
    }

    group.bench_function("trait_object", |b| {
        let generator: Arc<dyn CodeGenerator> = Arc::new(RandomCodeGenerator);
        b.iter(|| black_box(generator.generate()));
    });

    group.finish();
}

// ============== MemoryStorage 基准测试 ==============

fn bench_memory_save(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("storage/memory");

    group.bench_function("save_unique", |b| {
        let storage = MemoryStorage::new();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let url = NewUrl::new(format!("c{}", n), format!("https://bench.example/{}", n), 1);
            runtime.block_on(storage.save(url)).unwrap();
        });
    });

    group.bench_function("find_by_short_url", |b| {
        let storage = MemoryStorage::new();
        runtime
            .block_on(storage.save(NewUrl::new("bench", "https://bench.example", 1)))
            .unwrap();
        b.iter(|| {
            black_box(runtime.block_on(storage.find_by_short_url("bench")).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_generate_random_code, bench_memory_save);
criterion_main!(benches);

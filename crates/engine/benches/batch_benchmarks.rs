use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use genflow_core::{GenerationItem, GenerationRequest, ProviderKind, TaskId};
use genflow_engine::{RegistryConfig, TaskRegistry, partition};

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for len in [7usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| black_box(partition(black_box(len), 5)))
        });
    }
    group.finish();
}

fn bench_progress_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for len in [5usize, 50, 500] {
        let registry = TaskRegistry::new(RegistryConfig::default());
        let task_id = TaskId::new();
        let items: Vec<GenerationItem> = (0..len)
            .map(|i| {
                GenerationItem::from_request(
                    task_id,
                    GenerationRequest::new(format!("prompt {i}")),
                    ProviderKind::FluxKontext,
                )
            })
            .collect();
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        registry.create_task(task_id, items, 5);

        group.bench_with_input(BenchmarkId::new("mark_generating", len), &ids, |b, ids| {
            let mut progress = 0u8;
            b.iter(|| {
                progress = progress % 98 + 1;
                for id in ids {
                    let _ = registry.mark_generating(task_id, *id, progress, "polling");
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("snapshot", len), &task_id, |b, id| {
            b.iter(|| black_box(registry.snapshot(*id)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_progress_updates);
criterion_main!(benches);

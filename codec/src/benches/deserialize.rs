use super::utils::{configs, engine, ring};
use criterion::{criterion_group, Criterion};

fn bench_deserialize(c: &mut Criterion) {
    for items in [10, 100, 1_000] {
        let (heap, root) = ring(items);
        for (mode, cfg) in configs() {
            let mut engine = engine(cfg);
            let bytes = engine.serialize(&heap, &root).unwrap();
            c.bench_function(
                &format!("{}/mode={} items={}", module_path!(), mode, items),
                |b| b.iter(|| engine.deserialize(bytes.clone()).unwrap()),
            );
        }
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_deserialize
}

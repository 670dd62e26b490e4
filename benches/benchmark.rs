// Benchmarks for HFS scoring, relation sampling and the sphere training step
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use spherix::sampler::relation_samples;
use spherix::{EmbeddingTable, FidelityScorer, RelationMap};
use spherix_train::{Device, SphereTable};

fn forest(size: usize, fanout: usize) -> RelationMap {
    let roots = size.div_ceil(fanout + 1);
    let mut relations = RelationMap::new();
    for child in roots..size {
        relations.add_relation(child, &[(child - roots) % roots]);
    }
    relations
}

fn benchmark_hfs(c: &mut Criterion) {
    let mut group = c.benchmark_group("hfs");

    for size in [100, 1000, 10000].iter() {
        let relations = forest(*size, 9);
        let mut rng = StdRng::seed_from_u64(1);
        let table = EmbeddingTable::random_unit(*size, 64, &mut rng);
        group.bench_with_input(BenchmarkId::new("evaluate", size), size, |b, _| {
            let scorer = FidelityScorer::new(&relations);
            b.iter(|| black_box(scorer.evaluate(Some(&table), &mut rng).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("relation_samples");

    for size in [100, 1000].iter() {
        let relations = forest(*size, 9);
        let mut rng = StdRng::seed_from_u64(2);
        group.bench_with_input(BenchmarkId::new("k5", size), size, |b, &size| {
            b.iter(|| black_box(relation_samples(&relations, size, 5, &mut rng).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_sphere_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("sphere_step");
    group.sample_size(20);

    for dim in [16, 64, 256].iter() {
        let size = 1000;
        let relations = forest(size, 9);
        let mut rng = StdRng::seed_from_u64(3);
        let samples = relation_samples(&relations, size, 5, &mut rng).unwrap();
        let mut sphere = SphereTable::new(size, *dim, 0.01, &mut rng, &Device::Cpu).unwrap();
        group.bench_with_input(BenchmarkId::new("batch32", dim), dim, |b, _| {
            let mut batches = samples.chunks(32).cycle();
            b.iter(|| {
                let batch = batches.next().unwrap();
                black_box(sphere.step(batch, 0.1).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_hfs, benchmark_sampling, benchmark_sphere_step);
criterion_main!(benches);

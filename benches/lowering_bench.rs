use cheri_ladder::compiler::{representations, Configuration, Level};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SUM: &str = include_str!("../demos/sum.ex");
const COUNTER: &str = include_str!("../demos/counter.ex");

fn lowering_benchmark(c: &mut Criterion) {
    let configuration = Configuration::default();

    c.bench_function("lower sum to assembly", |b| {
        b.iter(|| representations(Level::EX, black_box(SUM), [Level::S], &configuration).unwrap())
    });

    c.bench_function("lower counter to basic blocks", |b| {
        b.iter(|| {
            representations(Level::EX, black_box(COUNTER), [Level::BB], &configuration).unwrap()
        })
    });

    let unoptimised = Configuration::default().with_optimise(false);
    c.bench_function("lower sum without optimisation", |b| {
        b.iter(|| representations(Level::EX, black_box(SUM), [Level::S], &unoptimised).unwrap())
    });
}

criterion_group!(benches, lowering_benchmark);
criterion_main!(benches);

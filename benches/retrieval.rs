//! Benchmarks for nearest-term retrieval.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bdi_interpreter::distance::cosine_distance;
use bdi_interpreter::llm::{LanguageModel, ScriptedModel};
use bdi_interpreter::space::{EmbeddingSpace, Subspace};
use bdi_interpreter::term::Term;

fn bench_cosine(c: &mut Criterion) {
    let a: Vec<f32> = (0..384).map(|i| (i as f32 * 0.37).sin()).collect();
    let b: Vec<f32> = (0..384).map(|i| (i as f32 * 0.11).cos()).collect();

    c.bench_function("cosine_distance_384", |bench| {
        bench.iter(|| black_box(cosine_distance(&a, &b).unwrap()))
    });
}

fn bench_find_nearest(c: &mut Criterion) {
    let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::default());
    let space = EmbeddingSpace::new(model);
    for i in 0..1000 {
        let agent = format!("agent{}", i % 10);
        let term: Term = format!("fact{i}(item{}, {})", i % 37, i).parse().unwrap();
        space.add(&agent, Subspace::Terms, &term).unwrap();
    }
    let everyone: Vec<String> = Vec::new();
    let one = vec!["agent3".to_string()];

    c.bench_function("find_nearest_1000", |bench| {
        bench.iter(|| {
            black_box(
                space
                    .find_nearest(&everyone, Subspace::Terms, "item twelve of fact 40")
                    .unwrap(),
            )
        })
    });
    c.bench_function("find_nearest_scoped_100", |bench| {
        bench.iter(|| {
            black_box(
                space
                    .find_nearest(&one, Subspace::Terms, "item twelve of fact 40")
                    .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_cosine, bench_find_nearest);
criterion_main!(benches);

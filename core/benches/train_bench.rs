/// Criterion benchmarks for per-example training cost.
///
/// Measures the forward pass and the full forward+backward step across the
/// cell variants and a hidden-size sweep.
///
/// Run: cargo bench --bench train_bench
/// Reports saved to: target/criterion/

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use retrace_core::activation::Activation;
use retrace_core::classifier::SequenceClassifier;
use retrace_core::data::Token;
use retrace_core::model::{CellKind, ClassifierConfig};

fn make_classifier(kind: CellKind, hidden: usize) -> SequenceClassifier {
    let cfg = ClassifierConfig {
        kind,
        vocab_size: 256,
        embedding_dim: 32,
        hidden_size: hidden,
        output_size: 4,
        activation: Activation::Logistic,
        learn_initial_state: true,
    };
    let mut clf = SequenceClassifier::new(cfg);
    clf.initialize_parameters(42);
    clf
}

fn make_tokens(seq_len: usize, vocab_size: usize) -> Vec<Token> {
    (0..seq_len).map(|i| Token::new(i % vocab_size)).collect()
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");
    for kind in [CellKind::Plain, CellKind::Gru, CellKind::BiGru] {
        let clf = make_classifier(kind, 64);
        let tokens = make_tokens(32, 256);
        group.bench_with_input(
            BenchmarkId::new("seq32", format!("{kind:?}")),
            &kind,
            |b, _| {
                b.iter(|| clf.forward(&tokens).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_backward");
    for hidden in [32, 64, 128] {
        let mut clf = make_classifier(CellKind::Gru, hidden);
        let tokens = make_tokens(32, 256);
        group.bench_with_input(
            BenchmarkId::new("gru", format!("h={hidden}")),
            &hidden,
            |b, _| {
                b.iter(|| {
                    let trace = clf.forward(&tokens).unwrap();
                    clf.backward(&tokens, &trace, 1, 0.01).unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_forward, bench_step);
criterion_main!(benches);

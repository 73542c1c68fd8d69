/// Online SGD training loop over a labeled dataset.
///
/// One epoch is one in-order pass over the training examples — forward,
/// loss/accuracy bookkeeping, backward — followed by forward-only sweeps
/// over the dev and test splits. No shuffling, no batching; parameters
/// move after every example. The first fatal error aborts the run.

use std::time::{Duration, Instant};

use crate::classifier::SequenceClassifier;
use crate::data::Example;
use crate::model::ModelError;

/// Metrics of one completed epoch.
#[derive(Clone, Debug)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Summed -ln p[gold] over the training sweep.
    pub total_loss: f64,
    pub train_accuracy: f64,
    pub dev_accuracy: f64,
    pub test_accuracy: f64,
    pub elapsed: Duration,
}

/// Receives training progress. Object-safe for `Box<dyn Reporter>`.
pub trait Reporter {
    /// Dev accuracy of the untrained model, measured once before epoch 1.
    fn baseline(&mut self, dev_accuracy: f64);

    fn epoch(&mut self, report: &EpochReport);
}

/// Default reporter: one line per event on stdout.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn baseline(&mut self, dev_accuracy: f64) {
        println!("Initial accuracy dev: {dev_accuracy:.4}");
    }

    fn epoch(&mut self, r: &EpochReport) {
        println!(
            "Epoch: {} Total loss: {:.4} Accuracy train: {:.4} Accuracy dev: {:.4} \
             Accuracy test: {:.4} Time: {:.1}ms",
            r.epoch,
            r.total_loss,
            r.train_accuracy,
            r.dev_accuracy,
            r.test_accuracy,
            r.elapsed.as_secs_f64() * 1000.0,
        );
    }
}

/// Forward-only accuracy over a split. An empty split scores 0.
pub fn evaluate(clf: &SequenceClassifier, data: &[Example]) -> Result<f64, ModelError> {
    if data.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for ex in data {
        if clf.predict(&ex.tokens)? == ex.label {
            correct += 1;
        }
    }
    Ok(correct as f64 / data.len() as f64)
}

fn train_epoch(
    clf: &mut SequenceClassifier,
    train_set: &[Example],
    dev_set: &[Example],
    test_set: &[Example],
    epoch: usize,
    learning_rate: f64,
) -> Result<EpochReport, ModelError> {
    let start = Instant::now();
    let mut total_loss = 0.0f64;
    let mut correct = 0usize;

    for ex in train_set {
        let trace = clf.forward(&ex.tokens)?;
        total_loss += trace.loss(ex.label);
        if trace.prediction() == ex.label {
            correct += 1;
        }
        clf.backward(&ex.tokens, &trace, ex.label, learning_rate)?;
    }

    let train_accuracy = if train_set.is_empty() {
        0.0
    } else {
        correct as f64 / train_set.len() as f64
    };
    let dev_accuracy = evaluate(clf, dev_set)?;
    let test_accuracy = evaluate(clf, test_set)?;

    Ok(EpochReport {
        epoch,
        total_loss,
        train_accuracy,
        dev_accuracy,
        test_accuracy,
        elapsed: start.elapsed(),
    })
}

/// Train for `num_epochs` full passes, reporting the untrained dev
/// baseline first and one report per epoch. Returns the per-epoch reports.
pub fn train(
    clf: &mut SequenceClassifier,
    train_set: &[Example],
    dev_set: &[Example],
    test_set: &[Example],
    num_epochs: usize,
    learning_rate: f64,
    reporter: &mut dyn Reporter,
) -> Result<Vec<EpochReport>, ModelError> {
    reporter.baseline(evaluate(clf, dev_set)?);

    let mut reports = Vec::with_capacity(num_epochs);
    for epoch in 0..num_epochs {
        let report = train_epoch(clf, train_set, dev_set, test_set, epoch + 1, learning_rate)?;
        reporter.epoch(&report);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellKind, ClassifierConfig};
    use crate::tensor::SimpleRng;

    struct SilentReporter {
        baseline: Option<f64>,
        epochs: usize,
    }

    impl SilentReporter {
        fn new() -> Self {
            SilentReporter { baseline: None, epochs: 0 }
        }
    }

    impl Reporter for SilentReporter {
        fn baseline(&mut self, dev_accuracy: f64) {
            self.baseline = Some(dev_accuracy);
        }
        fn epoch(&mut self, _report: &EpochReport) {
            self.epochs += 1;
        }
    }

    /// Separable toy task: label 1 iff the sequence contains word 0.
    fn synthetic_split(rng: &mut SimpleRng, n: usize, vocab: usize) -> Vec<Example> {
        (0..n)
            .map(|_| {
                let len = 2 + rng.next_below(4);
                let ids: Vec<usize> = (0..len).map(|_| rng.next_below(vocab)).collect();
                let label = usize::from(ids.contains(&0));
                Example::new(&ids, label)
            })
            .collect()
    }

    fn toy_classifier(kind: CellKind) -> SequenceClassifier {
        let cfg = ClassifierConfig {
            kind,
            vocab_size: 6,
            embedding_dim: 4,
            hidden_size: 8,
            output_size: 2,
            activation: crate::activation::Activation::Logistic,
            learn_initial_state: true,
        };
        let mut clf = SequenceClassifier::new(cfg);
        clf.initialize_parameters(42);
        clf
    }

    #[test]
    fn test_train_reports_baseline_and_epochs() {
        let mut rng = SimpleRng::new(5);
        let train_set = synthetic_split(&mut rng, 30, 6);
        let dev_set = synthetic_split(&mut rng, 10, 6);
        let mut clf = toy_classifier(CellKind::Plain);
        let mut reporter = SilentReporter::new();

        let reports = train(&mut clf, &train_set, &dev_set, &[], 3, 0.1, &mut reporter).unwrap();

        assert!(reporter.baseline.is_some());
        assert_eq!(reporter.epochs, 3);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].epoch, 1);
        assert_eq!(reports[2].epoch, 3);
        // Empty test split scores 0, not NaN.
        assert_eq!(reports[0].test_accuracy, 0.0);
    }

    #[test]
    fn test_training_reduces_loss_on_separable_task() {
        let mut rng = SimpleRng::new(17);
        let train_set = synthetic_split(&mut rng, 60, 6);
        let dev_set = synthetic_split(&mut rng, 20, 6);

        for kind in [CellKind::Plain, CellKind::Gru] {
            let mut clf = toy_classifier(kind);
            let mut reporter = SilentReporter::new();
            let reports =
                train(&mut clf, &train_set, &dev_set, &dev_set, 12, 0.2, &mut reporter).unwrap();

            let first = reports.first().unwrap().total_loss;
            let last = reports.last().unwrap().total_loss;
            assert!(
                last < first,
                "{kind:?}: loss did not decrease ({first:.4} -> {last:.4})"
            );
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let mut rng = SimpleRng::new(23);
        let train_set = synthetic_split(&mut rng, 25, 6);
        let dev_set = synthetic_split(&mut rng, 10, 6);

        let run = || {
            let mut clf = toy_classifier(CellKind::Gru);
            let mut reporter = SilentReporter::new();
            let reports =
                train(&mut clf, &train_set, &dev_set, &[], 4, 0.1, &mut reporter).unwrap();
            let metrics: Vec<(f64, f64, f64)> = reports
                .iter()
                .map(|r| (r.total_loss, r.train_accuracy, r.dev_accuracy))
                .collect();
            (clf.params, metrics)
        };

        let (params_a, metrics_a) = run();
        let (params_b, metrics_b) = run();
        assert_eq!(params_a, params_b);
        assert_eq!(metrics_a, metrics_b);
    }

    #[test]
    fn test_invalid_example_aborts_training() {
        let mut clf = toy_classifier(CellKind::Plain);
        let train_set = vec![Example::new(&[0, 99], 0)];
        let mut reporter = SilentReporter::new();
        let err = train(&mut clf, &train_set, &[], &[], 1, 0.1, &mut reporter).unwrap_err();
        assert!(matches!(err, ModelError::InvalidTokenId { .. }));
    }

    #[test]
    fn test_evaluate_empty_split_is_zero() {
        let clf = toy_classifier(CellKind::Plain);
        assert_eq!(evaluate(&clf, &[]).unwrap(), 0.0);
    }
}

/// Sequence classifier: one training surface over the interchangeable cell
/// variants.
///
/// The cell kind is fixed at construction and dispatched by enum match; the
/// training loop never sees which variant runs. Forward is pure and returns
/// a `Trace`; the paired backward consumes it, so finite-difference checks
/// can re-run forward without snapshotting any hidden state.

use crate::bigru;
use crate::data::Token;
use crate::elman;
use crate::gru;
use crate::model::{
    CellGrads, CellParams, CellKind, ClassifierConfig, ModelError, ParamRegistry, ParamStore,
    initialize_registry, load_registry,
};
use crate::tensor::argmax_f64;

/// Per-example forward trace, one variant per cell kind. Allocated by each
/// forward pass, read by the paired backward, superseded by the next
/// example.
pub enum Trace {
    Plain(elman::PlainTrace),
    Gru(gru::GruTrace),
    BiGru(bigru::BiGruTrace),
}

impl Trace {
    /// Class probabilities of the example, summing to 1.
    pub fn probabilities(&self) -> &[f64] {
        match self {
            Trace::Plain(t) => &t.probs,
            Trace::Gru(t) => &t.probs,
            Trace::BiGru(t) => &t.probs,
        }
    }

    /// Unnormalized class scores.
    pub fn logits(&self) -> &[f64] {
        match self {
            Trace::Plain(t) => &t.logits,
            Trace::Gru(t) => &t.logits,
            Trace::BiGru(t) => &t.logits,
        }
    }

    /// Predicted label: argmax of the probabilities, lowest index on ties.
    pub fn prediction(&self) -> usize {
        argmax_f64(self.probabilities())
    }

    /// Negative log-probability of the gold label.
    pub fn loss(&self, label: usize) -> f64 {
        -self.probabilities()[label].ln()
    }
}

/// A recurrent sequence classifier with its parameters.
#[derive(Clone)]
pub struct SequenceClassifier {
    cfg: ClassifierConfig,
    pub params: CellParams,
}

impl SequenceClassifier {
    /// Allocate a classifier with zeroed parameters. Call
    /// `initialize_parameters` or `load_parameters` before training.
    pub fn new(cfg: ClassifierConfig) -> Self {
        assert!(cfg.vocab_size >= 1, "vocab_size must be at least 1");
        assert!(cfg.embedding_dim >= 1, "embedding_dim must be at least 1");
        assert!(cfg.hidden_size >= 1, "hidden_size must be at least 1");
        assert!(cfg.output_size >= 1, "output_size must be at least 1");
        let params = CellParams::zeros(&cfg);
        SequenceClassifier { cfg, params }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.cfg
    }

    /// Reallocate every parameter tensor (zeroed) and return the named
    /// registry over them.
    pub fn collect_parameters(&mut self) -> ParamRegistry<'_> {
        self.params.collect(&self.cfg)
    }

    /// Collect, then fill weights with scaled-uniform values and zero the
    /// bias/state vectors. Deterministic for a fixed seed.
    pub fn initialize_parameters(&mut self, seed: u64) {
        let activation = self.cfg.activation;
        initialize_registry(self.params.collect(&self.cfg), activation, seed);
    }

    /// Collect, then fill every named tensor from the store.
    pub fn load_parameters(&mut self, store: &dyn ParamStore) -> Result<(), ModelError> {
        load_registry(self.params.collect(&self.cfg), store)
    }

    /// Run the forward pass. Rejects empty sequences — there is no final
    /// timestep to read the class scores from.
    pub fn forward(&self, tokens: &[Token]) -> Result<Trace, ModelError> {
        if tokens.is_empty() {
            return Err(ModelError::EmptySequence);
        }
        match self.cfg.kind {
            CellKind::Plain => elman::forward(&self.params, &self.cfg, tokens).map(Trace::Plain),
            CellKind::Gru => gru::forward(&self.params, &self.cfg, tokens).map(Trace::Gru),
            CellKind::BiGru => bigru::forward(&self.params, &self.cfg, tokens).map(Trace::BiGru),
        }
    }

    /// BPTT over a forward trace, without applying anything. The trace must
    /// come from this classifier's own forward pass for the same tokens.
    pub fn gradients(&self, tokens: &[Token], trace: &Trace, label: usize) -> CellGrads {
        assert!(
            label < self.cfg.output_size,
            "label {label} outside {} classes",
            self.cfg.output_size
        );
        match (self.cfg.kind, trace) {
            (CellKind::Plain, Trace::Plain(t)) => {
                elman::backward(&self.params, &self.cfg, t, tokens, label)
            }
            (CellKind::Gru, Trace::Gru(t)) => {
                gru::backward(&self.params, &self.cfg, t, tokens, label)
            }
            (CellKind::BiGru, Trace::BiGru(t)) => {
                bigru::backward(&self.params, &self.cfg, t, tokens, label)
            }
            _ => panic!("trace does not match cell kind {:?}", self.cfg.kind),
        }
    }

    /// One online SGD step: BPTT, dense parameter update, then the sparse
    /// per-position embedding update.
    pub fn backward(
        &mut self,
        tokens: &[Token],
        trace: &Trace,
        label: usize,
        learning_rate: f64,
    ) -> Result<(), ModelError> {
        let grads = self.gradients(tokens, trace, label);
        self.params.apply_gradients(&grads, learning_rate);
        self.params.lookup.apply_gradients(tokens, &grads.dx, learning_rate);
        Ok(())
    }

    /// Forward-only classification.
    pub fn predict(&self, tokens: &[Token]) -> Result<usize, ModelError> {
        Ok(self.forward(tokens)?.prediction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Example;

    fn classifier(cfg: ClassifierConfig) -> SequenceClassifier {
        let mut clf = SequenceClassifier::new(cfg);
        clf.initialize_parameters(42);
        clf
    }

    #[test]
    fn test_rejects_empty_sequence() {
        let clf = classifier(ClassifierConfig::test_config());
        assert!(matches!(clf.forward(&[]), Err(ModelError::EmptySequence)));
        assert!(matches!(clf.predict(&[]), Err(ModelError::EmptySequence)));
    }

    #[test]
    fn test_probabilities_normalized_for_every_kind() {
        for cfg in [
            ClassifierConfig::test_config(),
            ClassifierConfig::gru_test_config(),
            ClassifierConfig::bigru_test_config(),
        ] {
            let clf = classifier(cfg);
            let ex = Example::new(&[0, 3, 1], 0);
            let trace = clf.forward(&ex.tokens).unwrap();
            let sum: f64 = trace.probabilities().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum {sum}");
            assert!(trace.probabilities().iter().all(|&p| p > 0.0));
            assert!(trace.prediction() < clf.config().output_size);
        }
    }

    #[test]
    fn test_loss_is_negative_log_probability() {
        let clf = classifier(ClassifierConfig::test_config());
        let ex = Example::new(&[1, 2], 1);
        let trace = clf.forward(&ex.tokens).unwrap();
        let expected = -trace.probabilities()[1].ln();
        assert_eq!(trace.loss(1), expected);
        assert!(trace.loss(1) > 0.0);
    }

    #[test]
    fn test_backward_moves_parameters() {
        for cfg in [
            ClassifierConfig::test_config(),
            ClassifierConfig::gru_test_config(),
            ClassifierConfig::bigru_test_config(),
        ] {
            let mut clf = classifier(cfg);
            let before = clf.params.clone();
            let ex = Example::new(&[0, 1], 0);
            let trace = clf.forward(&ex.tokens).unwrap();
            clf.backward(&ex.tokens, &trace, ex.label, 0.1).unwrap();
            assert_ne!(before, clf.params);
        }
    }

    #[test]
    fn test_end_to_end_single_step_update() {
        // V=3, D=2, H=2, C=2; sequence [0, 1], label 0, rate 0.1. One
        // forward+backward must move Why, Wxh, Whh, bh, by and the
        // embedding rows for ids 0 and 1 — and nothing else in the table.
        let cfg = ClassifierConfig {
            kind: CellKind::Plain,
            vocab_size: 3,
            embedding_dim: 2,
            hidden_size: 2,
            output_size: 2,
            activation: crate::activation::Activation::Logistic,
            learn_initial_state: true,
        };
        let mut clf = SequenceClassifier::new(cfg);
        clf.initialize_parameters(1234);
        let before = clf.params.clone();
        let ex = Example::new(&[0, 1], 0);

        let trace = clf.forward(&ex.tokens).unwrap();
        let sum: f64 = trace.probabilities().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "pre-step probabilities sum to {sum}");

        clf.backward(&ex.tokens, &trace, ex.label, 0.1).unwrap();

        assert_ne!(before.fwd.why, clf.params.fwd.why);
        assert_ne!(before.fwd.wxh, clf.params.fwd.wxh);
        assert_ne!(before.fwd.whh, clf.params.fwd.whh);
        assert_ne!(before.fwd.bh, clf.params.fwd.bh);
        assert_ne!(before.by, clf.params.by);

        let table_before = &before.lookup.table;
        let table_after = &clf.params.lookup.table;
        // Rows for ids 0 and 1 (rows 1 and 2) moved; the reserved row and
        // the row for id 2 are bit-identical.
        assert_ne!(table_before.row(1), table_after.row(1));
        assert_ne!(table_before.row(2), table_after.row(2));
        assert_eq!(table_before.row(0), table_after.row(0));
        assert_eq!(table_before.row(3), table_after.row(3));
    }

    #[test]
    fn test_deterministic_training_trajectory() {
        let examples = [
            Example::new(&[0, 1, 2], 0),
            Example::new(&[3, 2], 1),
            Example::new(&[1, 1, 4], 0),
        ];
        let run = || {
            let mut clf = classifier(ClassifierConfig::gru_test_config());
            for ex in &examples {
                let trace = clf.forward(&ex.tokens).unwrap();
                clf.backward(&ex.tokens, &trace, ex.label, 0.05).unwrap();
            }
            clf.params
        };
        assert_eq!(run(), run());
    }

    #[test]
    #[should_panic(expected = "trace does not match cell kind")]
    fn test_mismatched_trace_panics() {
        let plain = classifier(ClassifierConfig::test_config());
        let gated = classifier(ClassifierConfig::gru_test_config());
        let ex = Example::new(&[0, 1], 0);
        let trace = plain.forward(&ex.tokens).unwrap();
        gated.gradients(&ex.tokens, &trace, 0);
    }
}

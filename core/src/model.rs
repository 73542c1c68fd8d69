/// Classifier configuration, parameter tensors, and the named-parameter
/// registry shared by every cell variant.
///
/// All weights are flat f64 tensors in row-major layout, grouped per
/// recurrence direction. Tensors a variant does not use stay empty
/// (numel 0) so one struct serves the plain, gated, and bidirectional
/// cells uniformly; the registry exposes only the allocated ones.

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::activation::{Activation, init_gain};
use crate::lookup::LookupTable;
use crate::tensor::{Tensor, SimpleRng, axpy_f64};

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Token id outside the embedding range. Fatal for the example.
    InvalidTokenId { position: usize, word: usize, vocab_size: usize },
    /// A stored tensor disagrees with the shape declared at construction.
    ShapeMismatch { name: String, expected: Vec<usize>, found: Vec<usize> },
    /// The store has no tensor under a required name.
    MissingParameter { name: String },
    /// Zero-length input: there is no final timestep to read out from.
    EmptySequence,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidTokenId { position, word, vocab_size } => {
                write!(f, "token id {word} at position {position} outside vocabulary of {vocab_size}")
            }
            ModelError::ShapeMismatch { name, expected, found } => {
                write!(f, "parameter {name}: expected shape {expected:?}, found {found:?}")
            }
            ModelError::MissingParameter { name } => {
                write!(f, "parameter {name} not present in store")
            }
            ModelError::EmptySequence => {
                write!(f, "empty input sequence")
            }
        }
    }
}

impl std::error::Error for ModelError {}

// ── Configuration ────────────────────────────────────────────────────

/// Which recurrent cell the classifier runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Plain,
    Gru,
    BiGru,
}

impl CellKind {
    /// Whether the cell carries update/reset gates.
    pub fn gated(self) -> bool {
        !matches!(self, CellKind::Plain)
    }

    /// Whether a right-to-left recurrence runs alongside the left-to-right one.
    pub fn bidirectional(self) -> bool {
        matches!(self, CellKind::BiGru)
    }
}

/// Model configuration — immutable after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub kind: CellKind,
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    /// Nonlinearity of the hidden update (gates are always logistic).
    pub activation: Activation,
    /// Learn the initial hidden state h0 instead of starting from zero.
    pub learn_initial_state: bool,
}

impl ClassifierConfig {
    /// Test configuration: tiny plain cell for gradient checking.
    pub fn test_config() -> Self {
        ClassifierConfig {
            kind: CellKind::Plain,
            vocab_size: 8,
            embedding_dim: 2,
            hidden_size: 3,
            output_size: 2,
            activation: Activation::Logistic,
            learn_initial_state: true,
        }
    }

    /// Test configuration: tiny gated cell.
    pub fn gru_test_config() -> Self {
        ClassifierConfig {
            kind: CellKind::Gru,
            ..Self::test_config()
        }
    }

    /// Test configuration: tiny bidirectional gated cell.
    pub fn bigru_test_config() -> Self {
        ClassifierConfig {
            kind: CellKind::BiGru,
            ..Self::test_config()
        }
    }
}

// ── Per-direction parameters ─────────────────────────────────────────

/// Weights of one recurrence direction.
///
/// Layout:
///   wxh: [H, D] input → hidden        whh: [H, H] hidden → hidden
///   why: [C, H] hidden → output       bh:  [H]
///   h0:  [H] learned initial state (empty when disabled)
///   wxz/whz/bz, wxr/whr/br: update and reset gates (empty for the plain cell)
///
/// The same struct doubles as its own gradient shadow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionParams {
    pub wxh: Tensor,
    pub whh: Tensor,
    pub why: Tensor,
    pub bh: Tensor,
    pub h0: Tensor,
    pub wxz: Tensor,
    pub whz: Tensor,
    pub bz: Tensor,
    pub wxr: Tensor,
    pub whr: Tensor,
    pub br: Tensor,
}

/// Registry names for one direction. The reverse direction carries its own
/// store keys (Wxl/Wll/Wly/... and the `_r` gate names).
struct DirectionNames {
    wxh: &'static str,
    whh: &'static str,
    why: &'static str,
    bh: &'static str,
    h0: &'static str,
    wxz: &'static str,
    whz: &'static str,
    bz: &'static str,
    wxr: &'static str,
    whr: &'static str,
    br: &'static str,
}

const LEFT_TO_RIGHT: DirectionNames = DirectionNames {
    wxh: "Wxh", whh: "Whh", why: "Why", bh: "bh", h0: "h0",
    wxz: "Wxz", whz: "Whz", bz: "bz", wxr: "Wxr", whr: "Whr", br: "br",
};

const RIGHT_TO_LEFT: DirectionNames = DirectionNames {
    wxh: "Wxl", whh: "Wll", why: "Wly", bh: "bl", h0: "l0",
    wxz: "Wxz_r", whz: "Wlz", bz: "bz_r", wxr: "Wxr_r", whr: "Wlr", br: "br_r",
};

impl DirectionParams {
    /// Allocate every tensor this direction uses, zeroed, at its
    /// shape-from-construction.
    pub fn zeros(cfg: &ClassifierConfig) -> Self {
        let h = cfg.hidden_size;
        let d = cfg.embedding_dim;
        let c = cfg.output_size;
        let gated = cfg.kind.gated();

        let gate_w_x = || if gated { Tensor::zeros(&[h, d]) } else { Tensor::empty() };
        let gate_w_h = || if gated { Tensor::zeros(&[h, h]) } else { Tensor::empty() };
        let gate_b = || if gated { Tensor::zeros(&[h]) } else { Tensor::empty() };

        DirectionParams {
            wxh: Tensor::zeros(&[h, d]),
            whh: Tensor::zeros(&[h, h]),
            why: Tensor::zeros(&[c, h]),
            bh: Tensor::zeros(&[h]),
            h0: if cfg.learn_initial_state { Tensor::zeros(&[h]) } else { Tensor::empty() },
            wxz: gate_w_x(),
            whz: gate_w_h(),
            bz: gate_b(),
            wxr: gate_w_x(),
            whr: gate_w_h(),
            br: gate_b(),
        }
    }

    fn names(reverse: bool) -> &'static DirectionNames {
        if reverse { &RIGHT_TO_LEFT } else { &LEFT_TO_RIGHT }
    }

    fn push_named<'p>(
        &'p mut self,
        reverse: bool,
        weights: &mut Vec<(&'static str, &'p mut Tensor)>,
        biases: &mut Vec<(&'static str, &'p mut Tensor)>,
    ) {
        let n = Self::names(reverse);
        weights.push((n.wxh, &mut self.wxh));
        weights.push((n.whh, &mut self.whh));
        weights.push((n.why, &mut self.why));
        if self.wxz.numel() > 0 {
            weights.push((n.wxz, &mut self.wxz));
            weights.push((n.whz, &mut self.whz));
            weights.push((n.wxr, &mut self.wxr));
            weights.push((n.whr, &mut self.whr));
        }
        biases.push((n.bh, &mut self.bh));
        if self.h0.numel() > 0 {
            biases.push((n.h0, &mut self.h0));
        }
        if self.bz.numel() > 0 {
            biases.push((n.bz, &mut self.bz));
            biases.push((n.br, &mut self.br));
        }
    }

    fn push_named_ref<'p>(&'p self, reverse: bool, out: &mut Vec<(&'static str, &'p Tensor)>) {
        let n = Self::names(reverse);
        out.push((n.wxh, &self.wxh));
        out.push((n.whh, &self.whh));
        out.push((n.why, &self.why));
        if self.wxz.numel() > 0 {
            out.push((n.wxz, &self.wxz));
            out.push((n.whz, &self.whz));
            out.push((n.wxr, &self.wxr));
            out.push((n.whr, &self.whr));
        }
        out.push((n.bh, &self.bh));
        if self.h0.numel() > 0 {
            out.push((n.h0, &self.h0));
        }
        if self.bz.numel() > 0 {
            out.push((n.bz, &self.bz));
            out.push((n.br, &self.br));
        }
    }

    /// SGD step: tensor -= rate * grad for every allocated tensor.
    pub fn apply_gradients(&mut self, grads: &DirectionParams, rate: f64) {
        fn step(param: &mut Tensor, grad: &Tensor, rate: f64) {
            if param.numel() > 0 {
                axpy_f64(-rate, &grad.data, &mut param.data);
            }
        }
        step(&mut self.wxh, &grads.wxh, rate);
        step(&mut self.whh, &grads.whh, rate);
        step(&mut self.why, &grads.why, rate);
        step(&mut self.bh, &grads.bh, rate);
        step(&mut self.h0, &grads.h0, rate);
        step(&mut self.wxz, &grads.wxz, rate);
        step(&mut self.whz, &grads.whz, rate);
        step(&mut self.bz, &grads.bz, rate);
        step(&mut self.wxr, &grads.wxr, rate);
        step(&mut self.whr, &grads.whr, rate);
        step(&mut self.br, &grads.br, rate);
    }

    pub fn num_params(&self) -> usize {
        self.wxh.numel() + self.whh.numel() + self.why.numel()
            + self.bh.numel() + self.h0.numel()
            + self.wxz.numel() + self.whz.numel() + self.bz.numel()
            + self.wxr.numel() + self.whr.numel() + self.br.numel()
    }
}

// ── Full parameter set ───────────────────────────────────────────────

/// Every learnable tensor of the classifier: the shared embedding table,
/// the left-to-right direction, optionally the right-to-left direction,
/// and the shared output bias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellParams {
    pub lookup: LookupTable,
    pub fwd: DirectionParams,
    pub rev: Option<DirectionParams>,
    pub by: Tensor,
}

/// Named references to every allocated parameter tensor, weights and
/// bias/state vectors in two parallel lists. Rebuilt on each collection;
/// names are unique and stable for a fixed cell kind and double as the
/// on-disk store keys.
pub struct ParamRegistry<'p> {
    pub weights: Vec<(&'static str, &'p mut Tensor)>,
    pub biases: Vec<(&'static str, &'p mut Tensor)>,
}

impl CellParams {
    /// Allocate all tensors for `cfg`, zeroed.
    pub fn zeros(cfg: &ClassifierConfig) -> Self {
        CellParams {
            lookup: LookupTable::new(cfg.vocab_size, cfg.embedding_dim),
            fwd: DirectionParams::zeros(cfg),
            rev: if cfg.kind.bidirectional() {
                Some(DirectionParams::zeros(cfg))
            } else {
                None
            },
            by: Tensor::zeros(&[cfg.output_size]),
        }
    }

    /// Reallocate every tensor to its shape-from-construction (zeroed) and
    /// return the registry over the fresh tensors. Shape-idempotent;
    /// resets values.
    pub fn collect(&mut self, cfg: &ClassifierConfig) -> ParamRegistry<'_> {
        *self = CellParams::zeros(cfg);
        self.registry()
    }

    /// Registry over the current tensors, without reallocating.
    pub fn registry(&mut self) -> ParamRegistry<'_> {
        let CellParams { lookup, fwd, rev, by } = self;
        let mut weights: Vec<(&'static str, &mut Tensor)> =
            vec![("embeddings", &mut lookup.table)];
        let mut biases: Vec<(&'static str, &mut Tensor)> = Vec::new();
        fwd.push_named(false, &mut weights, &mut biases);
        if let Some(rev) = rev {
            rev.push_named(true, &mut weights, &mut biases);
        }
        biases.push(("by", by));
        ParamRegistry { weights, biases }
    }

    /// Immutable name → tensor view (store export, diagnostics).
    pub fn named_tensors(&self) -> Vec<(&'static str, &Tensor)> {
        let mut out: Vec<(&'static str, &Tensor)> = vec![("embeddings", &self.lookup.table)];
        self.fwd.push_named_ref(false, &mut out);
        if let Some(rev) = &self.rev {
            rev.push_named_ref(true, &mut out);
        }
        out.push(("by", &self.by));
        out
    }

    pub fn num_params(&self) -> usize {
        self.lookup.table.numel()
            + self.fwd.num_params()
            + self.rev.as_ref().map_or(0, |r| r.num_params())
            + self.by.numel()
    }

    /// SGD step over every dense tensor. Embedding rows are updated
    /// separately through `LookupTable::apply_gradients` since only the
    /// rows touched by the current sequence carry gradient.
    pub fn apply_gradients(&mut self, grads: &CellGrads, rate: f64) {
        self.fwd.apply_gradients(&grads.fwd, rate);
        if let (Some(rev), Some(rev_grads)) = (self.rev.as_mut(), grads.rev.as_ref()) {
            rev.apply_gradients(rev_grads, rate);
        }
        axpy_f64(-rate, &grads.by.data, &mut self.by.data);
    }
}

/// Gradient shadow of `CellParams` for one example, plus the gradient into
/// the embedded inputs (the lookup layer's per-position update vector).
pub struct CellGrads {
    pub fwd: DirectionParams,
    pub rev: Option<DirectionParams>,
    pub by: Tensor,
    /// [T, D] gradient into X; applied row-by-row to the embedding table.
    pub dx: Tensor,
}

impl CellGrads {
    /// Immutable name → gradient view, mirroring the parameter registry
    /// names. The embedding gradient is not dense — it lives in `dx` and
    /// the token list — so there is no "embeddings" entry.
    pub fn named_tensors(&self) -> Vec<(&'static str, &Tensor)> {
        let mut out: Vec<(&'static str, &Tensor)> = Vec::new();
        self.fwd.push_named_ref(false, &mut out);
        if let Some(rev) = &self.rev {
            rev.push_named_ref(true, &mut out);
        }
        out.push(("by", &self.by));
        out
    }

    pub fn zeros(cfg: &ClassifierConfig, seq_len: usize) -> Self {
        CellGrads {
            fwd: DirectionParams::zeros(cfg),
            rev: if cfg.kind.bidirectional() {
                Some(DirectionParams::zeros(cfg))
            } else {
                None
            },
            by: Tensor::zeros(&[cfg.output_size]),
            dx: Tensor::zeros(&[seq_len, cfg.embedding_dim]),
        }
    }
}

// ── Initialization ───────────────────────────────────────────────────

/// Fill every weight matrix with scaled-uniform values,
/// max = gain * sqrt(6 / (fan_in + fan_out)), and zero every bias/state
/// vector. Deterministic for a fixed seed.
pub fn initialize_registry(registry: ParamRegistry<'_>, activation: Activation, seed: u64) {
    let gain = init_gain(activation);
    let mut rng = SimpleRng::new(seed);
    for (_, w) in registry.weights {
        let fan_out = w.rows();
        let fan_in = w.cols();
        let max = gain * (6.0 / (fan_in + fan_out) as f64).sqrt();
        rng.fill_uniform(&mut w.data, max);
    }
    // Biases and initial states stay at their zero allocation.
}

// ── Named-parameter store ────────────────────────────────────────────

/// External store of tensors keyed by registry name.
pub trait ParamStore {
    fn load(&self, name: &str) -> Option<Tensor>;
}

/// JSON-backed store: one file holding a name → tensor map.
#[derive(Default, Serialize, Deserialize)]
pub struct JsonParamStore {
    entries: BTreeMap<String, Tensor>,
}

impl JsonParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, tensor: Tensor) {
        self.entries.insert(name.to_string(), tensor);
    }

    /// Snapshot every named tensor of a parameter set.
    pub fn from_params(params: &CellParams) -> Self {
        let mut store = Self::new();
        for (name, t) in params.named_tensors() {
            store.insert(name, t.clone());
        }
        store
    }

    pub fn open(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

impl ParamStore for JsonParamStore {
    fn load(&self, name: &str) -> Option<Tensor> {
        self.entries.get(name).cloned()
    }
}

/// Fill a freshly collected registry from a store, validating shapes.
pub fn load_registry(registry: ParamRegistry<'_>, store: &dyn ParamStore) -> Result<(), ModelError> {
    for (name, t) in registry.weights.into_iter().chain(registry.biases) {
        let loaded = store
            .load(name)
            .ok_or_else(|| ModelError::MissingParameter { name: name.to_string() })?;
        let expected_len: usize = loaded.shape.iter().product();
        if loaded.shape != t.shape || loaded.data.len() != expected_len {
            return Err(ModelError::ShapeMismatch {
                name: name.to_string(),
                expected: t.shape.clone(),
                found: loaded.shape,
            });
        }
        *t = loaded;
    }
    Ok(())
}

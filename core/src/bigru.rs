/// Bidirectional gated cell: two independent gated recurrences over one
/// shared embedding — left-to-right states H and right-to-left states L,
/// each with its own weights and initial state.
///
/// The classifier readout sums both directions' terminal states into one
/// projection: y = Why·h[T-1] + Wly·l[0] + by. Backward runs each
/// direction's own sweep; the two meet only in the shared dX accumulation.

use crate::data::Token;
use crate::gru::{GatedTrace, gated_sweep, gated_sweep_backward};
use crate::model::{CellGrads, CellParams, ClassifierConfig, ModelError};
use crate::tensor::{
    Tensor, add_acc_f64, log_sum_exp_f64, matvec_acc_f64, matvec_f64, matvec_t_acc_f64,
    outer_acc_f64,
};

/// Full trace of a bidirectional forward pass.
pub struct BiGruTrace {
    /// Embedded input: [T, D], shared by both directions.
    pub x: Tensor,
    /// Left-to-right direction (states H).
    pub ltr: GatedTrace,
    /// Right-to-left direction (states L).
    pub rtl: GatedTrace,
    /// Final class scores: [C]
    pub logits: Vec<f64>,
    /// Final class probabilities: [C]
    pub probs: Vec<f64>,
}

fn rev_params(params: &CellParams) -> &crate::model::DirectionParams {
    params
        .rev
        .as_ref()
        .expect("bidirectional cell requires reverse-direction parameters")
}

/// Run both recurrences and the combined readout.
pub(crate) fn forward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    tokens: &[Token],
) -> Result<BiGruTrace, ModelError> {
    debug_assert!(!tokens.is_empty());
    let x = params.lookup.lookup(tokens)?;
    let ltr = gated_sweep(&params.fwd, cfg, &x, false);
    let rtl = gated_sweep(rev_params(params), cfg, &x, true);

    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let c = cfg.output_size;
    // Each direction contributes its terminal state: the left-to-right
    // recurrence ends at t = T-1, the right-to-left one at t = 0.
    let mut logits = vec![0.0f64; c];
    matvec_f64(&params.fwd.why.data, ltr.h.row(t_len - 1), &mut logits, c, h_size);
    matvec_acc_f64(&rev_params(params).why.data, rtl.h.row(0), &mut logits, c, h_size);
    add_acc_f64(&params.by.data, &mut logits);
    let logsum = log_sum_exp_f64(&logits);
    let probs: Vec<f64> = logits.iter().map(|&y| (y - logsum).exp()).collect();

    Ok(BiGruTrace { x, ltr, rtl, logits, probs })
}

/// BPTT through both directions. Returns gradients; nothing is applied here.
pub(crate) fn backward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    trace: &BiGruTrace,
    tokens: &[Token],
    label: usize,
) -> CellGrads {
    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let c = cfg.output_size;
    let rev = rev_params(params);
    let mut g = CellGrads::zeros(cfg, t_len);
    let g_rev = g
        .rev
        .as_mut()
        .expect("bidirectional gradients carry a reverse direction");

    let mut dy = trace.probs.clone();
    dy[label] -= 1.0;
    outer_acc_f64(&dy, trace.ltr.h.row(t_len - 1), &mut g.fwd.why.data);
    outer_acc_f64(&dy, trace.rtl.h.row(0), &mut g_rev.why.data);
    add_acc_f64(&dy, &mut g.by.data);

    let mut seed_h = vec![0.0f64; h_size];
    matvec_t_acc_f64(&params.fwd.why.data, &dy, &mut seed_h, c, h_size);
    let mut seed_l = vec![0.0f64; h_size];
    matvec_t_acc_f64(&rev.why.data, &dy, &mut seed_l, c, h_size);

    gated_sweep_backward(&params.fwd, cfg, &trace.x, &trace.ltr, &seed_h, false, &mut g.fwd, &mut g.dx);
    gated_sweep_backward(rev, cfg, &trace.x, &trace.rtl, &seed_l, true, g_rev, &mut g.dx);

    g
}

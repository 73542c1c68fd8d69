/// Plain recurrent cell: forward recurrence and its hand-derived BPTT pair.
///
/// Per step: h_t = act(Wxh·x_t + bh + Whh·h_{t-1}), with h_{-1} the learned
/// initial state (or zero). Class scores are read from the final step only:
/// y = Why·h_{T-1} + by, p = exp(y - logsumexp(y)).

use crate::activation;
use crate::data::Token;
use crate::model::{CellGrads, CellParams, ClassifierConfig, ModelError};
use crate::tensor::{
    Tensor, add_acc_f64, log_sum_exp_f64, matvec_acc_f64, matvec_f64, matvec_t_acc_f64,
    outer_acc_f64,
};

/// All intermediate activations from a plain-cell forward pass, needed for
/// backward.
pub struct PlainTrace {
    /// Embedded input: [T, D]
    pub x: Tensor,
    /// Hidden states: [T, H]
    pub h: Tensor,
    /// Final-step class scores: [C]
    pub logits: Vec<f64>,
    /// Final-step class probabilities: [C]
    pub probs: Vec<f64>,
}

/// Run the forward recurrence over the whole sequence.
pub(crate) fn forward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    tokens: &[Token],
) -> Result<PlainTrace, ModelError> {
    debug_assert!(!tokens.is_empty());
    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let dir = &params.fwd;

    let x = params.lookup.lookup(tokens)?;

    let mut h = Tensor::zeros(&[t_len, h_size]);
    let mut pre = vec![0.0f64; h_size];
    let mut hprev = if dir.h0.numel() > 0 {
        dir.h0.data.clone()
    } else {
        vec![0.0f64; h_size]
    };
    for t in 0..t_len {
        matvec_f64(&dir.wxh.data, x.row(t), &mut pre, h_size, cfg.embedding_dim);
        add_acc_f64(&dir.bh.data, &mut pre);
        matvec_acc_f64(&dir.whh.data, &hprev, &mut pre, h_size, h_size);
        activation::evaluate(cfg.activation, &pre, h.row_mut(t));
        hprev.copy_from_slice(h.row(t));
    }

    let mut logits = vec![0.0f64; cfg.output_size];
    matvec_f64(&dir.why.data, h.row(t_len - 1), &mut logits, cfg.output_size, h_size);
    add_acc_f64(&params.by.data, &mut logits);
    let logsum = log_sum_exp_f64(&logits);
    let probs: Vec<f64> = logits.iter().map(|&y| (y - logsum).exp()).collect();

    Ok(PlainTrace { x, h, logits, probs })
}

/// BPTT over the trace. Returns per-parameter gradients plus the gradient
/// into the embedded inputs; nothing is applied here.
pub(crate) fn backward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    trace: &PlainTrace,
    tokens: &[Token],
    label: usize,
) -> CellGrads {
    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let d = cfg.embedding_dim;
    let c = cfg.output_size;
    let dir = &params.fwd;
    let mut g = CellGrads::zeros(cfg, t_len);

    // Softmax-cross-entropy seed; only the final step projects to the output.
    let mut dy = trace.probs.clone();
    dy[label] -= 1.0;
    outer_acc_f64(&dy, trace.h.row(t_len - 1), &mut g.fwd.why.data);
    add_acc_f64(&dy, &mut g.by.data);
    let mut dhnext = vec![0.0f64; h_size];
    matvec_t_acc_f64(&dir.why.data, &dy, &mut dhnext, c, h_size);

    let mut draw = vec![0.0f64; h_size];
    for t in (0..t_len).rev() {
        // dh is dhnext alone: earlier steps receive no direct output
        // gradient, only what flows back through the recurrence.
        activation::derivative(cfg.activation, trace.h.row(t), &mut draw);
        for i in 0..h_size {
            draw[i] *= dhnext[i];
        }

        outer_acc_f64(&draw, trace.x.row(t), &mut g.fwd.wxh.data);
        add_acc_f64(&draw, &mut g.fwd.bh.data);
        if t > 0 {
            outer_acc_f64(&draw, trace.h.row(t - 1), &mut g.fwd.whh.data);
        }

        for v in dhnext.iter_mut() {
            *v = 0.0;
        }
        matvec_t_acc_f64(&dir.whh.data, &draw, &mut dhnext, h_size, h_size);
        matvec_t_acc_f64(&dir.wxh.data, &draw, g.dx.row_mut(t), h_size, d);
    }

    // What remains in dhnext is the gradient into the initial state.
    if g.fwd.h0.numel() > 0 {
        g.fwd.h0.data.copy_from_slice(&dhnext);
    }

    g
}

/// Gated recurrent cell (update gate z, reset gate r, candidate u) and its
/// hand-derived BPTT pair.
///
/// Per step:
///   z = σ(Wxz·x + bz + Whz·h_prev)
///   r = σ(Wxr·x + br + Whr·h_prev)
///   u = act(Wxh·x + bh + Whh·(r ⊙ h_prev))
///   h = h_prev + z ⊙ (u - h_prev)
///
/// The sweeps are direction-generic (`reverse` walks the sequence
/// right-to-left); the bidirectional cell runs one sweep per direction over
/// the shared embedded input.

use crate::activation::{self, Activation};
use crate::data::Token;
use crate::model::{CellGrads, CellParams, ClassifierConfig, DirectionParams, ModelError};
use crate::tensor::{
    Tensor, add_acc_f64, log_sum_exp_f64, matvec_acc_f64, matvec_f64, matvec_t_acc_f64,
    outer_acc_f64,
};

/// Gate and state activations of one recurrence direction, each [T, H].
pub struct GatedTrace {
    pub z: Tensor,
    pub r: Tensor,
    pub u: Tensor,
    pub h: Tensor,
}

/// Full trace of a gated-cell forward pass.
pub struct GruTrace {
    /// Embedded input: [T, D]
    pub x: Tensor,
    pub gates: GatedTrace,
    /// Final-step class scores: [C]
    pub logits: Vec<f64>,
    /// Final-step class probabilities: [C]
    pub probs: Vec<f64>,
}

/// Run one gated recurrence over `x`. `reverse` walks the sequence
/// right-to-left; row t of the trace always belongs to timestep t.
pub(crate) fn gated_sweep(
    dir: &DirectionParams,
    cfg: &ClassifierConfig,
    x: &Tensor,
    reverse: bool,
) -> GatedTrace {
    let t_len = x.rows();
    let h_size = cfg.hidden_size;
    let d = cfg.embedding_dim;

    let mut tr = GatedTrace {
        z: Tensor::zeros(&[t_len, h_size]),
        r: Tensor::zeros(&[t_len, h_size]),
        u: Tensor::zeros(&[t_len, h_size]),
        h: Tensor::zeros(&[t_len, h_size]),
    };
    let mut pre = vec![0.0f64; h_size];
    let mut rh = vec![0.0f64; h_size];
    let mut hprev = if dir.h0.numel() > 0 {
        dir.h0.data.clone()
    } else {
        vec![0.0f64; h_size]
    };

    for step in 0..t_len {
        let t = if reverse { t_len - 1 - step } else { step };

        matvec_f64(&dir.wxz.data, x.row(t), &mut pre, h_size, d);
        add_acc_f64(&dir.bz.data, &mut pre);
        matvec_acc_f64(&dir.whz.data, &hprev, &mut pre, h_size, h_size);
        activation::evaluate(Activation::Logistic, &pre, tr.z.row_mut(t));

        matvec_f64(&dir.wxr.data, x.row(t), &mut pre, h_size, d);
        add_acc_f64(&dir.br.data, &mut pre);
        matvec_acc_f64(&dir.whr.data, &hprev, &mut pre, h_size, h_size);
        activation::evaluate(Activation::Logistic, &pre, tr.r.row_mut(t));

        for i in 0..h_size {
            rh[i] = tr.r.row(t)[i] * hprev[i];
        }
        matvec_f64(&dir.wxh.data, x.row(t), &mut pre, h_size, d);
        add_acc_f64(&dir.bh.data, &mut pre);
        matvec_acc_f64(&dir.whh.data, &rh, &mut pre, h_size, h_size);
        activation::evaluate(cfg.activation, &pre, tr.u.row_mut(t));

        {
            let z_row = tr.z.row(t);
            let u_row = tr.u.row(t);
            let h_row = tr.h.row_mut(t);
            for i in 0..h_size {
                h_row[i] = hprev[i] + z_row[i] * (u_row[i] - hprev[i]);
            }
        }
        hprev.copy_from_slice(tr.h.row(t));
    }

    tr
}

/// BPTT through one gated recurrence, accumulating into `g_dir` and `dx`.
/// `seed` is the gradient arriving at the direction's readout state (the
/// last state visited by the forward sweep). The state preceding the first
/// forward step is treated as the zero vector, which is exact while the
/// learned initial state sits at its zero initialization.
pub(crate) fn gated_sweep_backward(
    dir: &DirectionParams,
    cfg: &ClassifierConfig,
    x: &Tensor,
    tr: &GatedTrace,
    seed: &[f64],
    reverse: bool,
    g_dir: &mut DirectionParams,
    dx: &mut Tensor,
) {
    let t_len = x.rows();
    let h_size = cfg.hidden_size;
    let d = cfg.embedding_dim;

    let zero = vec![0.0f64; h_size];
    let mut dhnext = seed.to_vec();
    let mut dh = vec![0.0f64; h_size];
    let mut duraw = vec![0.0f64; h_size];
    let mut dq = vec![0.0f64; h_size];
    let mut dzraw = vec![0.0f64; h_size];
    let mut drraw = vec![0.0f64; h_size];
    let mut rh = vec![0.0f64; h_size];

    for step in 0..t_len {
        // Walk opposite to the forward order.
        let t = if reverse { step } else { t_len - 1 - step };
        let boundary = if reverse { t + 1 == t_len } else { t == 0 };
        let hprev: &[f64] = if boundary {
            &zero
        } else {
            tr.h.row(if reverse { t + 1 } else { t - 1 })
        };
        dh.copy_from_slice(&dhnext);

        let z_row = tr.z.row(t);
        let r_row = tr.r.row(t);
        let u_row = tr.u.row(t);

        // Candidate path: duraw = act'(u) ⊙ z ⊙ dh
        activation::derivative(cfg.activation, u_row, &mut duraw);
        for i in 0..h_size {
            duraw[i] *= z_row[i] * dh[i];
        }
        for v in dq.iter_mut() {
            *v = 0.0;
        }
        matvec_t_acc_f64(&dir.whh.data, &duraw, &mut dq, h_size, h_size);

        // Gate paths, derivatives at the activated values.
        activation::derivative(Activation::Logistic, z_row, &mut dzraw);
        for i in 0..h_size {
            dzraw[i] *= (u_row[i] - hprev[i]) * dh[i];
        }
        activation::derivative(Activation::Logistic, r_row, &mut drraw);
        for i in 0..h_size {
            drraw[i] *= hprev[i] * dq[i];
        }

        outer_acc_f64(&dzraw, x.row(t), &mut g_dir.wxz.data);
        add_acc_f64(&dzraw, &mut g_dir.bz.data);
        outer_acc_f64(&drraw, x.row(t), &mut g_dir.wxr.data);
        add_acc_f64(&drraw, &mut g_dir.br.data);
        outer_acc_f64(&duraw, x.row(t), &mut g_dir.wxh.data);
        add_acc_f64(&duraw, &mut g_dir.bh.data);

        outer_acc_f64(&dzraw, hprev, &mut g_dir.whz.data);
        outer_acc_f64(&drraw, hprev, &mut g_dir.whr.data);
        for i in 0..h_size {
            rh[i] = r_row[i] * hprev[i];
        }
        outer_acc_f64(&duraw, &rh, &mut g_dir.whh.data);

        // Combined gradient into the preceding state, all three paths plus
        // the copy-through term.
        for v in dhnext.iter_mut() {
            *v = 0.0;
        }
        matvec_t_acc_f64(&dir.whz.data, &dzraw, &mut dhnext, h_size, h_size);
        matvec_t_acc_f64(&dir.whr.data, &drraw, &mut dhnext, h_size, h_size);
        for i in 0..h_size {
            dhnext[i] += r_row[i] * dq[i] + (1.0 - z_row[i]) * dh[i];
        }

        let dx_row = dx.row_mut(t);
        matvec_t_acc_f64(&dir.wxz.data, &dzraw, dx_row, h_size, d);
        matvec_t_acc_f64(&dir.wxr.data, &drraw, dx_row, h_size, d);
        matvec_t_acc_f64(&dir.wxh.data, &duraw, dx_row, h_size, d);
    }

    if g_dir.h0.numel() > 0 {
        g_dir.h0.data.copy_from_slice(&dhnext);
    }
}

/// Run the gated forward pass over the whole sequence.
pub(crate) fn forward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    tokens: &[Token],
) -> Result<GruTrace, ModelError> {
    debug_assert!(!tokens.is_empty());
    let x = params.lookup.lookup(tokens)?;
    let gates = gated_sweep(&params.fwd, cfg, &x, false);

    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let mut logits = vec![0.0f64; cfg.output_size];
    matvec_f64(
        &params.fwd.why.data,
        gates.h.row(t_len - 1),
        &mut logits,
        cfg.output_size,
        h_size,
    );
    add_acc_f64(&params.by.data, &mut logits);
    let logsum = log_sum_exp_f64(&logits);
    let probs: Vec<f64> = logits.iter().map(|&y| (y - logsum).exp()).collect();

    Ok(GruTrace { x, gates, logits, probs })
}

/// BPTT over the gated trace. Returns gradients; nothing is applied here.
pub(crate) fn backward(
    params: &CellParams,
    cfg: &ClassifierConfig,
    trace: &GruTrace,
    tokens: &[Token],
    label: usize,
) -> CellGrads {
    let t_len = tokens.len();
    let h_size = cfg.hidden_size;
    let mut g = CellGrads::zeros(cfg, t_len);

    let mut dy = trace.probs.clone();
    dy[label] -= 1.0;
    outer_acc_f64(&dy, trace.gates.h.row(t_len - 1), &mut g.fwd.why.data);
    add_acc_f64(&dy, &mut g.by.data);
    let mut seed = vec![0.0f64; h_size];
    matvec_t_acc_f64(&params.fwd.why.data, &dy, &mut seed, cfg.output_size, h_size);

    gated_sweep_backward(
        &params.fwd,
        cfg,
        &trace.x,
        &trace.gates,
        &seed,
        false,
        &mut g.fwd,
        &mut g.dx,
    );

    g
}

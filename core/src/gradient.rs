/// Gradient orchestration and verification.
///
/// Provides:
/// - `compute_gradients`: loss + per-parameter gradients for one example
/// - `check_gradients`: central finite differences over every named weight
///   and bias, compared element-wise against the analytic backward pass
///
/// The FD probe perturbs a single element through the registry by name, so
/// it exercises exactly the tensors the training loop updates.

use crate::classifier::SequenceClassifier;
use crate::data::Token;
use crate::model::{CellGrads, ModelError};

/// Compute gradients of the example loss with respect to all parameters.
pub fn compute_gradients(
    clf: &SequenceClassifier,
    tokens: &[Token],
    label: usize,
) -> Result<(f64, CellGrads), ModelError> {
    let trace = clf.forward(tokens)?;
    let loss = trace.loss(label);
    let grads = clf.gradients(tokens, &trace, label);
    Ok((loss, grads))
}

/// Central-difference probe of one parameter element:
/// (loss(w + eps) - loss(w - eps)) / (2 * eps).
fn fd_probe(
    clf: &SequenceClassifier,
    tokens: &[Token],
    label: usize,
    name: &str,
    idx: usize,
    eps: f64,
) -> Result<f64, ModelError> {
    let mut losses = [0.0f64; 2];
    for (slot, delta) in [(0usize, eps), (1usize, -eps)] {
        let mut probe = clf.clone();
        {
            let reg = probe.params.registry();
            let tensor = reg
                .weights
                .into_iter()
                .chain(reg.biases)
                .find(|(n, _)| *n == name)
                .map(|(_, t)| t)
                .unwrap_or_else(|| panic!("no parameter named {name}"));
            tensor.data[idx] += delta;
        }
        losses[slot] = probe.forward(tokens)?.loss(label);
    }
    Ok((losses[0] - losses[1]) / (2.0 * eps))
}

/// Check every element of every named gradient against finite differences.
/// Returns (num_checked, num_passed, max_relative_error).
///
/// Relative error uses denominator max(|analytical|, |numerical|); pairs
/// where both magnitudes fall below the FD resolution are auto-passed.
pub fn check_gradients(
    clf: &SequenceClassifier,
    tokens: &[Token],
    label: usize,
    eps: f64,
    tol: f64,
) -> Result<(usize, usize, f64), ModelError> {
    let (_, grads) = compute_gradients(clf, tokens, label)?;

    let abs_threshold = 1e-7;
    let mut checked = 0usize;
    let mut passed = 0usize;
    let mut max_rel_err = 0.0f64;

    let mut compare = |name: &str, idx: usize, analytical: f64, numerical: f64| {
        checked += 1;
        let abs_diff = (analytical - numerical).abs();
        let denom = analytical.abs().max(numerical.abs());
        if denom < abs_threshold {
            passed += 1;
            return;
        }
        let rel_err = abs_diff / denom;
        if rel_err > max_rel_err {
            max_rel_err = rel_err;
        }
        if rel_err < tol {
            passed += 1;
        } else {
            eprintln!(
                "  FAIL {name}[{idx}]: analytical={analytical:.6e}, numerical={numerical:.6e}, \
                 rel_err={rel_err:.4e}"
            );
        }
    };

    for (name, grad) in grads.named_tensors() {
        for idx in 0..grad.numel() {
            let numerical = fd_probe(clf, tokens, label, name, idx, eps)?;
            compare(name, idx, grad.data[idx], numerical);
        }
    }

    // Embedding gradient: dense per-row sum of the dX contributions of
    // every position referencing that row.
    let d = clf.params.lookup.embedding_dim();
    let mut rows: Vec<usize> = tokens.iter().map(|tok| tok.word + 1).collect();
    rows.sort_unstable();
    rows.dedup();
    for row in rows {
        for col in 0..d {
            let mut analytical = 0.0f64;
            for (t, tok) in tokens.iter().enumerate() {
                if tok.word + 1 == row {
                    analytical += grads.dx.row(t)[col];
                }
            }
            let idx = row * d + col;
            let numerical = fd_probe(clf, tokens, label, "embeddings", idx, eps)?;
            compare("embeddings", idx, analytical, numerical);
        }
    }

    Ok((checked, passed, max_rel_err))
}

//! Attention primitives shared by the model layers.
//!
//! burn ships multi-head attention but not the bare scaled dot-product
//! form, nor the "weight a sequence by per-position alphas" reductions
//! the gene-conditioned layers need. Those live here.

use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::error::{ModelError, Result};

/// Logit offset added to masked positions before the softmax.
const MASK_PENALTY: f64 = -1e9;

/// Scaled dot-product attention.
///
/// - `q`: [batch, len_q, depth]
/// - `k`: [batch, len_k, depth]
/// - `v`: [batch, len_k, depth_v]
/// - `mask`: [batch, len_q, len_k], 1.0 where a key must be ignored
///
/// Returns: (output [batch, len_q, depth_v], weights [batch, len_q, len_k])
pub fn scaled_dot_product_attention<B: Backend>(
    q: Tensor<B, 3>,
    k: Tensor<B, 3>,
    v: Tensor<B, 3>,
    mask: Option<Tensor<B, 3>>,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let depth = k.dims()[2];

    let logits = q.matmul(k.swap_dims(1, 2)).div_scalar((depth as f64).sqrt());
    let logits = match mask {
        Some(mask) => logits + mask.mul_scalar(MASK_PENALTY),
        None => logits,
    };

    // burn's softmax subtracts the row max before exponentiating
    let weights = softmax(logits, 2);
    let output = weights.clone().matmul(v);
    (output, weights)
}

/// Scale every position of `sequence` by its alpha.
///
/// - `sequence`: [batch, len, hidden]
/// - `alphas`: [batch, len]
///
/// Returns: [batch, len, hidden]
pub fn weight_sequence<B: Backend>(sequence: Tensor<B, 3>, alphas: Tensor<B, 2>) -> Tensor<B, 3> {
    let [batch, len, hidden] = sequence.dims();
    let alphas_expanded = alphas.unsqueeze_dim::<3>(2).expand([batch, len, hidden]);
    sequence * alphas_expanded
}

/// Alpha-weighted sum over the sequence axis.
///
/// - `sequence`: [batch, len, hidden]
/// - `alphas`: [batch, len]
///
/// Returns: [batch, hidden]
pub fn weighted_sum<B: Backend>(sequence: Tensor<B, 3>, alphas: Tensor<B, 2>) -> Tensor<B, 2> {
    weight_sequence(sequence, alphas)
        .sum_dim(1)
        .squeeze_dim::<2>(1)
}

/// Dot product of the last axis with a vector.
///
/// - `x`: [batch, len, size]
/// - `v`: [size]
///
/// Returns: [batch, len]
pub fn project_last<B: Backend>(x: Tensor<B, 3>, v: Tensor<B, 1>) -> Tensor<B, 2> {
    let [batch, len, size] = x.dims();
    let v_expanded = v.reshape([1, 1, size]).expand([batch, len, size]);
    (x * v_expanded).sum_dim(2).squeeze_dim::<2>(2)
}

/// Fail with [`ModelError::NonFinite`] if `tensor` holds NaN or infinity.
///
/// Nothing in the forward pass clamps; this is how callers surface
/// an unstable batch.
pub fn ensure_finite<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    what: &'static str,
) -> Result<()> {
    let count = tensor
        .clone()
        .into_data()
        .iter::<f32>()
        .filter(|x| !x.is_finite())
        .count();
    if count > 0 {
        tracing::warn!(what, count, "non-finite values in model output");
        return Err(ModelError::NonFinite { what, count });
    }
    Ok(())
}

/// Fail with [`ModelError::ShapeMismatch`] unless `actual == expected`.
pub(crate) fn expect_dims<const D: usize>(
    what: &'static str,
    actual: [usize; D],
    expected: [usize; D],
) -> Result<()> {
    if actual != expected {
        return Err(ModelError::shape(
            what,
            format!("{:?}", expected),
            format!("{:?}", actual),
        ));
    }
    Ok(())
}

/// Fail with [`ModelError::ShapeMismatch`] on an empty batch.
pub(crate) fn expect_batch(what: &'static str, batch: usize) -> Result<()> {
    if batch == 0 {
        return Err(ModelError::shape(what, "at least one row", "an empty batch"));
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────

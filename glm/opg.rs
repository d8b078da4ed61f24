//! Collective linear-algebra primitives over row-partitioned data.
//!
//! Each function computes a per-block partial on the call's streams, sums the
//! partials locally, and finishes with exactly one `all_reduce`. All ranks must
//! call these functions in the same order with the same global shapes.
//!
//! Partials and reductions are accumulated in `f64` regardless of `T`.

use crate::comm::{Communicator, ReduceOp};
use crate::faer_ndarray::descending_eigh;
use crate::kernels::SINGULAR_VALUE_FLOOR;
use crate::stream::StreamPool;
use crate::types::{GlmError, GlmFloat};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Eigenvalues of `AᵀA` at or below `λ_max` times this ratio are treated as zero
/// by [`svd_eig`] and [`lstsq_eig`].
pub const EIGENVALUE_RCOND: f64 = 1.0e-12;

fn sum_partials(len: usize, partials: Vec<Vec<f64>>) -> Vec<f64> {
    let mut total = vec![0.0; len];
    for partial in partials {
        for (acc, value) in total.iter_mut().zip(partial) {
            *acc += value;
        }
    }
    total
}

fn reduce_partials(
    comm: &dyn Communicator,
    len: usize,
    partials: Vec<Vec<f64>>,
) -> Result<Vec<f64>, GlmError> {
    let mut total = sum_partials(len, partials);
    comm.all_reduce(&mut total, ReduceOp::Sum)?;
    Ok(total)
}

/// Column sums over every block of every rank.
pub fn column_sums<T: GlmFloat>(
    comm: &dyn Communicator,
    blocks: &[ArrayView2<T>],
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<f64>, GlmError> {
    let partials = streams.for_each_block(blocks.iter(), |_, block| {
        let mut sums = vec![0.0; n_cols];
        for row in block.rows() {
            for (acc, &value) in sums.iter_mut().zip(row.iter()) {
                *acc += value.as_f64();
            }
        }
        sums
    });
    Ok(Array1::from(reduce_partials(comm, n_cols, partials)?))
}

/// Column means over the `n_rows` global rows.
pub fn mean<T: GlmFloat>(
    comm: &dyn Communicator,
    blocks: &[ArrayView2<T>],
    n_rows: usize,
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    let sums = column_sums(comm, blocks, n_cols, streams)?;
    let rows = n_rows as f64;
    Ok(sums.mapv(|sum| T::from_f64(sum / rows)))
}

/// Mean of a partitioned vector over the `n_rows` global entries.
pub fn vector_mean<T: GlmFloat>(
    comm: &dyn Communicator,
    parts: &[ArrayView1<T>],
    n_rows: usize,
    streams: &StreamPool,
) -> Result<T, GlmError> {
    let partials = streams.for_each_block(parts.iter(), |_, part| {
        vec![part.iter().map(|&value| value.as_f64()).sum::<f64>()]
    });
    let total = reduce_partials(comm, 1, partials)?;
    Ok(T::from_f64(total[0] / n_rows as f64))
}

/// Global column L2 norms.
pub fn col_norm2<T: GlmFloat>(
    comm: &dyn Communicator,
    blocks: &[ArrayView2<T>],
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    let partials = streams.for_each_block(blocks.iter(), |_, block| {
        let mut squares = vec![0.0; n_cols];
        for row in block.rows() {
            for (acc, &value) in squares.iter_mut().zip(row.iter()) {
                let v = value.as_f64();
                *acc += v * v;
            }
        }
        squares
    });
    let squares = reduce_partials(comm, n_cols, partials)?;
    Ok(squares.into_iter().map(|sq| T::from_f64(sq.sqrt())).collect())
}

/// `Σ_blocks Aᵢᵀ bᵢ` over every rank. `a` and `b` hold one entry per local block.
pub fn mv_a_tb<T: GlmFloat>(
    comm: &dyn Communicator,
    a: &[ArrayView2<T>],
    b: &[ArrayView1<T>],
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    if a.len() != b.len() {
        return Err(GlmError::ShapeMismatch(format!(
            "mv_aTb got {} matrix blocks and {} vector blocks",
            a.len(),
            b.len()
        )));
    }
    let partials = streams.for_each_block(a.iter().zip(b.iter()), |_, (a_block, b_block)| {
        a_block.t().dot(b_block).iter().map(|&v| v.as_f64()).collect::<Vec<f64>>()
    });
    let total = reduce_partials(comm, n_cols, partials)?;
    Ok(total.into_iter().map(T::from_f64).collect())
}

fn local_gram_partials<T: GlmFloat>(
    blocks: &[ArrayView2<T>],
    labels: Option<&[ArrayView1<T>]>,
    streams: &StreamPool,
) -> Vec<Vec<f64>> {
    let items = blocks
        .iter()
        .enumerate()
        .map(|(idx, block)| (block, labels.map(|labels| &labels[idx])));
    streams.for_each_block(items, |_, (block, label)| {
        let wide = block.mapv(T::as_f64);
        let gram = wide.t().dot(&wide);
        let mut packed: Vec<f64> = gram.iter().copied().collect();
        if let Some(label) = label {
            let wide_label = label.mapv(T::as_f64);
            packed.extend(wide.t().dot(&wide_label).iter().copied());
        }
        packed
    })
}

fn unpack_gram(packed: &[f64], n_cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_cols, n_cols), |(i, j)| packed[i * n_cols + j])
}

/// Thin SVD `A = U·diag(s)·Vᵀ` of the global matrix; `u` holds this rank's
/// row blocks of `U`, one per local block.
pub struct PartitionedSvd<T> {
    pub s: Array1<T>,
    pub v: Array2<T>,
    pub u: Vec<Array2<T>>,
}

/// Distributed SVD through the eigendecomposition of the all-reduced Gram
/// matrix `AᵀA = V·diag(s²)·Vᵀ`.
///
/// Singular values come out in decreasing order. Eigenvalues at or below
/// `λ_max · EIGENVALUE_RCOND` become exact zeros: the square root would
/// otherwise turn round-off on an exactly dependent column into a singular
/// value near `1e-8 · s_max`, far above [`SINGULAR_VALUE_FLOOR`]. `U` columns
/// belonging to singular values under the floor are left at zero.
pub fn svd_eig<T: GlmFloat>(
    comm: &dyn Communicator,
    blocks: &[ArrayView2<T>],
    n_cols: usize,
    streams: &StreamPool,
) -> Result<PartitionedSvd<T>, GlmError> {
    let partials = local_gram_partials(blocks, None, streams);
    let packed = reduce_partials(comm, n_cols * n_cols, partials)?;
    let gram = unpack_gram(&packed, n_cols);

    let (eigenvalues, eigenvectors) = descending_eigh(&gram)?;
    let cutoff = eigenvalues.get(0).copied().unwrap_or(0.0).max(0.0) * EIGENVALUE_RCOND;
    let s = eigenvalues.mapv(|lambda| if lambda > cutoff { lambda.sqrt() } else { 0.0 });
    let inv_s = s.mapv(|sv| if sv < SINGULAR_VALUE_FLOOR { 0.0 } else { sv.recip() });
    log::debug!(
        "svd_eig: largest singular value {:.6e}, {} of {} under the floor",
        s.get(0).copied().unwrap_or(0.0),
        s.iter().filter(|&&sv| sv < SINGULAR_VALUE_FLOOR).count(),
        n_cols
    );

    let v: Array2<T> = eigenvectors.mapv(T::from_f64);
    let mut v_over_s = eigenvectors;
    for (mut column, &inv) in v_over_s.columns_mut().into_iter().zip(inv_s.iter()) {
        column.mapv_inplace(|x| x * inv);
    }
    let v_over_s: Array2<T> = v_over_s.mapv(T::from_f64);

    let u = streams.for_each_block(blocks.iter(), |_, block| block.dot(&v_over_s));

    Ok(PartitionedSvd {
        s: s.mapv(T::from_f64),
        v,
        u,
    })
}

/// Least squares through the eigendecomposition of the normal equations.
///
/// `AᵀA` and `Aᵀb` are reduced in a single collective. Eigenvalues at or below
/// `λ_max · EIGENVALUE_RCOND` are dropped, which yields the minimum-norm
/// solution for a rank-deficient design.
pub fn lstsq_eig<T: GlmFloat>(
    comm: &dyn Communicator,
    a: &[ArrayView2<T>],
    b: &[ArrayView1<T>],
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    if a.len() != b.len() {
        return Err(GlmError::ShapeMismatch(format!(
            "lstsqEig got {} matrix blocks and {} label blocks",
            a.len(),
            b.len()
        )));
    }
    let partials = local_gram_partials(a, Some(b), streams);
    let packed = reduce_partials(comm, n_cols * n_cols + n_cols, partials)?;
    let gram = unpack_gram(&packed, n_cols);
    let atb = Array1::from(packed[n_cols * n_cols..].to_vec());

    let (eigenvalues, eigenvectors) = descending_eigh(&gram)?;
    let lambda_max = eigenvalues.get(0).copied().unwrap_or(0.0).max(0.0);
    let cutoff = lambda_max * EIGENVALUE_RCOND;
    let inv_lambda = eigenvalues.mapv(|lambda| if lambda > cutoff { lambda.recip() } else { 0.0 });
    let dropped = inv_lambda.iter().filter(|&&v| v == 0.0).count();
    if dropped > 0 {
        log::warn!("lstsqEig: design is rank deficient, dropping {dropped} direction(s)");
    }

    let projected = eigenvectors.t().dot(&atb) * &inv_lambda;
    let coef = eigenvectors.dot(&projected);
    Ok(coef.mapv(T::from_f64))
}

//! Ridge regression over row-partitioned data.
//!
//! The design is decomposed with [`opg::svd_eig`] and the coefficients are
//! formed as `w = V · diag(s / (s² + α)) · Uᵀ b` without inverting `AᵀA + αI`.

use crate::comm::Communicator;
use crate::fit::{check_fit_inputs, design_views, finish_fit, log_layout};
use crate::handle::Handle;
use crate::kernels::{self, SINGULAR_VALUE_FLOOR};
use crate::opg::{self, PartitionedSvd};
use crate::partition::PartitionDescriptor;
use crate::preprocess::preprocess_data;
use crate::stream::StreamPool;
use crate::types::{Algorithm, GlmError, GlmFloat};
use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

pub use crate::predict::predict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RidgeParams {
    pub fit_intercept: bool,
    pub normalize: bool,
    pub algo: u32,
    pub verbose: bool,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            normalize: false,
            algo: Algorithm::EIG_ID,
            verbose: false,
        }
    }
}

/// `s / (s² + alpha)` with singular values under [`SINGULAR_VALUE_FLOOR`]
/// mapped to exactly zero.
pub fn shrinkage_ratio<T: GlmFloat>(s: ArrayView1<T>, alpha: T) -> Array1<T> {
    let mut floored = s.to_owned();
    kernels::set_small_values_zero(&mut floored, T::from_f64(SINGULAR_VALUE_FLOOR));
    let mut s_nnz = kernels::power(&floored);
    kernels::add_scalar(&mut s_nnz, alpha);
    kernels::divide_skip_zero(floored.view(), s_nnz.view())
}

/// Shrinkage solve on an existing decomposition. `labels` holds this rank's
/// label blocks, aligned with `svd.u`. Collective through `Uᵀb`.
pub fn ridge_solve<T: GlmFloat>(
    comm: &dyn Communicator,
    svd: &PartitionedSvd<T>,
    labels: &[ArrayView1<T>],
    alpha: T,
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    let ratio = shrinkage_ratio(svd.s.view(), alpha);
    let mut v_scaled = svd.v.clone();
    kernels::scale_columns(&mut v_scaled, ratio.view());

    let u: Vec<ArrayView2<T>> = svd.u.iter().map(|block| block.view()).collect();
    let utb = opg::mv_a_tb(comm, &u, labels, n_cols, streams)?;
    Ok(v_scaled.dot(&utb))
}

fn single_alpha<T: GlmFloat>(alpha: &[T]) -> Result<T, GlmError> {
    let Some(&first) = alpha.first() else {
        return Err(GlmError::InvalidHyperparameter(
            "ridge needs at least one alpha".to_string(),
        ));
    };
    if alpha.len() > 1 {
        log::warn!(
            "ridgeFit: {} alphas supplied, only alpha[0] = {first} is used",
            alpha.len()
        );
    }
    if !first.is_finite() || first < T::zero() {
        return Err(GlmError::InvalidHyperparameter(format!(
            "alpha must be finite and non-negative, got {first}"
        )));
    }
    Ok(first)
}

fn solve<T: GlmFloat>(
    comm: &dyn Communicator,
    input: &[ArrayViewMut2<'_, T>],
    labels: &[ArrayViewMut1<'_, T>],
    alpha: T,
    n_cols: usize,
    streams: &StreamPool,
) -> Result<Array1<T>, GlmError> {
    let svd = opg::svd_eig(comm, &design_views(input), n_cols, streams)?;
    let b: Vec<ArrayView1<T>> = labels.iter().map(|label| label.view()).collect();
    ridge_solve(comm, &svd, &b, alpha, n_cols, streams)
}

/// Fits ridge coefficients and intercept over the blocks of every rank.
///
/// Only `alpha[0]` is honored. Buffers are borrowed as in [`crate::ols::fit`].
#[allow(clippy::too_many_arguments)]
pub fn fit<T: GlmFloat>(
    handle: &mut Handle,
    input: &mut [ArrayViewMut2<'_, T>],
    desc: &PartitionDescriptor,
    labels: &mut [ArrayViewMut1<'_, T>],
    alpha: &[T],
    coef: ArrayViewMut1<'_, T>,
    intercept: &mut T,
    params: &RidgeParams,
) -> Result<(), GlmError> {
    let n_cols = desc.n_cols();
    Algorithm::resolve("ridgeFit", params.algo, n_cols)?;
    let alpha = single_alpha(alpha)?;
    check_fit_inputs(handle, input, desc, labels, coef.len())?;
    log_layout("ridgeFit", params.verbose, handle.rank(), desc);

    let streams = handle.streams_for(input.len())?;
    let stats = if params.fit_intercept {
        Some(preprocess_data(
            handle.comm(),
            input,
            labels,
            desc,
            params.normalize,
            &streams,
        )?)
    } else {
        None
    };

    let solved = solve(handle.comm(), input, labels, alpha, n_cols, &streams);
    finish_fit(solved, input, labels, stats, coef, intercept, &streams)?;

    if params.verbose {
        log::info!(
            "ridgeFit on rank {}: alpha {alpha}, intercept {}",
            handle.rank(),
            *intercept
        );
    }
    Ok(())
}

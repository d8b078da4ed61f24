//! Ordinary least squares over row-partitioned data.

use crate::fit::{check_fit_inputs, design_views, finish_fit, log_layout};
use crate::handle::Handle;
use crate::opg;
use crate::partition::PartitionDescriptor;
use crate::preprocess::preprocess_data;
use crate::types::{Algorithm, GlmError, GlmFloat};
use ndarray::{ArrayView1, ArrayViewMut1, ArrayViewMut2};

pub use crate::predict::predict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlsParams {
    pub fit_intercept: bool,
    /// Scale centered columns to unit norm before solving. Ignored without
    /// `fit_intercept`.
    pub normalize: bool,
    pub algo: u32,
    pub verbose: bool,
}

impl Default for OlsParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            normalize: false,
            algo: Algorithm::EIG_ID,
            verbose: false,
        }
    }
}

/// Fits `labels ≈ input · coef + intercept` over the blocks of every rank.
///
/// `input` and `labels` hold this rank's blocks in the order `desc` lists
/// them. They are borrowed for the duration of the call: with `fit_intercept`
/// they are centered in place and restored before returning, on success and on
/// failure. Every rank of the group must make the same call.
pub fn fit<T: GlmFloat>(
    handle: &mut Handle,
    input: &mut [ArrayViewMut2<'_, T>],
    desc: &PartitionDescriptor,
    labels: &mut [ArrayViewMut1<'_, T>],
    coef: ArrayViewMut1<'_, T>,
    intercept: &mut T,
    params: &OlsParams,
) -> Result<(), GlmError> {
    let n_cols = desc.n_cols();
    Algorithm::resolve("olsFit", params.algo, n_cols)?;
    check_fit_inputs(handle, input, desc, labels, coef.len())?;
    log_layout("olsFit", params.verbose, handle.rank(), desc);

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

    let solved = {
        let a = design_views(input);
        let b: Vec<ArrayView1<T>> = labels.iter().map(|label| label.view()).collect();
        opg::lstsq_eig(handle.comm(), &a, &b, n_cols, &streams)
    };
    finish_fit(solved, input, labels, stats, coef, intercept, &streams)?;

    if params.verbose {
        log::info!("olsFit on rank {}: intercept {}", handle.rank(), *intercept);
    }
    Ok(())
}

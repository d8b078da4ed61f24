//! Prediction with a fitted linear model. Purely local: no collectives.

use crate::handle::Handle;
use crate::kernels;
use crate::partition::{PartitionDescriptor, RankSizePair};
use crate::types::{GlmError, GlmFloat};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1};

/// Writes `input[i] · coef + intercept` into `preds[i]` for each local block.
///
/// `rank_sizes` describes the prediction layout, which need not match the one
/// used for fitting.
#[allow(clippy::too_many_arguments)]
pub fn predict<T: GlmFloat>(
    handle: &mut Handle,
    rank_sizes: &[RankSizePair],
    n_rows: usize,
    n_cols: usize,
    input: &[ArrayView2<'_, T>],
    coef: ArrayView1<'_, T>,
    intercept: T,
    preds: &mut [ArrayViewMut1<'_, T>],
    verbose: bool,
) -> Result<(), GlmError> {
    let desc = PartitionDescriptor::new(n_rows, n_cols, rank_sizes.to_vec(), handle.rank())?;
    predict_partitioned(handle, &desc, input, coef, intercept, preds, verbose)
}

/// [`predict`] with an already built descriptor.
pub fn predict_partitioned<T: GlmFloat>(
    handle: &mut Handle,
    desc: &PartitionDescriptor,
    input: &[ArrayView2<'_, T>],
    coef: ArrayView1<'_, T>,
    intercept: T,
    preds: &mut [ArrayViewMut1<'_, T>],
    verbose: bool,
) -> Result<(), GlmError> {
    desc.check_group(handle.rank(), handle.n_ranks())?;
    if coef.len() != desc.n_cols() {
        return Err(GlmError::ShapeMismatch(format!(
            "{} coefficients for a design with {} columns",
            coef.len(),
            desc.n_cols()
        )));
    }
    let shapes: Vec<(usize, usize)> = input.iter().map(|block| block.dim()).collect();
    desc.check_local_blocks(&shapes)?;
    let lens: Vec<usize> = preds.iter().map(|out| out.len()).collect();
    desc.check_local_vectors(&lens)?;

    if verbose {
        log::info!("predict on rank {}\n{desc}", handle.rank());
    } else {
        log::debug!("predict on rank {}\n{desc}", handle.rank());
    }

    let streams = handle.streams_for(input.len())?;
    streams.for_each_block(input.iter().zip(preds.iter_mut()), |_, (block, out)| {
        kernels::gemv_into(block.view(), coef, out.view_mut());
        kernels::add_scalar(out, intercept);
    });
    Ok(())
}

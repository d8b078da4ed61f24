//! Orchestration shared by the OLS and ridge entry points.

use crate::handle::Handle;
use crate::partition::PartitionDescriptor;
use crate::preprocess::{CenteringStats, postprocess_data, restore_data};
use crate::stream::StreamPool;
use crate::types::{GlmError, GlmFloat};
use ndarray::{Array1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

/// Checks the caller's blocks, labels and output length against `desc` and the
/// handle's group before anything is mutated or reduced.
pub(crate) fn check_fit_inputs<T: GlmFloat>(
    handle: &Handle,
    input: &[ArrayViewMut2<'_, T>],
    desc: &PartitionDescriptor,
    labels: &[ArrayViewMut1<'_, T>],
    coef_len: usize,
) -> Result<(), GlmError> {
    desc.check_group(handle.rank(), handle.n_ranks())?;
    let shapes: Vec<(usize, usize)> = input.iter().map(|block| block.dim()).collect();
    desc.check_local_blocks(&shapes)?;
    let lens: Vec<usize> = labels.iter().map(|label| label.len()).collect();
    desc.check_local_vectors(&lens)?;
    if coef_len != desc.n_cols() {
        return Err(GlmError::ShapeMismatch(format!(
            "coefficient buffer holds {coef_len} values but the design has {} columns",
            desc.n_cols()
        )));
    }
    Ok(())
}

pub(crate) fn log_layout(solver: &str, verbose: bool, rank: usize, desc: &PartitionDescriptor) {
    if verbose {
        log::info!("{solver} on rank {rank}\n{desc}");
    } else {
        log::debug!("{solver} on rank {rank}\n{desc}");
    }
}

pub(crate) fn design_views<'a, T: GlmFloat>(
    input: &'a [ArrayViewMut2<'_, T>],
) -> Vec<ArrayView2<'a, T>> {
    input.iter().map(|block| block.view()).collect()
}

/// Writes a solved coefficient vector and its intercept into the caller's
/// outputs, restoring centered data on both the success and the failure path.
pub(crate) fn finish_fit<T: GlmFloat>(
    solved: Result<Array1<T>, GlmError>,
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    stats: Option<CenteringStats<T>>,
    mut coef_out: ArrayViewMut1<'_, T>,
    intercept_out: &mut T,
    streams: &StreamPool,
) -> Result<(), GlmError> {
    let mut coef = match solved {
        Ok(coef) => coef,
        Err(err) => {
            if let Some(stats) = &stats {
                restore_data(input, labels, stats, streams);
            }
            return Err(err);
        }
    };
    let intercept = match &stats {
        Some(stats) => postprocess_data(input, labels, &mut coef, stats, streams),
        None => T::zero(),
    };
    coef_out.assign(&coef);
    *intercept_out = intercept;
    Ok(())
}

//! Centering and scaling around a closed-form solve.
//!
//! With an intercept, the design blocks and labels are centered in place using
//! statistics reduced over every rank, optionally followed by division by the
//! global column norms. After the solve, coefficients are mapped back to the
//! original feature scale, the intercept is recovered from the means, and the
//! caller's buffers are restored. Restoration is exact up to floating-point
//! rounding of the subtract/add (and divide/multiply) pairs.
//!
//! Non-finite means or norms are rejected before the buffers they would
//! poison are touched. The reduced values are identical on every rank, so
//! every rank returns the same error.

use crate::comm::Communicator;
use crate::kernels;
use crate::opg;
use crate::partition::PartitionDescriptor;
use crate::stream::StreamPool;
use crate::types::{GlmError, GlmFloat};
use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

/// Statistics gathered before the solve and consumed after it.
#[derive(Debug, Clone)]
pub struct CenteringStats<T> {
    pub mu_input: Array1<T>,
    pub mu_labels: T,
    pub norm2_input: Option<Array1<T>>,
}

fn center<T: GlmFloat>(
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    mu_input: ArrayView1<T>,
    mu_labels: T,
    streams: &StreamPool,
) {
    streams.for_each_block(input.iter_mut(), |_, block| {
        kernels::subtract_row_vector(block, mu_input);
    });
    streams.for_each_block(labels.iter_mut(), |_, label| {
        kernels::add_scalar(label, -mu_labels);
    });
}

fn uncenter<T: GlmFloat>(
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    mu_input: ArrayView1<T>,
    mu_labels: T,
    streams: &StreamPool,
) {
    streams.for_each_block(input.iter_mut(), |_, block| {
        kernels::add_row_vector(block, mu_input);
    });
    streams.for_each_block(labels.iter_mut(), |_, label| {
        kernels::add_scalar(label, mu_labels);
    });
}

pub fn preprocess_data<T: GlmFloat>(
    comm: &dyn Communicator,
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    desc: &PartitionDescriptor,
    normalize: bool,
    streams: &StreamPool,
) -> Result<CenteringStats<T>, GlmError> {
    let n_rows = desc.n_rows();
    let n_cols = desc.n_cols();

    let mu_input = {
        let views: Vec<ArrayView2<T>> = input.iter().map(|block| block.view()).collect();
        opg::mean(comm, &views, n_rows, n_cols, streams)?
    };
    let mu_labels = {
        let views: Vec<ArrayView1<T>> = labels.iter().map(|label| label.view()).collect();
        opg::vector_mean(comm, &views, n_rows, streams)?
    };
    if let Some(col) = mu_input.iter().position(|mu| !mu.is_finite()) {
        return Err(GlmError::NonFiniteInput(format!(
            "column {col} has mean {}",
            mu_input[col]
        )));
    }
    if !mu_labels.is_finite() {
        return Err(GlmError::NonFiniteInput(format!(
            "labels have mean {mu_labels}"
        )));
    }
    center(input, labels, mu_input.view(), mu_labels, streams);

    let norm2_input = if normalize {
        let norms = {
            let views: Vec<ArrayView2<T>> = input.iter().map(|block| block.view()).collect();
            opg::col_norm2(comm, &views, n_cols, streams)
        };
        let norms = norms.and_then(|norms| match norms.iter().position(|n| !n.is_finite()) {
            Some(col) => Err(GlmError::NonFiniteInput(format!(
                "column {col} has norm {}",
                norms[col]
            ))),
            None => Ok(norms),
        });
        match norms {
            Ok(norms) => {
                streams.for_each_block(input.iter_mut(), |_, block| {
                    kernels::divide_columns_skip_zero(block, norms.view());
                });
                Some(norms)
            }
            Err(err) => {
                uncenter(input, labels, mu_input.view(), mu_labels, streams);
                return Err(err);
            }
        }
    } else {
        None
    };

    log::debug!(
        "preprocess: centered {} local block(s), label mean {}, normalized: {}",
        input.len(),
        mu_labels,
        norm2_input.is_some()
    );

    Ok(CenteringStats {
        mu_input,
        mu_labels,
        norm2_input,
    })
}

/// Returns the caller's design and label blocks to their original values.
pub fn restore_data<T: GlmFloat>(
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    stats: &CenteringStats<T>,
    streams: &StreamPool,
) {
    if let Some(norms) = &stats.norm2_input {
        streams.for_each_block(input.iter_mut(), |_, block| {
            kernels::scale_columns(block, norms.view());
        });
    }
    uncenter(input, labels, stats.mu_input.view(), stats.mu_labels, streams);
}

/// Maps `coef` back to the original feature scale, restores the caller's
/// buffers and returns the intercept `mu_labels - mu_input · coef`.
pub fn postprocess_data<T: GlmFloat>(
    input: &mut [ArrayViewMut2<'_, T>],
    labels: &mut [ArrayViewMut1<'_, T>],
    coef: &mut Array1<T>,
    stats: &CenteringStats<T>,
    streams: &StreamPool,
) -> T {
    if let Some(norms) = &stats.norm2_input {
        *coef = kernels::divide_skip_zero(coef.view(), norms.view());
    }
    let intercept = stats.mu_labels - stats.mu_input.dot(&*coef);
    restore_data(input, labels, stats, streams);
    intercept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array, s};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 10.0, 0.0],
            [2.0, 20.0, 0.0],
            [3.0, 15.0, 0.0],
            [4.0, 35.0, 0.0],
            [5.0, 5.0, 0.0],
        ];
        let y = array![3.0, 5.0, 4.0, 9.0, 1.0];
        (x, y)
    }

    #[test]
    fn centering_uses_global_statistics_and_is_undone() {
        let comm = LocalComm::group(1).remove(0);
        let (mut x, mut y) = data();
        let (x_orig, y_orig) = (x.clone(), y.clone());
        let desc = PartitionDescriptor::even(5, 3, 1, 2, 0).unwrap();
        let streams = StreamPool::new(2, None).unwrap();

        let (x_top, x_bottom) = x.view_mut().split_at(ndarray::Axis(0), 3);
        let (y_top, y_bottom) = y.view_mut().split_at(ndarray::Axis(0), 3);
        let mut input = vec![x_top, x_bottom];
        let mut labels = vec![y_top, y_bottom];

        let stats = preprocess_data(&comm, &mut input, &mut labels, &desc, true, &streams).unwrap();
        assert_abs_diff_eq!(stats.mu_input[0], 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(stats.mu_input[1], 17.0, epsilon = 1e-14);
        assert_abs_diff_eq!(stats.mu_labels, 4.4, epsilon = 1e-14);
        let norms = stats.norm2_input.clone().unwrap();
        assert_abs_diff_eq!(norms[0], 10.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(norms[2], 0.0);

        let column_norm: f64 = input
            .iter()
            .flat_map(|block| block.column(0).to_vec())
            .map(|v| v * v)
            .sum();
        assert_abs_diff_eq!(column_norm, 1.0, epsilon = 1e-12);

        let mut coef = array![2.0, 0.5, 1.0];
        let intercept = postprocess_data(&mut input, &mut labels, &mut coef, &stats, &streams);
        assert_abs_diff_eq!(coef[0], 2.0 / 10.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(coef[2], 1.0);
        let expected = 4.4 - (3.0 * coef[0] + 17.0 * coef[1]);
        assert_abs_diff_eq!(intercept, expected, epsilon = 1e-12);

        drop(input);
        drop(labels);
        for (a, b) in x.iter().zip(x_orig.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        for (a, b) in y.iter().zip(y_orig.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn restore_without_solve_returns_original_values() {
        let comm = LocalComm::group(1).remove(0);
        let (mut x, mut y) = data();
        let x_orig = x.clone();
        let desc = PartitionDescriptor::even(5, 3, 1, 1, 0).unwrap();
        let streams = StreamPool::new(1, None).unwrap();
        {
            let mut input = vec![x.view_mut()];
            let mut labels = vec![y.view_mut()];
            let stats =
                preprocess_data(&comm, &mut input, &mut labels, &desc, false, &streams).unwrap();
            assert!(stats.norm2_input.is_none());
            assert_abs_diff_eq!(input[0].slice(s![.., 1]).sum(), 0.0, epsilon = 1e-12);
            restore_data(&mut input, &mut labels, &stats, &streams);
        }
        for (a, b) in x.iter().zip(x_orig.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn non_finite_means_are_rejected_before_centering() {
        let comm = LocalComm::group(1).remove(0);
        let desc = PartitionDescriptor::even(5, 3, 1, 1, 0).unwrap();
        let streams = StreamPool::new(1, None).unwrap();

        let (mut x, mut y) = data();
        y[2] = f64::NAN;
        let y_orig = y.clone();
        let err = preprocess_data(
            &comm,
            &mut [x.view_mut()],
            &mut [y.view_mut()],
            &desc,
            false,
            &streams,
        )
        .unwrap_err();
        assert!(matches!(err, GlmError::NonFiniteInput(_)));
        assert_eq!(x, data().0);
        for (a, b) in y.iter().zip(y_orig.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }

        let (mut x, mut y) = data();
        x[[4, 1]] = f64::INFINITY;
        let x_orig = x.clone();
        let err = preprocess_data(
            &comm,
            &mut [x.view_mut()],
            &mut [y.view_mut()],
            &desc,
            true,
            &streams,
        )
        .unwrap_err();
        assert!(err.to_string().contains("column 1"));
        assert_eq!(x, x_orig);
        assert_eq!(y, data().1);
    }
}

//! Bridge from ndarray to `faer` for the symmetric eigendecompositions of
//! reduced Gram matrices.
//!
//! Contiguous inputs (row or column major) are handed to `faer` without a
//! copy; anything else is gathered into an owned `faer::Mat` first.

use faer::linalg::solvers;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
    #[error("Eigendecomposition produced non-finite values")]
    NonFinite,
}

/// Runs `op` on a `faer` view of `array`.
pub fn with_faer_view<S, R>(
    array: &ArrayBase<S, Ix2>,
    op: impl FnOnce(MatRef<'_, f64>) -> R,
) -> R
where
    S: Data<Elem = f64>,
{
    let (rows, cols) = array.dim();
    match array.as_slice_memory_order() {
        Some(slice) if array.is_standard_layout() => {
            op(MatRef::from_row_major_slice(slice, rows, cols))
        }
        Some(slice) if array.t().is_standard_layout() => {
            op(MatRef::from_column_major_slice(slice, rows, cols))
        }
        _ => op(Mat::from_fn(rows, cols, |i, j| array[(i, j)]).as_ref()),
    }
}

/// Eigenvalues and eigenvectors (as columns) in the order `faer` returns them.
fn symmetric_eigen<S: Data<Elem = f64>>(
    matrix: &ArrayBase<S, Ix2>,
) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
    with_faer_view(matrix, |view| {
        let eigen = view
            .self_adjoint_eigen(Side::Lower)
            .map_err(FaerLinalgError::SelfAdjointEigen)?;
        let values = eigen.S().column_vector().as_mat();
        let vectors = eigen.U();
        Ok((
            Array1::from_shape_fn(values.nrows(), |i| values[(i, 0)]),
            Array2::from_shape_fn((vectors.nrows(), vectors.ncols()), |(i, j)| vectors[(i, j)]),
        ))
    })
}

/// Eigenpairs of a symmetric matrix ordered by decreasing eigenvalue.
pub fn descending_eigh(
    matrix: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
    let (values, vectors) = symmetric_eigen(matrix)?;
    if values.iter().chain(vectors.iter()).any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFinite);
    }
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[j].total_cmp(&values[i]));

    let sorted_values = order.iter().map(|&idx| values[idx]).collect::<Array1<f64>>();
    let mut sorted_vectors = Array2::zeros(vectors.raw_dim());
    for (col, &idx) in order.iter().enumerate() {
        sorted_vectors.column_mut(col).assign(&vectors.column(idx));
    }
    Ok((sorted_values, sorted_vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_psd(n: usize, rank: usize, rng: &mut StdRng) -> Array2<f64> {
        let mut mat = Array2::zeros((rank, n));
        for i in 0..rank {
            for j in 0..n {
                mat[(i, j)] = rng.gen_range(-1.0..1.0);
            }
        }
        mat.t().dot(&mat)
    }

    #[test]
    fn descending_eigh_reconstructs_the_matrix() {
        let mut rng = StdRng::seed_from_u64(42);
        let matrix = random_psd(6, 9, &mut rng);
        let (values, vectors) = descending_eigh(&matrix).unwrap();

        for pair in values.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (a, b) in rebuilt.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn column_major_views_are_read_correctly() {
        let matrix = array![[4.0, 1.0], [1.0, 3.0]];
        let transposed = matrix.t().to_owned();
        let column_major = transposed.t();
        let read = with_faer_view(&column_major, |view| (view[(0, 1)], view[(1, 1)]));
        assert_eq!(read, (1.0, 3.0));
        let strided = array![[4.0, 9.0, 1.0], [1.0, 9.0, 3.0]];
        let gapped = strided.slice(ndarray::s![.., ..;2]);
        let read = with_faer_view(&gapped, |view| (view[(0, 1)], view[(1, 0)]));
        assert_eq!(read, (1.0, 1.0));
    }

    #[test]
    fn diagonal_matrix_eigenvalues_are_sorted() {
        let matrix = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let (values, vectors) = descending_eigh(&matrix).unwrap();
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[(1, 0)].abs(), 1.0, epsilon = 1e-12);
    }
}

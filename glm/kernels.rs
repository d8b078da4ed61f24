//! Dense element-wise and matrix-vector primitives used by the solvers.
//!
//! These operate on a single block; cross-rank work lives in `opg`.

use crate::types::GlmFloat;
use ndarray::{
    Array1, ArrayBase, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Data, DataMut, Ix1, Ix2,
};

/// Magnitude below which a singular value is treated as exactly zero.
pub const SINGULAR_VALUE_FLOOR: f64 = 1.0e-10;

/// Replaces every entry with `|x| < threshold` by zero.
pub fn set_small_values_zero<T, S>(values: &mut ArrayBase<S, Ix1>, threshold: T)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    values.mapv_inplace(|v| if v.abs() < threshold { T::zero() } else { v });
}

/// Element-wise square.
pub fn power<T, S>(values: &ArrayBase<S, Ix1>) -> Array1<T>
where
    T: GlmFloat,
    S: Data<Elem = T>,
{
    values.mapv(|v| v * v)
}

pub fn add_scalar<T, S>(values: &mut ArrayBase<S, Ix1>, scalar: T)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    values.mapv_inplace(|v| v + scalar);
}

/// `numerator / denominator` element-wise, yielding zero wherever the
/// denominator is zero.
pub fn divide_skip_zero<T: GlmFloat>(
    numerator: ArrayView1<T>,
    denominator: ArrayView1<T>,
) -> Array1<T> {
    let mut out = Array1::zeros(numerator.len());
    ndarray::Zip::from(&mut out)
        .and(&numerator)
        .and(&denominator)
        .for_each(|o, &num, &den| {
            *o = if den == T::zero() { T::zero() } else { num / den };
        });
    out
}

/// Multiplies column `j` by `scale[j]`.
pub fn scale_columns<T, S>(matrix: &mut ArrayBase<S, Ix2>, scale: ArrayView1<T>)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    for (mut column, &factor) in matrix.axis_iter_mut(Axis(1)).zip(scale.iter()) {
        column.mapv_inplace(|v| v * factor);
    }
}

/// Divides column `j` by `divisor[j]`, leaving columns with a zero divisor untouched.
pub fn divide_columns_skip_zero<T, S>(matrix: &mut ArrayBase<S, Ix2>, divisor: ArrayView1<T>)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    for (mut column, &d) in matrix.axis_iter_mut(Axis(1)).zip(divisor.iter()) {
        if d != T::zero() {
            column.mapv_inplace(|v| v / d);
        }
    }
}

/// Subtracts `row` from every row of `matrix`.
pub fn subtract_row_vector<T, S>(matrix: &mut ArrayBase<S, Ix2>, row: ArrayView1<T>)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    *matrix -= &row;
}

/// Adds `row` to every row of `matrix`.
pub fn add_row_vector<T, S>(matrix: &mut ArrayBase<S, Ix2>, row: ArrayView1<T>)
where
    T: GlmFloat,
    S: DataMut<Elem = T>,
{
    *matrix += &row;
}

/// `out = matrix · vector`.
pub fn gemv_into<T: GlmFloat>(
    matrix: ArrayView2<T>,
    vector: ArrayView1<T>,
    mut out: ArrayViewMut1<T>,
) {
    ndarray::linalg::general_mat_vec_mul(T::one(), &matrix, &vector, T::zero(), &mut out);
}

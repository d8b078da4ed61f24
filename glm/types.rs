use crate::comm::CommError;
use crate::faer_ndarray::FaerLinalgError;
use ndarray::NdFloat;
use thiserror::Error;

/// Floating-point element types accepted by the fit and predict entry points.
///
/// Cross-rank reductions and the eigendecomposition are carried out in `f64`;
/// `as_f64`/`from_f64` move values across that boundary.
pub trait GlmFloat: NdFloat + Send + Sync + 'static {
    fn as_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl GlmFloat for f32 {
    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl GlmFloat for f64 {
    #[inline]
    fn as_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Solver variants addressed by the integer `algo` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Svd,
    Eig,
    Qr,
}

impl Algorithm {
    pub const SVD_ID: u32 = 0;
    pub const EIG_ID: u32 = 1;
    pub const QR_ID: u32 = 2;

    pub fn id(self) -> u32 {
        match self {
            Algorithm::Svd => Self::SVD_ID,
            Algorithm::Eig => Self::EIG_ID,
            Algorithm::Qr => Self::QR_ID,
        }
    }

    /// Resolves the solver for a closed-form fit.
    ///
    /// Only the eigen path is implemented. A single-column design is rejected
    /// together with `algo == 0`, matching the dispatch of the distributed
    /// solvers this crate reproduces.
    pub fn resolve(solver: &'static str, algo: u32, n_cols: usize) -> Result<Self, GlmError> {
        if algo == Self::SVD_ID || n_cols == 1 {
            return Err(GlmError::UnsupportedAlgorithm {
                solver,
                algo,
                n_cols,
            });
        }
        match algo {
            Self::EIG_ID => Ok(Algorithm::Eig),
            _ => Err(GlmError::UnsupportedAlgorithm {
                solver,
                algo,
                n_cols,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum GlmError {
    #[error("{solver}: no algorithm with id {algo} has been implemented for {n_cols} column(s)")]
    UnsupportedAlgorithm {
        solver: &'static str,
        algo: u32,
        n_cols: usize,
    },

    #[error("invalid partition layout: {0}")]
    InvalidPartition(String),

    #[error("local buffers do not match the partition layout: {0}")]
    ShapeMismatch(String),

    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("non-finite input data: {0}")]
    NonFiniteInput(String),

    #[error("collective operation failed: {0}")]
    Comm(#[from] CommError),

    #[error("dense linear algebra failed: {0}")]
    Linalg(#[from] FaerLinalgError),

    #[error("failed to create execution streams: {0}")]
    Streams(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eigen_is_the_only_resolvable_algorithm() {
        assert_eq!(Algorithm::resolve("olsFit", 1, 3).unwrap(), Algorithm::Eig);
        for algo in [0, 2, 7] {
            let err = Algorithm::resolve("olsFit", algo, 3).unwrap_err();
            assert!(matches!(err, GlmError::UnsupportedAlgorithm { algo: a, .. } if a == algo));
        }
    }

    #[test]
    fn single_column_design_is_rejected_even_for_eigen() {
        let err = Algorithm::resolve("ridgeFit", 1, 1).unwrap_err();
        assert!(err.to_string().contains("ridgeFit"));
    }

    #[test]
    fn precision_round_trips_through_f64() {
        assert_eq!(<f32 as GlmFloat>::from_f64(0.5).as_f64(), 0.5);
        assert_eq!(<f64 as GlmFloat>::from_f64(1.0e-300), 1.0e-300);
    }
}

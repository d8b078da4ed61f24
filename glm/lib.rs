#![deny(unused_variables)]
#![deny(dead_code)]
//! Closed-form linear regression (OLS and ridge) over row-partitioned data
//! spread across the ranks of a collective group.
//!
//! Each rank passes the blocks it owns. Global statistics, the Gram matrix and
//! `Uᵀb` are combined through a [`comm::Communicator`]; per-block work runs on
//! a per-call [`stream::StreamPool`].

pub mod comm;
pub mod data;
pub mod faer_ndarray;
mod fit;
pub mod handle;
pub mod kernels;
pub mod model;
pub mod ols;
pub mod opg;
pub mod partition;
pub mod predict;
pub mod preprocess;
pub mod ridge;
pub mod stream;
pub mod types;

pub use comm::{CommError, Communicator, LocalComm, ReduceOp};
pub use handle::{Handle, run_local_group};
pub use model::{Estimator, LinearModel, ModelError};
pub use ols::OlsParams;
pub use partition::{PartitionDescriptor, RankSizePair};
pub use ridge::RidgeParams;
pub use types::{Algorithm, GlmError, GlmFloat};

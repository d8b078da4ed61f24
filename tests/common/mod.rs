#![allow(dead_code)]

use mnmg_glm::{
    CommError, Communicator, GlmError, GlmFloat, Handle, LocalComm, OlsParams,
    PartitionDescriptor, RankSizePair, ReduceOp, RidgeParams, ols, ridge, run_local_group,
};
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, concatenate, s};
use std::sync::atomic::{AtomicUsize, Ordering};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

pub enum Solver<T> {
    Ols(OlsParams),
    Ridge(Vec<T>, RidgeParams),
}

/// `n_rows x n_cols` standard normal design and `y = x·w + intercept + noise`.
pub fn linear_data(
    n_rows: usize,
    w: &[f64],
    intercept: f64,
    noise: f64,
    seed: u64,
) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let x = Array2::from_shape_fn((n_rows, w.len()), |_| normal.sample(&mut rng));
    let w = Array1::from(w.to_vec());
    let mut y = x.dot(&w) + intercept;
    if noise > 0.0 {
        let jitter = Normal::new(0.0, noise).unwrap();
        y.mapv_inplace(|v| v + jitter.sample(&mut rng));
    }
    (x, y)
}

pub fn layout(sizes: &[(usize, usize)]) -> Vec<RankSizePair> {
    sizes
        .iter()
        .map(|&(rank, size)| RankSizePair::new(rank, size))
        .collect()
}

/// Copies of the blocks `desc` assigns to its rank.
pub fn split_local<T: GlmFloat>(
    x: &Array2<T>,
    y: &Array1<T>,
    desc: &PartitionDescriptor,
) -> (Vec<Array2<T>>, Vec<Array1<T>>) {
    desc.local_blocks()
        .iter()
        .map(|block| {
            let rows = block.start_row..block.start_row + block.size;
            (
                x.slice(s![rows.clone(), ..]).to_owned(),
                y.slice(s![rows]).to_owned(),
            )
        })
        .unzip()
}

/// Wraps a [`LocalComm`] and fails the `fail_at`-th `all_reduce` (1-based)
/// as if a peer had left the group.
pub struct FailingComm {
    inner: LocalComm,
    fail_at: usize,
    calls: AtomicUsize,
}

impl FailingComm {
    pub fn single_rank(fail_at: usize) -> Self {
        Self {
            inner: LocalComm::group(1).remove(0),
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Communicator for FailingComm {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn all_reduce(&self, buf: &mut [f64], op: ReduceOp) -> Result<(), CommError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_at {
            return Err(CommError::Disconnected {
                rank: self.rank(),
                peer: self.rank() + 1,
            });
        }
        self.inner.all_reduce(buf, op)
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError> {
        self.inner.all_gather(local)
    }
}

/// One rank's fit. Returns the fitted model together with the rank's design
/// and label rows as they stand after the call, concatenated in row order.
pub fn fit_rank<T: GlmFloat>(
    handle: &mut Handle,
    x: &Array2<T>,
    y: &Array1<T>,
    parts: &[RankSizePair],
    solver: &Solver<T>,
) -> (Result<(Array1<T>, T), GlmError>, Array2<T>, Array1<T>) {
    let desc = match PartitionDescriptor::new(x.nrows(), x.ncols(), parts.to_vec(), handle.rank())
    {
        Ok(desc) => desc,
        Err(err) => return (Err(err), Array2::zeros((0, x.ncols())), Array1::zeros(0)),
    };
    let (mut x_blocks, mut y_blocks) = split_local(x, y, &desc);
    let mut coef = Array1::zeros(x.ncols());
    let mut intercept = T::zero();
    let result = {
        let mut input: Vec<ArrayViewMut2<T>> =
            x_blocks.iter_mut().map(|block| block.view_mut()).collect();
        let mut labels: Vec<ArrayViewMut1<T>> =
            y_blocks.iter_mut().map(|block| block.view_mut()).collect();
        match solver {
            Solver::Ols(params) => ols::fit(
                handle,
                &mut input,
                &desc,
                &mut labels,
                coef.view_mut(),
                &mut intercept,
                params,
            ),
            Solver::Ridge(alpha, params) => ridge::fit(
                handle,
                &mut input,
                &desc,
                &mut labels,
                alpha,
                coef.view_mut(),
                &mut intercept,
                params,
            ),
        }
    };
    let x_local = if x_blocks.is_empty() {
        Array2::zeros((0, x.ncols()))
    } else {
        let views: Vec<ArrayView2<T>> = x_blocks.iter().map(|block| block.view()).collect();
        concatenate(Axis(0), &views).unwrap()
    };
    let y_local: Array1<T> = y_blocks.iter().flat_map(|block| block.iter().copied()).collect();
    (result.map(|()| (coef, intercept)), x_local, y_local)
}

/// Fits on an in-process group, every rank holding its blocks of `x`/`y`.
pub fn fit_group<T: GlmFloat>(
    x: &Array2<T>,
    y: &Array1<T>,
    parts: &[RankSizePair],
    n_ranks: usize,
    solver: &Solver<T>,
) -> Vec<Result<(Array1<T>, T), GlmError>> {
    run_local_group(n_ranks, |mut handle| {
        fit_rank(&mut handle, x, y, parts, solver).0
    })
}

/// Element-wise equality that treats two NaNs as equal.
pub fn same_values<T: GlmFloat>(
    a: impl IntoIterator<Item = T>,
    b: impl IntoIterator<Item = T>,
) -> bool {
    let a: Vec<T> = a.into_iter().collect();
    let b: Vec<T> = b.into_iter().collect();
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(u, v)| u == v || (u.is_nan() && v.is_nan()))
}

/// Like [`fit_group`] but expects every rank to succeed with the same model.
pub fn fit_ok<T: GlmFloat>(
    x: &Array2<T>,
    y: &Array1<T>,
    parts: &[RankSizePair],
    n_ranks: usize,
    solver: &Solver<T>,
) -> (Array1<T>, T) {
    let mut results = fit_group(x, y, parts, n_ranks, solver)
        .into_iter()
        .map(|result| result.unwrap());
    let first = results.next().unwrap();
    for other in results {
        assert_eq!(other.0, first.0);
        assert_eq!(other.1, first.1);
    }
    first
}

/// Predictions for every row of `x` computed on an in-process group, gathered
/// in global row order.
pub fn predict_group(
    x: &Array2<f64>,
    parts: &[RankSizePair],
    n_ranks: usize,
    coef: &Array1<f64>,
    intercept: f64,
) -> Array1<f64> {
    let per_rank = run_local_group(n_ranks, |mut handle| {
        let desc =
            PartitionDescriptor::new(x.nrows(), x.ncols(), parts.to_vec(), handle.rank()).unwrap();
        let local = desc.local_blocks();
        let views: Vec<ArrayView2<f64>> = local
            .iter()
            .map(|block| x.slice(s![block.start_row..block.start_row + block.size, ..]))
            .collect();
        let mut outputs: Vec<Array1<f64>> =
            local.iter().map(|block| Array1::zeros(block.size)).collect();
        let mut preds: Vec<ArrayViewMut1<f64>> =
            outputs.iter_mut().map(|out| out.view_mut()).collect();
        ols::predict(
            &mut handle,
            parts,
            x.nrows(),
            x.ncols(),
            &views,
            coef.view(),
            intercept,
            &mut preds,
            false,
        )
        .unwrap();
        local
            .iter()
            .map(|block| block.start_row)
            .zip(outputs)
            .collect::<Vec<_>>()
    });
    let mut all = Array1::zeros(x.nrows());
    for (start, block) in per_rank.into_iter().flatten() {
        all.slice_mut(s![start..start + block.len()]).assign(&block);
    }
    all
}

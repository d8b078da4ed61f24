//! Per-call execution streams.
//!
//! A [`StreamPool`] is built at the start of a fit or predict call with one
//! worker per locally owned block (optionally capped), and dropped when the
//! call returns. Blocks are assigned to streams round-robin; work on one
//! stream runs in block order, work on different streams may overlap.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;

pub struct StreamPool {
    pool: ThreadPool,
    n_streams: usize,
}

impl StreamPool {
    pub fn new(
        n_blocks: usize,
        limit: Option<NonZeroUsize>,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let mut n_streams = n_blocks.max(1);
        if let Some(limit) = limit {
            n_streams = n_streams.min(limit.get());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_streams)
            .thread_name(|idx| format!("glm-stream-{idx}"))
            .build()?;
        log::trace!("created {n_streams} stream(s) for {n_blocks} block(s)");
        Ok(Self { pool, n_streams })
    }

    pub fn n_streams(&self) -> usize {
        self.n_streams
    }

    #[inline]
    pub fn stream_of(&self, block: usize) -> usize {
        block % self.n_streams
    }

    /// Runs `op` once per block and returns the results in block order.
    ///
    /// Returns only after every stream has drained its queue.
    pub fn for_each_block<I, R, F>(&self, blocks: I, op: F) -> Vec<R>
    where
        I: IntoIterator,
        I::Item: Send,
        R: Send,
        F: Fn(usize, I::Item) -> R + Sync,
    {
        let mut lanes: Vec<Vec<(usize, I::Item)>> =
            (0..self.n_streams).map(|_| Vec::new()).collect();
        let mut n_blocks = 0;
        for (idx, item) in blocks.into_iter().enumerate() {
            lanes[self.stream_of(idx)].push((idx, item));
            n_blocks += 1;
        }

        let op = &op;
        let finished: Vec<Vec<(usize, R)>> = self.pool.install(|| {
            lanes
                .into_par_iter()
                .map(|lane| {
                    lane.into_iter()
                        .map(|(idx, item)| (idx, op(idx, item)))
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let mut ordered: Vec<(usize, R)> = Vec::with_capacity(n_blocks);
        for lane in finished {
            ordered.extend(lane);
        }
        ordered.sort_by_key(|(idx, _)| *idx);
        ordered.into_iter().map(|(_, result)| result).collect()
    }
}

impl Drop for StreamPool {
    fn drop(&mut self) {
        log::trace!("releasing {} stream(s)", self.n_streams);
    }
}

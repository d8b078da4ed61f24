use crate::comm::{Communicator, LocalComm};
use crate::stream::StreamPool;
use crate::types::GlmError;
use std::num::NonZeroUsize;
use std::thread;

/// Environment variable capping the number of streams a call may create.
pub const MAX_STREAMS_ENV: &str = "MNMG_GLM_MAX_STREAMS";

/// Unset, unparsable and `0` all mean "no cap".
fn parse_stream_limit(value: Option<&str>) -> Option<NonZeroUsize> {
    let value = value?;
    match value.trim().parse::<usize>() {
        Ok(parsed) => NonZeroUsize::new(parsed),
        Err(_) => {
            log::warn!("ignoring {MAX_STREAMS_ENV}={value:?}: not a non-negative integer");
            None
        }
    }
}

fn stream_limit_from_env() -> Option<NonZeroUsize> {
    parse_stream_limit(std::env::var(MAX_STREAMS_ENV).ok().as_deref())
}

/// Everything one rank needs to take part in a fit or predict call.
///
/// Entry points borrow the handle mutably: a call, with its collectives and
/// its streams, must finish before the next one starts on the same rank.
pub struct Handle {
    comm: Box<dyn Communicator>,
    stream_limit: Option<NonZeroUsize>,
}

impl Handle {
    pub fn new(comm: impl Communicator + 'static) -> Self {
        Self {
            comm: Box::new(comm),
            stream_limit: stream_limit_from_env(),
        }
    }

    /// Caps the streams per call; `0` removes the cap.
    pub fn with_stream_limit(mut self, limit: usize) -> Self {
        self.stream_limit = NonZeroUsize::new(limit);
        self
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn n_ranks(&self) -> usize {
        self.comm.size()
    }

    pub fn stream_limit(&self) -> Option<NonZeroUsize> {
        self.stream_limit
    }

    pub(crate) fn streams_for(&self, n_blocks: usize) -> Result<StreamPool, GlmError> {
        Ok(StreamPool::new(n_blocks, self.stream_limit)?)
    }
}

/// Runs `body` once per rank of an in-process group of `n_ranks` ranks, each on
/// its own thread with its own [`Handle`], and returns the results in rank order.
///
/// A panic on any rank is resumed on the caller's thread after all ranks exit.
pub fn run_local_group<R, F>(n_ranks: usize, body: F) -> Vec<R>
where
    R: Send,
    F: Fn(Handle) -> R + Sync,
{
    let comms = LocalComm::group(n_ranks);
    thread::scope(|scope| {
        let workers: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let body = &body;
                scope.spawn(move || body(Handle::new(comm)))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| match worker.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

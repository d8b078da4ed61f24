//! Collective communication between the ranks of one fit or predict call.
//!
//! Every collective is blocking and must be entered by all ranks in the same
//! order. [`LocalComm`] runs a whole group inside one process, one thread per
//! rank, and combines contributions in rank order so every rank sees
//! bit-identical reduction results.

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    #[inline]
    fn combine(self, acc: f64, value: f64) -> f64 {
        match self {
            ReduceOp::Sum => acc + value,
            ReduceOp::Max => acc.max(value),
            ReduceOp::Min => acc.min(value),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommError {
    #[error("rank {rank}: peer rank {peer} left the group")]
    Disconnected { rank: usize, peer: usize },

    #[error("rank {rank}: peer rank {peer} contributed {found} values, expected {expected}")]
    LengthMismatch {
        rank: usize,
        peer: usize,
        expected: usize,
        found: usize,
    },
}

/// Rank identity plus the collectives the distributed solvers rely on.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Reduces `buf` element-wise across all ranks; every rank receives the result.
    fn all_reduce(&self, buf: &mut [f64], op: ReduceOp) -> Result<(), CommError>;

    /// Collects every rank's `local` buffer, indexed by rank.
    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError>;

    fn barrier(&self) -> Result<(), CommError> {
        self.all_gather(&[]).map(|_| ())
    }
}

/// In-process communicator. Each ordered pair of ranks has its own channel,
/// so a peer that exits is reported as [`CommError::Disconnected`] instead of
/// leaving the group blocked.
pub struct LocalComm {
    rank: usize,
    size: usize,
    to_peer: Vec<Option<Sender<Vec<f64>>>>,
    from_peer: Vec<Option<Receiver<Vec<f64>>>>,
}

impl LocalComm {
    /// Creates the communicators of a group of `size` ranks, indexed by rank.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let mut to_peer: Vec<Vec<Option<Sender<Vec<f64>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut from_peer: Vec<Vec<Option<Receiver<Vec<f64>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for from in 0..size {
            for to in 0..size {
                if from == to {
                    continue;
                }
                let (tx, rx) = unbounded();
                to_peer[from][to] = Some(tx);
                from_peer[to][from] = Some(rx);
            }
        }

        to_peer
            .into_iter()
            .zip(from_peer)
            .enumerate()
            .map(|(rank, (to_peer, from_peer))| LocalComm {
                rank,
                size,
                to_peer,
                from_peer,
            })
            .collect()
    }

    fn send_all(&self, payload: &[f64]) -> Result<(), CommError> {
        for (peer, tx) in self.to_peer.iter().enumerate() {
            if let Some(tx) = tx {
                tx.send(payload.to_vec())
                    .map_err(|_| CommError::Disconnected {
                        rank: self.rank,
                        peer,
                    })?;
            }
        }
        Ok(())
    }

    /// Exchanges `local` with every peer and returns all contributions in rank order.
    fn exchange(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError> {
        self.send_all(local)?;
        let mut contributions = Vec::with_capacity(self.size);
        for (peer, rx) in self.from_peer.iter().enumerate() {
            match rx {
                Some(rx) => {
                    let received = rx.recv().map_err(|_| CommError::Disconnected {
                        rank: self.rank,
                        peer,
                    })?;
                    contributions.push(received);
                }
                None => contributions.push(local.to_vec()),
            }
        }
        Ok(contributions)
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce(&self, buf: &mut [f64], op: ReduceOp) -> Result<(), CommError> {
        if self.size <= 1 {
            return Ok(());
        }
        let contributions = self.exchange(buf)?;
        for (peer, contribution) in contributions.iter().enumerate() {
            if contribution.len() != buf.len() {
                return Err(CommError::LengthMismatch {
                    rank: self.rank,
                    peer,
                    expected: buf.len(),
                    found: contribution.len(),
                });
            }
        }

        let (first, rest) = contributions.split_at(1);
        buf.copy_from_slice(&first[0]);
        for contribution in rest {
            for (acc, &value) in buf.iter_mut().zip(contribution) {
                *acc = op.combine(*acc, value);
            }
        }
        log::trace!(
            "rank {}: all_reduce({op:?}) over {} values",
            self.rank,
            buf.len()
        );
        Ok(())
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, CommError> {
        if self.size <= 1 {
            return Ok(vec![local.to_vec()]);
        }
        self.exchange(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_group<R: Send>(size: usize, body: impl Fn(LocalComm) -> R + Sync) -> Vec<R> {
        let comms = LocalComm::group(size);
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let body = &body;
                    scope.spawn(move || body(comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn all_reduce_sum_matches_on_every_rank() {
        let results = run_group(3, |comm| {
            let r = comm.rank() as f64;
            let mut buf = vec![r, 10.0 * r, 0.1];
            comm.all_reduce(&mut buf, ReduceOp::Sum).unwrap();
            buf
        });
        for buf in &results {
            assert_eq!(buf, &results[0]);
        }
        assert_eq!(results[0][0], 3.0);
        assert_eq!(results[0][1], 30.0);
    }

    #[test]
    fn max_and_min_reduce_elementwise() {
        let results = run_group(4, |comm| {
            let r = comm.rank() as f64;
            let mut hi = vec![r, -r];
            let mut lo = hi.clone();
            comm.all_reduce(&mut hi, ReduceOp::Max).unwrap();
            comm.all_reduce(&mut lo, ReduceOp::Min).unwrap();
            (hi, lo)
        });
        for (hi, lo) in results {
            assert_eq!(hi, vec![3.0, 0.0]);
            assert_eq!(lo, vec![0.0, -3.0]);
        }
    }

    #[test]
    fn back_to_back_collectives_stay_ordered() {
        let results = run_group(3, |comm| {
            let mut totals = Vec::new();
            for round in 0..25 {
                let mut buf = vec![(comm.rank() * round) as f64];
                comm.all_reduce(&mut buf, ReduceOp::Sum).unwrap();
                totals.push(buf[0]);
            }
            comm.barrier().unwrap();
            totals
        });
        for totals in results {
            for (round, total) in totals.into_iter().enumerate() {
                assert_eq!(total, (3 * round) as f64);
            }
        }
    }

    #[test]
    fn all_gather_is_indexed_by_rank() {
        let results = run_group(3, |comm| {
            let local = vec![comm.rank() as f64; comm.rank() + 1];
            comm.all_gather(&local).unwrap()
        });
        for gathered in results {
            assert_eq!(gathered.len(), 3);
            for (rank, part) in gathered.iter().enumerate() {
                assert_eq!(part.len(), rank + 1);
                assert!(part.iter().all(|&v| v == rank as f64));
            }
        }
    }

    #[test]
    fn mismatched_lengths_are_reported() {
        let results = run_group(2, |comm| {
            let mut buf = vec![1.0; comm.rank() + 1];
            comm.all_reduce(&mut buf, ReduceOp::Sum)
        });
        assert!(
            results
                .iter()
                .all(|r| matches!(r, Err(CommError::LengthMismatch { .. })))
        );
    }

    #[test]
    fn departed_peer_is_reported_not_awaited() {
        let results = run_group(2, |comm| {
            if comm.rank() == 1 {
                drop(comm);
                return Ok(());
            }
            let mut buf = vec![1.0];
            comm.all_reduce(&mut buf, ReduceOp::Sum)
        });
        assert!(matches!(
            results[0],
            Err(CommError::Disconnected { rank: 0, peer: 1 })
        ));
    }

    #[test]
    fn single_rank_group_is_a_no_op() {
        let mut comms = LocalComm::group(1);
        let comm = comms.remove(0);
        let mut buf = vec![2.5, -1.0];
        comm.all_reduce(&mut buf, ReduceOp::Sum).unwrap();
        assert_eq!(buf, vec![2.5, -1.0]);
        assert_eq!(comm.all_gather(&buf).unwrap(), vec![vec![2.5, -1.0]]);
    }
}

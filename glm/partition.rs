//! Row-partition layout shared by every rank taking part in a fit or predict call.
//!
//! A global `M x N` design matrix is cut into contiguous row blocks. Each block
//! is owned by exactly one rank, and the blocks of one rank form a single run of
//! the block sequence. Every rank holds the full layout so it can size
//! cross-rank reductions, but only touches the blocks it owns.

use crate::types::GlmError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One entry of the block sequence: the owning rank and the number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSizePair {
    pub rank: usize,
    pub size: usize,
}

impl RankSizePair {
    pub fn new(rank: usize, size: usize) -> Self {
        Self { rank, size }
    }
}

/// A block as seen from the layout: its position in the global sequence and
/// the first global row it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub index: usize,
    pub rank: usize,
    pub size: usize,
    pub start_row: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    m: usize,
    n: usize,
    parts: Vec<RankSizePair>,
    rank: usize,
}

impl PartitionDescriptor {
    pub fn new(
        m: usize,
        n: usize,
        parts: Vec<RankSizePair>,
        rank: usize,
    ) -> Result<Self, GlmError> {
        if m == 0 {
            return Err(GlmError::InvalidPartition(
                "global row count must be positive".to_string(),
            ));
        }
        if n == 0 {
            return Err(GlmError::InvalidPartition(
                "global column count must be positive".to_string(),
            ));
        }
        if let Some(pos) = parts.iter().position(|part| part.size == 0) {
            return Err(GlmError::InvalidPartition(format!(
                "block {pos} (rank {}) has zero rows",
                parts[pos].rank
            )));
        }

        let total: usize = parts.iter().map(|part| part.size).sum();
        if total != m {
            return Err(GlmError::InvalidPartition(format!(
                "block sizes sum to {total} but the matrix has {m} rows"
            )));
        }

        let mut finished = BTreeSet::new();
        let mut current: Option<usize> = None;
        for part in &parts {
            if current == Some(part.rank) {
                continue;
            }
            if finished.contains(&part.rank) {
                return Err(GlmError::InvalidPartition(format!(
                    "blocks of rank {} are not contiguous",
                    part.rank
                )));
            }
            if let Some(previous) = current {
                finished.insert(previous);
            }
            current = Some(part.rank);
        }

        Ok(Self { m, n, parts, rank })
    }

    /// Splits `m` rows into `n_ranks * blocks_per_rank` blocks of near-equal
    /// size, rank-major. Leading blocks absorb the remainder.
    pub fn even(
        m: usize,
        n: usize,
        n_ranks: usize,
        blocks_per_rank: usize,
        rank: usize,
    ) -> Result<Self, GlmError> {
        let n_blocks = n_ranks.checked_mul(blocks_per_rank).unwrap_or(0);
        if n_blocks == 0 {
            return Err(GlmError::InvalidPartition(
                "need at least one rank and one block per rank".to_string(),
            ));
        }
        if n_blocks > m {
            return Err(GlmError::InvalidPartition(format!(
                "cannot cut {m} rows into {n_blocks} non-empty blocks"
            )));
        }
        let base = m / n_blocks;
        let remainder = m % n_blocks;
        let parts = (0..n_blocks)
            .map(|block| {
                let size = base + usize::from(block < remainder);
                RankSizePair::new(block / blocks_per_rank, size)
            })
            .collect();
        Self::new(m, n, parts, rank)
    }

    pub fn n_rows(&self) -> usize {
        self.m
    }

    pub fn n_cols(&self) -> usize {
        self.n
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn parts(&self) -> &[RankSizePair] {
        &self.parts
    }

    pub fn n_blocks(&self) -> usize {
        self.parts.len()
    }

    fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.parts
            .iter()
            .scan(0usize, |start, part| {
                let info = (*start, *part);
                *start += part.size;
                Some(info)
            })
            .enumerate()
            .map(|(index, (start_row, part))| BlockInfo {
                index,
                rank: part.rank,
                size: part.size,
                start_row,
            })
    }

    /// Blocks owned by `rank`, in global order. Position in this list is the
    /// local block index used for buffers and stream assignment.
    pub fn blocks_owned_by(&self, rank: usize) -> Vec<BlockInfo> {
        self.blocks().filter(|block| block.rank == rank).collect()
    }

    pub fn local_blocks(&self) -> Vec<BlockInfo> {
        self.blocks_owned_by(self.rank)
    }

    pub fn total_blocks_owned_by(&self, rank: usize) -> usize {
        self.parts.iter().filter(|part| part.rank == rank).count()
    }

    pub fn total_rows_owned_by(&self, rank: usize) -> usize {
        self.parts
            .iter()
            .filter(|part| part.rank == rank)
            .map(|part| part.size)
            .sum()
    }

    pub fn total_elements_owned_by(&self, rank: usize) -> usize {
        self.total_rows_owned_by(rank) * self.n
    }

    pub fn start_indices(&self, rank: usize) -> Vec<usize> {
        self.blocks_owned_by(rank)
            .into_iter()
            .map(|block| block.start_row)
            .collect()
    }

    pub fn unique_ranks(&self) -> BTreeSet<usize> {
        self.parts.iter().map(|part| part.rank).collect()
    }

    pub fn max_rank(&self) -> Option<usize> {
        self.parts.iter().map(|part| part.rank).max()
    }

    /// Checks that the layout can run on a group of `n_ranks` ranks as `rank`.
    pub fn check_group(&self, rank: usize, n_ranks: usize) -> Result<(), GlmError> {
        if self.rank != rank {
            return Err(GlmError::InvalidPartition(format!(
                "descriptor was built for rank {} but the handle is rank {rank}",
                self.rank
            )));
        }
        if let Some(max_rank) = self.max_rank() {
            if max_rank >= n_ranks {
                return Err(GlmError::InvalidPartition(format!(
                    "block owned by rank {max_rank} but the group has {n_ranks} ranks"
                )));
            }
        }
        Ok(())
    }

    /// Checks one `(rows, cols)` design buffer per local block.
    pub fn check_local_blocks(&self, shapes: &[(usize, usize)]) -> Result<(), GlmError> {
        let local = self.local_blocks();
        if shapes.len() != local.len() {
            return Err(GlmError::ShapeMismatch(format!(
                "rank {} owns {} blocks but {} design buffers were passed",
                self.rank,
                local.len(),
                shapes.len()
            )));
        }
        for (block, &(rows, cols)) in local.iter().zip(shapes) {
            if rows != block.size || cols != self.n {
                return Err(GlmError::ShapeMismatch(format!(
                    "block {} expects {}x{} but the buffer is {rows}x{cols}",
                    block.index, block.size, self.n
                )));
            }
        }
        Ok(())
    }

    /// Checks one vector buffer per local block, one entry per row.
    pub fn check_local_vectors(&self, lens: &[usize]) -> Result<(), GlmError> {
        let local = self.local_blocks();
        if lens.len() != local.len() {
            return Err(GlmError::ShapeMismatch(format!(
                "rank {} owns {} blocks but {} vector buffers were passed",
                self.rank,
                local.len(),
                lens.len()
            )));
        }
        for (block, &len) in local.iter().zip(lens) {
            if len != block.size {
                return Err(GlmError::ShapeMismatch(format!(
                    "block {} expects {} rows but the vector has {len}",
                    block.index, block.size
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for PartitionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "M: {}, N: {}, blocks: {}, rank: {}",
            self.m,
            self.n,
            self.parts.len(),
            self.rank
        )?;
        writeln!(f, "{:>6} {:>6} {:>10} {:>10}", "block", "rank", "rows", "start")?;
        for block in self.blocks() {
            writeln!(
                f,
                "{:>6} {:>6} {:>10} {:>10}",
                block.index, block.rank, block.size, block.start_row
            )?;
        }
        Ok(())
    }
}

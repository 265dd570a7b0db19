//! Test chain construction.

use std::sync::Arc;

use crate::arith_uint::U256;
use crate::block_index::{is_proof_of_stake, version_with_algo, BlockIndex, CandidateHeader};

/// Builds chains of [`BlockIndex`] nodes, maintaining heights, cumulative
/// channel counters and unique fake block hashes.
pub struct ChainBuilder {
    tip: Option<Arc<BlockIndex>>,
    next_hash: u64,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            tip: None,
            next_hash: 1,
        }
    }

    pub fn tip(&self) -> Option<&Arc<BlockIndex>> {
        self.tip.as_ref()
    }

    /// Append a block with an explicit version word.
    pub fn add_version(&mut self, version: i32, time: i64, bits: u32) -> Arc<BlockIndex> {
        let (height, mut height_pow, mut height_pos) = match self.tip.as_deref() {
            Some(tip) => (tip.height + 1, tip.height_pow, tip.height_pos),
            None => (0, 0, 0),
        };
        if is_proof_of_stake(version) {
            height_pos += 1;
        } else {
            height_pow += 1;
        }
        let block_hash = U256::from(self.next_hash) << 64;
        self.next_hash += 1;

        let node = Arc::new(BlockIndex {
            height,
            height_pow,
            height_pos,
            prev: self.tip.clone(),
            time,
            bits,
            version,
            block_hash,
        });
        self.tip = Some(Arc::clone(&node));
        node
    }

    /// Append a block tagged with `algo`.
    pub fn add_algo(&mut self, algo: i32, time: i64, bits: u32) -> Arc<BlockIndex> {
        self.add_version(version_with_algo(4, algo), time, bits)
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate header tagged with `algo`.
pub fn candidate(algo: i32, time: i64) -> CandidateHeader {
    CandidateHeader {
        version: version_with_algo(4, algo),
        time,
    }
}

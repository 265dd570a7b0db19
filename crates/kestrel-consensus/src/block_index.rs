//! Chain-index model: header version tags, difficulty channels, and the
//! backward navigators the retargeting algorithms walk.
//!
//! The chain index is a DAG of shared, immutable nodes with upward `prev`
//! pointers; the node store itself (lookup, persistence) belongs to the
//! caller. Everything here reads the index without allocating.

use std::sync::Arc;

use crate::arith_uint::U256;

/// Algorithm tag for proof-of-stake blocks.
pub const ALGO_POS: i32 = 0;
/// Algorithm tag for SHA-256 proof-of-work blocks.
pub const ALGO_POW_SHA256: i32 = 1;
/// Number of tagged difficulty channels.
pub const ALGO_COUNT: i32 = 2;
/// Pseudo-tag for headers that predate the hybrid fork and carry no
/// algorithm bits.
pub const ALGO_NONE: i32 = -1;

/// Bit 27 of the header version marks a proof-of-stake block.
pub const VERSION_STAKE_BIT: i32 = 1 << 27;
/// Bits 28..30 carry the algorithm tag plus one; zero means untagged.
const VERSION_ALGO_SHIFT: u32 = 28;
const VERSION_ALGO_MASK: i32 = 0x7;

/// Algorithm tag embedded in a header version, [`ALGO_NONE`] when absent.
pub fn algo_type(version: i32) -> i32 {
    let tag = (version >> VERSION_ALGO_SHIFT) & VERSION_ALGO_MASK;
    if tag == 0 || tag > ALGO_COUNT {
        ALGO_NONE
    } else {
        tag - 1
    }
}

/// Stake flag embedded in a header version.
pub fn is_proof_of_stake(version: i32) -> bool {
    version & VERSION_STAKE_BIT != 0
}

/// Compose a header version carrying `algo`; proof-of-stake tags also set
/// the stake bit.
pub fn version_with_algo(base: i32, algo: i32) -> i32 {
    debug_assert!((0..ALGO_COUNT).contains(&algo));
    let mut version = base | ((algo + 1) << VERSION_ALGO_SHIFT);
    if algo == ALGO_POS {
        version |= VERSION_STAKE_BIT;
    }
    version
}

/// The candidate-header fields the retargeting core reads.
#[derive(Debug, Clone, Copy)]
pub struct CandidateHeader {
    pub version: i32,
    pub time: i64,
}

/// A node of the chain index.
///
/// `height_pow` and `height_pos` are cumulative counts of work and stake
/// blocks up to and including this node; the caller maintains them when
/// extending the index.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub height: u32,
    pub height_pow: u32,
    pub height_pos: u32,
    pub prev: Option<Arc<BlockIndex>>,
    pub time: i64,
    pub bits: u32,
    pub version: i32,
    pub block_hash: U256,
}

impl BlockIndex {
    pub fn algo_type(&self) -> i32 {
        algo_type(self.version)
    }

    pub fn is_proof_of_stake(&self) -> bool {
        is_proof_of_stake(self.version)
    }

    /// Most recent block at or before `self` with the given stake flag.
    /// Falls back to the earliest block when nothing matches.
    pub fn last_of_stake(&self, proof_of_stake: bool) -> &BlockIndex {
        let mut node = self;
        while node.is_proof_of_stake() != proof_of_stake {
            match node.prev.as_deref() {
                Some(prev) => node = prev,
                None => break,
            }
        }
        node
    }

    /// Most recent block at or before `self` carrying `algo`. Falls back to
    /// the earliest block when nothing matches.
    pub fn last_of_algo(&self, algo: i32) -> &BlockIndex {
        let mut node = self;
        while node.algo_type() != algo {
            match node.prev.as_deref() {
                Some(prev) => node = prev,
                None => break,
            }
        }
        node
    }

    /// Ancestor at exactly `height`, `None` when `height` is above `self`.
    pub fn ancestor(&self, height: u32) -> Option<&BlockIndex> {
        if height > self.height {
            return None;
        }
        let mut node = self;
        while node.height > height {
            node = node.prev.as_deref()?;
        }
        (node.height == height).then_some(node)
    }
}

/// An independent difficulty history: the algorithm tag when the header
/// carries one, the stake flag otherwise (pre-fork headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Algo(i32),
    Stake(bool),
}

impl Channel {
    pub fn for_header(version: i32) -> Channel {
        match algo_type(version) {
            ALGO_NONE => Channel::Stake(is_proof_of_stake(version)),
            algo => Channel::Algo(algo),
        }
    }

    /// Slot into `ChainParams::pow_limit` for this channel.
    pub fn limit_index(&self) -> usize {
        match *self {
            Channel::Algo(algo) => algo as usize,
            Channel::Stake(true) => ALGO_POS as usize,
            Channel::Stake(false) => ALGO_POW_SHA256 as usize,
        }
    }

    pub fn is_stake(&self) -> bool {
        matches!(*self, Channel::Algo(ALGO_POS) | Channel::Stake(true))
    }

    /// Most recent in-channel block at or before `node`.
    pub fn last_in<'a>(&self, node: &'a BlockIndex) -> &'a BlockIndex {
        match *self {
            Channel::Algo(algo) => node.last_of_algo(algo),
            Channel::Stake(proof_of_stake) => node.last_of_stake(proof_of_stake),
        }
    }
}

/// Resolve the ASERT anchor for a channel: walking back from `tip`, the
/// earliest in-channel block whose height still clears `start_height` (or
/// the channel's earliest block when the start height is unreachable).
pub fn asert_reference<'a>(
    channel: Channel,
    tip: &'a BlockIndex,
    start_height: u32,
) -> &'a BlockIndex {
    let mut node = tip;
    while let Some(prev) = node.prev.as_deref() {
        let earlier = channel.last_in(prev);
        if earlier.height < start_height {
            break;
        }
        node = earlier;
    }
    node
}

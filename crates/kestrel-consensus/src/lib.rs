//! # kestrel-consensus
//!
//! Consensus rules for the Kestrel hybrid proof-of-work / proof-of-stake
//! chain.
//!
//! This crate provides:
//! - Difficulty retargeting per channel (work and stake histories are
//!   independent and never mix)
//! - The proof validity predicate checking header hashes against compact
//!   targets
//! - Fixed-width 256/512-bit arithmetic and the compact target codec
//! - Chain-weight helpers for heaviest-chain selection
//!
//! ## Retargeting
//!
//! The live algorithm is an averaged-target ASERT: each channel is held to
//! an absolute block schedule counted from its anchor block, with the
//! reference target averaged over the channel's recent window and the
//! fractional exponent approximated by an exact integer cubic. A
//! weighted-target EMA covers heights before the ASERT anchor, and the
//! legacy epoch retarget validates the pre-hybrid SHA-256 segment.
//!
//! The retargeting entry points are total: malformed history and overflow
//! conditions deterministically resolve to the channel's limit.

pub mod arith_uint;
mod block_index;
mod chain_params;
mod difficulty;
mod error;
mod legacy_difficulty;
mod pow;
mod work;

#[cfg(test)]
mod retarget_vectors;
#[cfg(test)]
mod testutil;

pub use arith_uint::{U256, U512};
pub use block_index::{
    algo_type, asert_reference, is_proof_of_stake, version_with_algo, BlockIndex,
    CandidateHeader, Channel, ALGO_COUNT, ALGO_NONE, ALGO_POS, ALGO_POW_SHA256,
    VERSION_STAKE_BIT,
};
pub use chain_params::{ChainParams, ChainParamsConfig, ChainParamsError, POW_TARGET_SPACING};
pub use difficulty::{DifficultyCalculator, TargetCache};
pub use error::{ConsensusError, ConsensusResult};
pub use legacy_difficulty::{calculate_next_work, next_work_required_legacy};
pub use pow::{check_proof_of_work, verify_proof_of_work};
pub use work::block_proof;

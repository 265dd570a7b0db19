//! Proof validity predicate.

use tracing::debug;

use crate::arith_uint::U256;
use crate::block_index::{ALGO_COUNT, ALGO_NONE, ALGO_POS, ALGO_POW_SHA256};
use crate::chain_params::ChainParams;
use crate::error::{ConsensusError, ConsensusResult};

/// Check a header hash against its declared compact target, reporting the
/// rejection reason.
///
/// `algo` is the header's embedded tag: [`ALGO_NONE`] for pre-fork headers
/// (checked against the work limit), otherwise a work algorithm. Stake
/// blocks carry no provable work and are rejected outright.
pub fn verify_proof_of_work(
    hash: &U256,
    bits: u32,
    algo: i32,
    params: &ChainParams,
) -> ConsensusResult<()> {
    let (target, negative, overflow) = U256::from_compact(bits);
    if negative {
        return Err(ConsensusError::NegativeTarget { bits });
    }
    if target.is_zero() {
        return Err(ConsensusError::ZeroTarget { bits });
    }
    if overflow {
        return Err(ConsensusError::TargetOverflow { bits });
    }
    if algo < ALGO_NONE || algo == ALGO_POS || algo >= ALGO_COUNT {
        return Err(ConsensusError::UnknownAlgo { algo });
    }

    let limit_algo = if algo == ALGO_NONE { ALGO_POW_SHA256 } else { algo };
    if target > params.pow_limit[limit_algo as usize] {
        return Err(ConsensusError::TargetAboveLimit);
    }

    if *hash > target {
        return Err(ConsensusError::HashAboveTarget);
    }

    Ok(())
}

/// Boolean surface over [`verify_proof_of_work`]; the rejection reason is
/// logged at debug level.
pub fn check_proof_of_work(hash: &U256, bits: u32, algo: i32, params: &ChainParams) -> bool {
    match verify_proof_of_work(hash, bits, algo, params) {
        Ok(()) => true,
        Err(reason) => {
            debug!(%reason, bits = %format_args!("0x{bits:08x}"), algo, "proof of work rejected");
            false
        }
    }
}

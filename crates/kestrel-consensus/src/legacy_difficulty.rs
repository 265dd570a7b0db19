//! Legacy epoch-based retargeting.
//!
//! The pre-hybrid network retargeted once per adjustment interval, scaling
//! the last target by the clamped time the interval actually took. Kept for
//! validating the historical SHA-256 chain segment.

use tracing::debug;

use crate::arith_uint::U256;
use crate::block_index::{BlockIndex, CandidateHeader, ALGO_POW_SHA256};
use crate::chain_params::ChainParams;

/// Required compact target for `header` extending `last` under the epoch
/// rule.
pub fn next_work_required_legacy(
    last: &BlockIndex,
    header: &CandidateHeader,
    params: &ChainParams,
) -> u32 {
    let pow_limit_compact = params.pow_limit[ALGO_POW_SHA256 as usize].to_compact();
    let interval = params.difficulty_adjustment_interval();
    if interval == 0 {
        return pow_limit_compact;
    }

    // Only change once per adjustment interval.
    if (last.height + 1) % interval != 0 {
        if params.pow_allow_min_difficulty_blocks {
            // Testnet exception: a block more than twice the target spacing
            // late may be mined at minimum difficulty.
            if header.time > last.time + params.pow_target_spacing * 2 {
                return pow_limit_compact;
            }
            // Otherwise inherit from the last block that was not itself a
            // minimum-difficulty exception.
            let mut node = last;
            while let Some(prev) = node.prev.as_deref() {
                if node.height % interval == 0 || node.bits != pow_limit_compact {
                    break;
                }
                node = prev;
            }
            return node.bits;
        }
        return last.bits;
    }

    let first_height = last.height + 1 - interval;
    match last.ancestor(first_height) {
        Some(first) => calculate_next_work(last, first.time, params),
        None => pow_limit_compact,
    }
}

/// Scale the last target by the clamped actual timespan of the closing
/// interval.
pub fn calculate_next_work(
    last: &BlockIndex,
    first_block_time: i64,
    params: &ChainParams,
) -> u32 {
    if params.pow_no_retargeting {
        return last.bits;
    }

    let timespan = i64::from(params.pow_target_timespan);
    let actual = (last.time - first_block_time).clamp(timespan / 4, timespan * 4);

    let pow_limit = &params.pow_limit[ALGO_POW_SHA256 as usize];
    let (last_target, _, _) = U256::from_compact(last.bits);
    let mut new_target =
        last_target * U256::from(actual as u64) / U256::from(timespan as u64);
    if new_target > *pow_limit {
        new_target = *pow_limit;
    }

    let new_bits = new_target.to_compact();
    debug!(
        height = last.height + 1,
        actual_timespan = actual,
        new_bits = %format_args!("0x{new_bits:08x}"),
        "legacy retarget"
    );
    new_bits
}

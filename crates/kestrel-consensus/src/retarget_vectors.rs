//! End-to-end retargeting scenarios across both channels and all three
//! algorithms.

use crate::arith_uint::U256;
use crate::block_index::{CandidateHeader, ALGO_POS, ALGO_POW_SHA256, VERSION_STAKE_BIT};
use crate::chain_params::{ChainParams, ChainParamsConfig};
use crate::difficulty::{DifficultyCalculator, TargetCache};
use crate::testutil::{candidate, ChainBuilder};

/// Divisible by the stake timestamp mask plus one.
const START: i64 = 1_600_000_000;
/// Normalized target well inside both channel limits.
const BITS: u32 = 0x1c0f_fff0;

const SHA_LIMIT: u32 = 0x1e0f_ffff;
const POS_LIMIT: u32 = 0x1e00_ffff;

fn decode(bits: u32) -> U256 {
    U256::from_compact(bits).0
}

/// Chain whose tip sits exactly on the ASERT schedule for its channel: the
/// first solve absorbs the anchor-parent offset, the rest land every
/// `spacing` seconds.
fn on_schedule_chain(algo: i32, blocks: u32, spacing: i64, bits: u32) -> ChainBuilder {
    let mut chain = ChainBuilder::new();
    chain.add_algo(algo, START + spacing, bits);
    for i in 1..blocks {
        chain.add_algo(algo, START + spacing * (i64::from(i) + 2), bits);
    }
    chain
}

/// Uniformly spaced single-channel chain.
fn uniform_chain(algo: i32, blocks: u32, spacing: i64, bits: u32) -> ChainBuilder {
    let mut chain = ChainBuilder::new();
    for i in 0..blocks {
        chain.add_algo(algo, START + spacing * i64::from(i), bits);
    }
    chain
}

#[test]
fn genesis_returns_channel_limit() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    assert_eq!(
        calc.next_work_required(None, &candidate(ALGO_POW_SHA256, START)),
        SHA_LIMIT
    );
    assert_eq!(
        calc.next_work_required(None, &candidate(ALGO_POS, START)),
        POS_LIMIT
    );
    // Untagged headers resolve to the work limit in the dispatcher...
    let untagged_stake = CandidateHeader {
        version: 4 | VERSION_STAKE_BIT,
        time: START,
    };
    assert_eq!(calc.next_work_required(None, &untagged_stake), SHA_LIMIT);
    // ...but to their stake channel's limit inside the algorithms.
    assert_eq!(calc.weighted_target_ema(None, &untagged_stake), POS_LIMIT);
    assert_eq!(calc.averaged_target_asert(None, &untagged_stake), POS_LIMIT);
}

#[test]
fn no_retargeting_pins_the_limit() {
    let params = ChainParams::regtest();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    let chain = uniform_chain(ALGO_POW_SHA256, 5, 600, 0x207f_fff0);
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.next_work_required(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600)),
        0x207f_ffff
    );
}

#[test]
fn insufficient_history_returns_limit() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let header = candidate(ALGO_POW_SHA256, START + 1_200);

    // One block: no in-channel parent pair yet.
    let mut chain = ChainBuilder::new();
    chain.add_algo(ALGO_POW_SHA256, START, BITS);
    let tip = chain.tip().unwrap().clone();
    assert_eq!(calc.weighted_target_ema(Some(&tip), &header), SHA_LIMIT);
    assert_eq!(calc.averaged_target_asert(Some(&tip), &header), SHA_LIMIT);

    // Two blocks: still short one predecessor.
    chain.add_algo(ALGO_POW_SHA256, START + 600, BITS);
    let tip = chain.tip().unwrap();
    assert_eq!(calc.weighted_target_ema(Some(tip), &header), SHA_LIMIT);
    assert_eq!(calc.averaged_target_asert(Some(tip), &header), SHA_LIMIT);
}

#[test]
fn wtema_on_schedule_preserves_target() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    let chain = uniform_chain(ALGO_POW_SHA256, 5, 600, BITS);
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600)),
        BITS
    );

    // The stake channel runs its own spacing.
    let chain = uniform_chain(ALGO_POS, 5, 80, BITS);
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POS, tip.time + 80)),
        BITS
    );
}

#[test]
fn wtema_tracks_solve_time() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let target = decode(BITS);

    let fast = uniform_chain(ALGO_POW_SHA256, 5, 300, BITS);
    let tip = fast.tip().unwrap();
    let fast_bits =
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 300));
    assert!(decode(fast_bits) < target);

    let slow = uniform_chain(ALGO_POW_SHA256, 5, 1_200, BITS);
    let tip = slow.tip().unwrap();
    let slow_bits =
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 1_200));
    assert!(decode(slow_bits) > target);

    // Monotone: slower solves never tighten the target.
    assert!(decode(slow_bits) >= decode(fast_bits));
}

#[test]
fn wtema_negative_solve_time_stays_bounded() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // Timestamps run backward between the last two blocks.
    let mut chain = ChainBuilder::new();
    chain.add_algo(ALGO_POW_SHA256, START, BITS);
    chain.add_algo(ALGO_POW_SHA256, START + 600, BITS);
    chain.add_algo(ALGO_POW_SHA256, START + 1_200, BITS);
    chain.add_algo(ALGO_POW_SHA256, START + 900, BITS);
    let tip = chain.tip().unwrap();

    let bits =
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600));
    let target = decode(bits);
    assert!(!target.is_zero());
    assert!(target < decode(BITS));
    assert!(target <= params.pow_limit[ALGO_POW_SHA256 as usize]);
}

#[test]
fn wtema_caps_at_channel_limit() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // Already at the limit and running very slow: the sentinel holds.
    let chain = uniform_chain(ALGO_POW_SHA256, 5, 600_000, SHA_LIMIT);
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.weighted_target_ema(Some(tip), &candidate(ALGO_POW_SHA256, tip.time)),
        SHA_LIMIT
    );
}

#[test]
fn asert_at_anchor_matches_anchor_target() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // Window not yet filled: the reference is the anchor's own target, and
    // an on-schedule tip applies a unit exponent.
    let chain = on_schedule_chain(ALGO_POW_SHA256, 22, 600, BITS);
    let tip = chain.tip().unwrap();
    let header = candidate(ALGO_POW_SHA256, tip.time + 600);
    assert_eq!(calc.averaged_target_asert(Some(tip), &header), BITS);
    // The dispatcher routes straight to ASERT on mainnet.
    assert_eq!(calc.next_work_required(Some(tip), &header), BITS);
}

#[test]
fn asert_full_window_on_schedule_preserves_target() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // Height 574: the averaging window ends on the tip and spans exactly
    // the most recent 288 work blocks.
    let chain = on_schedule_chain(ALGO_POW_SHA256, 575, 600, BITS);
    let tip = chain.tip().unwrap();
    let header = candidate(ALGO_POW_SHA256, tip.time + 600);
    assert_eq!(calc.averaged_target_asert(Some(tip), &header), BITS);
}

#[test]
fn asert_schedule_offset_moves_target() {
    let params = ChainParams::mainnet();
    let target = decode(BITS);

    // Ahead of schedule (blocks came fast): harder.
    let mut chain = on_schedule_chain(ALGO_POW_SHA256, 21, 600, BITS);
    let behind = chain.tip().unwrap().time + 600 - 6_000;
    chain.add_algo(ALGO_POW_SHA256, behind, BITS);
    let tip = chain.tip().unwrap();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let fast_bits =
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600));
    assert!(decode(fast_bits) < target);

    // Behind schedule (blocks came slow): easier, still capped.
    let mut chain = on_schedule_chain(ALGO_POW_SHA256, 21, 600, BITS);
    let ahead = chain.tip().unwrap().time + 600 + 6_000;
    chain.add_algo(ALGO_POW_SHA256, ahead, BITS);
    let tip = chain.tip().unwrap();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let slow_bits =
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600));
    assert!(decode(slow_bits) > target);
    assert!(decode(slow_bits) <= params.pow_limit[ALGO_POW_SHA256 as usize]);

    assert!(decode(slow_bits) >= decode(fast_bits));
}

#[test]
fn asert_runs_per_channel_schedule() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // A stake chain on its own 80-second schedule holds its target.
    let chain = on_schedule_chain(ALGO_POS, 22, 80, BITS);
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POS, tip.time + 80)),
        BITS
    );
}

#[test]
fn asert_rounds_stake_reference_up_to_mask() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // The genesis anchor has no parent, so its own time minus one spacing
    // stands in: START + 85 - 80 = START + 5, misaligned, rounded up to
    // START + 16.
    let mut chain = ChainBuilder::new();
    chain.add_algo(ALGO_POS, START + 85, BITS);
    for i in 1..22u32 {
        chain.add_algo(ALGO_POS, START + 16 + 80 * (i64::from(i) + 2), BITS);
    }
    let tip = chain.tip().unwrap();
    // On schedule against the rounded-up reference: the target holds
    // exactly. Rounding down (or not rounding) would leave a remainder and
    // move the mantissa.
    assert_eq!(
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POS, tip.time + 80)),
        BITS
    );
}

#[test]
fn asert_history_shortfall_hardens_reference() {
    let params = ChainParams::mainnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    // Height 573: the averaging window ends at height 286 and runs out of
    // history one block short; the empty slot averages in as zero.
    let chain = on_schedule_chain(ALGO_POW_SHA256, 574, 600, BITS);
    let tip = chain.tip().unwrap();
    let bits =
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600));
    let target = decode(bits);
    assert!(target < decode(BITS));
    assert!(target > decode(BITS) / 2u32);
}

#[test]
fn asert_skips_min_difficulty_samples() {
    let params = ChainParams::testnet();
    let sentinel = SHA_LIMIT - 1;

    // Three sentinel blocks inside the averaging window: they are skipped
    // and the window stretches three blocks further back, so the average —
    // and the output — match the clean chain exactly.
    let mut chain = ChainBuilder::new();
    chain.add_algo(ALGO_POW_SHA256, START + 600, BITS);
    for i in 1..575u32 {
        let bits = if (400..=402).contains(&i) { sentinel } else { BITS };
        chain.add_algo(ALGO_POW_SHA256, START + 600 * (i64::from(i) + 2), bits);
    }
    let tip = chain.tip().unwrap();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    assert_eq!(
        calc.averaged_target_asert(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600)),
        BITS
    );
}

#[test]
fn asert_channel_isolation() {
    let params = ChainParams::mainnet();

    let plain = on_schedule_chain(ALGO_POW_SHA256, 22, 600, BITS);
    let plain_tip = plain.tip().unwrap();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let header = candidate(ALGO_POW_SHA256, plain_tip.time + 600);
    let expected = calc.averaged_target_asert(Some(plain_tip), &header);

    // The same work blocks with stake blocks woven between them.
    let mut mixed = ChainBuilder::new();
    mixed.add_algo(ALGO_POW_SHA256, START + 600, BITS);
    for i in 1..22u32 {
        mixed.add_algo(ALGO_POS, START + 600 * (i64::from(i) + 2) - 80, 0x1b00_fff0);
        mixed.add_algo(ALGO_POW_SHA256, START + 600 * (i64::from(i) + 2), BITS);
    }
    mixed.add_algo(ALGO_POS, plain_tip.time + 40, 0x1b00_fff0);
    let mixed_tip = mixed.tip().unwrap();

    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    assert_eq!(
        calc.averaged_target_asert(Some(mixed_tip), &header),
        expected
    );
    assert_eq!(calc.next_work_required(Some(mixed_tip), &header), expected);
}

#[test]
fn asert_cache_is_transparent() {
    let params = ChainParams::mainnet();
    let chain = on_schedule_chain(ALGO_POW_SHA256, 575, 600, BITS);
    let tip = chain.tip().unwrap();
    let header = candidate(ALGO_POW_SHA256, tip.time + 600);

    // Fresh cache per call.
    let cold = {
        let cache = TargetCache::new();
        DifficultyCalculator::new(&params, &cache).averaged_target_asert(Some(tip), &header)
    };

    // One shared cache: recompute, hit, evict via the stake channel, hit
    // again. Every answer matches the cold run.
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    assert_eq!(calc.averaged_target_asert(Some(tip), &header), cold);
    assert_eq!(calc.averaged_target_asert(Some(tip), &header), cold);

    let stake_chain = on_schedule_chain(ALGO_POS, 22, 80, BITS);
    let stake_tip = stake_chain.tip().unwrap();
    let stake_header = candidate(ALGO_POS, stake_tip.time + 80);
    let stake_bits = calc.averaged_target_asert(Some(stake_tip), &stake_header);
    assert_eq!(stake_bits, BITS);

    assert_eq!(calc.averaged_target_asert(Some(tip), &header), cold);
}

#[test]
fn asert_defers_to_wtema_before_start_height() {
    let config = ChainParamsConfig {
        pow_limit_stake_hex: Some(
            "000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff".to_string(),
        ),
        pow_limit_work_hex: Some(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffff".to_string(),
        ),
        pow_target_spacing: Some(80),
        pow_target_timespan: Some(43_200),
        stake_timestamp_mask: Some(0xf),
        pow_allow_min_difficulty_blocks: Some(false),
        pow_no_retargeting: Some(false),
        asert_start_height: Some(1_000),
    };
    let params = ChainParams::from_config(&config).expect("valid config");
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);

    let chain = uniform_chain(ALGO_POW_SHA256, 10, 900, BITS);
    let tip = chain.tip().unwrap();
    let header = candidate(ALGO_POW_SHA256, tip.time + 900);
    assert_eq!(
        calc.averaged_target_asert(Some(tip), &header),
        calc.weighted_target_ema(Some(tip), &header)
    );
}

#[test]
fn testnet_min_difficulty_rule() {
    let params = ChainParams::testnet();
    let cache = TargetCache::new();
    let calc = DifficultyCalculator::new(&params, &cache);
    let sentinel = SHA_LIMIT - 1;

    let mut chain = uniform_chain(ALGO_POW_SHA256, 13, 600, BITS);
    let tip = chain.tip().unwrap().clone();

    // A block more than 30 minutes late may use the sentinel.
    assert_eq!(
        calc.next_work_required(Some(&tip), &candidate(ALGO_POW_SHA256, tip.time + 1_801)),
        sentinel
    );
    // On time, the rule stays out of the way.
    let on_time = candidate(ALGO_POW_SHA256, tip.time + 600);
    assert_ne!(calc.next_work_required(Some(&tip), &on_time), sentinel);

    // After a run of sentinel blocks, an on-time block resumes the standing
    // difficulty rather than inheriting the sentinel.
    for i in 0..3 {
        chain.add_algo(ALGO_POW_SHA256, tip.time + 1_801 + i * 601, sentinel);
    }
    let tip = chain.tip().unwrap();
    assert_eq!(
        calc.next_work_required(Some(tip), &candidate(ALGO_POW_SHA256, tip.time + 600)),
        BITS
    );
}

#[test]
fn outputs_stay_within_channel_limits() {
    let params = ChainParams::mainnet();

    // A chain already at the limit, with its final solve anywhere from a
    // day early to ten days late: the output never escapes the channel cap
    // and never collapses to zero.
    for offset in [-86_400i64, -3_600, -600, 0, 600, 3_600, 86_400, 864_000] {
        let mut chain = on_schedule_chain(ALGO_POW_SHA256, 574, 600, SHA_LIMIT);
        let last_time = chain.tip().unwrap().time + 600 + offset;
        chain.add_algo(ALGO_POW_SHA256, last_time, SHA_LIMIT);
        let tip = chain.tip().unwrap();

        let cache = TargetCache::new();
        let calc = DifficultyCalculator::new(&params, &cache);
        let header = candidate(ALGO_POW_SHA256, tip.time + 600);
        let bits = calc.next_work_required(Some(tip), &header);
        assert!(decode(bits) <= params.pow_limit[ALGO_POW_SHA256 as usize]);
        assert!(!decode(bits).is_zero());
    }
}

//! Difficulty retargeting for the hybrid chain.
//!
//! Each channel — a work algorithm or the stake history — retargets
//! independently; the navigators in [`crate::block_index`] never cross
//! channels. The live algorithm is an averaged-target ASERT that holds every
//! channel to an absolute schedule counted from its anchor block. Before the
//! ASERT start height, a weighted-target EMA over the previous block's
//! solve time applies instead.
//!
//! All target arithmetic happens on fixed-width integers: products widen to
//! 512 bits before division, and results above the channel limit (or
//! trimming to zero) collapse to the channel limit.

use parking_lot::Mutex;
use tracing::debug;

use crate::arith_uint::{U256, U512};
use crate::block_index::{
    algo_type, asert_reference, BlockIndex, CandidateHeader, Channel, ALGO_NONE,
    ALGO_POW_SHA256,
};
use crate::chain_params::ChainParams;

/// Memo of the most recently computed window-average reference target.
///
/// Advisory only: dropping the cache, or sharing one instance across every
/// validator thread, never changes a computed target. Entries are validated
/// by channel, window-end height and window-end block hash, so a
/// reorganization simply misses and recomputes.
#[derive(Debug, Default)]
pub struct TargetCache {
    entry: Mutex<Option<CacheEntry>>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    ref_target: U256,
    /// Height of the averaging window's most recent block; `-1` marks the
    /// anchor-target path.
    window_end_height: i64,
    window_end_hash: U256,
    channel: Channel,
}

/// Computes required targets against a chain tip.
pub struct DifficultyCalculator<'a> {
    params: &'a ChainParams,
    cache: &'a TargetCache,
}

impl<'a> DifficultyCalculator<'a> {
    pub fn new(params: &'a ChainParams, cache: &'a TargetCache) -> Self {
        Self { params, cache }
    }

    /// Required compact target for `header` extending `last` (`None` for the
    /// genesis block).
    pub fn next_work_required(
        &self,
        last: Option<&BlockIndex>,
        header: &CandidateHeader,
    ) -> u32 {
        let algo = algo_type(header.version);
        // Untagged headers resolve to the work limit here, whatever their
        // stake flag says.
        let limit_index = if algo == ALGO_NONE {
            ALGO_POW_SHA256 as usize
        } else {
            algo as usize
        };
        let pow_limit_compact = self.params.pow_limit[limit_index].to_compact();

        let Some(last) = last else {
            return pow_limit_compact;
        };
        if self.params.pow_no_retargeting {
            return pow_limit_compact;
        }

        if self.params.pow_allow_min_difficulty_blocks && algo != ALGO_NONE {
            // Testnet exception: a block arriving more than 30 minutes after
            // its in-channel predecessor may declare the minimum-difficulty
            // sentinel, one step below the channel limit. The gap must stay
            // above twice the work spacing or it would fight the retarget.
            let prev = last.last_of_algo(algo);
            if prev.height > 10 && header.time > prev.time + 30 * 60 {
                return pow_limit_compact - 1;
            }
            if prev.prev.is_some() && prev.bits == pow_limit_compact - 1 {
                // Walk past sentinel and off-channel blocks to the standing
                // difficulty.
                let mut node = prev;
                while let Some(parent) = node.prev.as_deref() {
                    if node.bits != pow_limit_compact - 1 && node.algo_type() == algo {
                        break;
                    }
                    node = parent;
                }
                if let Some(parent) = node.prev.as_deref() {
                    let before = parent.last_of_algo(algo);
                    if before.height > 10 {
                        // A sentinel this deep would only repeat the
                        // exception; report the block we stopped on instead.
                        if before.bits != pow_limit_compact - 1 {
                            return before.bits;
                        }
                        return node.bits;
                    }
                }
            }
        }

        self.averaged_target_asert(Some(last), header)
    }

    /// Weighted-target EMA: the fallback schedule before the ASERT anchor.
    ///
    /// `next = prev * (N - 1 + prev_solvetime / target_solvetime) / N`, with
    /// `N` the EMA window matched to a simple moving average of the same
    /// center of mass.
    pub fn weighted_target_ema(
        &self,
        last: Option<&BlockIndex>,
        header: &CandidateHeader,
    ) -> u32 {
        let channel = Channel::for_header(header.version);
        let pow_limit = &self.params.pow_limit[channel.limit_index()];
        let pow_limit_compact = pow_limit.to_compact();

        // Genesis, first and second in-channel blocks all start from the
        // channel limit.
        let Some(last) = last else {
            return pow_limit_compact;
        };
        let prev = channel.last_in(last);
        let Some(prev_parent) = prev.prev.as_deref() else {
            return pow_limit_compact;
        };
        let prev_prev = channel.last_in(prev_parent);
        if prev_prev.prev.is_none() {
            return pow_limit_compact;
        }

        // Solve times may run backward; the numerator clamp below absorbs it.
        let actual_spacing = prev.time - prev_prev.time;
        let target_spacing = self.params.target_spacing(channel.is_stake());
        let interval = i64::from(self.params.pow_target_timespan) / (target_spacing * 2);

        let numerator = ((interval - 1) * target_spacing + actual_spacing).max(1) as u32;
        let denominator = (interval * target_spacing) as u32;
        if denominator == 0 {
            return pow_limit_compact;
        }

        let (prev_target, _, _) = U256::from_compact(prev.bits);
        // The product must widen before the division; a compound
        // multiply-assign would truncate the intermediate.
        let scaled = U512::from(prev_target) * U512::from(numerator) / U512::from(denominator);
        let new_target = scaled.trim256();
        if scaled > U512::from(*pow_limit) || new_target.is_zero() {
            return pow_limit_compact;
        }

        let new_bits = new_target.to_compact_rounded();
        debug!(
            ?channel,
            actual_spacing,
            target_spacing,
            interval,
            new_bits = %format_args!("0x{new_bits:08x}"),
            "wtema retarget"
        );
        new_bits
    }

    /// Averaged-target ASERT: `ref_target * 2^((time_diff - spacing *
    /// height_diff) / timespan)`, with the reference target averaged over
    /// the channel's most recent window and the fractional exponent
    /// approximated by an exact cubic.
    pub fn averaged_target_asert(
        &self,
        last: Option<&BlockIndex>,
        header: &CandidateHeader,
    ) -> u32 {
        let channel = Channel::for_header(header.version);
        let pow_limit = &self.params.pow_limit[channel.limit_index()];
        let pow_limit_compact = pow_limit.to_compact();
        let target_spacing = self.params.target_spacing(channel.is_stake());

        let Some(last) = last else {
            return pow_limit_compact;
        };
        let prev = channel.last_in(last);
        let Some(prev_parent) = prev.prev.as_deref() else {
            return pow_limit_compact;
        };
        let prev_prev = channel.last_in(prev_parent);
        if prev_prev.prev.is_none() {
            return pow_limit_compact;
        }

        let height = last.height + 1;
        if height < self.params.asert_start_height {
            return self.weighted_target_ema(Some(last), header);
        }

        // Two days' worth of in-channel targets.
        let window = (4 * i64::from(self.params.pow_target_timespan) / target_spacing) as u32;
        let channel_height = if channel.is_stake() {
            last.height_pos
        } else {
            last.height_pow
        };
        // The anchor block itself counts toward the schedule.
        let blocks_passed = channel_height + 1;

        let anchor = asert_reference(channel, prev, self.params.asert_start_height);
        let anchor_parent = anchor.prev.as_deref().map(|parent| channel.last_in(parent));

        // Schedule from the anchor's parent timestamp; anchoring on the
        // block itself would leave the chain permanently one block behind.
        let mut ref_timestamp = match anchor_parent {
            Some(parent) => parent.time,
            None => anchor.time - target_spacing,
        };
        if channel.is_stake() {
            // Stake timestamps are mask-aligned; round up so the schedule
            // can land exactly on one.
            let mask = self.params.stake_timestamp_mask;
            ref_timestamp = (ref_timestamp + mask) & !mask;
        }

        let time_diff = prev.time - ref_timestamp;
        let height_diff = blocks_passed;

        let ref_target =
            self.reference_target(channel, prev, anchor, height, height_diff, window);

        let dividend = time_diff - target_spacing * i64::from(height_diff);
        let positive = dividend >= 0;
        let divisor = self.params.pow_target_timespan; // strictly positive
        let exponent = dividend / i64::from(divisor); // truncates toward zero on both signs
        let remainder = (dividend.unsigned_abs() % u64::from(divisor)) as u32;

        let mut numerator = U512::ONE;
        let mut denominator = U512::ONE;
        if positive {
            if exponent > 0 {
                numerator <<= shift_amount(exponent);
            }
            if remainder != 0 {
                numerator = numerator * cubic_two_pow_numerator(remainder, divisor);
                denominator = denominator * cubic_two_pow_scale(divisor);
            }
        } else {
            if exponent < 0 {
                denominator <<= shift_amount(exponent);
            }
            if remainder != 0 {
                numerator = numerator * cubic_two_pow_scale(divisor);
                denominator = denominator * cubic_two_pow_numerator(remainder, divisor);
            }
        }
        if denominator.is_zero() {
            // Only reachable through a pathological negative exponent; the
            // schedule answers with the channel limit rather than dividing.
            return pow_limit_compact;
        }

        let scaled = U512::from(ref_target) * numerator / denominator;
        let new_target = scaled.trim256();
        if scaled > U512::from(*pow_limit) || new_target.is_zero() {
            return pow_limit_compact;
        }

        let new_bits = new_target.to_compact_rounded();
        debug!(
            ?channel,
            time_diff,
            height_diff,
            exponent,
            remainder,
            new_bits = %format_args!("0x{new_bits:08x}"),
            "asert retarget"
        );
        new_bits
    }

    /// Reference target for the ASERT exponent: the rolling average of the
    /// channel's most recent `window` targets once the window has filled,
    /// the anchor's own target until then. Memoized in the target cache.
    fn reference_target(
        &self,
        channel: Channel,
        prev: &BlockIndex,
        anchor: &BlockIndex,
        height: u32,
        height_diff: u32,
        window: u32,
    ) -> U256 {
        let pow_limit_compact = self.params.pow_limit[channel.limit_index()].to_compact();
        let mut entry = self.cache.entry.lock();

        // The window always ends on a schedule boundary, so its end block —
        // and with it the average — only moves every `window` blocks.
        let blocks_to_skip = if window > 0 { height_diff % window } else { 0 };
        let mut window_end = Some(prev);
        for _ in 0..blocks_to_skip {
            window_end = window_end
                .and_then(|node| node.prev.as_deref())
                .map(|parent| channel.last_in(parent));
            if window_end.is_none() {
                break;
            }
        }

        let window_filled = window > 0
            && height >= self.params.asert_start_height.saturating_add(window)
            && height_diff >= window;

        if let (Some(window_end), true) = (window_end, window_filled) {
            let hit = entry.as_ref().filter(|cached| {
                cached.channel == channel
                    && cached.window_end_height == i64::from(window_end.height)
                    && cached.window_end_hash == window_end.block_hash
                    && !cached.ref_target.is_zero()
            });
            if let Some(hit) = hit {
                return hit.ref_target;
            }

            let mut ref_target = U256::ZERO;
            let mut contributed = 0u32;
            let mut cursor = Some(window_end);
            while contributed < window {
                let Some(node) = cursor else {
                    // Out of history: the missing samples average in as
                    // zeroes, pulling the reference toward harder targets.
                    break;
                };
                let min_difficulty = self.params.pow_allow_min_difficulty_blocks
                    && node.bits == pow_limit_compact - 1;
                if !min_difficulty {
                    let (target, _, _) = U256::from_compact(node.bits);
                    // Per-sample division: the averaged sum rounds down.
                    ref_target += target / window;
                    contributed += 1;
                }
                // Sentinel samples do not count, so each one walks the
                // window one block further back.
                cursor = node.prev.as_deref().map(|parent| channel.last_in(parent));
            }

            *entry = Some(CacheEntry {
                ref_target,
                window_end_height: i64::from(window_end.height),
                window_end_hash: window_end.block_hash,
                channel,
            });
            ref_target
        } else {
            let hit = entry.as_ref().filter(|cached| {
                cached.channel == channel
                    && cached.window_end_height == -1
                    && cached.window_end_hash.is_zero()
                    && !cached.ref_target.is_zero()
            });
            if let Some(hit) = hit {
                return hit.ref_target;
            }

            let (ref_target, _, _) = U256::from_compact(anchor.bits);
            *entry = Some(CacheEntry {
                ref_target,
                window_end_height: -1,
                window_end_hash: U256::ZERO,
                channel,
            });
            ref_target
        }
    }
}

/// `4r³ + 11r²d + 35rd² + 50d³`: numerator of the cubic approximation of
/// `2^(r/d)` on `0 < r/d < 1`. Equals `50d³` at `r = 0` and `100d³` at
/// `r = d`, the exact `2^0` and `2^1` endpoints.
fn cubic_two_pow_numerator(remainder: u32, divisor: u32) -> U512 {
    let r = U512::from(remainder);
    let d = U512::from(divisor);
    U512::from(4u32) * r * r * r
        + U512::from(11u32) * r * r * d
        + U512::from(35u32) * r * d * d
        + U512::from(50u32) * d * d * d
}

/// `50d³`, the matching scale.
fn cubic_two_pow_scale(divisor: u32) -> U512 {
    let d = U512::from(divisor);
    U512::from(50u32) * d * d * d
}

fn shift_amount(exponent: i64) -> u32 {
    // Anything at or past the full width zeroes the value anyway.
    exponent.unsigned_abs().min(u64::from(U512::BITS)) as u32
}

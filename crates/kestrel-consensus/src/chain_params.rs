//! Network consensus parameters.
//!
//! `ChainParams` is frozen per network: `mainnet()`, `testnet()` and
//! `regtest()` carry verified values, and `from_config()` builds custom
//! networks from a partial config with per-field validation errors.

use std::fmt;

use crate::arith_uint::U256;
use crate::block_index::ALGO_COUNT;

/// Work channels target one block per ten minutes; only the stake channel
/// spacing varies per network.
pub const POW_TARGET_SPACING: i64 = 10 * 60;

/// Consensus parameters of one Kestrel network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Easiest admissible target per channel, indexed by algorithm tag.
    pub pow_limit: [U256; ALGO_COUNT as usize],
    /// Nominal proof-of-stake block spacing in seconds.
    pub pow_target_spacing: i64,
    /// Retargeting timespan in seconds; also the ASERT exponent divisor.
    pub pow_target_timespan: u32,
    /// Stake block timestamps must satisfy `time & mask == 0`.
    pub stake_timestamp_mask: i64,
    /// Testnet: blocks long overdue may be mined at minimum difficulty.
    pub pow_allow_min_difficulty_blocks: bool,
    /// Regtest: difficulty never moves off the channel limit.
    pub pow_no_retargeting: bool,
    /// Absolute anchor height for the ASERT schedule.
    pub asert_start_height: u32,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            pow_limit: [
                U256::from_be_hex(
                    "000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                )
                .expect("valid mainnet stake limit"),
                U256::from_be_hex(
                    "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                )
                .expect("valid mainnet work limit"),
            ],
            pow_target_spacing: 80,
            pow_target_timespan: 43_200, // 12 hours
            stake_timestamp_mask: 0xf,
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: false,
            asert_start_height: 0,
        }
    }

    pub fn testnet() -> Self {
        Self {
            pow_allow_min_difficulty_blocks: true,
            ..Self::mainnet()
        }
    }

    pub fn regtest() -> Self {
        let limit = U256::from_be_hex(
            "7fffff0000000000000000000000000000000000000000000000000000000000",
        )
        .expect("valid regtest limit");
        Self {
            pow_limit: [limit, limit],
            pow_target_spacing: 80,
            pow_target_timespan: 43_200,
            stake_timestamp_mask: 0xf,
            pow_allow_min_difficulty_blocks: true,
            pow_no_retargeting: true,
            asert_start_height: 0,
        }
    }

    /// Nominal spacing for a channel: the configured stake spacing, or the
    /// fixed work spacing.
    pub fn target_spacing(&self, proof_of_stake: bool) -> i64 {
        if proof_of_stake {
            self.pow_target_spacing
        } else {
            POW_TARGET_SPACING
        }
    }

    /// Blocks per legacy retargeting interval.
    pub fn difficulty_adjustment_interval(&self) -> u32 {
        (i64::from(self.pow_target_timespan) / self.pow_target_spacing) as u32
    }
}

/// Error when constructing [`ChainParams`] from configuration.
#[derive(Debug, Clone)]
pub struct ChainParamsError {
    /// The field that is missing or invalid.
    pub field: &'static str,
    /// Description of the error.
    pub message: String,
}

impl fmt::Display for ChainParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainParams error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ChainParamsError {}

/// Partial configuration for a custom network. All fields are optional so
/// incomplete configs validate with clear errors.
#[derive(Debug, Clone, Default)]
pub struct ChainParamsConfig {
    /// Easiest stake target as a big-endian hex string.
    pub pow_limit_stake_hex: Option<String>,
    /// Easiest work target as a big-endian hex string.
    pub pow_limit_work_hex: Option<String>,
    pub pow_target_spacing: Option<i64>,
    pub pow_target_timespan: Option<u32>,
    pub stake_timestamp_mask: Option<i64>,
    pub pow_allow_min_difficulty_blocks: Option<bool>,
    pub pow_no_retargeting: Option<bool>,
    pub asert_start_height: Option<u32>,
}

impl ChainParams {
    /// Build parameters from configuration, naming the offending field on
    /// failure. Hex limits accept surrounding whitespace and a `0x` prefix.
    pub fn from_config(config: &ChainParamsConfig) -> Result<Self, ChainParamsError> {
        let stake_limit = parse_limit(
            "pow_limit_stake_hex",
            config.pow_limit_stake_hex.as_deref(),
        )?;
        let work_limit =
            parse_limit("pow_limit_work_hex", config.pow_limit_work_hex.as_deref())?;

        let spacing = config.pow_target_spacing.ok_or_else(|| ChainParamsError {
            field: "pow_target_spacing",
            message: "required field missing".to_string(),
        })?;
        if spacing <= 0 {
            return Err(ChainParamsError {
                field: "pow_target_spacing",
                message: format!("must be positive, got {}", spacing),
            });
        }

        let timespan = config.pow_target_timespan.ok_or_else(|| ChainParamsError {
            field: "pow_target_timespan",
            message: "required field missing".to_string(),
        })?;
        if i64::from(timespan) < spacing * 2 {
            return Err(ChainParamsError {
                field: "pow_target_timespan",
                message: "must be at least twice pow_target_spacing".to_string(),
            });
        }

        let mask = config.stake_timestamp_mask.ok_or_else(|| ChainParamsError {
            field: "stake_timestamp_mask",
            message: "required field missing".to_string(),
        })?;
        if mask < 0 || (mask + 1) & mask != 0 {
            return Err(ChainParamsError {
                field: "stake_timestamp_mask",
                message: format!("must be one less than a power of two, got {:#x}", mask),
            });
        }

        Ok(Self {
            pow_limit: [stake_limit, work_limit],
            pow_target_spacing: spacing,
            pow_target_timespan: timespan,
            stake_timestamp_mask: mask,
            pow_allow_min_difficulty_blocks: config
                .pow_allow_min_difficulty_blocks
                .unwrap_or(false),
            pow_no_retargeting: config.pow_no_retargeting.unwrap_or(false),
            asert_start_height: config.asert_start_height.unwrap_or(0),
        })
    }
}

fn parse_limit(field: &'static str, hex_str: Option<&str>) -> Result<U256, ChainParamsError> {
    let hex_str = hex_str.ok_or_else(|| ChainParamsError {
        field,
        message: "required field missing".to_string(),
    })?;

    // Hex hygiene: trim whitespace and strip an optional 0x prefix.
    let cleaned = hex_str.trim();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);

    let limit = U256::from_be_hex(cleaned).map_err(|_| ChainParamsError {
        field,
        message: format!("invalid hex string: '{}'", hex_str),
    })?;

    if limit.is_zero() {
        return Err(ChainParamsError {
            field,
            message: "limit cannot be zero".to_string(),
        });
    }

    Ok(limit)
}

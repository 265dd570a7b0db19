//! Error types for consensus checks.
//!
//! The retargeting functions are total and never return these; the error
//! enum carries the specific reason a proof-of-work check rejected, for
//! callers that want more than the boolean verdict.

use thiserror::Error;

/// Reasons a proof-of-work check rejects.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusError {
    /// Compact target with the mantissa sign bit set.
    #[error("compact target 0x{bits:08x} decodes negative")]
    NegativeTarget { bits: u32 },

    /// Compact target decoding to zero.
    #[error("compact target 0x{bits:08x} decodes to zero")]
    ZeroTarget { bits: u32 },

    /// Compact target wider than 256 bits.
    #[error("compact target 0x{bits:08x} overflows 256 bits")]
    TargetOverflow { bits: u32 },

    /// Algorithm tag outside the provable range.
    #[error("algorithm tag {algo} cannot carry proof of work")]
    UnknownAlgo { algo: i32 },

    /// Declared target easier than the channel limit.
    #[error("target exceeds the channel limit")]
    TargetAboveLimit,

    /// Header hash above the declared target.
    #[error("header hash exceeds the claimed target")]
    HashAboveTarget,
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

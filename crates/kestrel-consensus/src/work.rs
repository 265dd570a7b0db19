//! Chain-weight helpers for heaviest-chain selection.

use crate::arith_uint::U256;

/// Expected work for a block declaring compact `bits`.
///
/// Defined as `floor(2^256 / (target + 1))`, computed as
/// `(~target / (target + 1)) + 1` to stay within 256 bits. Unusable bits
/// contribute zero work.
pub fn block_proof(bits: u32) -> U256 {
    let (target, negative, overflow) = U256::from_compact(bits);
    if negative || overflow || target.is_zero() {
        return U256::ZERO;
    }
    (!target / (target + U256::ONE)) + U256::ONE
}

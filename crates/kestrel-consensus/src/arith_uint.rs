//! Fixed-width unsigned integers for consensus arithmetic.
//!
//! Targets are 256-bit values; every product of two targets (or a target and
//! a schedule ratio) is formed in 512 bits before any division so no
//! intermediate can overflow or truncate. Both widths share one limb-array
//! implementation with wrapping semantics: results reduce modulo the type
//! width, and shifts of a full width or more yield zero.
//!
//! [`U256`] additionally carries the compact base-256 codec used in block
//! headers: `bits = exponent << 24 | mantissa`, where the decoded value is
//! `mantissa * 256^(exponent - 3)` and the mantissa's high bit is a sign
//! flag recognized only to reject negative targets.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{
    Add, AddAssign, BitAnd, Div, Mul, Not, Shl, ShlAssign, Shr, ShrAssign, Sub, SubAssign,
};

macro_rules! construct_uint {
    ($name:ident, $limbs:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name([u64; $limbs]);

        impl $name {
            /// Width in bits.
            pub const BITS: u32 = $limbs as u32 * 64;

            pub const ZERO: Self = Self([0u64; $limbs]);

            pub const ONE: Self = {
                let mut limbs = [0u64; $limbs];
                limbs[0] = 1;
                Self(limbs)
            };

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&limb| limb == 0)
            }

            /// One-based position of the highest set bit; zero for zero.
            pub fn bits(&self) -> u32 {
                for (i, &limb) in self.0.iter().enumerate().rev() {
                    if limb != 0 {
                        return i as u32 * 64 + (64 - limb.leading_zeros());
                    }
                }
                0
            }

            /// Low 64 bits.
            pub fn low_u64(&self) -> u64 {
                self.0[0]
            }

            pub fn to_be_bytes(&self) -> [u8; $limbs * 8] {
                let mut bytes = [0u8; $limbs * 8];
                for (i, limb) in self.0.iter().rev().enumerate() {
                    bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
                }
                bytes
            }

            pub fn from_be_bytes(bytes: [u8; $limbs * 8]) -> Self {
                let mut limbs = [0u64; $limbs];
                for (i, chunk) in bytes.chunks_exact(8).enumerate() {
                    let mut limb = [0u8; 8];
                    limb.copy_from_slice(chunk);
                    limbs[$limbs - 1 - i] = u64::from_be_bytes(limb);
                }
                Self(limbs)
            }

            /// Parse a big-endian hex string of at most the full width;
            /// shorter strings are left-padded with zeros.
            pub fn from_be_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
                let decoded = hex::decode(hex_str)?;
                if decoded.len() > $limbs * 8 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut bytes = [0u8; $limbs * 8];
                bytes[$limbs * 8 - decoded.len()..].copy_from_slice(&decoded);
                Ok(Self::from_be_bytes(bytes))
            }

            fn overflowing_add(self, rhs: Self) -> (Self, bool) {
                let mut limbs = [0u64; $limbs];
                let mut carry = false;
                for i in 0..$limbs {
                    let (sum, first) = self.0[i].overflowing_add(rhs.0[i]);
                    let (sum, second) = sum.overflowing_add(carry as u64);
                    limbs[i] = sum;
                    carry = first || second;
                }
                (Self(limbs), carry)
            }

            fn overflowing_sub(self, rhs: Self) -> (Self, bool) {
                let mut limbs = [0u64; $limbs];
                let mut borrow = false;
                for i in 0..$limbs {
                    let (diff, first) = self.0[i].overflowing_sub(rhs.0[i]);
                    let (diff, second) = diff.overflowing_sub(borrow as u64);
                    limbs[i] = diff;
                    borrow = first || second;
                }
                (Self(limbs), borrow)
            }

            /// Schoolbook multiplication reduced modulo the type width.
            fn wrapping_mul(self, rhs: Self) -> Self {
                let mut limbs = [0u64; $limbs];
                for i in 0..$limbs {
                    if self.0[i] == 0 {
                        continue;
                    }
                    let mut carry = 0u128;
                    for j in 0..($limbs - i) {
                        let product = u128::from(self.0[i]) * u128::from(rhs.0[j])
                            + u128::from(limbs[i + j])
                            + carry;
                        limbs[i + j] = product as u64;
                        carry = product >> 64;
                    }
                }
                Self(limbs)
            }

            fn set_bit(&mut self, bit: u32) {
                self.0[(bit / 64) as usize] |= 1u64 << (bit % 64);
            }

            /// Quotient and remainder by shift-and-subtract. Panics on a zero
            /// divisor like the primitive integer types.
            pub fn div_rem(self, divisor: Self) -> (Self, Self) {
                assert!(!divisor.is_zero(), "attempt to divide by zero");
                let dividend_bits = self.bits();
                let divisor_bits = divisor.bits();
                if dividend_bits < divisor_bits {
                    return (Self::ZERO, self);
                }
                let mut quotient = Self::ZERO;
                let mut remainder = self;
                let mut shift = dividend_bits - divisor_bits;
                let mut shifted = divisor << shift;
                loop {
                    if remainder >= shifted {
                        remainder = remainder - shifted;
                        quotient.set_bit(shift);
                    }
                    if shift == 0 {
                        break;
                    }
                    shift -= 1;
                    shifted = shifted >> 1;
                }
                (quotient, remainder)
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                for i in (0..$limbs).rev() {
                    match self.0[i].cmp(&other.0[i]) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                Ordering::Equal
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                self.overflowing_add(rhs).0
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                self.overflowing_sub(rhs).0
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl Mul for $name {
            type Output = Self;
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        }

        impl Div for $name {
            type Output = Self;
            fn div(self, rhs: Self) -> Self {
                self.div_rem(rhs).0
            }
        }

        impl Div<u32> for $name {
            type Output = Self;
            fn div(self, rhs: u32) -> Self {
                self.div_rem(Self::from(rhs)).0
            }
        }

        impl Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                let mut limbs = self.0;
                for limb in limbs.iter_mut() {
                    *limb = !*limb;
                }
                Self(limbs)
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                let mut limbs = [0u64; $limbs];
                for i in 0..$limbs {
                    limbs[i] = self.0[i] & rhs.0[i];
                }
                Self(limbs)
            }
        }

        impl Shl<u32> for $name {
            type Output = Self;
            fn shl(self, shift: u32) -> Self {
                if shift >= Self::BITS {
                    return Self::ZERO;
                }
                let mut limbs = [0u64; $limbs];
                let limb_shift = (shift / 64) as usize;
                let bit_shift = shift % 64;
                for i in limb_shift..$limbs {
                    limbs[i] = self.0[i - limb_shift] << bit_shift;
                    if bit_shift > 0 && i > limb_shift {
                        limbs[i] |= self.0[i - limb_shift - 1] >> (64 - bit_shift);
                    }
                }
                Self(limbs)
            }
        }

        impl ShlAssign<u32> for $name {
            fn shl_assign(&mut self, shift: u32) {
                *self = *self << shift;
            }
        }

        impl Shr<u32> for $name {
            type Output = Self;
            fn shr(self, shift: u32) -> Self {
                if shift >= Self::BITS {
                    return Self::ZERO;
                }
                let mut limbs = [0u64; $limbs];
                let limb_shift = (shift / 64) as usize;
                let bit_shift = shift % 64;
                for i in 0..($limbs - limb_shift) {
                    limbs[i] = self.0[i + limb_shift] >> bit_shift;
                    if bit_shift > 0 && i + limb_shift + 1 < $limbs {
                        limbs[i] |= self.0[i + limb_shift + 1] << (64 - bit_shift);
                    }
                }
                Self(limbs)
            }
        }

        impl ShrAssign<u32> for $name {
            fn shr_assign(&mut self, shift: u32) {
                *self = *self >> shift;
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self::from(u64::from(value))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                let mut limbs = [0u64; $limbs];
                limbs[0] = value;
                Self(limbs)
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                let mut limbs = [0u64; $limbs];
                limbs[0] = value as u64;
                limbs[1] = (value >> 64) as u64;
                Self(limbs)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for limb in self.0.iter().rev() {
                    write!(f, "{:016x}", limb)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self)
            }
        }
    };
}

construct_uint!(U256, 4, "Unsigned 256-bit integer: the width of a target.");
construct_uint!(
    U512,
    8,
    "Unsigned 512-bit integer, holding intermediate products of 256-bit values."
);

impl U256 {
    /// Decode a compact-encoded target.
    ///
    /// Returns the value together with the `negative` flag (mantissa sign bit
    /// set on a nonzero mantissa) and the `overflow` flag (value does not fit
    /// in 256 bits). Callers must treat `negative || overflow || zero` as
    /// invalid.
    pub fn from_compact(compact: u32) -> (U256, bool, bool) {
        let size = compact >> 24;
        let word = compact & 0x007f_ffff;
        let value = if size <= 3 {
            U256::from(word >> (8 * (3 - size)))
        } else {
            U256::from(word) << (8 * (size - 3))
        };
        let negative = word != 0 && (compact & 0x0080_0000) != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
        (value, negative, overflow)
    }

    /// Compact encoding with the minimal exponent. The mantissa is truncated;
    /// if its high bit would read as a sign, the exponent is promoted by one.
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.low_u64() as u32) << (8 * (3 - size))
        } else {
            ((*self >> (8 * (size - 3))).low_u64()) as u32
        };
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }

    /// Compact encoding that rounds half-up instead of truncating: when the
    /// discarded low bits reach half a mantissa unit, the mantissa is bumped
    /// by one and renormalized on overflow.
    pub fn to_compact_rounded(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.low_u64() as u32) << (8 * (3 - size))
        } else {
            let shift = 8 * (size - 3);
            let mut mantissa = (*self >> shift).low_u64();
            let half = U256::ONE << (shift - 1);
            let discarded = *self & ((U256::ONE << shift) - U256::ONE);
            if discarded >= half {
                mantissa += 1;
                if mantissa > 0x00ff_ffff {
                    mantissa >>= 8;
                    size += 1;
                }
            }
            mantissa as u32
        };
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }
}

impl U512 {
    /// Low 256 bits.
    pub fn trim256(&self) -> U256 {
        let mut limbs = [0u64; 4];
        limbs.copy_from_slice(&self.0[..4]);
        U256(limbs)
    }
}

impl From<U256> for U512 {
    fn from(value: U256) -> Self {
        let mut limbs = [0u64; 8];
        limbs[..4].copy_from_slice(&value.0);
        Self(limbs)
    }
}

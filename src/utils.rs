use std::{
    fmt::{Debug, LowerHex},
    ops::*,
};

use crate::config::arch_config::{SignedWordType, WordType, XLEN};

pub fn sign_extend(value: WordType, from_bits: u32) -> WordType {
    let sign_bit = XLEN as u32 - from_bits;
    ((value << sign_bit) as SignedWordType >> sign_bit) as WordType
}

/// get the negative of given number of [`WordType`] in 2's complement.
pub fn negative_of(value: WordType) -> WordType {
    (!value).wrapping_add(1)
}

/// Keep the low `bits` bits of `value`.
pub fn truncate_bits(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// Sign-extend the low `bits` bits of `value` to a full `i64`.
pub fn sext_bits(value: u64, bits: u32) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

pub fn check_align<T: UnsignedInteger>(addr: WordType) -> bool {
    addr & (T::BYTES as WordType - 1) == 0
}

// ========================================
//  gen_name_list ["a1", "a2", "a3", ... ]
// ========================================

/// # Examples
/// ```
/// assert_eq!(gen_name_list("a"; 0, 5), ["a0", "a1", "a2", "a3", "a4", "a5"])
/// ```
#[macro_export]
macro_rules! gen_name_list {
    ($base:literal; $begin: literal, $end: literal) => {
        seq_macro::seq!(N in $begin..= $end {
            [ #(concat!($base, stringify!(N)),) *]
        })
    }
}

/// Memory-sized unsigned integers, with little-endian byte conversion.
pub trait UnsignedInteger:
    Copy
    + Sized
    + Into<u64>
    + Default
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + PartialEq
    + Eq
    + Debug
    + LowerHex
{
    const BITS: u32;
    const BYTES: usize;

    /// Build a value from the first [`Self::BYTES`] bytes of `bytes`.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Write the value into the first [`Self::BYTES`] bytes of `out`.
    fn write_le_slice(self, out: &mut [u8]);

    /// Truncating conversion from a full word.
    fn truncate_from(value: u64) -> Self;
}

macro_rules! impl_unsigned_integer {
    ($($t:ty),*) => {
        $(
            impl UnsignedInteger for $t {
                const BITS: u32 = <$t>::BITS;
                const BYTES: usize = size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }

                fn write_le_slice(self, out: &mut [u8]) {
                    out[..size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
                }

                fn truncate_from(value: u64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_unsigned_integer!(u8, u16, u32, u64);

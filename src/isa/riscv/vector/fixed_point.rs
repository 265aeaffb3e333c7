use std::ops::{BitAnd, BitOr, Shl, Shr};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Fixed-point rounding mode held in `vxrm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RoundingMode {
    /// Round to nearest, ties up.
    Rnu = 0b00,
    /// Round to nearest, ties to even.
    Rne = 0b01,
    /// Round down (truncate).
    Rdn = 0b10,
    /// Round to odd.
    Rod = 0b11,
}

impl RoundingMode {
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0b00 => Self::Rnu,
            0b01 => Self::Rne,
            0b10 => Self::Rdn,
            _ => Self::Rod,
        }
    }
}

/// Integers wide enough to hold an unrounded fixed-point intermediate.
pub trait FixedPointInt:
    Copy
    + PartialEq
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    const BITS: u32;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
}

macro_rules! impl_fixed_point_int {
    ($($t:ty),*) => {
        $(
            impl FixedPointInt for $t {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const BITS: u32 = <$t>::BITS;

                #[inline(always)]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$t>::wrapping_add(self, rhs)
                }

                #[inline(always)]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$t>::wrapping_sub(self, rhs)
                }
            }
        )*
    };
}

impl_fixed_point_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

/// Add the rounding increment for discarding the low `d` bits of `value` under `mode`.
///
/// The rounded result is `round_increment(value, d, mode) >> d`. With `d == 0` nothing is
/// discarded and `value` is returned unchanged.
#[inline]
pub fn round_increment<T: FixedPointInt>(value: T, d: u32, mode: RoundingMode) -> T {
    if d == 0 {
        return value;
    }
    debug_assert!(d < T::BITS, "cannot discard {d} bits of a {}-bit value", T::BITS);

    let lsb = T::ONE << d;
    let guard = T::ONE << (d - 1);

    match mode {
        RoundingMode::Rnu => value.wrapping_add(guard),
        RoundingMode::Rne => {
            let guard_set = value & guard != T::ZERO;
            let sticky_set = value & guard.wrapping_sub(T::ONE) != T::ZERO;
            let lsb_set = value & lsb != T::ZERO;
            if guard_set && (sticky_set || lsb_set) {
                value.wrapping_add(lsb)
            } else {
                value
            }
        }
        RoundingMode::Rdn => value,
        RoundingMode::Rod => {
            if value & lsb.wrapping_sub(T::ONE) != T::ZERO {
                value | lsb
            } else {
                value
            }
        }
    }
}

/// Shift `value` right by `d` bits, rounding under `mode`.
#[inline]
pub fn rounding_shift<T: FixedPointInt>(value: T, d: u32, mode: RoundingMode) -> T {
    round_increment(value, d, mode) >> d
}

/// Clamp `value` to an unsigned `sew`-bit element. The flag is set when clamping happened.
#[inline]
pub fn saturate_unsigned(value: u128, sew: u32) -> (u64, bool) {
    let max = u64::MAX >> (64 - sew);
    if value > max as u128 {
        (max, true)
    } else {
        (value as u64, false)
    }
}

/// Clamp `value` to a signed `sew`-bit element, returned as its raw two's complement bits.
#[inline]
pub fn saturate_signed(value: i128, sew: u32) -> (u64, bool) {
    let max = i64::MAX >> (64 - sew);
    let min = i64::MIN >> (64 - sew);
    let mask = u64::MAX >> (64 - sew);
    if value > max as i128 {
        (max as u64 & mask, true)
    } else if value < min as i128 {
        (min as u64 & mask, true)
    } else {
        (value as u64 & mask, false)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    use super::*;

    const MODES: [RoundingMode; 4] = [
        RoundingMode::Rnu,
        RoundingMode::Rne,
        RoundingMode::Rdn,
        RoundingMode::Rod,
    ];

    /// Round `value / 2^d` by comparing the exact remainder against one half.
    fn reference_unsigned(value: u128, d: u32, mode: RoundingMode) -> u128 {
        if d == 0 {
            return value;
        }
        let q = value >> d;
        let r = value & ((1u128 << d) - 1);
        let half = 1u128 << (d - 1);
        match mode {
            RoundingMode::Rnu => q + (r >= half) as u128,
            RoundingMode::Rne => q + (r > half || (r == half && q & 1 == 1)) as u128,
            RoundingMode::Rdn => q,
            RoundingMode::Rod => q | (r != 0) as u128,
        }
    }

    /// Same as [`reference_unsigned`] but with floor division on signed values.
    fn reference_signed(value: i128, d: u32, mode: RoundingMode) -> i128 {
        if d == 0 {
            return value;
        }
        let q = value.div_euclid(1i128 << d);
        let r = value.rem_euclid(1i128 << d);
        let half = 1i128 << (d - 1);
        match mode {
            RoundingMode::Rnu => q + (r >= half) as i128,
            RoundingMode::Rne => q + (r > half || (r == half && q & 1 == 1)) as i128,
            RoundingMode::Rdn => q,
            RoundingMode::Rod => q | (r != 0) as i128,
        }
    }

    #[test]
    fn test_exhaustive_small_unsigned() {
        for mode in MODES {
            for value in 0u16..=u8::MAX as u16 {
                for d in 0..8 {
                    let got = rounding_shift(value, d, mode);
                    let want = reference_unsigned(value as u128, d, mode) as u16;
                    assert_eq!(got, want, "value = {value}, d = {d}, mode = {mode:?}");
                }
            }
        }
    }

    #[test]
    fn test_exhaustive_small_signed() {
        for mode in MODES {
            for value in i8::MIN as i16..=i8::MAX as i16 {
                for d in 0..8 {
                    let got = rounding_shift(value, d, mode);
                    let want = reference_signed(value as i128, d, mode) as i16;
                    assert_eq!(got, want, "value = {value}, d = {d}, mode = {mode:?}");
                }
            }
        }
    }

    #[test]
    fn test_random_wide() {
        let mut rng = ChaCha12Rng::seed_from_u64(0721);
        for _ in 0..10_000 {
            let value: u64 = rng.random();
            let d = rng.random_range(0..64u32);
            for mode in MODES {
                let got = rounding_shift(value as u128, d, mode);
                assert_eq!(got, reference_unsigned(value as u128, d, mode));

                let signed = value as i64 as i128;
                let got = rounding_shift(signed, d, mode);
                assert_eq!(got, reference_signed(signed, d, mode));
            }
        }
    }

    #[test]
    fn test_ties() {
        // 1.5: both nearest modes round up to the even 2
        assert_eq!(rounding_shift(0b0110u32, 2, RoundingMode::Rne), 0b10);
        assert_eq!(rounding_shift(0b0110u32, 2, RoundingMode::Rnu), 0b10);
        // 2.5: ties-to-even stays, ties-up does not
        assert_eq!(rounding_shift(0b1010u32, 2, RoundingMode::Rne), 0b10);
        assert_eq!(rounding_shift(0b1010u32, 2, RoundingMode::Rnu), 0b11);
        // sticky only
        assert_eq!(rounding_shift(0b1001u32, 2, RoundingMode::Rne), 0b10);
        assert_eq!(rounding_shift(0b1001u32, 2, RoundingMode::Rod), 0b11);
        assert_eq!(rounding_shift(0b1000u32, 2, RoundingMode::Rod), 0b10);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(saturate_unsigned(0x1_00, 8), (0xff, true));
        assert_eq!(saturate_unsigned(0x7f, 8), (0x7f, false));
        assert_eq!(saturate_unsigned(u64::MAX as u128 + 1, 64), (u64::MAX, true));
        assert_eq!(saturate_signed(128, 8), (0x7f, true));
        assert_eq!(saturate_signed(-129, 8), (0x80, true));
        assert_eq!(saturate_signed(-1, 16), (0xffff, false));
        assert_eq!(saturate_signed(i64::MIN as i128 - 1, 64), (i64::MIN as u64, true));
    }

    #[test]
    fn test_shift_of_fifteen_by_two() {
        assert_eq!(round_increment(15u64, 2, RoundingMode::Rne), 19);
        assert_eq!(rounding_shift(15u64, 2, RoundingMode::Rne), 4);
        assert_eq!(rounding_shift(15u64, 2, RoundingMode::Rdn), 3);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        for mode in MODES {
            assert_eq!(round_increment(0xdead_beefu64, 0, mode), 0xdead_beef);
            assert_eq!(round_increment(-7i64, 0, mode), -7);
        }
    }

    #[test]
    fn test_mode_bits() {
        assert_eq!(RoundingMode::from_bits(0b01), RoundingMode::Rne);
        assert_eq!(RoundingMode::from_bits(0b111), RoundingMode::Rod);
        assert_eq!(u8::from(RoundingMode::Rdn), 2);
    }
}

//! Bit-field accessors for register images
//!
//! Read-clear-set helpers over fixed-width register values. One generic
//! implementation covers the 16, 32 and 64-bit registers in the SMMU map.

use num_traits::PrimInt;

/// Set the bits `[high_bit:low_bit]` of `reg` to `value`.
///
/// The target range is cleared first, then `value` is OR-ed in. Bits of
/// `value` above the field width are masked off silently, matching hardware
/// field semantics; bits of `reg` outside the range are preserved.
///
/// `high_bit >= low_bit` and `high_bit < width(T)` are programming errors
/// (debug-asserted).
pub fn set_bit_range<T: PrimInt>(reg: &mut T, high_bit: u8, low_bit: u8, value: T) {
    let width = (core::mem::size_of::<T>() * 8) as u8;
    debug_assert!(high_bit >= low_bit);
    debug_assert!(high_bit < width);

    let num_bits = high_bit - low_bit + 1;
    let field = if num_bits >= width {
        !T::zero()
    } else {
        (T::one() << num_bits as usize) - T::one()
    };
    let mask = field << low_bit as usize;

    *reg = (*reg & !mask) | ((value << low_bit as usize) & mask);
}

/// Set a single bit of `reg`.
pub fn set_bit<T: PrimInt>(reg: &mut T, bit_position: u8, value: bool) {
    let mask = T::one() << bit_position as usize;
    *reg = if value { *reg | mask } else { *reg & !mask };
}

/// Extract the bits `[high_bit:low_bit]` of `reg` as a field value.
pub fn bit_range<T: PrimInt>(reg: T, high_bit: u8, low_bit: u8) -> T {
    let width = (core::mem::size_of::<T>() * 8) as u8;
    debug_assert!(high_bit >= low_bit);
    debug_assert!(high_bit < width);

    let num_bits = high_bit - low_bit + 1;
    let field = if num_bits >= width {
        !T::zero()
    } else {
        (T::one() << num_bits as usize) - T::one()
    };
    (reg >> low_bit as usize) & field
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(9, 0, 0b10_0000_0000, 0x0000_0200 ; "master id field")]
    #[test_case(30, 16, 0x7FFF, 0x7FFF_0000 ; "mask field")]
    #[test_case(31, 31, 0x1, 0x8000_0000 ; "valid bit")]
    #[test_case(14, 10, 0x1F, 0x0000_7C00 ; "tbu field")]
    fn field_placement_u32(high: u8, low: u8, value: u32, expected: u32) {
        let mut reg = 0u32;
        set_bit_range(&mut reg, high, low, value);
        assert_eq!(reg, expected);
    }

    #[test]
    fn round_trip_and_outside_bits_preserved_u16() {
        let mut reg: u16 = 0xA5A5;
        set_bit_range(&mut reg, 11, 4, 0x3C);
        assert_eq!(bit_range(reg, 11, 4), 0x3C);
        // bits outside [11:4] untouched
        assert_eq!(reg & 0xF00F, 0xA5A5 & 0xF00F);
    }

    #[test]
    fn round_trip_and_outside_bits_preserved_u32() {
        let mut reg: u32 = 0xDEAD_BEEF;
        set_bit_range(&mut reg, 17, 16, 0b10);
        assert_eq!(bit_range(reg, 17, 16), 0b10);
        assert_eq!(reg & !0x0003_0000, 0xDEAD_BEEF & !0x0003_0000);
    }

    #[test]
    fn round_trip_and_outside_bits_preserved_u64() {
        let mut reg: u64 = 0x0123_4567_89AB_CDEF;
        set_bit_range(&mut reg, 55, 48, 0x42);
        assert_eq!(bit_range(reg, 55, 48), 0x42);
        assert_eq!(
            reg & !(0xFFu64 << 48),
            0x0123_4567_89AB_CDEF & !(0xFFu64 << 48)
        );
    }

    #[test]
    fn overflowing_value_truncated_to_field() {
        let mut reg = 0u32;
        set_bit_range(&mut reg, 7, 6, 0xFF);
        // only two bits of the value survive
        assert_eq!(reg, 0b11 << 6);
        assert_eq!(bit_range(reg, 7, 6), 0b11);
    }

    #[test]
    fn full_width_range() {
        let mut reg = 0u32;
        set_bit_range(&mut reg, 31, 0, 0xFFFF_FFFF);
        assert_eq!(reg, 0xFFFF_FFFF);

        let mut reg = 0u64;
        set_bit_range(&mut reg, 63, 0, u64::MAX);
        assert_eq!(reg, u64::MAX);
    }

    #[test]
    fn set_and_clear_single_bit() {
        let mut reg = 0u32;
        set_bit(&mut reg, 31, true);
        assert_eq!(reg, 0x8000_0000);
        set_bit(&mut reg, 31, false);
        assert_eq!(reg, 0);

        let mut reg = 0u64;
        set_bit(&mut reg, 54, true);
        assert_eq!(reg, 1u64 << 54);
    }

    #[test]
    fn clear_then_set_replaces_stale_field() {
        let mut reg: u32 = 0xFFFF_FFFF;
        set_bit_range(&mut reg, 17, 16, 0b00);
        assert_eq!(bit_range(reg, 17, 16), 0);
        assert_eq!(reg, 0xFFFC_FFFF);
    }
}

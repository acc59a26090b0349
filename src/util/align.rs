//! Utilities for aligning memory

use std::ops::{Add, Rem, Sub};

/// Align a size to a required alignment. Does not align the base address.
/// Values that are already aligned are returned unchanged.
pub fn align<T: Add<T, Output = T> + Sub<T, Output = T> + Rem<T, Output = T> + PartialEq + Default + Copy>(
    value: T,
    alignment: T,
) -> T {
    let unaligned_size = value % alignment;
    if unaligned_size == T::default() {
        return value;
    }
    let padding = alignment - unaligned_size;
    value + padding
}

/// Align a 64-bit offset or address up to a power-of-two alignment.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Round up to the next power of two. Zero stays zero.
pub fn next_pow2(value: u64) -> u64 {
    if value == 0 {
        0
    } else {
        value.next_power_of_two()
    }
}

/// Integer division rounding up.
pub fn div_round_up(value: u64, divisor: u64) -> u64 {
    (value + divisor - 1) / divisor
}

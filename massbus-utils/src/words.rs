//! PDP-10 word arithmetic. A 36-bit word is carried in the low bits of a
//! `u64`; an 18-bit half-word in the low bits of a `u32`.

pub const HALF_MASK: u32 = 0o777777;
pub const WORD_MASK: u64 = 0o777777_777777;

/// Split a 36-bit word into its (left, right) halves.
#[inline]
pub fn split_word(word: u64) -> (u32, u32) {
    let word = word & WORD_MASK;
    ((word >> 18) as u32, (word as u32) & HALF_MASK)
}

/// Join two 18-bit halves into a 36-bit word. Bits above 18 in either half
/// are discarded.
#[inline]
pub fn join_halves(left: u32, right: u32) -> u64 {
    ((left & HALF_MASK) as u64) << 18 | (right & HALF_MASK) as u64
}

/// Pack a number in the range 0..=9999 as four BCD digits, `d3d2d1d0`.
/// Larger values keep only their four low decimal digits.
pub fn to_bcd(value: u16) -> u16 {
    let mut value = value % 10000;
    let mut bcd = 0;
    for shift in [0, 4, 8, 12] {
        bcd |= (value % 10) << shift;
        value /= 10;
    }
    bcd
}

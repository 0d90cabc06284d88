use std::fmt::Write;

use crate::words::HALF_MASK;

/// Half-words shown per line: four 36-bit words.
const HALVES_PER_LINE: usize = 8;

/// Nicely format a run of 18-bit half-words as an octal block, the way a
/// PDP-10 front end would dump memory. Adjacent half-words are paired into
/// `left,,right` words and the listed addresses (in words) start from
/// `start`. A trailing unpaired half-word is shown on its own.
pub fn pretty_print_octal_halves(buf: &[u32], start: usize) -> String {
    // Each line is a 6-digit address, a slash, then four words of
    // 6+2+6 characters separated by two spaces.
    let mut str = String::with_capacity((buf.len() / HALVES_PER_LINE + 1) * 72);
    for (i, pair) in buf.chunks(2).enumerate() {
        if i % (HALVES_PER_LINE / 2) == 0 {
            if i != 0 {
                str.push('\n');
            }
            write!(str, "{:06o}/", start + i).unwrap();
        }
        str.push_str("  ");
        match pair {
            [left, right] => {
                write!(str, "{:06o},,{:06o}", left & HALF_MASK, right & HALF_MASK).unwrap()
            }
            [left] => write!(str, "{:06o}", left & HALF_MASK).unwrap(),
            _ => unreachable!(),
        }
    }
    str
}

/// Shortcut for starting the addresses at zero.
#[inline]
pub fn pretty_print_octal_halves_zero(buf: &[u32]) -> String {
    pretty_print_octal_halves(buf, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let s = pretty_print_octal_halves_zero(&[1, 0o777777, 0o123456, 0o654321]);
        assert_eq!(s, "000000/  000001,,777777  123456,,654321");
    }

    #[test]
    fn test_wraps_and_odd_tail() {
        let halves: Vec<u32> = (0..11).collect();
        let s = pretty_print_octal_halves(&halves, 0o100);
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("000100/  000000,,000001"));
        assert_eq!(lines[1], "000104/  000010,,000011  000012");
    }

    #[test]
    fn test_masks_junk() {
        assert_eq!(pretty_print_octal_halves_zero(&[0xFFFF_FFFF, 0]),
                   "000000/  777777,,000000");
    }

    #[test]
    fn test_empty() {
        assert_eq!(pretty_print_octal_halves_zero(&[]), "");
    }
}

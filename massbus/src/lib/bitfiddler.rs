//! Conversion between tape frames (8 bit bytes) and the 18 bit half-words
//! that travel over the MASSBUS.
//!
//! Tape data is packed into 36 bit words. In *compatible* mode each word
//! holds four frames, left justified, with the low four bits zero. In
//! *core dump* mode each word takes five frames: four whole bytes and the
//! low nibble of the fifth. Either way the word is then sent as two
//! half-words, left half first.

use std::convert::TryFrom;
use thiserror::Error;

use massbus_utils::words::{join_halves, split_word};

/// Errors from the bit fiddler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported tape format {0:#o}")]
    UnsupportedFormat(u8),

    #[error("cannot decode {0} half-words: only whole words can be decoded")]
    OddHalfWordCount(usize),
}

/// Packing mode, as selected by the format field of the tape control
/// register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingMode {
    CoreDump,
    Compatible,
}

impl TryFrom<u8> for PackingMode {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(PackingMode::Compatible),
            3 => Ok(PackingMode::CoreDump),
            _ => Err(CodecError::UnsupportedFormat(code)),
        }
    }
}

impl PackingMode {
    /// Number of tape frames packed into each 36 bit word.
    #[inline]
    pub fn group_size(self) -> usize {
        match self {
            PackingMode::CoreDump => 5,
            PackingMode::Compatible => 4,
        }
    }

    /// Round a byte count up to a whole number of groups.
    pub fn padded_len(self, bytes: usize) -> usize {
        let g = self.group_size();
        (bytes + g - 1) / g * g
    }

    /// Half-words needed to carry `bytes` frames.
    pub fn halves_for_bytes(self, bytes: usize) -> usize {
        self.padded_len(bytes) / self.group_size() * 2
    }

    /// Frames carried by `halves` half-words.
    pub fn bytes_for_halves(self, halves: usize) -> usize {
        halves / 2 * self.group_size()
    }

    fn pack(self, group: &[u8]) -> u64 {
        let b = |i: usize| group[i] as u64;
        let word = b(0) << 28 | b(1) << 20 | b(2) << 12 | b(3) << 4;
        match self {
            PackingMode::CoreDump => word | (b(4) & 0o17),
            PackingMode::Compatible => word,
        }
    }

    fn unpack(self, word: u64, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            (word >> 28) as u8,
            (word >> 20) as u8,
            (word >> 12) as u8,
            (word >> 4) as u8,
        ]);
        if self == PackingMode::CoreDump {
            out.push((word & 0o17) as u8);
        }
    }
}

/// Encode tape frames as half-words.
///
/// `data` should already be padded out to a whole number of groups; if it
/// isn't, the missing frames of the last group read as zero. With `reverse`
/// set the groups are taken last to first and each word's halves come out
/// right half first, which is exactly what the host sees when the drive
/// reads a record backwards. The result always has
/// `mode.halves_for_bytes(data.len())` entries.
pub fn encode(mode: PackingMode, data: &[u8], reverse: bool) -> Vec<u32> {
    let g = mode.group_size();
    let mut halves = Vec::with_capacity(mode.halves_for_bytes(data.len()));
    let mut emit = |chunk: &[u8]| {
        let mut group = [0u8; 5];
        group[..chunk.len()].copy_from_slice(chunk);
        let (left, right) = split_word(mode.pack(&group));
        if reverse {
            halves.push(right);
            halves.push(left);
        } else {
            halves.push(left);
            halves.push(right);
        }
    };
    if reverse {
        data.chunks(g).rev().for_each(&mut emit);
    } else {
        data.chunks(g).for_each(&mut emit);
    }
    halves
}

/// Decode half-words back into tape frames. Only forward decoding exists,
/// since the drive never writes backwards. Produces `group_size` frames per
/// word; in compatible mode the four pad bits of each word are dropped.
pub fn decode(mode: PackingMode, halves: &[u32]) -> Result<Vec<u8>, CodecError> {
    if halves.len() % 2 != 0 {
        return Err(CodecError::OddHalfWordCount(halves.len()));
    }
    let mut out = Vec::with_capacity(mode.bytes_for_halves(halves.len()));
    for pair in halves.chunks_exact(2) {
        mode.unpack(join_halves(pair[0], pair[1]), &mut out);
    }
    Ok(out)
}

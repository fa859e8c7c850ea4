//! Decoding of the checksummed byte stream the sensor replies with.
//!
//! Every reply is a sequence of 3-byte groups: a big-endian 16-bit data
//! word followed by its CRC-8. A reply is only usable as a whole: one bad
//! group discards the entire decode.

use crate::crc::crc8;

/// Why a reply failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum WordsError {
    /// Reply length is not 3 bytes per expected word.
    Length,
    /// A group's checksum byte does not match its data word.
    Crc,
}

/// Decode `N` checksummed words out of a raw reply buffer.
///
/// `buf` must be exactly `3 * N` bytes. Words come back in sensor order;
/// any further byte-order correction is the caller's concern.
pub(crate) fn decode_words<const N: usize>(buf: &[u8]) -> Result<[u16; N], WordsError> {
    if buf.len() != N * 3 {
        return Err(WordsError::Length);
    }

    let mut words = [0u16; N];

    for (word, group) in words.iter_mut().zip(buf.chunks_exact(3)) {
        if crc8(&group[..2]) != group[2] {
            return Err(WordsError::Crc);
        }

        *word = u16::from_be_bytes([group[0], group[1]]);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::*;

    fn encode(words: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        for word in words {
            let data = word.to_be_bytes();
            buf.extend_from_slice(&data);
            buf.push(crc8(&data));
        }
        buf
    }

    #[test]
    fn empty_reply() {
        assert_eq!(decode_words::<0>(&[]), Ok([]));
    }

    #[test]
    fn single_word() {
        assert_eq!(decode_words::<1>(&[0xBE, 0xEF, 0x92]), Ok([0xBEEF]));
    }

    /// Encoding then decoding reproduces the original words, for every
    /// word count a sensor reply actually uses.
    #[test]
    fn round_trip() {
        let mut words = [0u16; 20];
        for (i, word) in words.iter_mut().enumerate() {
            *word = 0xC0DE_u16.rotate_left(i as u32);
        }

        let serial: [u16; 16] = words[..16].try_into().unwrap();

        assert_eq!(decode_words::<20>(&encode(&words)), Ok(words));
        assert_eq!(decode_words::<16>(&encode(&serial)), Ok(serial));
    }

    #[test]
    fn rejects_wrong_length() {
        let buf = encode(&[0x1234, 0x5678]);

        assert_eq!(decode_words::<1>(&buf), Err(WordsError::Length));
        assert_eq!(decode_words::<2>(&buf[..5]), Err(WordsError::Length));
        assert_eq!(decode_words::<2>(&[]), Err(WordsError::Length));
    }

    /// Corrupting any single checksum byte fails the whole decode.
    #[test]
    fn rejects_corrupted_checksum() {
        let reference = encode(&[0x0001, 0x0203, 0x0405]);

        for group in 0..3 {
            let mut buf = reference.clone();
            buf[group * 3 + 2] ^= 0x01;
            assert_eq!(decode_words::<3>(&buf), Err(WordsError::Crc));
        }
    }

    /// Corrupting a data byte is caught by that group's checksum.
    #[test]
    fn rejects_corrupted_data() {
        let mut buf = encode(&[0xBEEF]);
        buf[0] ^= 0x80;

        assert_eq!(decode_words::<1>(&buf), Err(WordsError::Crc));
    }
}

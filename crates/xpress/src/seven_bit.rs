//! 7-bit dictionary decompression for short ESE string columns.

use super::{XpressError, XpressResult};

/// Unpack a 7-bit-per-character stream into octets.
///
/// Bits are consumed LSB-first; every 7 bits emit one octet with the high bit
/// clear. Leftover bits shorter than a full group are producer padding and
/// are discarded. With `utf16` set the octets are UTF-16LE byte pairs; an odd
/// octet count means the final group was padding and a trailing NUL is
/// dropped to restore pairing.
pub fn decompress_seven_bit(input: &[u8], utf16: bool) -> XpressResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 8 / 7);
    let mut accumulator = 0_u16;
    let mut bits = 0_u8;

    for &byte in input {
        accumulator |= (byte as u16) << bits;
        bits += 8;
        while bits >= 7 {
            out.push((accumulator & 0x7F) as u8);
            accumulator >>= 7;
            bits -= 7;
        }
    }

    if utf16 && out.len() % 2 != 0 {
        if out.last() != Some(&0) {
            return Err(XpressError::Malformed("odd UTF-16 octet count"));
        }
        out.pop();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack octets into a 7-bit stream, LSB-first.
    fn pack(octets: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut accumulator = 0_u32;
        let mut bits = 0_u8;
        for &octet in octets {
            accumulator |= ((octet & 0x7F) as u32) << bits;
            bits += 7;
            while bits >= 8 {
                out.push((accumulator & 0xFF) as u8);
                accumulator >>= 8;
                bits -= 8;
            }
        }
        if bits > 0 {
            out.push(accumulator as u8);
        }
        out
    }

    #[test]
    fn test_ascii_round_trip() {
        let packed = pack(b"winterfell.north");
        let out = decompress_seven_bit(&packed, false).unwrap();
        assert_eq!(out, b"winterfell.north");
    }

    #[test]
    fn test_exact_multiple_of_seven() {
        // 8 octets pack to exactly 7 bytes with no padding bits.
        let packed = pack(b"abcdefgh");
        assert_eq!(packed.len(), 7);
        let out = decompress_seven_bit(&packed, false).unwrap();
        assert_eq!(out, b"abcdefgh");
    }

    #[test]
    fn test_utf16_pairing() {
        let packed = pack(&[b'H', 0x00, b'i', 0x00]);
        let out = decompress_seven_bit(&packed, true).unwrap();
        let text: Vec<u16> = out
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(String::from_utf16(&text).unwrap(), "Hi");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decompress_seven_bit(&[], false).unwrap(), Vec::<u8>::new());
    }
}

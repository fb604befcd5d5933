//! [Plain LZ77](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-xca/fb98aa28-5cd7-407f-8869-a6cef1ff1ccb)
//! decompression as used by Exchange column payloads.

use super::{XpressError, XpressResult};

/// Decompress an [MS-XCA] plain LZ77 stream.
///
/// The stream is a sequence of 4-byte little-endian flag words; flag bits are
/// consumed LSB-first and select, per symbol, a literal byte (0) or a
/// (length, offset) back-reference (1). Match lengths below 10 are stored in
/// the low 3 bits of the 16-bit match word; longer lengths extend through a
/// shared half-byte, then a byte, then 2- and 4-byte fields.
///
/// `declared_len` comes from the variant's uncompressed-size header and is
/// authoritative: output is truncated to it, and an input that runs out
/// before producing it is malformed.
pub fn decompress_lz77(input: &[u8], declared_len: usize) -> XpressResult<Vec<u8>> {
    let mut out = Vec::with_capacity(declared_len);
    let mut pos = 0_usize;
    let mut last_half_byte: Option<usize> = None;

    'stream: while out.len() < declared_len {
        if pos + 4 > input.len() {
            return Err(XpressError::Malformed("flag word past end of input"));
        }
        let flags = u32::from_le_bytes(input[pos..pos + 4].try_into().unwrap_or_default());
        pos += 4;

        for bit in 0..32 {
            if out.len() >= declared_len {
                break 'stream;
            }

            if flags & (1 << bit) == 0 {
                let Some(&literal) = input.get(pos) else {
                    return Err(XpressError::Malformed("literal past end of input"));
                };
                out.push(literal);
                pos += 1;
                continue;
            }

            if pos + 2 > input.len() {
                return Err(XpressError::Malformed("match word past end of input"));
            }
            let match_word = u16::from_le_bytes(input[pos..pos + 2].try_into().unwrap_or_default());
            pos += 2;

            let offset = (match_word >> 3) as usize + 1;
            let mut length = (match_word & 0x7) as usize;
            if length == 7 {
                match last_half_byte.take() {
                    None => {
                        let Some(&ext) = input.get(pos) else {
                            return Err(XpressError::Malformed("length nibble past end of input"));
                        };
                        length = (ext & 0x0F) as usize;
                        last_half_byte = Some(pos);
                        pos += 1;
                    }
                    Some(saved) => {
                        length = (input[saved] >> 4) as usize;
                    }
                }
                if length == 15 {
                    let Some(&ext) = input.get(pos) else {
                        return Err(XpressError::Malformed("length byte past end of input"));
                    };
                    length = ext as usize;
                    pos += 1;
                    if length == 255 {
                        if pos + 2 > input.len() {
                            return Err(XpressError::Malformed("length word past end of input"));
                        }
                        length =
                            u16::from_le_bytes(input[pos..pos + 2].try_into().unwrap_or_default()) as usize;
                        pos += 2;
                        if length == 0 {
                            if pos + 4 > input.len() {
                                return Err(XpressError::Malformed(
                                    "length dword past end of input",
                                ));
                            }
                            length = u32::from_le_bytes(input[pos..pos + 4].try_into().unwrap_or_default())
                                as usize;
                            pos += 4;
                        }
                        if length < 15 + 7 {
                            return Err(XpressError::Malformed("extended match length underflow"));
                        }
                        length -= 15 + 7;
                    }
                    length += 15;
                }
                length += 7;
            }
            length += 3;

            if offset > out.len() {
                return Err(XpressError::Malformed("match offset before output start"));
            }

            // Matches may reach into bytes produced by this same copy, so the
            // copy has to run byte-by-byte.
            let start = out.len() - offset;
            for i in 0..length {
                if out.len() >= declared_len {
                    break;
                }
                let byte = out[start + i];
                out.push(byte);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_literals() {
        let mut input = vec![0x00, 0x00, 0x00, 0x00];
        input.extend_from_slice(b"Hello World");
        let out = decompress_lz77(&input, 11).unwrap();
        assert_eq!(out, b"Hello World");
    }

    #[test]
    fn test_short_match() {
        // "abc" then a 9-byte match at offset 3.
        let input = [0x08, 0x00, 0x00, 0x00, b'a', b'b', b'c', 0x16, 0x00];
        let out = decompress_lz77(&input, 12).unwrap();
        assert_eq!(out, b"abcabcabcabc");
    }

    #[test]
    fn test_nibble_extended_match() {
        // 'a' then a 19-byte overlapping match at offset 1.
        let input = [0x02, 0x00, 0x00, 0x00, b'a', 0x07, 0x00, 0x09];
        let out = decompress_lz77(&input, 20).unwrap();
        assert_eq!(out, vec![b'a'; 20]);
    }

    #[test]
    fn test_shared_half_byte() {
        // Two extended matches; the second consumes the high nibble stored by
        // the first.
        let input = [
            0x0C, 0x00, 0x00, 0x00, b'x', b'y', 0x07, 0x00, 0x00, 0x07, 0x00,
        ];
        let out = decompress_lz77(&input, 22).unwrap();
        let mut expected = vec![b'x', b'y'];
        expected.extend(std::iter::repeat(b'y').take(20));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_declared_length_truncates() {
        let mut input = vec![0x00, 0x00, 0x00, 0x00];
        input.extend_from_slice(b"Hello World");
        let out = decompress_lz77(&input, 5).unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_short_input_is_malformed() {
        // Claims 100 bytes of output but the stream runs dry at 11.
        let mut input = vec![0x00, 0x00, 0x00, 0x00];
        input.extend_from_slice(b"Hello World");
        assert!(matches!(
            decompress_lz77(&input, 100),
            Err(XpressError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_offset_is_malformed() {
        // Match at offset 9 with only 1 byte of output produced.
        let input = [0x02, 0x00, 0x00, 0x00, b'a', 0x40, 0x00];
        assert!(matches!(
            decompress_lz77(&input, 10),
            Err(XpressError::Malformed(_))
        ));
    }
}

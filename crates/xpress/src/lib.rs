//! Decompressor for the column compression family used by Exchange ESE
//! databases.
//!
//! The first byte of a compressed column value identifies the variant:
//!
//! | Byte   | Variant |
//! |--------|---------|
//! | `0x10` | 7-bit ASCII dictionary form |
//! | `0x12` | 7-bit UTF-16 dictionary form |
//! | `0x15` | 7-bit form with an alternate preamble |
//! | `0x17` | Uncompressed; the payload is the remainder verbatim |
//! | `0x18` | LZXPRESS ([MS-XCA] plain LZ77), 2-byte uncompressed size |
//! | `0x19` | LZXPRESS, 4-byte uncompressed size |
//!
//! [MS-XCA]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-xca/a8b7cb0a-92a6-4187-a23b-5e14273b96f8

use thiserror::Error;

mod lz77;
mod seven_bit;

pub use lz77::decompress_lz77;
pub use seven_bit::decompress_seven_bit;

#[derive(Error, Debug)]
pub enum XpressError {
    #[error("Unsupported compression tag: 0x{0:02X}")]
    Unsupported(u8),
    #[error("Malformed compressed stream: {0}")]
    Malformed(&'static str),
}

pub type XpressResult<T> = Result<T, XpressError>;

/// Which decoder handled the column, for callers that audit rare tags.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Variant {
    SevenBitAscii,
    SevenBitUtf16,
    SevenBitAlternate,
    Uncompressed,
    Lz77,
    Lz77Large,
}

/// A decompressed column value.
#[derive(Clone, Debug)]
pub struct Decompressed {
    pub variant: Variant,
    pub data: Vec<u8>,
}

/// Decompress an ESE column value, dispatching on the leading tag byte.
///
/// The returned bytes are the logical column value, suitable for direct
/// UTF-16LE/UTF-8 decoding or further structural parsing.
pub fn decompress(input: &[u8]) -> XpressResult<Decompressed> {
    let Some((&tag, payload)) = input.split_first() else {
        return Err(XpressError::Malformed("empty column value"));
    };

    match tag {
        0x10 => Ok(Decompressed {
            variant: Variant::SevenBitAscii,
            data: decompress_seven_bit(payload, false)?,
        }),
        0x12 => Ok(Decompressed {
            variant: Variant::SevenBitUtf16,
            data: decompress_seven_bit(payload, true)?,
        }),
        0x15 => Ok(Decompressed {
            variant: Variant::SevenBitAlternate,
            data: decompress_seven_bit(payload, false)?,
        }),
        0x17 => Ok(Decompressed {
            variant: Variant::Uncompressed,
            data: payload.to_vec(),
        }),
        0x18 => {
            if payload.len() < 2 {
                return Err(XpressError::Malformed("truncated LZXPRESS size header"));
            }
            let size = u16::from_le_bytes([payload[0], payload[1]]) as usize;
            Ok(Decompressed {
                variant: Variant::Lz77,
                data: decompress_lz77(&payload[2..], size)?,
            })
        }
        0x19 => {
            if payload.len() < 4 {
                return Err(XpressError::Malformed("truncated LZXPRESS size header"));
            }
            let size =
                u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
            Ok(Decompressed {
                variant: Variant::Lz77Large,
                data: decompress_lz77(&payload[4..], size)?,
            })
        }
        other => Err(XpressError::Unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_passthrough() {
        let result = decompress(b"\x17Hello").unwrap();
        assert_eq!(result.variant, Variant::Uncompressed);
        assert_eq!(result.data, b"Hello");
    }

    #[test]
    fn test_lz77_with_size_header() {
        let mut input = vec![0x18, 0x0B, 0x00];
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        input.extend_from_slice(b"Hello World");
        let result = decompress(&input).unwrap();
        assert_eq!(result.variant, Variant::Lz77);
        assert_eq!(result.data, b"Hello World");
    }

    #[test]
    fn test_unknown_tag() {
        let Err(XpressError::Unsupported(tag)) = decompress(b"\x42abc") else {
            panic!("tag 0x42 should be unsupported");
        };
        assert_eq!(tag, 0x42);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(decompress(b""), Err(XpressError::Malformed(_))));
    }

    #[test]
    fn test_truncated_lz77_header() {
        assert!(matches!(
            decompress(b"\x18\x0B"),
            Err(XpressError::Malformed(_))
        ));
    }
}

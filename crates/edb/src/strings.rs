//! String decoding for ESE column values: UTF-16LE and UTF-8 first, then the
//! legacy code-page heuristics used for pre-Unicode message bodies.

/// A decoded string plus the number of U+FFFD substitutions made.
#[derive(Clone, Default, Debug)]
pub struct Decoded {
    pub text: String,
    pub replacements: usize,
}

impl Decoded {
    fn clean(text: String) -> Self {
        Self {
            text,
            replacements: 0,
        }
    }
}

/// Decode UTF-16LE, substituting U+FFFD for unpaired surrogates. Trailing
/// NULs are stripped.
pub fn decode_utf16le(bytes: &[u8]) -> Decoded {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut replacements = bytes.len() % 2;
    let text: String = char::decode_utf16(units.into_iter())
        .map(|result| {
            result.unwrap_or_else(|_| {
                replacements += 1;
                '\u{FFFD}'
            })
        })
        .collect();

    Decoded {
        text: text.trim_end_matches('\0').to_string(),
        replacements,
    }
}

/// Decode UTF-8, substituting U+FFFD for invalid sequences.
pub fn decode_utf8(bytes: &[u8]) -> Decoded {
    match std::str::from_utf8(bytes) {
        Ok(text) => Decoded::clean(text.trim_end_matches('\0').to_string()),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            Decoded {
                replacements: text.matches('\u{FFFD}').count(),
                text: text.trim_end_matches('\0').to_string(),
            }
        }
    }
}

/// Decode a short string column the way Exchange stores them: UTF-16LE when
/// the byte stream looks wide, otherwise strict UTF-8, otherwise legacy.
pub fn decode_exchange_string(bytes: &[u8]) -> Decoded {
    if bytes.is_empty() {
        return Decoded::default();
    }

    // UTF-16LE text over the Basic Latin range has NUL high bytes.
    let wide = bytes.len() >= 2
        && bytes.len() % 2 == 0
        && bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count() > bytes.len() / 4;
    if wide {
        return decode_utf16le(bytes);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Decoded::clean(text.trim_end_matches('\0').to_string());
    }

    decode_legacy_body(bytes)
}

/// Share of decoded characters that read like running Russian text. The two
/// candidate code pages mirror each other's case ranges, so lowercase
/// dominance is the discriminating signal.
fn cyrillic_score(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let good = text
        .chars()
        .filter(|c| {
            matches!(c, '\u{0430}'..='\u{044F}' | 'ё')
                || c.is_ascii_alphanumeric()
                || " .,;:!?-\r\n\t'\"()".contains(*c)
        })
        .count();
    good as f64 / text.chars().count() as f64
}

/// Decode a legacy code-page body: UTF-8 strict first; on failure probe for
/// Cyrillic signatures and pick Windows-1251 or KOI8-R by which decode reads
/// better; otherwise fall back to Windows-1252.
pub fn decode_legacy_body(bytes: &[u8]) -> Decoded {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Decoded::clean(text.trim_end_matches('\0').to_string());
    }

    let high_bytes = bytes.iter().filter(|&&b| b >= 0xC0).count();
    if high_bytes * 4 > bytes.len() {
        let (win1251, _, _) = encoding_rs::WINDOWS_1251.decode(bytes);
        let (koi8r, _, _) = encoding_rs::KOI8_R.decode(bytes);
        let decoded = if cyrillic_score(&win1251) >= cyrillic_score(&koi8r) {
            win1251
        } else {
            koi8r
        };
        return Decoded::clean(decoded.trim_end_matches('\0').to_string());
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    Decoded {
        replacements: if had_errors {
            text.matches('\u{FFFD}').count()
        } else {
            0
        },
        text: text.trim_end_matches('\0').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16le_with_terminator() {
        let decoded = decode_utf16le(&[b'H', 0, b'i', 0, 0, 0]);
        assert_eq!(decoded.text, "Hi");
        assert_eq!(decoded.replacements, 0);
    }

    #[test]
    fn test_unpaired_surrogate_counts_replacement() {
        // A lone high surrogate 0xD800.
        let decoded = decode_utf16le(&[0x00, 0xD8]);
        assert_eq!(decoded.text, "\u{FFFD}");
        assert_eq!(decoded.replacements, 1);
    }

    #[test]
    fn test_exchange_string_picks_utf16() {
        let wide: Vec<u8> = "IPM.Note".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode_exchange_string(&wide).text, "IPM.Note");
        assert_eq!(decode_exchange_string(b"IPM.Note\0").text, "IPM.Note");
    }

    #[test]
    fn test_windows_1251_body() {
        // "Привет" in Windows-1251.
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let decoded = decode_legacy_body(&bytes);
        assert_eq!(decoded.text, "Привет");
    }

    #[test]
    fn test_koi8r_body_wins_when_it_reads_better() {
        // "привет мир" in KOI8-R; read as Windows-1251 it turns into
        // uppercase soup and loses the arbitration.
        let bytes = [0xD0, 0xD2, 0xC9, 0xD7, 0xC5, 0xD4, 0x20, 0xCD, 0xC9, 0xD2];
        let decoded = decode_legacy_body(&bytes);
        assert_eq!(decoded.text, "привет мир");
    }

    #[test]
    fn test_latin_fallback() {
        // "café" in Windows-1252.
        let bytes = [b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_legacy_body(&bytes).text, "café");
    }
}

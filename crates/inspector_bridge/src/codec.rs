//! Conversion of engine-native strings into UTF-8 protocol text.
//!
//! Engines hand out protocol text either as one-byte (Latin-1) or two-byte
//! (UTF-16) buffers. Everything past this module only ever sees UTF-8.

use crate::error::CodecError;

/// Borrowed view of a string in the engine's native representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineString<'a> {
    /// One byte per code point, Latin-1.
    OneByte(&'a [u8]),
    /// UTF-16 code units.
    TwoByte(&'a [u16]),
}

impl EngineString<'_> {
    /// Length in engine units (bytes or UTF-16 code units).
    pub fn len(&self) -> usize {
        match self {
            EngineString::OneByte(bytes) => bytes.len(),
            EngineString::TwoByte(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts an engine string into UTF-8.
///
/// # Errors
///
/// Returns [`CodecError::UnpairedSurrogate`] when a two-byte string is not
/// valid UTF-16. Nothing is truncated or replaced.
pub fn encode(message: EngineString<'_>) -> Result<String, CodecError> {
    match message {
        EngineString::OneByte(bytes) => Ok(latin1_to_utf8(bytes)),
        EngineString::TwoByte(units) => utf16_to_utf8(units),
    }
}

fn latin1_to_utf8(bytes: &[u8]) -> String {
    if bytes.is_ascii()
        && let Ok(ascii) = std::str::from_utf8(bytes)
    {
        return ascii.to_owned();
    }

    // Latin-1 bytes are exactly the first 256 code points
    let mut text = String::with_capacity(bytes.len() + bytes.len() / 2);
    text.extend(bytes.iter().copied().map(char::from));
    text
}

fn utf16_to_utf8(units: &[u16]) -> Result<String, CodecError> {
    let mut text = String::with_capacity(units.len());
    let mut index = 0;

    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(ch) => {
                index += ch.len_utf16();
                text.push(ch);
            }
            Err(err) => {
                return Err(CodecError::UnpairedSurrogate {
                    index,
                    unit: err.unpaired_surrogate(),
                });
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_one_byte() {
        let text = encode(EngineString::OneByte(br#"{"id":1,"result":{}}"#)).unwrap();
        assert_eq!(text, r#"{"id":1,"result":{}}"#);
    }

    #[test]
    fn test_latin1_high_bytes_become_two_byte_utf8() {
        // "café ñ" in Latin-1
        let latin1 = [0x63, 0x61, 0x66, 0xE9, 0x20, 0xF1];
        let text = encode(EngineString::OneByte(&latin1)).unwrap();
        assert_eq!(text, "café ñ");
        assert_eq!(text.len(), 8);
    }

    #[test]
    fn test_two_byte_non_ascii_matches_reference_decoder() {
        let source_text = "{\"value\":\"héllo wörld Привет 日本 🌍🚀\"}";
        let units: Vec<u16> = source_text.encode_utf16().collect();

        let text = encode(EngineString::TwoByte(&units)).unwrap();

        let reference = String::from_utf16(&units).unwrap();
        assert_eq!(text, reference);
        assert_eq!(
            text.chars().collect::<Vec<_>>(),
            source_text.chars().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_astral_code_point_is_fully_converted() {
        // U+1F600 as a surrogate pair
        let units = [0xD83D, 0xDE00];
        let text = encode(EngineString::TwoByte(&units)).unwrap();
        assert_eq!(text, "\u{1F600}");
        assert_eq!(text.as_bytes(), &[0xF0, 0x9F, 0x98, 0x80]);
    }

    #[test]
    fn test_unpaired_surrogate_is_an_error() {
        let units = [0x0061, 0x0062, 0xD800, 0x0063];
        let err = encode(EngineString::TwoByte(&units)).unwrap_err();
        match err {
            CodecError::UnpairedSurrogate { index, unit } => {
                assert_eq!(index, 2);
                assert_eq!(unit, 0xD800);
            }
        }
    }

    #[test]
    fn test_lone_low_surrogate_is_an_error() {
        let units = [0xDC00];
        assert!(encode(EngineString::TwoByte(&units)).is_err());
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(encode(EngineString::OneByte(&[])).unwrap(), "");
        assert_eq!(encode(EngineString::TwoByte(&[])).unwrap(), "");
        assert!(EngineString::TwoByte(&[]).is_empty());
    }
}

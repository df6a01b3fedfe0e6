use encoding_rs::SHIFT_JIS;
use std::borrow::Cow;
use tracing::warn;

/// Decodes a Shift_JIS export body into UTF-8 text.
///
/// Malformed sequences are replaced with U+FFFD rather than rejected; the
/// damage is usually confined to a single instrument name.
pub fn decode_shift_jis(bytes: &[u8]) -> Cow<'_, str> {
    let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        warn!(len = bytes.len(), "Shift_JIS payload contained malformed sequences");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_section_marker() {
        let (encoded, _, _) = SHIFT_JIS.encode("■資産合計欄,時価評価額[円]");
        assert_ne!(encoded.as_ref(), "■資産合計欄,時価評価額[円]".as_bytes());
        assert_eq!(decode_shift_jis(&encoded), "■資産合計欄,時価評価額[円]");
    }

    #[test]
    fn test_decode_ascii_passthrough() {
        assert_eq!(decode_shift_jis(b"USD,146.26"), "USD,146.26");
    }

    #[test]
    fn test_decode_malformed_replaces() {
        let decoded = decode_shift_jis(&[0x41, 0x81]);
        assert!(decoded.starts_with('A'));
        assert!(decoded.contains('\u{FFFD}'));
    }
}

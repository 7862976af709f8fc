use std::borrow::Cow;

use crate::{UTF8_NAME, UTF16BE_NAME, UTF16LE_NAME};

pub const UTF32BE_NAME: &str = "UTF-32BE";
pub const UTF32LE_NAME: &str = "UTF-32LE";

/// How long a prefix [`detect_encoding`] looks at for an encoding declaration.
pub const DETECTION_PREFIX_LENGTH: usize = 1024;

/// The outcome of [`detect_encoding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedEncoding {
    pub name: Cow<'static, str>,
    /// Length of the byte order mark at the head of the input. The BOM is not part of the
    /// document and must be skipped before decoding.
    pub bom_length: usize,
    /// `true` if `name` comes from an `encoding` pseudo-attribute.
    pub declared: bool,
}

impl DetectedEncoding {
    fn autodetected(name: &'static str, bom_length: usize) -> Self {
        Self {
            name: Cow::Borrowed(name),
            bom_length,
            declared: false,
        }
    }
}

/// Detect the encoding of an entity from its first bytes.
///
/// A byte order mark wins. Otherwise, for ASCII-compatible input starting with an XML or
/// text declaration, the declared encoding name is picked up. Everything else falls back
/// to UTF-8.
///
/// Reference: [Autodetection of Character Encodings](https://www.w3.org/TR/xml/#sec-guessing)
pub fn detect_encoding(prefix: &[u8]) -> DetectedEncoding {
    match prefix {
        [0x00, 0x00, 0xFE, 0xFF, ..] => DetectedEncoding::autodetected(UTF32BE_NAME, 4),
        [0xFF, 0xFE, 0x00, 0x00, ..] => DetectedEncoding::autodetected(UTF32LE_NAME, 4),
        [0xEF, 0xBB, 0xBF, rem @ ..] => {
            // A declaration after the UTF-8 BOM may only restate UTF-8.
            let mut detected = DetectedEncoding::autodetected(UTF8_NAME, 3);
            if let Some(name) = scan_encoding_decl(rem) {
                detected.name = Cow::Owned(name);
                detected.declared = true;
            }
            detected
        }
        [0xFE, 0xFF, ..] => DetectedEncoding::autodetected(UTF16BE_NAME, 2),
        [0xFF, 0xFE, ..] => DetectedEncoding::autodetected(UTF16LE_NAME, 2),
        [0x00, 0x00, 0x00, 0x3C, ..] => DetectedEncoding::autodetected(UTF32BE_NAME, 0),
        [0x3C, 0x00, 0x00, 0x00, ..] => DetectedEncoding::autodetected(UTF32LE_NAME, 0),
        [0x00, 0x3C, 0x00, 0x3F, ..] => DetectedEncoding::autodetected(UTF16BE_NAME, 0),
        [0x3C, 0x00, 0x3F, 0x00, ..] => DetectedEncoding::autodetected(UTF16LE_NAME, 0),
        _ => match scan_encoding_decl(prefix) {
            Some(name) => DetectedEncoding {
                name: Cow::Owned(name),
                bom_length: 0,
                declared: true,
            },
            None => DetectedEncoding::autodetected(UTF8_NAME, 0),
        },
    }
}

/// Extract the value of the `encoding` pseudo-attribute from an ASCII-compatible
/// XML declaration or text declaration at the head of `prefix`.
fn scan_encoding_decl(prefix: &[u8]) -> Option<String> {
    let prefix = &prefix[..prefix.len().min(DETECTION_PREFIX_LENGTH)];
    let rem = prefix.strip_prefix(b"<?xml")?;
    if !rem.first().is_some_and(|b| b.is_ascii_whitespace()) {
        return None;
    }
    let end = rem.windows(2).position(|w| w == b"?>")?;
    let decl = &rem[..end];

    let pos = decl.windows(8).position(|w| w == b"encoding")?;
    let mut rem = decl[pos + 8..].trim_ascii_start();
    rem = rem.strip_prefix(b"=")?.trim_ascii_start();
    let (&quote, rem) = rem.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let len = rem.iter().position(|&b| b == quote)?;
    let name = &rem[..len];
    // [81] EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
    if name.first().is_some_and(|b| b.is_ascii_alphabetic())
        && name
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        String::from_utf8(name.to_vec()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_marks() {
        let d = detect_encoding(&[0xFF, 0xFE, b'<', 0]);
        assert_eq!(d.name, UTF16LE_NAME);
        assert_eq!(d.bom_length, 2);
        let d = detect_encoding(&[0xEF, 0xBB, 0xBF, b'<', b'a']);
        assert_eq!(d.name, UTF8_NAME);
        assert_eq!(d.bom_length, 3);
        assert!(!d.declared);
    }

    #[test]
    fn declared_encoding() {
        let d = detect_encoding(b"<?xml version='1.0' encoding = \"Shift_JIS\"?><a/>");
        assert_eq!(d.name, "Shift_JIS");
        assert!(d.declared);
        let d = detect_encoding(b"<?xml version='1.0'?><a encoding='x'/>");
        assert_eq!(d.name, UTF8_NAME);
        assert!(!d.declared);
        // "<?xml-stylesheet" is a PI, not a declaration
        let d = detect_encoding(b"<?xml-stylesheet encoding='latin1'?>");
        assert_eq!(d.name, UTF8_NAME);
    }

    #[test]
    fn fallback_to_utf8() {
        assert_eq!(detect_encoding(b"<root/>").name, UTF8_NAME);
        assert_eq!(detect_encoding(b"").name, UTF8_NAME);
    }
}

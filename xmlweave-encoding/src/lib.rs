//! Provide a unified decoding interface for the XML processor and a default set of decoders.
//!
//! UTF-8, US-ASCII and ISO-8859-1 are decoded natively. Other legacy encodings are backed by
//! [`encoding_rs`].
//!
//! If it is necessary to provide a custom decoder, a type implementing the [`Decoder`] trait
//! can be registered using the [`register_decoder`] function.  \
//! Encoding names are compared case-insensitively, and additional names for a registered
//! decoder can be provided with [`register_encoding_alias`].
//!
//! The default encoding names and aliases are based on
//! [IANA registrations](https://www.iana.org/assignments/character-sets/character-sets.xhtml).

mod detect;
mod legacy;
mod utf8;

use std::{
    borrow::Cow,
    collections::BTreeMap,
    sync::{LazyLock, RwLock},
};

pub use detect::*;
pub use legacy::*;
pub use utf8::*;

#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Input buffer is empty.
    InputIsEmpty,
    /// The length of the output buffer is too short.
    /// If this error is returned, it is guaranteed that the decoder is consuming the input buffer.
    OutputTooShort,
    /// Malformed byte sequence is found.
    ///
    /// The input and output buffer have consumed `read` and `write` bytes respectively.
    /// Malformed sequence occurs `input[read-length-offset..read-offset]`.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
        offset: usize,
    },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputIsEmpty => write!(f, "input buffer is empty"),
            Self::OutputTooShort => write!(f, "output buffer is too short"),
            Self::Malformed { length, .. } => {
                write!(f, "malformed byte sequence of length {length}")
            }
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decoders are moved into the parser's worker thread, so they must be [`Send`].
pub trait Decoder: Send {
    fn name(&self) -> &'static str;
    /// If no error occurs, return `Ok((read_bytes, write_bytes))`.
    ///
    /// `dst` must have some spare capacity. The decoder never grows `dst` beyond its capacity.
    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError>;
}

/// Manage aliases for encoding names.
pub static ENCODING_ALIASES: LazyLock<RwLock<BTreeMap<Cow<'static, str>, &'static str>>> =
    LazyLock::new(|| {
        // To perform case-insensitive comparisons, capitalize all aliases.
        RwLock::new(BTreeMap::from([
            ("UTF8".into(), UTF8_NAME),
            ("UTF16".into(), UTF16BE_NAME),
            ("UTF-16".into(), UTF16BE_NAME),
            ("UTF16BE".into(), UTF16BE_NAME),
            ("UTF16LE".into(), UTF16LE_NAME),
            ("ISO-10646-UCS-2".into(), UTF16BE_NAME),
            ("ISO-IR-6".into(), US_ASCII_NAME),
            ("ANSI_X3.4-1968".into(), US_ASCII_NAME),
            ("ANSI_X3.4-1986".into(), US_ASCII_NAME),
            ("ISO_646.IRV:1991".into(), US_ASCII_NAME),
            ("ISO646-US".into(), US_ASCII_NAME),
            ("US".into(), US_ASCII_NAME),
            ("IBM367".into(), US_ASCII_NAME),
            ("CP367".into(), US_ASCII_NAME),
            ("ASCII".into(), US_ASCII_NAME),
            ("ISO-IR-100".into(), ISO_8859_1_NAME),
            ("ISO_8859-1".into(), ISO_8859_1_NAME),
            ("LATIN1".into(), ISO_8859_1_NAME),
            ("L1".into(), ISO_8859_1_NAME),
            ("IBM819".into(), ISO_8859_1_NAME),
            ("CP819".into(), ISO_8859_1_NAME),
            ("ISOLATIN1".into(), ISO_8859_1_NAME),
            ("ISO_8859-2".into(), ISO_8859_2_NAME),
            ("LATIN2".into(), ISO_8859_2_NAME),
            ("ISO_8859-3".into(), ISO_8859_3_NAME),
            ("LATIN3".into(), ISO_8859_3_NAME),
            ("ISO_8859-4".into(), ISO_8859_4_NAME),
            ("LATIN4".into(), ISO_8859_4_NAME),
            ("ISO_8859-5".into(), ISO_8859_5_NAME),
            ("CYRILLIC".into(), ISO_8859_5_NAME),
            ("ISO_8859-6".into(), ISO_8859_6_NAME),
            ("ARABIC".into(), ISO_8859_6_NAME),
            ("ISO_8859-7".into(), ISO_8859_7_NAME),
            ("GREEK".into(), ISO_8859_7_NAME),
            ("ISO_8859-8".into(), ISO_8859_8_NAME),
            ("HEBREW".into(), ISO_8859_8_NAME),
            ("ISO_8859-10".into(), ISO_8859_10_NAME),
            ("LATIN6".into(), ISO_8859_10_NAME),
            ("ISO_8859-13".into(), ISO_8859_13_NAME),
            ("ISO_8859-14".into(), ISO_8859_14_NAME),
            ("LATIN8".into(), ISO_8859_14_NAME),
            ("ISO_8859-15".into(), ISO_8859_15_NAME),
            ("LATIN-9".into(), ISO_8859_15_NAME),
            ("ISO_8859-16".into(), ISO_8859_16_NAME),
            ("LATIN10".into(), ISO_8859_16_NAME),
            // `Shift_JIS` documents are decoded with the `windows-31j` superset.
            ("SHIFT_JIS".into(), WINDOWS_31J_NAME),
            ("SHIFT-JIS".into(), WINDOWS_31J_NAME),
            ("SHIFTJIS".into(), WINDOWS_31J_NAME),
            ("SJIS".into(), WINDOWS_31J_NAME),
            ("MS_KANJI".into(), WINDOWS_31J_NAME),
            ("CSSHIFTJIS".into(), WINDOWS_31J_NAME),
            ("MS932".into(), WINDOWS_31J_NAME),
            ("CP932".into(), WINDOWS_31J_NAME),
            ("CSEUCPKDFMTJAPANESE".into(), EUC_JP_NAME),
            ("CSISO2022JP".into(), ISO_2022_JP_NAME),
            ("GB2312".into(), GBK_NAME),
            ("CP936".into(), GBK_NAME),
            ("BIG5-HKSCS".into(), BIG5_NAME),
            ("KS_C_5601-1987".into(), EUC_KR_NAME),
            ("CP1250".into(), WINDOWS_1250_NAME),
            ("CP1251".into(), WINDOWS_1251_NAME),
            ("CP1252".into(), WINDOWS_1252_NAME),
            ("KOI8".into(), KOI8_R_NAME),
        ]))
    });

/// Register `alias` as an alias for the encoding name `real`.  \
/// If `alias` is already an alias for another encoding name, overwrite it and return
/// the encoding name before the overwrite.
///
/// Since aliases do not redirect multiple times, `real` must be the name registered
/// with the decoder.
pub fn register_encoding_alias(alias: &'static str, real: &'static str) -> Option<&'static str> {
    let mut table = ENCODING_ALIASES.write().unwrap();
    if alias.chars().all(|c| !c.is_ascii_lowercase()) {
        table.insert(alias.into(), real)
    } else {
        table.insert(alias.to_ascii_uppercase().into(), real)
    }
}

/// Unregister `alias` if it is registerd as an alias for an encoding name.  \
/// If successfully removed, return the real name.
pub fn unregister_encoding_alias(alias: &str) -> Option<&'static str> {
    ENCODING_ALIASES
        .write()
        .unwrap()
        .remove(alias.to_ascii_uppercase().as_str())
}

/// Retrieve the encoding name from `alias`, which is an alias for a certain encoding name.  \
/// If retrieval fails, returns [`None`].
///
/// Alias comparisons are case-insensitive.
pub fn resolve_encoding_alias(alias: &str) -> Option<&'static str> {
    let aliases = ENCODING_ALIASES.read().unwrap();
    aliases
        .get(alias)
        .or_else(|| aliases.get(alias.to_ascii_uppercase().as_str()))
        .copied()
}

pub type DecoderFactory = fn() -> Box<dyn Decoder>;
pub static DECODER_TABLE: LazyLock<RwLock<BTreeMap<Cow<'static, str>, DecoderFactory>>> =
    LazyLock::new(|| {
        let mut map = BTreeMap::<Cow<'static, str>, DecoderFactory>::new();
        map.insert(UTF8_NAME.into(), || Box::new(UTF8Decoder));
        map.insert(US_ASCII_NAME.into(), || Box::new(USASCIIDecoder));
        map.insert(ISO_8859_1_NAME.into(), || Box::new(ISO8859_1Decoder));
        for &(name, factory) in LEGACY_ENCODINGS {
            map.insert(name.to_ascii_uppercase().into(), factory);
        }
        RwLock::new(map)
    });

/// Find a decoder for `encoding_name`.
///
/// Registered names are tried first, then aliases.
pub fn find_decoder(encoding_name: &str) -> Option<Box<dyn Decoder>> {
    let table = DECODER_TABLE.read().unwrap();
    let upper = encoding_name.to_ascii_uppercase();
    if let Some(factory) = table.get(upper.as_str()) {
        return Some(factory());
    }

    let alias = resolve_encoding_alias(encoding_name)?;
    table.get(alias.to_ascii_uppercase().as_str()).map(|f| f())
}

/// Register a decoder factory for `encoding_name`.  \
/// If a factory is already registered, it is replaced and returned.
pub fn register_decoder(
    encoding_name: &'static str,
    factory: DecoderFactory,
) -> Option<DecoderFactory> {
    DECODER_TABLE
        .write()
        .unwrap()
        .insert(encoding_name.to_ascii_uppercase().into(), factory)
}

pub fn unregister_decoder(encoding_name: &str) -> Option<DecoderFactory> {
    DECODER_TABLE
        .write()
        .unwrap()
        .remove(encoding_name.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(name: &str, src: &[u8]) -> Result<String, DecodeError> {
        let mut decoder = find_decoder(name).unwrap();
        let mut out = String::with_capacity(src.len() * 3 + 8);
        let mut src = src;
        while !src.is_empty() {
            let (read, _) = decoder.decode(src, &mut out, true)?;
            src = &src[read..];
            if out.capacity() - out.len() < 8 {
                out.reserve(64);
            }
        }
        Ok(out)
    }

    #[test]
    fn shift_jis_aliases_to_windows_31j() {
        assert_eq!(find_decoder("Shift_JIS").unwrap().name(), WINDOWS_31J_NAME);
        assert_eq!(find_decoder("shift-jis").unwrap().name(), WINDOWS_31J_NAME);
        assert_eq!(find_decoder("windows-31j").unwrap().name(), WINDOWS_31J_NAME);
        // NEC special character, only in the windows-31j superset
        assert_eq!(decode_all("Shift_JIS", &[0x87, 0x40]).unwrap(), "\u{2460}");
    }

    #[test]
    fn native_decoders() {
        assert_eq!(decode_all("utf-8", "aあ𠀋".as_bytes()).unwrap(), "aあ𠀋");
        assert_eq!(decode_all("latin1", &[0x41, 0xE9, 0x85]).unwrap(), "Aé\u{85}");
        assert!(matches!(
            decode_all("US-ASCII", &[0x41, 0x80]),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            decode_all("UTF-8", &[0x41, 0xC3, 0x28]),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn utf16_decoders() {
        assert_eq!(decode_all("UTF-16LE", &[0x3C, 0x00, 0x61, 0x00]).unwrap(), "<a");
        assert_eq!(decode_all("UTF-16", &[0x00, 0x3C, 0x00, 0x61]).unwrap(), "<a");
        // lone high surrogate
        assert!(decode_all("UTF-16BE", &[0xD8, 0x00, 0x00, 0x41]).is_err());
    }

    #[test]
    fn unknown_encoding() {
        assert!(find_decoder("x-no-such-encoding").is_none());
    }
}

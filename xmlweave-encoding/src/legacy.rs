//! Decoders backed by `encoding_rs`.

use encoding_rs::{DecoderResult, Encoding};

use crate::{DecodeError, Decoder, DecoderFactory};

pub const UTF16BE_NAME: &str = "UTF-16BE";
pub const UTF16LE_NAME: &str = "UTF-16LE";
pub const ISO_8859_2_NAME: &str = "ISO-8859-2";
pub const ISO_8859_3_NAME: &str = "ISO-8859-3";
pub const ISO_8859_4_NAME: &str = "ISO-8859-4";
pub const ISO_8859_5_NAME: &str = "ISO-8859-5";
pub const ISO_8859_6_NAME: &str = "ISO-8859-6";
pub const ISO_8859_7_NAME: &str = "ISO-8859-7";
pub const ISO_8859_8_NAME: &str = "ISO-8859-8";
pub const ISO_8859_10_NAME: &str = "ISO-8859-10";
pub const ISO_8859_13_NAME: &str = "ISO-8859-13";
pub const ISO_8859_14_NAME: &str = "ISO-8859-14";
pub const ISO_8859_15_NAME: &str = "ISO-8859-15";
pub const ISO_8859_16_NAME: &str = "ISO-8859-16";
pub const WINDOWS_31J_NAME: &str = "windows-31j";
pub const EUC_JP_NAME: &str = "EUC-JP";
pub const ISO_2022_JP_NAME: &str = "ISO-2022-JP";
pub const GBK_NAME: &str = "GBK";
pub const GB18030_NAME: &str = "GB18030";
pub const BIG5_NAME: &str = "Big5";
pub const EUC_KR_NAME: &str = "EUC-KR";
pub const KOI8_R_NAME: &str = "KOI8-R";
pub const KOI8_U_NAME: &str = "KOI8-U";
pub const WINDOWS_1250_NAME: &str = "windows-1250";
pub const WINDOWS_1251_NAME: &str = "windows-1251";
pub const WINDOWS_1252_NAME: &str = "windows-1252";
pub const WINDOWS_1253_NAME: &str = "windows-1253";
pub const WINDOWS_1254_NAME: &str = "windows-1254";
pub const WINDOWS_1255_NAME: &str = "windows-1255";
pub const WINDOWS_1256_NAME: &str = "windows-1256";
pub const WINDOWS_1257_NAME: &str = "windows-1257";
pub const WINDOWS_1258_NAME: &str = "windows-1258";

/// A decoder delegating to an [`encoding_rs::Encoding`].
///
/// BOM handling is disabled. The parser strips byte order marks before decoding.
pub struct LegacyDecoder {
    name: &'static str,
    inner: encoding_rs::Decoder,
}

impl LegacyDecoder {
    pub fn new(name: &'static str, encoding: &'static Encoding) -> Self {
        Self {
            name,
            inner: encoding.new_decoder_without_bom_handling(),
        }
    }
}

impl Decoder for LegacyDecoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() && !finish {
            return Err(DecodeError::InputIsEmpty);
        }
        if dst.capacity() - dst.len() < 4 {
            return Err(DecodeError::OutputTooShort);
        }

        let before = dst.len();
        let (result, read) = self
            .inner
            .decode_to_string_without_replacement(src, dst, finish);
        let write = dst.len() - before;
        match result {
            DecoderResult::InputEmpty => Ok((read, write)),
            DecoderResult::OutputFull if read == 0 && write == 0 => {
                Err(DecodeError::OutputTooShort)
            }
            DecoderResult::OutputFull => Ok((read, write)),
            DecoderResult::Malformed(length, offset) => Err(DecodeError::Malformed {
                read,
                write,
                length: length as usize,
                offset: offset as usize,
            }),
        }
    }
}

macro_rules! legacy_encodings {
    ( $( ($name:ident, $encoding:ident) ),* $(,)? ) => {
        /// Encoding names served by [`LegacyDecoder`], with their factories.
        pub const LEGACY_ENCODINGS: &[(&str, DecoderFactory)] = &[
            $( ($name, || -> Box<dyn Decoder> {
                Box::new(LegacyDecoder::new($name, encoding_rs::$encoding))
            }) ),*
        ];
    };
}

legacy_encodings!(
    (UTF16BE_NAME, UTF_16BE),
    (UTF16LE_NAME, UTF_16LE),
    (ISO_8859_2_NAME, ISO_8859_2),
    (ISO_8859_3_NAME, ISO_8859_3),
    (ISO_8859_4_NAME, ISO_8859_4),
    (ISO_8859_5_NAME, ISO_8859_5),
    (ISO_8859_6_NAME, ISO_8859_6),
    (ISO_8859_7_NAME, ISO_8859_7),
    (ISO_8859_8_NAME, ISO_8859_8),
    (ISO_8859_10_NAME, ISO_8859_10),
    (ISO_8859_13_NAME, ISO_8859_13),
    (ISO_8859_14_NAME, ISO_8859_14),
    (ISO_8859_15_NAME, ISO_8859_15),
    (ISO_8859_16_NAME, ISO_8859_16),
    (WINDOWS_31J_NAME, SHIFT_JIS),
    (EUC_JP_NAME, EUC_JP),
    (ISO_2022_JP_NAME, ISO_2022_JP),
    (GBK_NAME, GBK),
    (GB18030_NAME, GB18030),
    (BIG5_NAME, BIG5),
    (EUC_KR_NAME, EUC_KR),
    (KOI8_R_NAME, KOI8_R),
    (KOI8_U_NAME, KOI8_U),
    (WINDOWS_1250_NAME, WINDOWS_1250),
    (WINDOWS_1251_NAME, WINDOWS_1251),
    (WINDOWS_1252_NAME, WINDOWS_1252),
    (WINDOWS_1253_NAME, WINDOWS_1253),
    (WINDOWS_1254_NAME, WINDOWS_1254),
    (WINDOWS_1255_NAME, WINDOWS_1255),
    (WINDOWS_1256_NAME, WINDOWS_1256),
    (WINDOWS_1257_NAME, WINDOWS_1257),
    (WINDOWS_1258_NAME, WINDOWS_1258),
);

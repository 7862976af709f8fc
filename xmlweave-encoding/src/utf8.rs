use std::str::{from_utf8, from_utf8_unchecked};

use crate::{DecodeError, Decoder};

pub const UTF8_NAME: &str = "UTF-8";
pub const US_ASCII_NAME: &str = "US-ASCII";
pub const ISO_8859_1_NAME: &str = "ISO-8859-1";

pub struct UTF8Decoder;
impl Decoder for UTF8Decoder {
    fn name(&self) -> &'static str {
        UTF8_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return Err(DecodeError::InputIsEmpty);
        }
        let len = dst.capacity() - dst.len();
        if len < 4 {
            return Err(DecodeError::OutputTooShort);
        }

        let len = len.min(src.len());
        match from_utf8(&src[..len]) {
            Ok(s) => {
                dst.push_str(s);
                Ok((len, len))
            }
            Err(err) => {
                let up_to = err.valid_up_to();
                dst.push_str(unsafe {
                    // # Safety
                    // This operation is safe due to the `Utf8Error` constraint.
                    from_utf8_unchecked(&src[..up_to])
                });
                match err.error_len() {
                    Some(length) => Err(DecodeError::Malformed {
                        read: up_to + length,
                        write: up_to,
                        length,
                        offset: 0,
                    }),
                    // The sequence is cut at the end of the window. If more input follows,
                    // it is completed by the next call.
                    None if !finish || len < src.len() => Ok((up_to, up_to)),
                    None => Err(DecodeError::Malformed {
                        read: len,
                        write: up_to,
                        length: len - up_to,
                        offset: 0,
                    }),
                }
            }
        }
    }
}

pub struct USASCIIDecoder;
impl Decoder for USASCIIDecoder {
    fn name(&self) -> &'static str {
        US_ASCII_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        _finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return Err(DecodeError::InputIsEmpty);
        }
        let len = (dst.capacity() - dst.len()).min(src.len());
        if len == 0 {
            return Err(DecodeError::OutputTooShort);
        }

        let valid = src[..len]
            .iter()
            .position(|b| !b.is_ascii())
            .unwrap_or(len);
        dst.push_str(unsafe {
            // # Safety
            // `src[..valid]` contains only ASCII characters.
            from_utf8_unchecked(&src[..valid])
        });
        if valid < len {
            return Err(DecodeError::Malformed {
                read: valid + 1,
                write: valid,
                length: 1,
                offset: 0,
            });
        }
        Ok((len, len))
    }
}

pub struct ISO8859_1Decoder;
impl Decoder for ISO8859_1Decoder {
    fn name(&self) -> &'static str {
        ISO_8859_1_NAME
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        _finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        if src.is_empty() {
            return Err(DecodeError::InputIsEmpty);
        }
        let cap = dst.capacity() - dst.len();
        if cap < 2 {
            return Err(DecodeError::OutputTooShort);
        }

        let mut read = 0;
        let mut write = 0;
        for &b in src {
            let c = b as char;
            if write + c.len_utf8() > cap {
                break;
            }
            dst.push(c);
            read += 1;
            write += c.len_utf8();
        }
        Ok((read, write))
    }
}

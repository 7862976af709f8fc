use std::{io::Read, sync::Arc};

use crate::{
    XMLVersion,
    encoding::{
        DETECTION_PREFIX_LENGTH, DecodeError, Decoder, UTF8Decoder, detect_encoding, find_decoder,
    },
    error::XMLError,
};

const INPUT_CHUNK: usize = 4096;
const GROW_THRESHOLD: usize = 64;

/// A stream of codepoints read from bytes, a string or a replacement text.
///
/// Byte input is decoded with a decoder selected from the byte order mark, the encoding
/// declaration, or the encoding supplied by the caller.  \
/// Line endings are normalized to `'\n'` while reading, and characters not allowed in the
/// current XML version are rejected.
pub struct InputSource {
    source: Box<dyn Read + Send>,
    buffer: Box<[u8]>,
    decoder: Box<dyn Decoder>,
    decoded: String,
    /// Start position of the undecoded range of `buffer`
    buffer_next: usize,
    /// End position of data read into `buffer`
    buffer_end: usize,
    /// Start position of unused data in `decoded`
    decoded_next: usize,
    /// Whether `source` has reached EOF
    eof: bool,

    system_id: Option<Arc<str>>,
    public_id: Option<Arc<str>>,

    version: XMLVersion,
    /// Apply line ending normalization and character checks.
    /// Replacement texts and captured subsets have already been normalized.
    normalize: bool,
    pub(crate) line: usize,
    pub(crate) column: usize,
    /// The number of characters consumed.
    pub(crate) offset: usize,
}

impl InputSource {
    /// Create a source from a byte stream.
    ///
    /// If `encoding` is `None`, the encoding is detected from the head of the stream.
    pub fn from_reader(
        reader: impl Read + Send + 'static,
        encoding: Option<&str>,
    ) -> Result<Self, XMLError> {
        Self::with_buffer_size(reader, encoding, INPUT_CHUNK)
    }

    /// Same as [`InputSource::from_reader`], reading the stream in chunks of `size` bytes.
    pub(crate) fn with_buffer_size(
        reader: impl Read + Send + 'static,
        encoding: Option<&str>,
        size: usize,
    ) -> Result<Self, XMLError> {
        let size = size.max(GROW_THRESHOLD * 2);
        let mut ret = Self {
            source: Box::new(reader),
            buffer: vec![0; size].into_boxed_slice(),
            eof: false,
            ..Self::default()
        };
        ret.decoded.reserve(INPUT_CHUNK);

        // Handling strange implementations that write only one byte per read
        while ret.buffer_end < DETECTION_PREFIX_LENGTH.min(size) {
            let read = ret.source.read(&mut ret.buffer[ret.buffer_end..])?;
            if read == 0 {
                ret.eof = true;
                break;
            }
            ret.buffer_end += read;
            if ret.buffer[..ret.buffer_end].windows(2).any(|w| w == b"?>") {
                break;
            }
        }

        let detected = detect_encoding(&ret.buffer[..ret.buffer_end]);
        ret.buffer_next = detected.bom_length;
        let name = encoding.unwrap_or(&*detected.name);
        ret.decoder = find_decoder(name).ok_or(XMLError::ParserUnsupportedEncoding)?;
        Ok(ret)
    }

    /// Create a source from a string. The encoding declaration in `content` is ignored.
    pub fn from_content(content: &str) -> Self {
        Self {
            decoded: content.to_owned(),
            ..Self::default()
        }
    }

    /// A replacement text of an internal entity. It is neither normalized nor checked again,
    /// and its position is not tracked.
    pub(crate) fn from_replacement_text(text: &str) -> Self {
        Self {
            decoded: text.to_owned(),
            normalize: false,
            ..Self::default()
        }
    }

    /// Already normalized text that originally started at (`line`, `column`).
    pub(crate) fn from_normalized_text(text: String, line: usize, column: usize) -> Self {
        Self {
            decoded: text,
            normalize: false,
            line,
            column,
            ..Self::default()
        }
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn set_system_id(&mut self, system_id: impl Into<Arc<str>>) {
        self.system_id = Some(system_id.into());
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn set_public_id(&mut self, public_id: impl Into<Arc<str>>) {
        self.public_id = Some(public_id.into());
    }

    pub(crate) fn system_id_arc(&self) -> Option<Arc<str>> {
        self.system_id.clone()
    }

    pub(crate) fn public_id_arc(&self) -> Option<Arc<str>> {
        self.public_id.clone()
    }

    pub fn encoding_name(&self) -> &'static str {
        self.decoder.name()
    }

    pub(crate) fn set_version(&mut self, version: XMLVersion) {
        self.version = version;
    }

    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        if self.decoded.len() - self.decoded_next >= GROW_THRESHOLD {
            return Ok(());
        }
        if !self.eof && self.buffer_end - self.buffer_next < GROW_THRESHOLD {
            self.buffer
                .copy_within(self.buffer_next..self.buffer_end, 0);
            self.buffer_end -= self.buffer_next;
            self.buffer_next = 0;
            while self.buffer_end < self.buffer.len() {
                let read = self.source.read(&mut self.buffer[self.buffer_end..])?;
                if read == 0 {
                    self.eof = true;
                    break;
                }
                self.buffer_end += read;
            }
        }

        if self.decoded_next > 0 {
            self.decoded.drain(..self.decoded_next);
            self.decoded_next = 0;
        }
        while self.buffer_next < self.buffer_end && self.decoded.len() < INPUT_CHUNK {
            if self.decoded.capacity() - self.decoded.len() < GROW_THRESHOLD {
                self.decoded.reserve(INPUT_CHUNK);
            }
            match self.decoder.decode(
                &self.buffer[self.buffer_next..self.buffer_end],
                &mut self.decoded,
                self.eof,
            ) {
                Ok((0, _)) => break,
                Ok((read, _)) => self.buffer_next += read,
                Err(DecodeError::Malformed {
                    read,
                    length,
                    offset,
                    ..
                }) if read > length + offset => {
                    // Report the malformed sequence after the valid prefix is consumed.
                    self.buffer_next += read - length - offset;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Read and decode the whole stream into a string without normalization.
    pub(crate) fn read_to_string(&mut self) -> Result<String, XMLError> {
        let mut text = String::new();
        loop {
            self.grow()?;
            if self.is_empty() {
                break Ok(text);
            }
            text.push_str(&self.decoded[self.decoded_next..]);
            self.decoded_next = self.decoded.len();
        }
    }

    pub(crate) fn content_bytes(&self) -> &[u8] {
        &self.decoded.as_bytes()[self.decoded_next..]
    }

    pub(crate) fn content_str(&self) -> &str {
        &self.decoded[self.decoded_next..]
    }

    /// Returns `true` if both the decoded but unused string
    /// and the read but undecoded data are 0 bytes.
    ///
    /// # Note
    /// Returning `true` does not mean that EOF has been reached.
    /// If all of the read data has been decoded and you continue to consume the decoded strings
    /// without explicitly calling `grow`, this function may return `true` before reaching EOF.
    pub(crate) fn is_empty(&self) -> bool {
        self.decoded.len() == self.decoded_next && self.buffer_end == self.buffer_next
    }

    /// Read one character, normalizing line endings.
    ///
    /// ```text
    /// // XML 1.0 2.11 End-of-Line Handling
    /// #xD #xA, #xD  => #xA
    /// // XML 1.1 2.11 End-of-Line Handling
    /// #xD #xA, #xD #x85, #x85, #x2028, #xD  => #xA
    /// ```
    pub(crate) fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        if self.decoded.len() - self.decoded_next < 8 {
            self.grow()?;
        }
        let Some(c) = self.content_str().chars().next() else {
            if !self.is_empty() {
                // Undecodable bytes remain.
                return Err(XMLError::DecodeError(DecodeError::Other {
                    msg: "malformed byte sequence".into(),
                }));
            }
            return Ok(None);
        };
        self.decoded_next += c.len_utf8();
        self.offset += 1;

        if !self.normalize {
            self.count_position(c);
            return Ok(Some(c));
        }

        let xml11 = self.version.is_xml11();
        let c = match c {
            '\r' => {
                match self.content_str().chars().next() {
                    Some('\n') => self.decoded_next += 1,
                    Some('\u{85}') if xml11 => self.decoded_next += 2,
                    _ => {}
                }
                '\n'
            }
            '\u{85}' | '\u{2028}' if xml11 => '\n',
            c if !self.version.is_char(c) || self.version.is_restricted_char(c) => {
                return Err(XMLError::ParserInvalidCharacter);
            }
            c => c,
        };
        self.count_position(c);
        Ok(Some(c))
    }

    /// Peek one character without normalization.
    pub(crate) fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        if self.decoded.len() == self.decoded_next {
            self.grow()?;
        }
        Ok(self.content_str().chars().next())
    }

    /// Skip `len` bytes of ASCII markup that contains no line breaks.
    ///
    /// # Errors
    /// Fails without moving if fewer than `len` bytes remain or they are not all ASCII.
    pub(crate) fn advance(&mut self, len: usize) -> Result<(), XMLError> {
        if self.decoded.len() - self.decoded_next < len {
            self.grow()?;
        }
        match self.content_bytes().get(..len) {
            Some(bytes) if bytes.is_ascii() => {}
            Some(_) => return Err(XMLError::InternalError),
            None => return Err(XMLError::ParserUnexpectedEOF),
        }
        self.decoded_next += len;
        self.offset += len;
        self.column += len;
        Ok(())
    }

    fn count_position(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for InputSource {
    fn default() -> Self {
        Self {
            source: Box::new(std::io::empty()),
            buffer: Box::new([]),
            decoder: Box::new(UTF8Decoder),
            decoded: String::new(),
            buffer_next: 0,
            buffer_end: 0,
            decoded_next: 0,
            eof: true,
            system_id: None,
            public_id: None,
            version: XMLVersion::default(),
            normalize: true,
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource")
            .field("system_id", &self.system_id)
            .field("public_id", &self.public_id)
            .field("encoding", &self.decoder.name())
            .field("line", &self.line)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(source: &mut InputSource) -> (String, usize) {
        let mut out = String::new();
        while let Some(c) = source.next_char().unwrap() {
            out.push(c);
        }
        (out, source.line)
    }

    #[test]
    fn line_endings_are_normalized() {
        let mut source = InputSource::from_content("a\r\nb\rc\nd");
        assert_eq!(collect(&mut source), ("a\nb\nc\nd".to_owned(), 4));
    }

    #[test]
    fn xml11_line_endings() {
        let mut source = InputSource::from_content("a\r\u{85}b\u{85}c\u{2028}d");
        source.set_version(XMLVersion::XML11);
        assert_eq!(collect(&mut source), ("a\nb\nc\nd".to_owned(), 4));

        // NEL is an ordinary character in XML 1.0
        let mut source = InputSource::from_content("a\u{85}b");
        assert_eq!(collect(&mut source), ("a\u{85}b".to_owned(), 1));
    }

    #[test]
    fn advance_stays_in_bounds() {
        let mut source = InputSource::from_content("<a\u{e9}");
        assert!(matches!(source.advance(4), Err(XMLError::ParserUnexpectedEOF)));
        assert!(matches!(source.advance(3), Err(XMLError::InternalError)));
        source.advance(2).unwrap();
        assert_eq!(source.next_char().unwrap(), Some('\u{e9}'));
        assert_eq!(source.next_char().unwrap(), None);
        assert!(matches!(source.advance(1), Err(XMLError::ParserUnexpectedEOF)));
    }

    #[test]
    fn invalid_characters_are_rejected() {
        let mut source = InputSource::from_content("a\u{1}");
        assert_eq!(source.next_char().unwrap(), Some('a'));
        assert!(matches!(
            source.next_char(),
            Err(XMLError::ParserInvalidCharacter)
        ));
    }

    #[test]
    fn reader_with_declared_encoding() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>".to_vec();
        let mut source = InputSource::from_reader(std::io::Cursor::new(bytes), None).unwrap();
        assert_eq!(source.encoding_name(), "ISO-8859-1");
        assert!(source.read_to_string().unwrap().ends_with("<a>é</a>"));
    }

    #[test]
    fn reader_with_bom() {
        let bytes = vec![0xFF, 0xFE, b'<', 0, b'a', 0, b'/', 0, b'>', 0];
        let mut source = InputSource::from_reader(std::io::Cursor::new(bytes), None).unwrap();
        assert_eq!(source.read_to_string().unwrap(), "<a/>");
    }

    #[test]
    fn small_buffer() {
        let text = format!("<a>{}</a>", "xyz\u{3042}".repeat(200));
        let reader = std::io::Cursor::new(text.clone().into_bytes());
        let mut source = InputSource::with_buffer_size(reader, None, 1).unwrap();
        assert_eq!(source.read_to_string().unwrap(), text);
    }

    #[test]
    fn malformed_utf8() {
        let bytes = b"<a>\xC3\x28</a>".to_vec();
        let mut source = InputSource::from_reader(std::io::Cursor::new(bytes), None).unwrap();
        assert!(source.read_to_string().is_err());
    }
}

use crate::{
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [3] S ::= (#x20 | #x9 | #xD | #xA)+
    /// ```
    ///
    /// Returns the number of skipped whitespaces. In XML 1.1, `#x85` and `#x2028` are line
    /// breaks and also skipped.
    pub(crate) fn skip_whitespaces(&mut self) -> Result<usize, XMLError> {
        let xml11 = self.version.is_xml11();
        let mut skipped = 0;
        while self
            .source
            .next_char_if(|c| {
                matches!(c, '\x20' | '\t' | '\n' | '\r')
                    || (xml11 && matches!(c, '\u{85}' | '\u{2028}'))
            })?
            .is_some()
        {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// ```text
    /// [5] Name ::= NameStartChar (NameChar)*
    /// ```
    pub(crate) fn parse_name(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let Some(c) = self
            .source
            .next_char_if(|c| self.version.is_name_start_char(c))?
        else {
            return Err(match self.source.peek_char()? {
                Some(c) => fatal_error!(
                    self,
                    ParserInvalidNameStartChar,
                    "The character '{}' cannot start a name.",
                    c.escape_debug()
                ),
                None => fatal_error!(self, ParserEmptyName, "Name is empty."),
            });
        };
        buffer.push(c);
        while let Some(c) = self.source.next_char_if(|c| self.version.is_name_char(c))? {
            buffer.push(c);
        }
        Ok(())
    }

    /// ```text
    /// [7] Nmtoken ::= (NameChar)+
    /// ```
    pub(crate) fn parse_nmtoken(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let orig = buffer.len();
        while let Some(c) = self.source.next_char_if(|c| self.version.is_name_char(c))? {
            buffer.push(c);
        }
        if buffer.len() == orig {
            return Err(fatal_error!(self, ParserEmptyNmtoken, "Nmtoken is empty."));
        }
        Ok(())
    }

    /// Even if NCName is empty, no error will be reported.
    fn parse_ncname_allow_empty(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let Some(c) = self
            .source
            .next_char_if(|c| c != ':' && self.version.is_name_start_char(c))?
        else {
            return Ok(());
        };
        buffer.push(c);
        while let Some(c) = self
            .source
            .next_char_if(|c| c != ':' && self.version.is_name_char(c))?
        {
            buffer.push(c);
        }
        Ok(())
    }

    /// ```text
    /// [7] QName          ::= PrefixedName | UnprefixedName
    /// [8] PrefixedName   ::= Prefix ':' LocalPart
    /// [9] UnprefixedName ::= LocalPart
    /// ```
    ///
    /// Returns the length of the prefix, or 0 for unprefixed names.
    pub(crate) fn parse_qname(&mut self, buffer: &mut String) -> Result<usize, XMLError> {
        let orig = buffer.len();
        self.parse_ncname_allow_empty(buffer)?;
        if buffer.len() == orig {
            return Err(fatal_error!(self, ParserEmptyQName, "QName is empty."));
        }
        if self.source.next_char_if(|c| c == ':')?.is_none() {
            return Ok(0);
        }
        let prefix = buffer.len() - orig;
        buffer.push(':');
        self.parse_ncname_allow_empty(buffer)?;
        if buffer.len() == orig + prefix + 1 {
            return Err(fatal_error!(
                self,
                ParserInvalidQName,
                "':' is found in the QName '{}', but its local part is empty.",
                &buffer[orig..]
            ));
        }
        if self.source.peek_char()? == Some(':') {
            return Err(fatal_error!(
                self,
                ParserInvalidQName,
                "The QName '{}:' contains more than one ':'.",
                &buffer[orig..]
            ));
        }
        Ok(prefix)
    }

    /// ```text
    /// [25] Eq ::= S? '=' S?
    /// ```
    pub(crate) fn parse_eq(&mut self) -> Result<(), XMLError> {
        self.skip_whitespaces()?;
        if self.source.next_char_if(|c| c == '=')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidStartOrEmptyTag,
                "'=' is expected."
            ));
        }
        self.skip_whitespaces()?;
        Ok(())
    }

    /// Consume `literal` if the top frame starts with it.
    pub(crate) fn skip_literal(&mut self, literal: &[u8]) -> Result<bool, XMLError> {
        self.grow()?;
        if self.source.content_bytes().starts_with(literal) {
            self.source.advance(literal.len())?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

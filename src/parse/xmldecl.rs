use log::trace;

use crate::{
    ENCODING_NAME_LIMIT_LENGTH, XML_VERSION_NUM_LIMIT_LENGTH, XMLVersion,
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    /// ```
    pub(crate) fn parse_xmldecl(&mut self) -> Result<(), XMLError> {
        // skip '<?xml'
        self.source.advance(5)?;
        self.skip_whitespaces()?;
        self.grow()?;
        if !self.source.content_bytes().starts_with(b"version") {
            return Err(fatal_error!(
                self,
                ParserInvalidXMLDecl,
                "VersionInfo is required in the XML declaration."
            ));
        }
        let (raw, version) = self.parse_version_info()?;

        let mut s = self.skip_whitespaces()?;
        self.grow()?;
        let mut encoding = None;
        if self.source.content_bytes().starts_with(b"encoding") {
            if s == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidXMLDecl,
                    "Whitespaces are required before EncodingDecl."
                ));
            }
            encoding = Some(self.parse_encoding_decl()?);
            s = self.skip_whitespaces()?;
            self.grow()?;
        }

        let mut standalone = None;
        if self.source.content_bytes().starts_with(b"standalone") {
            if s == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidXMLDecl,
                    "Whitespaces are required before SDDecl."
                ));
            }
            standalone = Some(self.parse_sddecl()?);
            self.skip_whitespaces()?;
        }

        if !self.skip_literal(b"?>")? {
            return Err(fatal_error!(
                self,
                ParserInvalidXMLDecl,
                "The XML declaration is not closed by '?>'."
            ));
        }

        self.version = version;
        self.standalone = standalone;
        if let Some(frame) = self.source.top_mut() {
            frame.source.set_version(version);
        }
        self.handler
            .declaration(&raw, encoding.as_deref(), standalone);
        Ok(())
    }

    /// ```text
    /// [24] VersionInfo ::= S 'version' Eq ("'" VersionNum "'" | '"' VersionNum '"')
    /// [26] VersionNum  ::= '1.' [0-9]+
    /// ```
    ///
    /// Versions other than 1.0 and 1.1 are processed as 1.0.
    fn parse_version_info(&mut self) -> Result<(String, XMLVersion), XMLError> {
        // skip 'version'
        self.source.advance(7)?;
        self.parse_eq()?;
        let quote = match self.source.next_char()? {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                return Err(fatal_error!(
                    self,
                    ParserIncorrectLiteralQuotation,
                    "VersionNum must be quoted."
                ));
            }
        };
        let mut num = String::new();
        while let Some(c) = self.source.next_char_if(|c| c != quote)? {
            if num.len() >= XML_VERSION_NUM_LIMIT_LENGTH {
                return Err(fatal_error!(
                    self,
                    ParserTooLongXMLVersionNumber,
                    "VersionNum is too long."
                ));
            }
            num.push(c);
        }
        if self.source.next_char()?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidXMLVersion,
                "VersionNum is not closed."
            ));
        }
        let valid = num
            .strip_prefix("1.")
            .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(fatal_error!(
                self,
                ParserInvalidXMLVersion,
                "'{}' is not a valid VersionNum.",
                num
            ));
        }
        let version = match num.as_str() {
            "1.0" => XMLVersion::XML10,
            "1.1" => XMLVersion::XML11,
            _ => XMLVersion::Unknown,
        };
        Ok((num, version))
    }

    /// ```text
    /// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' | "'" EncName "'" )
    /// [81] EncName      ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
    /// ```
    fn parse_encoding_decl(&mut self) -> Result<String, XMLError> {
        // skip 'encoding'
        self.source.advance(8)?;
        self.parse_eq()?;
        let quote = match self.source.next_char()? {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                return Err(fatal_error!(
                    self,
                    ParserIncorrectLiteralQuotation,
                    "EncName must be quoted."
                ));
            }
        };
        let mut name = String::new();
        if let Some(c) = self.source.next_char_if(|c| c.is_ascii_alphabetic())? {
            name.push(c);
            while let Some(c) = self
                .source
                .next_char_if(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))?
            {
                if name.len() >= ENCODING_NAME_LIMIT_LENGTH {
                    return Err(fatal_error!(
                        self,
                        ParserTooLongEncodingName,
                        "EncName is too long."
                    ));
                }
                name.push(c);
            }
        }
        if name.is_empty() || self.source.next_char_if(|c| c == quote)?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidEncodingName,
                "EncName must match [A-Za-z] ([A-Za-z0-9._] | '-')* and be quoted."
            ));
        }
        Ok(name)
    }

    /// ```text
    /// [32] SDDecl ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no') '"'))
    /// ```
    fn parse_sddecl(&mut self) -> Result<bool, XMLError> {
        // skip 'standalone'
        self.source.advance(10)?;
        self.parse_eq()?;
        let standalone = if self.skip_literal(b"\"yes\"")? || self.skip_literal(b"'yes'")? {
            true
        } else if self.skip_literal(b"\"no\"")? || self.skip_literal(b"'no'")? {
            false
        } else {
            return Err(fatal_error!(
                self,
                ParserInvalidSDDecl,
                "The value of SDDecl must be 'yes' or 'no'."
            ));
        };
        Ok(standalone)
    }

    /// ```text
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    pub(crate) fn parse_text_decl(&mut self) -> Result<(), XMLError> {
        // skip '<?xml'
        self.source.advance(5)?;
        let mut s = self.skip_whitespaces()?;
        self.grow()?;
        if self.source.content_bytes().starts_with(b"version") {
            let (raw, version) = self.parse_version_info()?;
            if version.is_xml11() && !self.version.is_xml11() {
                return Err(fatal_error!(
                    self,
                    ParserUnsupportedXMLVersion,
                    "An XML {} document cannot refer to an XML 1.1 external entity.",
                    self.version
                ));
            }
            trace!("text declaration version: {raw}");
            s = self.skip_whitespaces()?;
            self.grow()?;
        }
        if !self.source.content_bytes().starts_with(b"encoding") {
            return Err(fatal_error!(
                self,
                ParserInvalidTextDecl,
                "EncodingDecl is required in text declarations."
            ));
        }
        if s == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidTextDecl,
                "Whitespaces are required before EncodingDecl."
            ));
        }
        self.parse_encoding_decl()?;
        self.skip_whitespaces()?;
        self.grow()?;
        if self.source.content_bytes().starts_with(b"standalone") {
            return Err(fatal_error!(
                self,
                ParserInvalidTextDecl,
                "SDDecl is not allowed in text declarations."
            ));
        }
        if !self.skip_literal(b"?>")? {
            return Err(fatal_error!(
                self,
                ParserInvalidTextDecl,
                "The text declaration is not closed by '?>'."
            ));
        }
        Ok(())
    }

    /// Parse a text declaration at the start of the top frame, if any.
    pub(crate) fn parse_text_decl_if_present(&mut self) -> Result<(), XMLError> {
        self.grow()?;
        if self.is_xml_decl_start() {
            self.parse_text_decl()?;
        }
        Ok(())
    }
}

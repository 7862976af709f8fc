use std::sync::Arc;

use crate::{
    dtd::Entity,
    error::XMLError,
    sax::{
        error::{error, fatal_error},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    fn parse_quote(&mut self) -> Result<char, XMLError> {
        match self.source.next_char()? {
            Some(c @ ('"' | '\'')) => Ok(c),
            Some(_) => Err(fatal_error!(
                self,
                ParserIncorrectLiteralQuotation,
                "Literals must be quoted by '\"' or '''."
            )),
            None => Err(fatal_error!(
                self,
                ParserUnexpectedEOF,
                "A literal is expected, but the input is exhausted."
            )),
        }
    }

    /// ```text
    /// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
    /// ```
    pub(crate) fn parse_system_literal(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote()?;
        loop {
            match self.source.next_char()? {
                Some(c) if c == quote => break,
                Some(c) => buffer.push(c),
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidSystemLiteral,
                        "SystemLiteral is not closed."
                    ));
                }
            }
        }
        if buffer.contains('#') {
            error!(
                self,
                ParserSystemLiteralWithFragment,
                "The system identifier '{}' contains a fragment identifier.",
                buffer
            )?;
        }
        Ok(())
    }

    /// ```text
    /// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
    /// ```
    pub(crate) fn parse_pubid_literal(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote()?;
        loop {
            match self.source.next_char()? {
                Some(c) if c == quote => break Ok(()),
                Some(c) if self.version.is_pubid_char(c) => buffer.push(c),
                Some(c) => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidPubidLiteral,
                        "The character '{}' is not allowed in PubidLiteral.",
                        c.escape_debug()
                    ));
                }
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidPubidLiteral,
                        "PubidLiteral is not closed."
                    ));
                }
            }
        }
    }

    /// ```text
    /// [75] ExternalID ::= 'SYSTEM' S SystemLiteral
    ///                     | 'PUBLIC' S PubidLiteral S SystemLiteral
    /// [83] PublicID   ::= 'PUBLIC' S PubidLiteral
    /// ```
    ///
    /// If `public_only` is `true`, the system literal after a public identifier is optional.
    /// Parameter entity references between tokens are expanded if `pe` is `true`.
    pub(crate) fn parse_external_id(
        &mut self,
        public_only: bool,
        pe: bool,
    ) -> Result<(Option<String>, Option<String>), XMLError> {
        let mut public_id = None;
        if self.skip_literal(b"PUBLIC")? {
            if self.skip_decl_whitespaces(pe)? == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidExternalID,
                    "Whitespaces are required after 'PUBLIC'."
                ));
            }
            let mut literal = String::new();
            self.parse_pubid_literal(&mut literal)?;
            public_id = Some(literal);
            let s = self.skip_decl_whitespaces(pe)?;
            self.grow()?;
            let quoted = matches!(self.source.content_bytes().first(), Some(b'"' | b'\''));
            if !quoted {
                if public_only {
                    return Ok((public_id, None));
                }
                return Err(fatal_error!(
                    self,
                    ParserInvalidExternalID,
                    "SystemLiteral is required after PubidLiteral."
                ));
            }
            if s == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidExternalID,
                    "Whitespaces are required between PubidLiteral and SystemLiteral."
                ));
            }
        } else if self.skip_literal(b"SYSTEM")? {
            if self.skip_decl_whitespaces(pe)? == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidExternalID,
                    "Whitespaces are required after 'SYSTEM'."
                ));
            }
        } else {
            return Err(fatal_error!(
                self,
                ParserInvalidExternalID,
                "'SYSTEM' or 'PUBLIC' is expected."
            ));
        }
        let mut system_id = String::new();
        self.parse_system_literal(&mut system_id)?;
        Ok((public_id, Some(system_id)))
    }

    /// ```text
    /// [66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'
    /// ```
    ///
    /// `'&#'` has already been consumed.
    pub(crate) fn parse_char_ref(&mut self) -> Result<char, XMLError> {
        let radix = if self.source.next_char_if(|c| c == 'x')?.is_some() {
            16
        } else {
            10
        };
        let mut code = 0u32;
        let mut digits = 0;
        while let Some(c) = self.source.next_char_if(|c| c.is_digit(radix))? {
            code = code
                .saturating_mul(radix)
                .saturating_add(c.to_digit(radix).unwrap_or_default());
            digits += 1;
        }
        if digits == 0 || self.source.next_char_if(|c| c == ';')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "A character reference must be '&#' [0-9]+ ';' or '&#x' [0-9a-fA-F]+ ';'."
            ));
        }
        match char::from_u32(code).filter(|&c| self.version.is_char(c)) {
            Some(c) => Ok(c),
            None => Err(fatal_error!(
                self,
                ParserInvalidCharacterReference,
                "The character reference '&#x{:X};' does not refer to a legal character.",
                code
            )),
        }
    }

    /// ```text
    /// [68] EntityRef ::= '&' Name ';'
    /// ```
    ///
    /// `'&'` has already been consumed.
    pub(crate) fn parse_entity_ref_name(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        self.parse_name(buffer)?;
        if self.source.next_char_if(|c| c == ';')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityReference,
                "The entity reference '&{}' is not terminated by ';'.",
                buffer
            ));
        }
        Ok(())
    }

    /// ```text
    /// [9] EntityValue ::= '"' ([^%&"] | PEReference | Reference)* '"'
    ///                     | "'" ([^%&'] | PEReference | Reference)* "'"
    /// ```
    ///
    /// Parameter entity and character references are replaced. General entity references
    /// are kept as written.
    pub(crate) fn parse_entity_value(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote()?;
        let base = self.source.depth();
        loop {
            if self.source.depth() > base && self.source.is_frame_end()? {
                self.source.pop();
                continue;
            }
            match self.source.next_char()? {
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidEntityDecl,
                        "EntityValue is not closed."
                    ));
                }
                Some(c) if c == quote && self.source.depth() == base => break Ok(()),
                Some('%') => {
                    if !self.source.in_external_markup() {
                        return Err(fatal_error!(
                            self,
                            ParserInvalidPEReferenceInInternalSubset,
                            "Parameter entity references are not allowed in entity values in the internal subset."
                        ));
                    }
                    let entity = self.parse_pe_reference()?;
                    self.push_parameter_entity(entity, false)?;
                }
                Some('&') => {
                    if self.source.next_char_if(|c| c == '#')?.is_some() {
                        let c = self.parse_char_ref()?;
                        buffer.push(c);
                    } else {
                        buffer.push('&');
                        self.parse_entity_ref_name(buffer)?;
                        buffer.push(';');
                    }
                }
                Some(c) => buffer.push(c),
            }
        }
    }

    /// ```text
    /// [10] AttValue ::= '"' ([^<&"] | Reference)* '"'
    ///                   |  "'" ([^<&'] | Reference)* "'"
    /// ```
    ///
    /// The value is normalized as a CDATA attribute. References to internal entities are
    /// expanded in place.
    pub(crate) fn parse_att_value(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let quote = self.parse_quote()?;
        let base = self.source.depth();
        loop {
            if self.source.depth() > base && self.source.is_frame_end()? {
                self.source.pop();
                continue;
            }
            match self.source.next_char()? {
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidAttValue,
                        "AttValue is not closed."
                    ));
                }
                Some(c) if c == quote && self.source.depth() == base => break Ok(()),
                Some('<') => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidAttValue,
                        "'<' is not allowed in attribute values."
                    ));
                }
                Some('&') => self.parse_reference_in_att_value(buffer)?,
                Some('\t' | '\n' | '\r') => buffer.push(' '),
                Some(c) => buffer.push(c),
            }
        }
    }

    /// Parse a reference whose `'&'` has already been consumed and find its target.
    ///
    /// Character references become [`Entity::Character`]. Names that are neither predefined
    /// nor declared become [`Entity::Invalid`], and the caller decides how to treat them.
    pub(crate) fn parse_reference_target(&mut self) -> Result<Arc<Entity>, XMLError> {
        if self.source.next_char_if(|c| c == '#')?.is_some() {
            let c = self.parse_char_ref()?;
            return Ok(Arc::new(Entity::Character(c)));
        }
        let mut name = String::new();
        self.parse_entity_ref_name(&mut name)?;
        if let Some(entity) = Entity::predefined(&name) {
            return Ok(entity);
        }
        Ok(self
            .dtd
            .as_ref()
            .and_then(|dtd| dtd.general_entity(&name))
            .cloned()
            .unwrap_or_else(|| Arc::new(Entity::Invalid { name: name.into() })))
    }

    fn parse_reference_in_att_value(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        let entity = self.parse_reference_target()?;
        match entity.as_ref() {
            Entity::Character(c) => {
                buffer.push(*c);
                return Ok(());
            }
            Entity::Predefined { value, .. } => {
                buffer.push_str(value);
                return Ok(());
            }
            Entity::Invalid { name } => {
                return Err(fatal_error!(
                    self,
                    ParserEntityNotFound,
                    "The entity '{}' is not declared.",
                    name
                ));
            }
            _ => {}
        }
        self.check_standalone(&entity)?;
        if entity.is_unparsed() {
            return Err(fatal_error!(
                self,
                ParserUnparsedEntityReference,
                "The unparsed entity '{}' cannot be referred to.",
                entity.name()
            ));
        }
        if entity.is_external() {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityReference,
                "The external entity '{}' cannot be referred to in attribute values.",
                entity.name()
            ));
        }
        self.check_recursion(&entity)?;
        self.count_expansion(false)?;
        self.push_internal_entity(entity)
    }

    /// ```text
    /// [69] PEReference ::= '%' Name ';'
    /// ```
    ///
    /// `'%'` has already been consumed.
    ///
    /// # Errors
    /// Undeclared parameter entities are always fatal.
    pub(crate) fn parse_pe_reference(&mut self) -> Result<Arc<Entity>, XMLError> {
        let mut name = String::new();
        self.parse_name(&mut name)?;
        if self.source.next_char_if(|c| c == ';')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityReference,
                "The parameter entity reference '%{}' is not terminated by ';'.",
                name
            ));
        }
        self.dtd_mut()?.set_has_pe_reference()?;
        match self
            .dtd
            .as_ref()
            .and_then(|dtd| dtd.parameter_entity(&name))
            .cloned()
        {
            Some(entity) => Ok(entity),
            None => Err(fatal_error!(
                self,
                ParserUndefinedParameterEntity,
                "The parameter entity '%{};' is not declared.",
                name
            )),
        }
    }
}

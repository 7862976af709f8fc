use crate::{
    dtd::{AttlistResult, AttributeDecl, MarkupDecl},
    error::XMLError,
    parse::element::normalize_tokenized,
    sax::{
        AttributeType, DefaultDecl,
        error::{error, fatal_error, warning},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
    /// [53] AttDef      ::= S Name S AttType S DefaultDecl
    /// ```
    pub(crate) fn parse_attlist_decl(&mut self) -> Result<(), XMLError> {
        // skip '<!ATTLIST'
        self.source.advance(9)?;
        let external_markup = self.source.in_external_markup();
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidAttlistDecl,
                "Whitespaces are required after '<!ATTLIST'."
            ));
        }
        let mut element = String::new();
        self.parse_declared_name(&mut element)?;

        loop {
            let s = self.skip_whitespaces_with_pe()?;
            if self.source.next_char_if(|c| c == '>')?.is_some() {
                break Ok(());
            }
            if s == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required before attribute definitions of '{}'.",
                    element
                ));
            }

            let mut name = String::new();
            self.parse_declared_name(&mut name)?;
            if self.skip_whitespaces_with_pe()? == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after the attribute name '{}'.",
                    name
                ));
            }
            let atype = self.parse_att_type()?;
            if self.skip_whitespaces_with_pe()? == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after the type of the attribute '{}'.",
                    name
                ));
            }
            let default = self.parse_default_decl(&atype)?;

            if atype == AttributeType::ID && default.value().is_some() {
                error!(
                    self,
                    ParserInvalidIDAttributeDefault,
                    "The ID attribute '{}' of '{}' must be #IMPLIED or #REQUIRED.",
                    name,
                    element
                )?;
            }

            let decl = AttributeDecl {
                name: name.as_str().into(),
                atype: atype.clone(),
                default: default.clone(),
                external_markup,
            };
            match self.dtd_mut()?.add_attribute_decl(&element, decl)? {
                AttlistResult::Added => self.report_decl(MarkupDecl::Attribute {
                    element: element.as_str().into(),
                    name: name.into(),
                    atype,
                    default,
                })?,
                AttlistResult::Duplicate => warning!(
                    self,
                    ParserDuplicateAttlistDecl,
                    "The attribute '{}' of '{}' is declared more than once. The first declaration is binding.",
                    name,
                    element
                )?,
                AttlistResult::MultipleId => error!(
                    self,
                    ParserMultipleIDAttributePerElement,
                    "The element '{}' already has an ID attribute, so '{}' is ignored.",
                    element,
                    name
                )?,
            }
        }
    }

    /// ```text
    /// [54] AttType        ::= StringType | TokenizedType | EnumeratedType
    /// [55] StringType     ::= 'CDATA'
    /// [56] TokenizedType  ::= 'ID' | 'IDREF' | 'IDREFS' | 'ENTITY' | 'ENTITIES'
    ///                         | 'NMTOKEN' | 'NMTOKENS'
    /// [57] EnumeratedType ::= NotationType | Enumeration
    /// [58] NotationType   ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
    /// [59] Enumeration    ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
    /// ```
    fn parse_att_type(&mut self) -> Result<AttributeType, XMLError> {
        // Longer keywords must be tried before their prefixes.
        const KEYWORDS: [(&[u8], AttributeType); 8] = [
            (b"CDATA", AttributeType::CDATA),
            (b"IDREFS", AttributeType::IDREFS),
            (b"IDREF", AttributeType::IDREF),
            (b"ID", AttributeType::ID),
            (b"ENTITIES", AttributeType::ENTITIES),
            (b"ENTITY", AttributeType::ENTITY),
            (b"NMTOKENS", AttributeType::NMTOKENS),
            (b"NMTOKEN", AttributeType::NMTOKEN),
        ];
        if self.skip_literal(b"NOTATION")? {
            if self.skip_whitespaces_with_pe()? == 0 {
                return Err(fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "Whitespaces are required after 'NOTATION'."
                ));
            }
            if self.source.next_char_if(|c| c == '(')?.is_none() {
                return Err(fatal_error!(
                    self,
                    ParserInvalidAttlistDecl,
                    "'(' is expected after 'NOTATION'."
                ));
            }
            return Ok(AttributeType::NOTATION(self.parse_enumerated_values(true)?));
        }
        if self.source.next_char_if(|c| c == '(')?.is_some() {
            return Ok(AttributeType::Enumeration(
                self.parse_enumerated_values(false)?,
            ));
        }
        for (keyword, atype) in KEYWORDS {
            if self.skip_literal(keyword)? {
                return Ok(atype);
            }
        }
        Err(fatal_error!(
            self,
            ParserInvalidAttlistDecl,
            "An attribute type is expected."
        ))
    }

    /// Parse `S? token (S? '|' S? token)* S? ')'`, where tokens are Names for notations and
    /// Nmtokens otherwise.
    fn parse_enumerated_values(&mut self, names: bool) -> Result<Vec<Box<str>>, XMLError> {
        let mut values = vec![];
        loop {
            self.skip_whitespaces_with_pe()?;
            let mut value = String::new();
            if names {
                self.parse_name(&mut value)?;
            } else {
                self.parse_nmtoken(&mut value)?;
            }
            values.push(value.into());
            self.skip_whitespaces_with_pe()?;
            match self.source.next_char()? {
                Some('|') => {}
                Some(')') => break Ok(values),
                _ => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidAttlistDecl,
                        "'|' or ')' is expected in the enumerated type."
                    ));
                }
            }
        }
    }

    /// ```text
    /// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
    /// ```
    fn parse_default_decl(&mut self, atype: &AttributeType) -> Result<DefaultDecl, XMLError> {
        if self.skip_literal(b"#REQUIRED")? {
            return Ok(DefaultDecl::REQUIRED);
        }
        if self.skip_literal(b"#IMPLIED")? {
            return Ok(DefaultDecl::IMPLIED);
        }
        let fixed = self.skip_literal(b"#FIXED")?;
        if fixed && self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidAttributeDefault,
                "Whitespaces are required after '#FIXED'."
            ));
        }
        self.grow()?;
        if !matches!(self.source.content_bytes().first(), Some(b'"' | b'\'')) {
            return Err(fatal_error!(
                self,
                ParserInvalidAttributeDefault,
                "'#REQUIRED', '#IMPLIED' or a default value is expected."
            ));
        }
        let mut value = String::new();
        self.parse_att_value(&mut value)?;
        if atype.is_tokenized() {
            value = normalize_tokenized(&value);
        }
        Ok(if fixed {
            DefaultDecl::FIXED(value.into())
        } else {
            DefaultDecl::None(value.into())
        })
    }
}

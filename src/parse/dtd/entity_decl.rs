use crate::{
    dtd::{Entity, MarkupDecl},
    error::XMLError,
    sax::{
        error::{fatal_error, warning},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [70] EntityDecl ::= GEDecl | PEDecl
    /// [71] GEDecl     ::= '<!ENTITY' S Name S EntityDef S? '>'
    /// [72] PEDecl     ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
    /// [73] EntityDef  ::= EntityValue | (ExternalID NDataDecl?)
    /// [74] PEDef      ::= EntityValue | ExternalID
    /// [76] NDataDecl  ::= S 'NDATA' S Name
    /// ```
    pub(crate) fn parse_entity_decl(&mut self) -> Result<(), XMLError> {
        // skip '<!ENTITY'
        self.source.advance(8)?;
        let external_markup = self.source.in_external_markup();
        let base_uri = self.source.base_uri();
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required after '<!ENTITY'."
            ));
        }

        let parameter = self.source.next_char_if(|c| c == '%')?.is_some();
        if parameter && self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required after '%' in parameter entity declarations."
            ));
        }
        let mut name = String::new();
        self.parse_name(&mut name)?;
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required after the entity name '{}'.",
                name
            ));
        }

        self.grow()?;
        let (entity, decl) = if matches!(self.source.content_bytes().first(), Some(b'"' | b'\''))
        {
            let mut value = String::new();
            self.parse_entity_value(&mut value)?;
            let decl = MarkupDecl::InternalEntity {
                name: reported_name(&name, parameter).into(),
                value: value.as_str().into(),
            };
            let entity = Entity::Internal {
                name: name.as_str().into(),
                parameter,
                value: value.into(),
                base_uri,
                external_markup,
            };
            (entity, decl)
        } else {
            let (public_id, system_id) = self.parse_external_id(false, true)?;
            let system_id = system_id.unwrap_or_default();
            let notation = self.parse_ndata_decl(parameter)?;
            let decl = match notation.as_deref() {
                Some(notation) => MarkupDecl::UnparsedEntity {
                    name: name.as_str().into(),
                    public_id: public_id.as_deref().map(Into::into),
                    system_id: system_id.as_str().into(),
                    notation: notation.into(),
                },
                None => MarkupDecl::ExternalEntity {
                    name: reported_name(&name, parameter).into(),
                    public_id: public_id.as_deref().map(Into::into),
                    system_id: system_id.as_str().into(),
                },
            };
            let entity = Entity::External {
                name: name.as_str().into(),
                parameter,
                public_id: public_id.map(Into::into),
                system_id: system_id.into(),
                base_uri,
                notation: notation.map(Into::into),
                external_markup,
            };
            (entity, decl)
        };

        self.skip_whitespaces_with_pe()?;
        if self.source.next_char_if(|c| c == '>')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "The declaration of the entity '{}' does not end with '>'.",
                name
            ));
        }

        if self.dtd_mut()?.add_entity(entity)? {
            self.report_decl(decl)
        } else {
            warning!(
                self,
                ParserDuplicateEntityDecl,
                "The entity '{}' is declared more than once. The first declaration is binding.",
                reported_name(&name, parameter)
            )
        }
    }

    /// Parse `NDataDecl?` after an ExternalID.
    fn parse_ndata_decl(&mut self, parameter: bool) -> Result<Option<String>, XMLError> {
        let s = self.skip_whitespaces_with_pe()?;
        if !self.skip_literal(b"NDATA")? {
            return Ok(None);
        }
        if s == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required before 'NDATA'."
            ));
        }
        if parameter {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Parameter entities cannot be unparsed."
            ));
        }
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidEntityDecl,
                "Whitespaces are required after 'NDATA'."
            ));
        }
        let mut notation = String::new();
        self.parse_name(&mut notation)?;
        Ok(Some(notation))
    }
}

/// Parameter entities are reported with a leading `'%'`.
fn reported_name(name: &str, parameter: bool) -> String {
    if parameter {
        format!("%{name}")
    } else {
        name.to_owned()
    }
}

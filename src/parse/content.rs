use crate::{
    dtd::Entity,
    error::XMLError,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
        stack::{Frame, FrameKind},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [43] content ::= CharData? ((element | Reference | CDSect | PI | Comment) CharData?)*
    /// ```
    ///
    /// Parses until the element stack becomes empty. Entity replacement texts are read as
    /// frames on the source stack instead of by recursion.
    pub(crate) fn parse_content(&mut self) -> Result<(), XMLError> {
        while !self.elements.is_empty() {
            self.grow()?;
            if self.source.is_frame_end()? {
                self.leave_general_entity()?;
                continue;
            }

            let bytes = self.source.content_bytes();
            if bytes.starts_with(b"</") {
                if self.source.top().is_some_and(|frame| {
                    frame.kind == FrameKind::GeneralEntity
                        && frame.element_depth == self.elements.len()
                }) {
                    return Err(fatal_error!(
                        self,
                        ParserEntityIncorrectNesting,
                        "The end tag in the entity closes an element started outside of it."
                    ));
                }
                self.parse_end_tag()?;
            } else if bytes.starts_with(b"<!--") {
                self.parse_comment()?;
            } else if bytes.starts_with(b"<![CDATA[") {
                self.parse_cdsect()?;
            } else if bytes.starts_with(b"<?") {
                if self.is_xml_decl_start() {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidXMLDecl,
                        "The XML declaration is allowed only at the start of the entity."
                    ));
                }
                self.parse_pi()?;
            } else if bytes.starts_with(b"<") {
                self.parse_start_tag()?;
            } else if bytes.starts_with(b"&#") {
                self.parse_char_data()?;
            } else if bytes.starts_with(b"&") {
                self.parse_reference()?;
            } else {
                self.parse_char_data()?;
            }
        }
        Ok(())
    }

    /// Pop an exhausted general entity frame.
    ///
    /// WFC: Parsed Entity
    /// Every element started in an entity must end in the same entity.
    fn leave_general_entity(&mut self) -> Result<(), XMLError> {
        let (kind, depth) = match self.source.top() {
            Some(frame) => (frame.kind, frame.element_depth),
            None => (FrameKind::Document, 0),
        };
        if kind != FrameKind::GeneralEntity {
            let name = self
                .elements
                .last()
                .map(|context| context.qname.clone())
                .unwrap_or_default();
            return Err(fatal_error!(
                self,
                ParserUnexpectedEOF,
                "The element '{}' is not closed.",
                name
            ));
        }
        if depth != self.elements.len() {
            return Err(fatal_error!(
                self,
                ParserEntityIncorrectNesting,
                "An element started in the entity is not closed in it."
            ));
        }
        if let Some(name) = self.source.pop().and_then(|frame| frame.entity_name()) {
            self.handler.end_entity(&name);
        }
        Ok(())
    }

    /// Must references to undeclared entities be fatal?
    ///
    /// WFC: Entity Declared
    /// If the DTD cannot be fully known, undeclared entities are only skipped.
    fn must_declare_entities(&self) -> bool {
        match self.dtd.as_ref() {
            None => true,
            Some(dtd) => {
                self.standalone == Some(true)
                    || (!dtd.has_external_subset() && !dtd.has_pe_reference())
            }
        }
    }

    /// ```text
    /// [67] Reference ::= EntityRef | CharRef
    /// [68] EntityRef ::= '&' Name ';'
    /// ```
    pub(crate) fn parse_reference(&mut self) -> Result<(), XMLError> {
        // skip '&'
        self.source.advance(1)?;
        let entity = self.parse_reference_target()?;
        let name = entity.name().to_owned();
        match entity.as_ref() {
            Entity::Character(c) => {
                self.handler.characters(c.encode_utf8(&mut [0; 4]));
                return Ok(());
            }
            Entity::Predefined { value, .. } => {
                self.handler.characters(value);
                return Ok(());
            }
            Entity::Invalid { .. } => {
                if self.must_declare_entities() {
                    return Err(fatal_error!(
                        self,
                        ParserEntityNotFound,
                        "The entity '{}' is not declared.",
                        name
                    ));
                }
                self.handler.skipped_entity(&name);
                return Ok(());
            }
            _ => {}
        }

        self.check_standalone(&entity)?;
        match entity.as_ref() {
            Entity::External {
                notation: Some(_), ..
            } => Err(fatal_error!(
                self,
                ParserUnparsedEntityReference,
                "The unparsed entity '{}' cannot be referred to.",
                name
            )),
            Entity::External {
                public_id,
                system_id,
                base_uri,
                ..
            } => {
                if !self.config.is_enable(ParserOption::ExternalGeneralEntities) {
                    self.handler.skipped_entity(&name);
                    return Ok(());
                }
                self.check_recursion(&entity)?;
                self.count_expansion(false)?;
                let resource = self.load_external(
                    &name,
                    public_id.as_deref(),
                    system_id,
                    base_uri.as_ref(),
                )?;
                let frame = Frame::new(
                    resource.source,
                    FrameKind::GeneralEntity,
                    Some(entity.clone()),
                    resource.base_uri,
                    true,
                )
                .with_element_depth(self.elements.len());
                self.source.push(frame)?;
                self.handler.start_entity(&name);
                self.parse_text_decl_if_present()
            }
            Entity::Internal { .. } => {
                self.check_recursion(&entity)?;
                self.count_expansion(false)?;
                self.push_internal_entity(entity.clone())?;
                self.handler.start_entity(&name);
                Ok(())
            }
            _ => {
                self.handler.skipped_entity(&name);
                Ok(())
            }
        }
    }
}

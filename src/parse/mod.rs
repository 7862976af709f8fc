mod cdsect;
mod char_data;
mod comment;
mod content;
mod dtd;
mod element;
mod external;
mod literals;
mod pi;
mod tokens;
mod xmldecl;

use std::sync::Arc;

use crate::{
    dtd::{Dtd, Entity, MarkupDecl},
    error::XMLError,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::XMLReader,
        source::InputSource,
        stack::{Frame, FrameKind},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [1] document ::= prolog element Misc*
    /// ```
    pub(crate) fn parse_document(&mut self) -> Result<(), XMLError> {
        self.handler.set_document_locator(self.locator.clone());
        self.handler.start_document();
        self.parse_prolog()?;
        self.parse_element()?;
        self.parse_misc()?;
        if !self.source.is_frame_end()? {
            return Err(fatal_error!(
                self,
                ParserUnexpectedDocumentContent,
                "Only comments, processing instructions and whitespaces are allowed after the document element."
            ));
        }
        self.handler.end_document();
        Ok(())
    }

    /// ```text
    /// [22] prolog ::= XMLDecl? Misc* (doctypedecl Misc*)?
    /// ```
    pub(crate) fn parse_prolog(&mut self) -> Result<(), XMLError> {
        self.grow()?;
        if self.is_xml_decl_start() {
            self.parse_xmldecl()?;
        }
        self.parse_misc()?;
        if self.source.content_bytes().starts_with(b"<!DOCTYPE") {
            self.parse_doctypedecl()?;
            self.parse_misc()?;
            if self.source.content_bytes().starts_with(b"<!DOCTYPE") {
                return Err(fatal_error!(
                    self,
                    ParserMultipleDoctypeDecl,
                    "Only one document type declaration is allowed."
                ));
            }
        }
        Ok(())
    }

    /// ```text
    /// [27] Misc ::= Comment | PI | S
    /// ```
    pub(crate) fn parse_misc(&mut self) -> Result<(), XMLError> {
        loop {
            self.skip_whitespaces()?;
            self.grow()?;
            let bytes = self.source.content_bytes();
            if bytes.starts_with(b"<!--") {
                self.parse_comment()?;
            } else if bytes.starts_with(b"<?") {
                if self.is_xml_decl_start() {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidXMLDecl,
                        "The XML declaration is allowed only at the start of the document."
                    ));
                }
                self.parse_pi()?;
            } else {
                break Ok(());
            }
        }
    }

    /// Check if the top frame starts with `'<?xml' S`.
    pub(crate) fn is_xml_decl_start(&self) -> bool {
        let bytes = self.source.content_bytes();
        bytes.starts_with(b"<?xml") && matches!(bytes.get(5), Some(b' ' | b'\t' | b'\r' | b'\n'))
    }

    pub(crate) fn is_building_dtd(&self) -> bool {
        self.dtd.as_ref().is_some_and(|dtd| !dtd.is_closed())
    }

    pub(crate) fn dtd_mut(&mut self) -> Result<&mut Dtd, XMLError> {
        self.dtd
            .as_mut()
            .map(Arc::make_mut)
            .ok_or(XMLError::InternalError)
    }

    /// Report a declaration, and record it so that it can be reported again from the cache.
    pub(crate) fn report_decl(&mut self, decl: MarkupDecl) -> Result<(), XMLError> {
        decl.replay(&mut self.handler);
        self.dtd_mut()?.record(decl)
    }

    pub(crate) fn count_expansion(&mut self, parameter: bool) -> Result<(), XMLError> {
        if parameter {
            self.parameter_entity_expansions += 1;
            let limit = self.config.max_parameter_entity_expansions();
            if self.parameter_entity_expansions > limit {
                return Err(fatal_error!(
                    self,
                    ParserParameterEntityExpansionLimitExceeded,
                    "The number of parameter entity expansions exceeds the limit {}.",
                    limit
                ));
            }
        } else {
            self.entity_expansions += 1;
            let limit = self.config.max_entity_expansions();
            if self.entity_expansions > limit {
                return Err(fatal_error!(
                    self,
                    ParserEntityExpansionLimitExceeded,
                    "The number of entity expansions exceeds the limit {}.",
                    limit
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn check_recursion(&mut self, entity: &Arc<Entity>) -> Result<(), XMLError> {
        if self.source.is_open(entity) {
            return Err(fatal_error!(
                self,
                ParserEntityRecursion,
                "The entity '{}' refers to itself.",
                entity.name()
            ));
        }
        Ok(())
    }

    /// WFC: Standalone Document Declaration
    pub(crate) fn check_standalone(&mut self, entity: &Entity) -> Result<(), XMLError> {
        if self.standalone == Some(true) && entity.is_declared_in_external_markup() {
            return Err(fatal_error!(
                self,
                ParserInvalidStandaloneDocument,
                "The entity '{}' is declared in external markup, but the document is standalone.",
                entity.name()
            ));
        }
        Ok(())
    }

    /// Push the replacement text of an internal general entity.
    ///
    /// The frame is not tracked, so positions are reported at the reference.
    pub(crate) fn push_internal_entity(&mut self, entity: Arc<Entity>) -> Result<(), XMLError> {
        let Entity::Internal {
            value, base_uri, ..
        } = entity.as_ref()
        else {
            return Err(XMLError::InternalError);
        };
        let mut source = InputSource::from_replacement_text(value);
        source.set_version(self.version);
        let base_uri = base_uri.clone();
        let frame = Frame::new(source, FrameKind::GeneralEntity, Some(entity), base_uri, false)
            .with_element_depth(self.elements.len());
        self.source.push(frame)
    }
}

use std::sync::Arc;

use crate::{
    dtd::{Entity, MarkupDecl},
    error::XMLError,
    parse::external::ExternalResource,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::XMLReader,
        stack::{Frame, FrameKind},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [30] extSubset ::= TextDecl? extSubsetDecl
    /// ```
    pub(super) fn parse_external_subset(
        &mut self,
        resource: ExternalResource,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<(), XMLError> {
        let entity = Arc::new(Entity::DtdPseudo {
            public_id: public_id.map(Into::into),
            system_id: system_id.map(Into::into),
            base_uri: resource.base_uri.clone(),
        });
        let frame = Frame::new(
            resource.source,
            FrameKind::ExternalSubset,
            Some(entity),
            resource.base_uri,
            true,
        );
        self.source.push(frame)?;
        self.report_decl(MarkupDecl::StartEntity("[dtd]".into()))?;
        self.parse_text_decl_if_present()?;
        self.parse_subset()?;
        self.source.pop();
        self.report_decl(MarkupDecl::EndEntity("[dtd]".into()))
    }

    /// Parse the markup declarations of the top frame until it is exhausted.
    ///
    /// ```text
    /// [28b] intSubset     ::= (markupdecl | DeclSep)*
    /// [31]  extSubsetDecl ::= ( markupdecl | conditionalSect | DeclSep)*
    /// ```
    pub(super) fn parse_subset(&mut self) -> Result<(), XMLError> {
        let base = self.source.depth();
        let mut include_depth = 0usize;
        loop {
            self.skip_whitespaces()?;
            if self.source.is_frame_end()? {
                if self.source.depth() > base {
                    self.pop_parameter_entity()?;
                    continue;
                }
                if include_depth > 0 {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidConditionalSect,
                        "The conditional section is not closed."
                    ));
                }
                break Ok(());
            }

            let bytes = self.source.content_bytes();
            if bytes.starts_with(b"%") {
                self.source.advance(1)?;
                let entity = self.parse_pe_reference()?;
                self.push_parameter_entity(entity, true)?;
            } else if bytes.starts_with(b"<!ELEMENT") {
                self.parse_element_decl()?;
            } else if bytes.starts_with(b"<!ATTLIST") {
                self.parse_attlist_decl()?;
            } else if bytes.starts_with(b"<!ENTITY") {
                self.parse_entity_decl()?;
            } else if bytes.starts_with(b"<!NOTATION") {
                self.parse_notation_decl()?;
            } else if bytes.starts_with(b"<!--") {
                self.parse_comment()?;
            } else if bytes.starts_with(b"<![") {
                if !self.source.in_external_markup() {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidConditionalSect,
                        "Conditional sections are not allowed in the internal subset."
                    ));
                }
                if self.parse_conditional_sect()? {
                    include_depth += 1;
                }
            } else if bytes.starts_with(b"]]>") && include_depth > 0 {
                self.source.advance(3)?;
                include_depth -= 1;
            } else if bytes.starts_with(b"<?") {
                if self.is_xml_decl_start() {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidTextDecl,
                        "The text declaration is allowed only at the start of the entity."
                    ));
                }
                self.parse_pi()?;
            } else {
                return Err(fatal_error!(
                    self,
                    ParserInvalidDoctypeDecl,
                    "A markup declaration is expected."
                ));
            }
        }
    }

    /// ```text
    /// [61] conditionalSect ::= includeSect | ignoreSect
    /// [62] includeSect     ::= '<![' S? 'INCLUDE' S? '[' extSubsetDecl ']]>'
    /// [63] ignoreSect      ::= '<![' S? 'IGNORE' S? '[' ignoreSectContents* ']]>'
    /// ```
    ///
    /// Returns `true` for `INCLUDE`. The contents of an `IGNORE` section are skipped here.
    fn parse_conditional_sect(&mut self) -> Result<bool, XMLError> {
        // skip '<!['
        self.source.advance(3)?;
        self.skip_whitespaces_with_pe()?;
        let include = if self.skip_literal(b"INCLUDE")? {
            true
        } else if self.skip_literal(b"IGNORE")? {
            false
        } else {
            return Err(fatal_error!(
                self,
                ParserInvalidConditionalSect,
                "'INCLUDE' or 'IGNORE' is expected."
            ));
        };
        self.skip_whitespaces_with_pe()?;
        if self.source.next_char_if(|c| c == '[')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidConditionalSect,
                "'[' is expected after the conditional section keyword."
            ));
        }
        if !include {
            self.skip_ignore_sect()?;
        }
        Ok(include)
    }

    /// ```text
    /// [64] ignoreSectContents ::= Ignore ('<![' ignoreSectContents ']]>' Ignore)*
    /// [65] Ignore             ::= Char* - (Char* ('<![' | ']]>') Char*)
    /// ```
    fn skip_ignore_sect(&mut self) -> Result<(), XMLError> {
        let mut depth = 1usize;
        loop {
            self.grow()?;
            let bytes = self.source.content_bytes();
            if bytes.starts_with(b"<![") {
                self.source.advance(3)?;
                depth += 1;
            } else if bytes.starts_with(b"]]>") {
                self.source.advance(3)?;
                depth -= 1;
                if depth == 0 {
                    break Ok(());
                }
            } else if self.source.next_char()?.is_none() {
                return Err(fatal_error!(
                    self,
                    ParserInvalidConditionalSect,
                    "The IGNORE section is not closed."
                ));
            }
        }
    }
}

mod attlist_decl;
mod element_decl;
mod entity_decl;
mod ext_subset;
mod notation_decl;

use std::sync::Arc;

use log::debug;

use crate::{
    dtd::{Dtd, Entity, MarkupDecl, cache::content_urn},
    error::XMLError,
    parse::external::ExternalResource,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::{ParserOption, XMLReader, resolve_url},
        source::InputSource,
        stack::{Frame, FrameKind},
    },
};

/// The internal subset captured from the document, with the position of its first character.
struct InternalSubset {
    text: String,
    line: usize,
    column: usize,
}

struct DoctypeDecl {
    name: String,
    public_id: Option<String>,
    system_id: Option<String>,
    internal: Option<InternalSubset>,
}

#[derive(Clone, Copy)]
enum CaptureState {
    Markup,
    /// Inside a markup declaration
    Declaration,
    Literal(char),
    /// Inside a comment that started at the byte offset
    Comment(usize),
    /// Inside a PI that started at the byte offset
    ProcessingInstruction(usize),
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [28]  doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
    /// [28a] DeclSep     ::= PEReference | S
    /// [28b] intSubset   ::= (markupdecl | DeclSep)*
    /// [29]  markupdecl  ::= elementdecl | AttlistDecl | EntityDecl | NotationDecl | PI | Comment
    /// ```
    pub(crate) fn parse_doctypedecl(&mut self) -> Result<(), XMLError> {
        if self.config.is_enable(ParserOption::DisallowDoctype) {
            return Err(fatal_error!(
                self,
                ParserDoctypeDisallowed,
                "Document type declarations are not allowed."
            ));
        }
        // skip '<!DOCTYPE'
        self.source.advance(9)?;
        if self.skip_whitespaces()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidDoctypeDecl,
                "Whitespaces are required after '<!DOCTYPE'."
            ));
        }

        let mut name = String::new();
        if self.config.is_enable(ParserOption::Namespaces) {
            self.parse_qname(&mut name)?;
        } else {
            self.parse_name(&mut name)?;
        }

        let s = self.skip_whitespaces()?;
        self.grow()?;
        let (mut public_id, mut system_id) = (None, None);
        match self.source.content_bytes().first() {
            Some(b'[' | b'>') => {}
            Some(_) if s == 0 => {
                return Err(fatal_error!(
                    self,
                    ParserInvalidDoctypeDecl,
                    "Whitespaces are required after the document type name."
                ));
            }
            Some(_) => {
                (public_id, system_id) = self.parse_external_id(false, false)?;
                self.skip_whitespaces()?;
            }
            None => {
                return Err(fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "The document type declaration is not closed."
                ));
            }
        }

        let mut internal = None;
        if self.skip_literal(b"[")? {
            let (line, column) = (self.locator.line(), self.locator.column());
            let text = self.capture_internal_subset()?;
            internal = Some(InternalSubset { text, line, column });
            self.skip_whitespaces()?;
        }
        if !self.skip_literal(b">")? {
            return Err(fatal_error!(
                self,
                ParserInvalidDoctypeDecl,
                "The document type declaration does not end with '>'."
            ));
        }

        self.handler
            .start_dtd(&name, public_id.as_deref(), system_id.as_deref());
        self.process_dtd(DoctypeDecl {
            name,
            public_id,
            system_id,
            internal,
        })?;
        self.handler.end_dtd();
        Ok(())
    }

    /// Read the internal subset up to its closing `']'` without interpreting it.
    ///
    /// Quoted literals, comments and PIs may contain `']'`.
    fn capture_internal_subset(&mut self) -> Result<String, XMLError> {
        let mut text = String::new();
        let mut state = CaptureState::Markup;
        loop {
            let Some(c) = self.source.next_char()? else {
                return Err(fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "The internal subset is not closed by ']'."
                ));
            };
            state = match state {
                CaptureState::Markup if c == ']' => break Ok(text),
                CaptureState::Markup | CaptureState::Declaration => {
                    text.push(c);
                    if text.ends_with("<!--") {
                        CaptureState::Comment(text.len())
                    } else if text.ends_with("<?") {
                        CaptureState::ProcessingInstruction(text.len())
                    } else if text.ends_with("<!") {
                        CaptureState::Declaration
                    } else if matches!(state, CaptureState::Declaration) && matches!(c, '"' | '\'') {
                        CaptureState::Literal(c)
                    } else if c == '>' {
                        CaptureState::Markup
                    } else {
                        state
                    }
                }
                CaptureState::Literal(quote) => {
                    text.push(c);
                    if c == quote {
                        CaptureState::Declaration
                    } else {
                        state
                    }
                }
                CaptureState::Comment(start) => {
                    text.push(c);
                    if text.len() >= start + 3 && text.ends_with("-->") {
                        CaptureState::Markup
                    } else {
                        state
                    }
                }
                CaptureState::ProcessingInstruction(start) => {
                    text.push(c);
                    if text.len() >= start + 2 && text.ends_with("?>") {
                        CaptureState::Markup
                    } else {
                        state
                    }
                }
            };
        }
    }

    /// Build the DTD of the document, or take it from the cache.
    ///
    /// The cache key combines the base URI (only if the internal subset is not empty), the
    /// identity of the external subset, the fingerprint of the internal subset and the
    /// options that affect the result.
    fn process_dtd(&mut self, decl: DoctypeDecl) -> Result<(), XMLError> {
        let base_uri = self.source.base_uri();
        let load_external = self.config.is_enable(ParserOption::LoadExternalDTD);

        let mut external = None;
        if decl.system_id.is_none() && load_external {
            let base = base_uri.as_ref().map(|base| base.as_str());
            if let Some(mut source) = self.handler.get_external_subset(&decl.name, base)? {
                source.set_version(self.version);
                let url = source
                    .system_id()
                    .and_then(|id| resolve_url(id, base_uri.as_deref()).ok())
                    .map(Arc::new)
                    .or_else(|| base_uri.clone());
                let mut resource = ExternalResource {
                    source,
                    base_uri: url,
                    urn: None,
                    fingerprint: None,
                };
                if self.caching().is_some() {
                    let text = resource.source.read_to_string()?;
                    let system_id = resource.source.system_id().unwrap_or_default().to_owned();
                    resource.fingerprint = Some(content_urn(&text));
                    resource.source = self.cached_source(&text, None, &system_id);
                }
                external = Some(resource);
            }
        }
        let has_external = decl.system_id.is_some() || external.is_some();

        let cache = self.caching();
        let mut key = None;
        if let Some(cache) = cache.as_ref() {
            let mut skip = None;
            let external_key = if !has_external || !load_external {
                String::new()
            } else if let Some(resource) = external.as_ref() {
                skip = Some("[dtd]");
                resource.fingerprint.clone().unwrap_or_default()
            } else {
                let system_id = decl.system_id.as_deref().unwrap_or_default();
                let url = resolve_url(system_id, base_uri.as_deref()).ok();
                match self.identity_urn(decl.public_id.as_deref(), url.as_ref()) {
                    Some(urn) => urn,
                    None => {
                        let resource = self.load_external(
                            "[dtd]",
                            decl.public_id.as_deref(),
                            system_id,
                            base_uri.as_ref(),
                        )?;
                        skip = Some("[dtd]");
                        let fingerprint = resource.fingerprint.clone().unwrap_or_default();
                        external = Some(resource);
                        fingerprint
                    }
                }
            };
            let internal = decl
                .internal
                .as_ref()
                .map(|internal| internal.text.as_str())
                .unwrap_or_default();
            let base = match base_uri.as_ref() {
                Some(base) if !internal.is_empty() => base.as_str(),
                _ => "",
            };
            let k = format!(
                "{base}|{external_key}|{}|{}",
                content_urn(internal),
                self.config.signature()
            );
            if let Some(cached) = cache.lookup(&k, self.version) {
                if self.revalidate(&cached, skip) {
                    debug!("DTD cache hit: {k}");
                    for decl in cached.declarations() {
                        decl.replay(&mut self.handler);
                    }
                    self.dtd = Some(cached);
                    return Ok(());
                }
                debug!("DTD cache entry is stale: {k}");
                cache.invalidate(&k, self.version);
            }
            key = Some(k);
        }

        let mut dtd = Dtd::new(
            decl.name.as_str(),
            decl.public_id.as_deref(),
            decl.system_id.as_deref(),
            base_uri.clone(),
        );
        if has_external {
            dtd.set_has_external_subset()?;
        }
        self.dtd = Some(Arc::new(dtd));

        if let Some(internal) = decl.internal {
            let mut source =
                InputSource::from_normalized_text(internal.text, internal.line, internal.column);
            source.set_version(self.version);
            source.set_system_id(self.locator.system_id());
            if let Some(public_id) = self.locator.public_id() {
                source.set_public_id(public_id);
            }
            let frame = Frame::new(source, FrameKind::InternalSubset, None, base_uri.clone(), true);
            self.source.push(frame)?;
            self.parse_subset()?;
            self.source.pop();
        }

        if has_external && load_external {
            let resource = match external {
                Some(resource) => resource,
                None => self.load_external(
                    "[dtd]",
                    decl.public_id.as_deref(),
                    decl.system_id.as_deref().unwrap_or_default(),
                    base_uri.as_ref(),
                )?,
            };
            if let Some(system_id) = decl.system_id.as_deref() {
                self.record_dependency(
                    "[dtd]",
                    decl.public_id.as_deref(),
                    system_id,
                    base_uri.clone(),
                    &resource,
                )?;
            }
            self.parse_external_subset(
                resource,
                decl.public_id.as_deref(),
                decl.system_id.as_deref(),
            )?;
        }

        self.dtd_mut()?.close();
        if let (Some(cache), Some(key), Some(dtd)) = (cache, key, self.dtd.clone()) {
            debug!("store DTD: {key}");
            cache.store(&key, self.version, dtd)?;
        }
        Ok(())
    }

    /// Skip whitespaces between tokens of a markup declaration.
    ///
    /// If `pe` is `true`, parameter entity references are also skipped and replaced.
    pub(crate) fn skip_decl_whitespaces(&mut self, pe: bool) -> Result<usize, XMLError> {
        if pe {
            self.skip_whitespaces_with_pe()
        } else {
            self.skip_whitespaces()
        }
    }

    /// Skip whitespaces and parameter entity references in a markup declaration.
    ///
    /// The start and the end of a replacement text count as whitespaces.
    pub(crate) fn skip_whitespaces_with_pe(&mut self) -> Result<usize, XMLError> {
        let mut skipped = 0;
        loop {
            skipped += self.skip_whitespaces()?;
            if self.source.is_frame_end()? {
                if self
                    .source
                    .top()
                    .is_some_and(|frame| frame.kind == FrameKind::ParameterEntity)
                {
                    self.pop_parameter_entity()?;
                    skipped += 1;
                    continue;
                }
                break;
            }

            let mut chars = self.source.content_str().chars();
            let is_reference = chars.next() == Some('%')
                && chars
                    .next()
                    .is_some_and(|c| self.version.is_name_start_char(c));
            if !is_reference {
                break;
            }
            if !self.source.in_external_markup() {
                return Err(fatal_error!(
                    self,
                    ParserInvalidPEReferenceInInternalSubset,
                    "Parameter entity references are not allowed in markup declarations in the internal subset."
                ));
            }
            // skip '%'
            self.source.advance(1)?;
            let entity = self.parse_pe_reference()?;
            if self.push_parameter_entity(entity, true)? {
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    /// Push the replacement text of a parameter entity.
    ///
    /// Boundary events are reported and recorded if `events` is `true`.
    /// Returns `false` if the entity is not read.
    pub(crate) fn push_parameter_entity(
        &mut self,
        entity: Arc<Entity>,
        events: bool,
    ) -> Result<bool, XMLError> {
        self.check_recursion(&entity)?;
        let name = format!("%{}", entity.name());
        match entity.as_ref() {
            Entity::Internal {
                value, base_uri, ..
            } => {
                self.count_expansion(true)?;
                let mut source = InputSource::from_replacement_text(value);
                source.set_version(self.version);
                let base_uri = base_uri.clone();
                let frame =
                    Frame::new(source, FrameKind::ParameterEntity, Some(entity), base_uri, false);
                self.source.push(frame)?;
                if events {
                    self.report_decl(MarkupDecl::StartEntity(name.into()))?;
                }
            }
            Entity::External {
                public_id,
                system_id,
                base_uri,
                ..
            } => {
                if !self.config.is_enable(ParserOption::ExternalParameterEntities) {
                    if events {
                        self.handler.skipped_entity(&name);
                    }
                    return Ok(false);
                }
                self.count_expansion(true)?;
                let resource =
                    self.load_external(&name, public_id.as_deref(), system_id, base_uri.as_ref())?;
                self.record_dependency(
                    &name,
                    public_id.as_deref(),
                    system_id,
                    base_uri.clone(),
                    &resource,
                )?;
                let frame = Frame::new(
                    resource.source,
                    FrameKind::ParameterEntity,
                    Some(entity.clone()),
                    resource.base_uri,
                    true,
                );
                self.source.push(frame)?;
                if events {
                    self.report_decl(MarkupDecl::StartEntity(name.into()))?;
                }
                self.parse_text_decl_if_present()?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Pop an exhausted parameter entity frame and report its end.
    pub(crate) fn pop_parameter_entity(&mut self) -> Result<(), XMLError> {
        if let Some(name) = self.source.pop().and_then(|frame| frame.entity_name()) {
            self.report_decl(MarkupDecl::EndEntity(name.into()))?;
        }
        Ok(())
    }
}

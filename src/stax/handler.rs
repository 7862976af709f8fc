use std::sync::Arc;

use log::{error, warn};

use crate::{
    XML_XML_NAMESPACE,
    error::XMLError,
    sax::{
        Locator,
        attributes::Attributes,
        error::SAXParseError,
        handler::{DefaultSAXHandler, EntityResolver, SAXHandler},
        source::InputSource,
    },
    stax::events::XMLEventType,
};

/// Prefix to namespace name bindings of the open elements.
#[derive(Debug, Default)]
pub(crate) struct NamespaceStack {
    /// `None` is the default namespace. An empty name undeclares the prefix.
    bindings: Vec<(Option<Box<str>>, Box<str>)>,
    scopes: Vec<usize>,
}

impl NamespaceStack {
    fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    fn pop_scope(&mut self) {
        if let Some(len) = self.scopes.pop() {
            self.bindings.truncate(len);
        }
    }

    fn bind(&mut self, prefix: Option<&str>, uri: &str) {
        self.bindings.push((prefix.map(Into::into), uri.into()));
    }

    pub(crate) fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| &**uri)
            .filter(|uri| !uri.is_empty())
    }

    fn clear(&mut self) {
        self.bindings.clear();
        self.scopes.clear();
    }
}

/// Receive the messages of a producer and keep the state of the current event.
pub(crate) struct XMLStreamReaderHandler<Resolver: EntityResolver = DefaultSAXHandler> {
    pub(super) event: XMLEventType,
    /// Set when a message produced a visible event.
    pub(super) produced: bool,
    pub(super) namespace_name: Option<String>,
    pub(super) local_name: Option<String>,
    /// The QName, the text of character data, comments and entity names, or the PI target.
    pub(super) text: String,
    /// The PI data, or the encoding of the XML declaration.
    pub(super) data: Option<String>,
    pub(super) standalone: Option<bool>,
    pub(super) atts: Attributes,
    pub(super) namespaces: NamespaceStack,
    /// Report namespace declarations as attributes.
    pub(super) keep_nsdecl: bool,
    in_dtd: bool,
    in_cdata: bool,
    /// The scope of the last end tag is left on the next move.
    pending_pop: bool,
    pub(super) fatal_error: Option<SAXParseError>,

    pub(super) entity_resolver: Resolver,
}

impl<Resolver: EntityResolver> XMLStreamReaderHandler<Resolver> {
    pub(super) fn new(entity_resolver: Resolver, keep_nsdecl: bool) -> Self {
        Self {
            event: XMLEventType::None,
            produced: false,
            namespace_name: None,
            local_name: None,
            text: String::new(),
            data: None,
            standalone: None,
            atts: Attributes::new(),
            namespaces: NamespaceStack::default(),
            keep_nsdecl,
            in_dtd: false,
            in_cdata: false,
            pending_pop: false,
            fatal_error: None,
            entity_resolver,
        }
    }

    pub(super) fn reset(&mut self) {
        self.event = XMLEventType::None;
        self.produced = false;
        self.namespaces.clear();
        self.in_dtd = false;
        self.in_cdata = false;
        self.pending_pop = false;
        self.fatal_error = None;
    }

    /// Prepare for the next message.
    pub(super) fn prepare(&mut self) {
        self.produced = false;
        if self.pending_pop {
            self.namespaces.pop_scope();
            self.pending_pop = false;
        }
    }

    fn produce(&mut self, event: XMLEventType) {
        self.event = event;
        self.produced = true;
    }

    fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
    }

    fn set_name(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        self.namespace_name = uri.map(str::to_owned);
        self.local_name = local_name.map(str::to_owned);
        self.set_text(qname);
    }
}

impl<Resolver: EntityResolver> EntityResolver for XMLStreamReaderHandler<Resolver> {
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        self.entity_resolver.get_external_subset(name, base_uri)
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        self.entity_resolver
            .resolve_entity(name, public_id, base_uri, system_id)
    }
}

impl<Resolver: EntityResolver> SAXHandler for XMLStreamReaderHandler<Resolver> {
    fn set_document_locator(&mut self, _locator: Arc<Locator>) {}

    fn start_document(&mut self) {
        self.produce(XMLEventType::StartDocument);
    }

    fn end_document(&mut self) {
        self.produce(XMLEventType::EndDocument);
    }

    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        self.set_text(version);
        self.data = encoding.map(str::to_owned);
        self.standalone = standalone;
        self.produce(XMLEventType::Declaration);
    }

    fn start_dtd(&mut self, name: &str, _public_id: Option<&str>, _system_id: Option<&str>) {
        self.set_text(name);
        self.in_dtd = true;
    }

    fn end_dtd(&mut self) {
        self.in_dtd = false;
        self.produce(XMLEventType::DocumentType);
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        self.set_name(uri, local_name, qname);
        self.namespaces.push_scope();
        for attribute in atts.iter().filter(|attribute| attribute.is_nsdecl()) {
            let prefix = (&*attribute.qname != "xmlns")
                .then(|| attribute.local_name.as_deref())
                .flatten();
            self.namespaces.bind(prefix, &attribute.value);
        }
        self.atts.clone_from_list(atts);
        if !self.keep_nsdecl {
            self.atts
                .retain_and_index(|attribute| !attribute.is_nsdecl())
                .ok();
        }
        self.produce(XMLEventType::StartElement);
    }

    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        self.set_name(uri, local_name, qname);
        self.pending_pop = true;
        self.produce(XMLEventType::EndElement);
    }

    fn characters(&mut self, data: &str) {
        self.set_text(data);
        if self.in_cdata {
            self.produce(XMLEventType::CDATASection);
        } else {
            self.produce(XMLEventType::Characters);
        }
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        self.set_text(data);
        self.produce(XMLEventType::Space);
    }

    fn start_cdata(&mut self) {
        self.in_cdata = true;
        self.produce(XMLEventType::StartCDATA);
    }

    fn end_cdata(&mut self) {
        self.in_cdata = false;
        self.produce(XMLEventType::EndCDATA);
    }

    fn comment(&mut self, data: &str) {
        if !self.in_dtd {
            self.set_text(data);
            self.produce(XMLEventType::Comment);
        }
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        if !self.in_dtd {
            self.set_text(target);
            self.data = data.map(str::to_owned);
            self.produce(XMLEventType::ProcessingInstruction);
        }
    }

    fn start_entity(&mut self, name: &str) {
        if !self.in_dtd {
            self.set_text(name);
            self.produce(XMLEventType::StartEntity);
        }
    }

    fn end_entity(&mut self, name: &str) {
        if !self.in_dtd {
            self.set_text(name);
            self.produce(XMLEventType::EndEntity);
        }
    }

    fn skipped_entity(&mut self, name: &str) {
        if !self.in_dtd {
            self.set_text(name);
            self.produce(XMLEventType::EntityReference);
        }
    }

    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        error!("{error}");
        Ok(())
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        error!("{error}");
        self.fatal_error = Some(error);
    }

    fn warning(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        warn!("{error}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_scopes() {
        let mut stack = NamespaceStack::default();
        stack.push_scope();
        stack.bind(None, "urn:default");
        stack.bind(Some("a"), "urn:a");
        stack.push_scope();
        stack.bind(Some("a"), "urn:inner");
        stack.bind(None, "");
        assert_eq!(stack.resolve(Some("a")), Some("urn:inner"));
        assert_eq!(stack.resolve(None), None);
        stack.pop_scope();
        assert_eq!(stack.resolve(Some("a")), Some("urn:a"));
        assert_eq!(stack.resolve(None), Some("urn:default"));
        assert_eq!(stack.resolve(Some("xml")), Some(XML_XML_NAMESPACE));
        stack.pop_scope();
        assert_eq!(stack.resolve(Some("a")), None);
    }
}

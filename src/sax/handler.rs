use std::{fmt::Write as _, sync::Arc};

use crate::{
    error::XMLError,
    sax::{
        AttributeType, ContentSpec, DefaultDecl, Locator, attributes::Attributes,
        error::SAXParseError, source::InputSource,
    },
};

/// The event sink of the parser.
///
/// All methods have no-op default implementations.  \
/// In worker-thread mode, every method is called on the thread that started the parse.
pub trait SAXHandler: EntityResolver {
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn characters(&mut self, data: &str) {
        let _ = data;
    }

    /// Report the XML declaration or the text declaration of the document entity.
    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        let _ = (version, encoding, standalone);
    }

    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn ignorable_whitespace(&mut self, data: &str) {
        let _ = data;
    }

    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        let _ = (target, data);
    }

    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        let _ = locator;
    }

    /// Report a general entity reference in content that the parser did not expand.
    ///
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn skipped_entity(&mut self, name: &str) {
        let _ = name;
    }

    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn start_document(&mut self) {}
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn end_document(&mut self) {}

    /// `uri` is `None` for elements in no namespace.
    /// `local_name` is `None` if namespace processing is disabled.
    ///
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        let _ = (uri, local_name, qname, atts);
    }
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        let _ = (uri, local_name, qname);
    }

    /// Bindings declared on an element are reported just after its `start_element`.
    ///
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        let _ = (prefix, uri);
    }
    /// # Reference
    /// [`ContentHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ContentHandler.html)
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        let _ = prefix;
    }

    /// # Reference
    /// [`DeclHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/DeclHandler.html)
    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        let _ = (element_name, attribute_name, attribute_type, default_decl);
    }

    /// # Reference
    /// [`DeclHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/DeclHandler.html)
    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        let _ = (name, contentspec);
    }

    /// Parameter entity names start with `'%'`.
    ///
    /// # Reference
    /// [`DeclHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/DeclHandler.html)
    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        let _ = (name, public_id, system_id);
    }

    /// Parameter entity names start with `'%'`.
    ///
    /// # Reference
    /// [`DeclHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/DeclHandler.html)
    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        let _ = (name, value);
    }

    /// # Reference
    /// [`DTDHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/DTDHandler.html)
    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }

    /// # Reference
    /// [`DTDHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/DTDHandler.html)
    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        let _ = (name, public_id, system_id, notation_name);
    }

    /// Returning `Err` stops the parse with that error.
    ///
    /// # Reference
    /// [`ErrorHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ErrorHandler.html)
    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        let _ = error;
        Ok(())
    }

    /// Called at most once per parse. The parse always stops after a fatal error.
    ///
    /// # Reference
    /// [`ErrorHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ErrorHandler.html)
    fn fatal_error(&mut self, error: SAXParseError) {
        let _ = error;
    }

    /// Returning `Err` stops the parse with that error.
    ///
    /// # Reference
    /// [`ErrorHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ErrorHandler.html)
    fn warning(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        let _ = error;
        Ok(())
    }

    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn comment(&mut self, data: &str) {
        let _ = data;
    }

    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn start_cdata(&mut self) {}
    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn end_cdata(&mut self) {}

    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let _ = (name, public_id, system_id);
    }
    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn end_dtd(&mut self) {}

    /// The external subset is reported as `"[dtd]"`, parameter entities with a leading `'%'`.
    ///
    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn start_entity(&mut self, name: &str) {
        let _ = name;
    }
    /// # Reference
    /// [`LexicalHandler` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/LexicalHandler.html)
    fn end_entity(&mut self, name: &str) {
        let _ = name;
    }
}

/// Supplier of external resources.
///
/// `Ok(None)` means "not resolved". The parser then falls back to its default resolution,
/// which loads `file:` URLs permitted by
/// [`ParserConfig::allowed_schemes`](crate::sax::parser::ParserConfig).
pub trait EntityResolver {
    /// Supply an external subset for a document whose document type declaration has no
    /// external ID.
    ///
    /// # Reference
    /// [`EntityResolver2` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/EntityResolver2.html)
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        let _ = (name, base_uri);
        Ok(None)
    }

    /// When handling untrusted XML documents, it is recommended to implement custom logic
    /// to prevent unexpected access to local resources.
    ///
    /// # Reference
    /// [`EntityResolver2` interface in Java SAX API](https://docs.oracle.com/javase/jp/21/docs/api/java.xml/org/xml/sax/ext/EntityResolver2.html)
    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        let _ = (name, public_id, base_uri, system_id);
        Ok(None)
    }
}

/// Route diagnostics to the [`log`] facade and ignore everything else.
pub struct DefaultSAXHandler;

impl SAXHandler for DefaultSAXHandler {
    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        log::error!("{error}");
        Ok(())
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        log::error!("{error}");
    }

    fn warning(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        log::warn!("{error}");
        Ok(())
    }
}
impl EntityResolver for DefaultSAXHandler {}

/// Record every callback as a line of text in `buffer`, then forward it to `child`.
pub struct DebugHandler<Child: SAXHandler = DefaultSAXHandler> {
    pub buffer: String,
    pub child: Child,
}

impl<Child: SAXHandler> DebugHandler<Child> {
    pub fn new(child: Child) -> Self {
        Self {
            buffer: String::new(),
            child,
        }
    }
}

impl<Child: SAXHandler> EntityResolver for DebugHandler<Child> {
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        writeln!(self.buffer, "getExternalSubset({name}, {base_uri:?})").ok();
        self.child.get_external_subset(name, base_uri)
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        writeln!(
            self.buffer,
            "resolveEntity({name}, {public_id:?}, {base_uri:?}, {system_id})"
        )
        .ok();
        self.child
            .resolve_entity(name, public_id, base_uri, system_id)
    }
}

impl<Child: SAXHandler> SAXHandler for DebugHandler<Child> {
    fn characters(&mut self, data: &str) {
        writeln!(self.buffer, "characters({data})").ok();
        self.child.characters(data);
    }

    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        writeln!(
            self.buffer,
            "declaration({version}, {encoding:?}, {standalone:?})"
        )
        .ok();
        self.child.declaration(version, encoding, standalone);
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        writeln!(self.buffer, "ignorableWhitespace({data})").ok();
        self.child.ignorable_whitespace(data);
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        writeln!(self.buffer, "processingInstruction({target}, {data:?})").ok();
        self.child.processing_instruction(target, data);
    }

    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        writeln!(self.buffer, "setDocumentLocator()").ok();
        self.child.set_document_locator(locator);
    }

    fn skipped_entity(&mut self, name: &str) {
        writeln!(self.buffer, "skippedEntity({name})").ok();
        self.child.skipped_entity(name);
    }

    fn start_document(&mut self) {
        writeln!(self.buffer, "startDocument()").ok();
        self.child.start_document();
    }
    fn end_document(&mut self) {
        writeln!(self.buffer, "endDocument()").ok();
        self.child.end_document();
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        write!(self.buffer, "startElement({uri:?}, {local_name:?}, {qname}").ok();
        for att in atts {
            write!(self.buffer, ", ").ok();
            if let Some(local_name) = att.local_name.as_deref() {
                write!(self.buffer, "{{{:?}}}{local_name}='{}'", att.uri, att.value).ok();
            } else {
                write!(self.buffer, "{}='{}'", att.qname, att.value).ok();
            }
            if !att.is_specified() {
                write!(self.buffer, "(default)").ok();
            }
        }
        writeln!(self.buffer, ")").ok();
        self.child.start_element(uri, local_name, qname, atts);
    }
    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        writeln!(self.buffer, "endElement({uri:?}, {local_name:?}, {qname})").ok();
        self.child.end_element(uri, local_name, qname);
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        writeln!(self.buffer, "startPrefixMapping({prefix:?}, {uri})").ok();
        self.child.start_prefix_mapping(prefix, uri);
    }
    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        writeln!(self.buffer, "endPrefixMapping({prefix:?})").ok();
        self.child.end_prefix_mapping(prefix);
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        writeln!(
            self.buffer,
            "attributeDecl({element_name}, {attribute_name}, {attribute_type:?}, {default_decl:?})"
        )
        .ok();
        self.child
            .attribute_decl(element_name, attribute_name, attribute_type, default_decl);
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        writeln!(self.buffer, "elementDecl({name}, {contentspec:?})").ok();
        self.child.element_decl(name, contentspec);
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        writeln!(
            self.buffer,
            "externalEntityDecl({name}, {public_id:?}, {system_id})"
        )
        .ok();
        self.child.external_entity_decl(name, public_id, system_id);
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        writeln!(self.buffer, "internalEntityDecl({name}, {value})").ok();
        self.child.internal_entity_decl(name, value);
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        writeln!(
            self.buffer,
            "notationDecl({name}, {public_id:?}, {system_id:?})"
        )
        .ok();
        self.child.notation_decl(name, public_id, system_id);
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        writeln!(
            self.buffer,
            "unparsedEntityDecl({name}, {public_id:?}, {system_id}, {notation_name})"
        )
        .ok();
        self.child
            .unparsed_entity_decl(name, public_id, system_id, notation_name);
    }

    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        writeln!(self.buffer, "error({:?})", error.error).ok();
        self.child.error(error)
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        writeln!(self.buffer, "fatalError({:?})", error.error).ok();
        self.child.fatal_error(error);
    }

    fn warning(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        writeln!(self.buffer, "warning({:?})", error.error).ok();
        self.child.warning(error)
    }

    fn comment(&mut self, data: &str) {
        writeln!(self.buffer, "comment({data})").ok();
        self.child.comment(data);
    }

    fn start_cdata(&mut self) {
        writeln!(self.buffer, "startCDATA()").ok();
        self.child.start_cdata();
    }
    fn end_cdata(&mut self) {
        writeln!(self.buffer, "endCDATA()").ok();
        self.child.end_cdata();
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        writeln!(self.buffer, "startDTD({name}, {public_id:?}, {system_id:?})").ok();
        self.child.start_dtd(name, public_id, system_id);
    }
    fn end_dtd(&mut self) {
        writeln!(self.buffer, "endDTD()").ok();
        self.child.end_dtd();
    }

    fn start_entity(&mut self, name: &str) {
        writeln!(self.buffer, "startEntity({name})").ok();
        self.child.start_entity(name);
    }
    fn end_entity(&mut self, name: &str) {
        writeln!(self.buffer, "endEntity({name})").ok();
        self.child.end_entity(name);
    }
}

impl Default for DebugHandler {
    fn default() -> Self {
        Self::new(DefaultSAXHandler)
    }
}

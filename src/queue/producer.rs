use std::sync::Arc;

use crate::{
    error::XMLError,
    queue::{Message, MessageKind, MessageQueue, Payload, Reply},
    sax::{
        AttributeType, ContentSpec, DefaultDecl, Locator,
        attributes::Attributes,
        error::SAXParseError,
        handler::{EntityResolver, SAXHandler},
        source::InputSource,
    },
};

/// The handler of a parser running on the producer thread.
///
/// Every callback becomes a message. Callbacks with a result are sent as requests and wait
/// for the consumer.
pub(crate) struct QueueSink {
    queue: Arc<MessageQueue>,
    locator: Option<Arc<Locator>>,
}

impl QueueSink {
    pub(crate) fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            queue,
            locator: None,
        }
    }

    fn fill(&self, message: &mut Message) {
        if let Some(locator) = self.locator.as_ref() {
            message.locator = locator.snapshot();
        }
    }

    /// A closed queue is noticed by the reader before the next read, so failures are dropped.
    fn emit(&self, kind: MessageKind, fill: impl FnOnce(&mut Message)) {
        self.queue
            .emit(kind, |message| {
                self.fill(message);
                fill(message);
            })
            .ok();
    }

    fn request(
        &self,
        kind: MessageKind,
        fill: impl FnOnce(&mut Message),
    ) -> Result<Reply, XMLError> {
        self.queue.request(kind, |message| {
            self.fill(message);
            fill(message);
        })
    }

    fn report(&self, kind: MessageKind, error: SAXParseError) -> Result<(), XMLError> {
        match self.request(kind, |message| message.payload = Payload::Report(error))? {
            Reply::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl EntityResolver for QueueSink {
    fn get_external_subset(
        &mut self,
        name: &str,
        base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        let reply = self.request(MessageKind::GetExternalSubset, |message| {
            message.slots[0].set(name);
            message.slots[1].set_opt(base_uri);
        })?;
        match reply {
            Reply::Resolved(source) => Ok(source),
            Reply::Failed(err) => Err(err),
            Reply::Ack => Ok(None),
        }
    }

    fn resolve_entity(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        base_uri: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource>, XMLError> {
        let reply = self.request(MessageKind::ResolveEntity, |message| {
            message.slots[0].set(name);
            message.slots[1].set_opt(public_id);
            message.slots[2].set_opt(base_uri);
            message.slots[3].set(system_id);
        })?;
        match reply {
            Reply::Resolved(source) => Ok(source),
            Reply::Failed(err) => Err(err),
            Reply::Ack => Ok(None),
        }
    }
}

impl SAXHandler for QueueSink {
    fn characters(&mut self, data: &str) {
        self.emit(MessageKind::Characters, |m| m.slots[0].set(data));
    }

    fn declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        self.emit(MessageKind::Declaration, |m| {
            m.slots[0].set(version);
            m.slots[1].set_opt(encoding);
            m.payload = Payload::Standalone(standalone);
        });
    }

    fn ignorable_whitespace(&mut self, data: &str) {
        self.emit(MessageKind::IgnorableWhitespace, |m| m.slots[0].set(data));
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        self.emit(MessageKind::ProcessingInstruction, |m| {
            m.slots[0].set(target);
            m.slots[1].set_opt(data);
        });
    }

    /// The consumer reports its own locator. Messages carry snapshots of this one.
    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        self.locator = Some(locator);
    }

    fn skipped_entity(&mut self, name: &str) {
        self.emit(MessageKind::SkippedEntity, |m| m.slots[0].set(name));
    }

    fn start_document(&mut self) {
        self.emit(MessageKind::StartDocument, |_| {});
    }

    fn end_document(&mut self) {
        self.emit(MessageKind::EndDocument, |_| {});
    }

    fn start_element(
        &mut self,
        uri: Option<&str>,
        local_name: Option<&str>,
        qname: &str,
        atts: &Attributes,
    ) {
        self.emit(MessageKind::StartElement, |m| {
            m.slots[0].set_opt(uri);
            m.slots[1].set_opt(local_name);
            m.slots[2].set(qname);
            m.attributes.clone_from_list(atts);
        });
    }

    fn end_element(&mut self, uri: Option<&str>, local_name: Option<&str>, qname: &str) {
        self.emit(MessageKind::EndElement, |m| {
            m.slots[0].set_opt(uri);
            m.slots[1].set_opt(local_name);
            m.slots[2].set(qname);
        });
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.emit(MessageKind::StartPrefixMapping, |m| {
            m.slots[0].set_opt(prefix);
            m.slots[1].set(uri);
        });
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        self.emit(MessageKind::EndPrefixMapping, |m| m.slots[0].set_opt(prefix));
    }

    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        default_decl: &DefaultDecl,
    ) {
        self.emit(MessageKind::AttributeDecl, |m| {
            m.slots[0].set(element_name);
            m.slots[1].set(attribute_name);
            m.payload = Payload::AttributeDecl(attribute_type.clone(), default_decl.clone());
        });
    }

    fn element_decl(&mut self, name: &str, contentspec: &ContentSpec) {
        self.emit(MessageKind::ElementDecl, |m| {
            m.slots[0].set(name);
            m.payload = Payload::ContentSpec(contentspec.clone());
        });
    }

    fn external_entity_decl(&mut self, name: &str, public_id: Option<&str>, system_id: &str) {
        self.emit(MessageKind::ExternalEntityDecl, |m| {
            m.slots[0].set(name);
            m.slots[1].set_opt(public_id);
            m.slots[2].set(system_id);
        });
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) {
        self.emit(MessageKind::InternalEntityDecl, |m| {
            m.slots[0].set(name);
            m.slots[1].set(value);
        });
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.emit(MessageKind::NotationDecl, |m| {
            m.slots[0].set(name);
            m.slots[1].set_opt(public_id);
            m.slots[2].set_opt(system_id);
        });
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) {
        self.emit(MessageKind::UnparsedEntityDecl, |m| {
            m.slots[0].set(name);
            m.slots[1].set_opt(public_id);
            m.slots[2].set(system_id);
            m.slots[3].set(notation_name);
        });
    }

    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        self.report(MessageKind::Error, error)
    }

    fn fatal_error(&mut self, error: SAXParseError) {
        self.report(MessageKind::FatalError, error).ok();
    }

    fn warning(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        self.report(MessageKind::Warning, error)
    }

    fn comment(&mut self, data: &str) {
        self.emit(MessageKind::Comment, |m| m.slots[0].set(data));
    }

    fn start_cdata(&mut self) {
        self.emit(MessageKind::StartCdata, |_| {});
    }

    fn end_cdata(&mut self) {
        self.emit(MessageKind::EndCdata, |_| {});
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.emit(MessageKind::StartDtd, |m| {
            m.slots[0].set(name);
            m.slots[1].set_opt(public_id);
            m.slots[2].set_opt(system_id);
        });
    }

    fn end_dtd(&mut self) {
        self.emit(MessageKind::EndDtd, |_| {});
    }

    fn start_entity(&mut self, name: &str) {
        self.emit(MessageKind::StartEntity, |m| m.slots[0].set(name));
    }

    fn end_entity(&mut self, name: &str) {
        self.emit(MessageKind::EndEntity, |m| m.slots[0].set(name));
    }
}

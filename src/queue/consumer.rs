use std::sync::Arc;

use crate::{
    dtd::Dtd,
    error::XMLError,
    queue::{Message, MessageKind, MessageQueue, Payload, Reply},
    sax::{Locator, handler::SAXHandler},
};

/// The consuming side of a [`MessageQueue`].
///
/// Dropping the consumer closes the queue, so a producer blocked on a full ring is released.
pub(crate) struct Consumer {
    queue: Arc<MessageQueue>,
    current: Message,
    has_current: bool,
    outcome: Option<Result<(), XMLError>>,
}

impl Consumer {
    pub(crate) fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            queue,
            current: Message::default(),
            has_current: false,
            outcome: None,
        }
    }

    /// Observe the oldest message.
    ///
    /// Returns `Ok(None)` after the producer finished successfully and all messages have been
    /// consumed. If the producer failed, its error is returned instead.
    pub(crate) fn peek(&mut self) -> Result<Option<&Message>, XMLError> {
        if let Some(outcome) = self.outcome.as_ref() {
            return outcome.clone().map(|_| None);
        }
        if !self.has_current {
            if let Some(outcome) = self.queue.swap_head(&mut self.current) {
                self.outcome = Some(outcome.clone());
                return outcome.map(|_| None);
            }
            self.has_current = true;
        }
        Ok(Some(&self.current))
    }

    /// Retire the message returned by the last `peek`.
    pub(crate) fn remove(&mut self) {
        self.has_current = false;
    }

    pub(crate) fn reply(&self, reply: Reply) {
        self.queue.reply(reply);
    }

    /// The DTD of the document, available once the producer has finished.
    pub(crate) fn dtd(&self) -> Option<Arc<Dtd>> {
        self.queue.dtd()
    }

    pub(crate) fn close(&mut self) {
        self.queue.close();
    }

    /// Drain all messages into `handler`.
    pub(crate) fn run<H: SAXHandler>(
        &mut self,
        handler: &mut H,
        locator: &Locator,
    ) -> Result<(), XMLError> {
        loop {
            let reply = match self.peek()? {
                Some(message) => dispatch(message, handler, locator),
                None => break Ok(()),
            };
            if let Some(reply) = reply {
                self.reply(reply);
            }
            self.remove();
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Deliver `message` to `handler` with `locator` pointing at the position of the message.
///
/// Returns the reply for requests.
pub(crate) fn dispatch<H: SAXHandler + ?Sized>(
    message: &Message,
    handler: &mut H,
    locator: &Locator,
) -> Option<Reply> {
    use MessageKind::*;

    locator.restore(&message.locator);
    let [s0, s1, s2, s3, _] = &message.slots;
    match message.kind {
        Empty => {}
        StartDocument => handler.start_document(),
        EndDocument => handler.end_document(),
        Declaration => {
            let standalone = match message.payload {
                Payload::Standalone(standalone) => standalone,
                _ => Option::None,
            };
            handler.declaration(s0.get(), s1.get_opt(), standalone);
        }
        StartElement => {
            handler.start_element(s0.get_opt(), s1.get_opt(), s2.get(), &message.attributes)
        }
        EndElement => handler.end_element(s0.get_opt(), s1.get_opt(), s2.get()),
        Characters => handler.characters(s0.get()),
        IgnorableWhitespace => handler.ignorable_whitespace(s0.get()),
        ProcessingInstruction => handler.processing_instruction(s0.get(), s1.get_opt()),
        StartPrefixMapping => handler.start_prefix_mapping(s0.get_opt(), s1.get()),
        EndPrefixMapping => handler.end_prefix_mapping(s0.get_opt()),
        SkippedEntity => handler.skipped_entity(s0.get()),
        AttributeDecl => {
            if let Payload::AttributeDecl(atype, default) = &message.payload {
                handler.attribute_decl(s0.get(), s1.get(), atype, default);
            }
        }
        ElementDecl => {
            if let Payload::ContentSpec(content) = &message.payload {
                handler.element_decl(s0.get(), content);
            }
        }
        ExternalEntityDecl => handler.external_entity_decl(s0.get(), s1.get_opt(), s2.get()),
        InternalEntityDecl => handler.internal_entity_decl(s0.get(), s1.get()),
        NotationDecl => handler.notation_decl(s0.get(), s1.get_opt(), s2.get_opt()),
        UnparsedEntityDecl => {
            handler.unparsed_entity_decl(s0.get(), s1.get_opt(), s2.get(), s3.get())
        }
        Comment => handler.comment(s0.get()),
        StartCdata => handler.start_cdata(),
        EndCdata => handler.end_cdata(),
        StartDtd => handler.start_dtd(s0.get(), s1.get_opt(), s2.get_opt()),
        EndDtd => handler.end_dtd(),
        StartEntity => handler.start_entity(s0.get()),
        EndEntity => handler.end_entity(s0.get()),
        ResolveEntity => {
            return Some(
                match handler.resolve_entity(s0.get(), s1.get_opt(), s2.get_opt(), s3.get()) {
                    Ok(source) => Reply::Resolved(source),
                    Err(err) => Reply::Failed(err),
                },
            );
        }
        GetExternalSubset => {
            return Some(match handler.get_external_subset(s0.get(), s1.get_opt()) {
                Ok(source) => Reply::Resolved(source),
                Err(err) => Reply::Failed(err),
            });
        }
        Warning | Error | FatalError => {
            let Payload::Report(report) = &message.payload else {
                return Some(Reply::Ack);
            };
            let report = report.clone();
            let result = match message.kind {
                Warning => handler.warning(report),
                Error => handler.error(report),
                _ => {
                    handler.fatal_error(report);
                    Ok(())
                }
            };
            return Some(match result {
                Ok(()) => Reply::Ack,
                Err(err) => Reply::Failed(err),
            });
        }
    }
    Option::None
}

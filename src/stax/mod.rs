//! A pull cursor over the parser.
//!
//! The parser always runs on a producer task. Each move of the cursor drains queued messages
//! until one of them maps to a visible [`XMLEvent`]. Declarations inside the document type
//! declaration are consumed without being reported.

pub mod events;
mod handler;

use std::{io::Read, sync::Arc, thread::JoinHandle};

use url::Url;

use crate::{
    dtd::ResourceCache,
    error::XMLError,
    queue::{Consumer, dispatch},
    sax::{
        Locator,
        error::SAXParseError,
        handler::{DefaultSAXHandler, EntityResolver},
        parser::{Executor, ParserConfig, ParserOption, open_url, resolve_url, start_producer},
        source::InputSource,
    },
    stax::{
        events::{
            Declaration, EndElement, ProcessingInstruction, StartElement, XMLEvent, XMLEventType,
        },
        handler::XMLStreamReaderHandler,
    },
};

/// ```
/// use xmlweave::stax::{XMLStreamReader, events::XMLEvent};
///
/// let mut reader = XMLStreamReader::default();
/// reader.parse_str("<a xmlns='urn:x'><b/></a>", None).unwrap();
/// let mut names = vec![];
/// loop {
///     match reader.next_tag().unwrap() {
///         XMLEvent::StartElement(start) => names.push(start.name().to_owned()),
///         XMLEvent::Finished => break,
///         _ => {}
///     }
/// }
/// assert_eq!(names, ["a", "b"]);
/// ```
pub struct XMLStreamReader<Resolver: EntityResolver = DefaultSAXHandler> {
    config: ParserConfig,
    cache: Option<Arc<ResourceCache>>,
    executor: Option<Arc<dyn Executor>>,
    consumer: Option<Consumer>,
    producer: Option<JoinHandle<()>>,
    locator: Arc<Locator>,
    handler: XMLStreamReaderHandler<Resolver>,
}

impl<Resolver: EntityResolver> XMLStreamReader<Resolver> {
    /// Start reading a document held in memory.
    pub fn parse_str(&mut self, input: &str, base: Option<&str>) -> Result<(), XMLError> {
        let base_uri = base.map(|base| resolve_url(base, None)).transpose()?;
        self.start(InputSource::from_content(input), base_uri)
    }

    /// Start reading a document from `reader`.
    pub fn parse_reader(
        &mut self,
        reader: impl Read + Send + 'static,
        encoding: Option<&str>,
        base: Option<&str>,
    ) -> Result<(), XMLError> {
        let base_uri = base.map(|base| resolve_url(base, None)).transpose()?;
        let source =
            InputSource::with_buffer_size(reader, encoding, self.config.input_buffer_size())?;
        self.start(source, base_uri)
    }

    /// Start reading the document at `uri`.
    ///
    /// The entity resolver is asked to resolve `uri` as the entity `"[document]"` first.
    pub fn parse_uri(&mut self, uri: &str, encoding: Option<&str>) -> Result<(), XMLError> {
        let url = resolve_url(uri, None)?;
        let mut source = match self.handler.entity_resolver.resolve_entity(
            "[document]",
            None,
            None,
            url.as_str(),
        )? {
            Some(source) => source,
            None => open_url(&url, encoding, self.config.input_buffer_size())?,
        };
        if source.system_id().is_none() {
            source.set_system_id(url.as_str());
        }
        self.start(source, Some(url))
    }

    fn start(&mut self, source: InputSource, base_uri: Option<Url>) -> Result<(), XMLError> {
        self.close();
        let mut config = self.config.clone();
        config.set_option(ParserOption::NamespacePrefixes, true);
        let (consumer, producer) = start_producer(
            &config,
            self.cache.clone(),
            self.executor.as_ref(),
            source,
            base_uri.map(Arc::new),
        )?;
        self.handler.reset();
        self.consumer = Some(consumer);
        self.producer = producer;
        Ok(())
    }

    /// Stop the parser and release the producer.
    ///
    /// After this, the cursor only returns [`XMLEvent::Finished`].
    pub fn close(&mut self) {
        if let Some(mut consumer) = self.consumer.take() {
            consumer.close();
        }
        if let Some(producer) = self.producer.take() {
            producer.join().ok();
        }
        self.handler.event = XMLEventType::Finished;
    }

    /// Move to the next visible event.
    ///
    /// Returns `Ok(false)` at the end of the stream.
    fn advance(&mut self) -> Result<bool, XMLError> {
        if self.handler.event == XMLEventType::Finished {
            return Ok(false);
        }
        self.handler.prepare();
        let Some(consumer) = self.consumer.as_mut() else {
            self.handler.event = XMLEventType::Finished;
            return Ok(false);
        };
        let outcome = loop {
            let reply = match consumer.peek() {
                Ok(Some(message)) => dispatch(message, &mut self.handler, &self.locator),
                Ok(None) => break Ok(false),
                Err(err) => break Err(err),
            };
            if let Some(reply) = reply {
                consumer.reply(reply);
            }
            consumer.remove();
            if self.handler.produced {
                break Ok(true);
            }
        };
        if !matches!(outcome, Ok(true)) {
            self.close();
        }
        outcome
    }

    pub fn next_event(&mut self) -> Result<XMLEvent<'_>, XMLError> {
        self.advance()?;
        Ok(self.create_event())
    }

    /// Skip to the next start tag or end tag.
    pub fn next_tag(&mut self) -> Result<XMLEvent<'_>, XMLError> {
        while self.advance()?
            && !matches!(
                self.handler.event,
                XMLEventType::StartElement | XMLEventType::EndElement
            )
        {}
        Ok(self.create_event())
    }

    fn create_event(&self) -> XMLEvent<'_> {
        let handler = &self.handler;
        match handler.event {
            XMLEventType::None | XMLEventType::Finished => XMLEvent::Finished,
            XMLEventType::StartDocument => XMLEvent::StartDocument,
            XMLEventType::EndDocument => XMLEvent::EndDocument,
            XMLEventType::StartElement => XMLEvent::StartElement(StartElement {
                namespace_name: handler.namespace_name.as_deref(),
                local_name: handler.local_name.as_deref(),
                qname: &handler.text,
                atts: &handler.atts,
            }),
            XMLEventType::EndElement => XMLEvent::EndElement(EndElement {
                namespace_name: handler.namespace_name.as_deref(),
                local_name: handler.local_name.as_deref(),
                qname: &handler.text,
            }),
            XMLEventType::Declaration => XMLEvent::Declaration(Declaration {
                version: &handler.text,
                encoding: handler.data.as_deref(),
                standalone: handler.standalone,
            }),
            XMLEventType::DocumentType => XMLEvent::DocumentType(&handler.text),
            XMLEventType::Characters => XMLEvent::Characters(&handler.text),
            XMLEventType::CDATASection => XMLEvent::CDATASection(&handler.text),
            XMLEventType::StartCDATA => XMLEvent::StartCDATA,
            XMLEventType::EndCDATA => XMLEvent::EndCDATA,
            XMLEventType::Space => XMLEvent::Space(&handler.text),
            XMLEventType::Comment => XMLEvent::Comment(&handler.text),
            XMLEventType::ProcessingInstruction => {
                XMLEvent::ProcessingInstruction(ProcessingInstruction {
                    target: &handler.text,
                    data: handler.data.as_deref(),
                })
            }
            XMLEventType::StartEntity => XMLEvent::StartEntity(&handler.text),
            XMLEventType::EndEntity => XMLEvent::EndEntity(&handler.text),
            XMLEventType::EntityReference => XMLEvent::EntityReference(&handler.text),
        }
    }

    /// The namespace name bound to `prefix` at the current event.
    ///
    /// `None` looks up the default namespace. The bindings of an element stay in scope
    /// until the cursor moves past its end tag.
    pub fn namespace_uri(&self, prefix: Option<&str>) -> Option<&str> {
        self.handler.namespaces.resolve(prefix)
    }

    pub fn line(&self) -> usize {
        self.locator.line()
    }

    pub fn column(&self) -> usize {
        self.locator.column()
    }

    pub fn system_id(&self) -> Arc<str> {
        self.locator.system_id()
    }

    /// The last fatal error reported by the parser, if any.
    pub fn fatal_error(&self) -> Option<&SAXParseError> {
        self.handler.fatal_error.as_ref()
    }

    pub fn entity_resolver(&self) -> &Resolver {
        &self.handler.entity_resolver
    }
}

impl<Resolver: EntityResolver> Drop for XMLStreamReader<Resolver> {
    fn drop(&mut self) {
        self.close();
    }
}

impl Default for XMLStreamReader {
    fn default() -> Self {
        XMLStreamReaderBuilder::new().build()
    }
}

pub struct XMLStreamReaderBuilder<Resolver: EntityResolver = DefaultSAXHandler> {
    config: ParserConfig,
    cache: Option<Arc<ResourceCache>>,
    executor: Option<Arc<dyn Executor>>,
    entity_resolver: Resolver,
}

impl XMLStreamReaderBuilder {
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
            cache: None,
            executor: None,
            entity_resolver: DefaultSAXHandler,
        }
    }
}

impl<Resolver: EntityResolver> XMLStreamReaderBuilder<Resolver> {
    pub fn set_entity_resolver<Other: EntityResolver>(
        self,
        resolver: Other,
    ) -> XMLStreamReaderBuilder<Other> {
        XMLStreamReaderBuilder {
            config: self.config,
            cache: self.cache,
            executor: self.executor,
            entity_resolver: resolver,
        }
    }

    pub fn set_parser_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn enable_option(mut self, option: ParserOption) -> Self {
        self.config.set_option(option, true);
        self
    }

    pub fn disable_option(mut self, option: ParserOption) -> Self {
        self.config.set_option(option, false);
        self
    }

    pub fn set_resource_cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> XMLStreamReader<Resolver> {
        let keep_nsdecl = self.config.is_enable(ParserOption::NamespacePrefixes);
        XMLStreamReader {
            config: self.config,
            cache: self.cache,
            executor: self.executor,
            consumer: None,
            producer: None,
            locator: Arc::new(Locator::default()),
            handler: XMLStreamReaderHandler::new(self.entity_resolver, keep_nsdecl),
        }
    }
}

impl Default for XMLStreamReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

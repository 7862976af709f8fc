use std::{
    borrow::Cow,
    collections::HashMap,
    fs::File,
    io::Read,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::JoinHandle,
};

use log::debug;
use url::Url;

use crate::{
    XMLVersion,
    dtd::{Dtd, ResourceCache},
    error::{XMLError, XMLErrorLevel},
    queue::{Consumer, MessageQueue, QueueSink},
    sax::{
        Locator,
        attributes::Attributes,
        error::SAXParseError,
        handler::{DefaultSAXHandler, SAXHandler},
        source::InputSource,
        stack::{Frame, FrameKind, SourceStack},
    },
};

pub const DEFAULT_ENTITY_EXPANSION_LIMIT: usize = 100_000;
pub const SECURE_ENTITY_EXPANSION_LIMIT: usize = 10_000;
pub const SECURE_PARAMETER_ENTITY_EXPANSION_LIMIT: usize = 1_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParserOption {
    /// Process namespaces.
    Namespaces = 0,
    /// Report namespace declaration attributes in [`Attributes`].
    NamespacePrefixes = 1,
    /// Load external parsed general entities.
    ExternalGeneralEntities = 2,
    /// Load external parameter entities.
    ExternalParameterEntities = 3,
    /// Load the external subset.
    LoadExternalDTD = 4,
    /// Tighten entity expansion limits and deny URL schemes not listed explicitly.
    SecureProcessing = 5,
    /// Treat document type declarations as fatal errors.
    DisallowDoctype = 6,
    /// Use the resource cache if one is set.
    ResultCaching = 7,
    /// Assume that resources with the same public identifier never change.
    PublicIdCaching = 8,
    /// Run the parser on a worker thread and deliver events through a queue.
    WorkerThread = 9,
}

impl std::ops::BitOr<Self> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParserConfig::from_flags((1 << self as i32) | (1 << rhs as i32))
    }
}

impl std::ops::BitOr<ParserConfig> for ParserOption {
    type Output = ParserConfig;

    fn bitor(self, mut rhs: ParserConfig) -> Self::Output {
        rhs.flags |= 1 << self as i32;
        rhs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    flags: u64,
    max_entity_expansions: Option<usize>,
    max_parameter_entity_expansions: Option<usize>,
    queue_capacity: usize,
    input_buffer_size: usize,
    allowed_schemes: Option<Vec<String>>,
}

impl ParserConfig {
    fn from_flags(flags: u64) -> Self {
        Self {
            flags,
            max_entity_expansions: None,
            max_parameter_entity_expansions: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            allowed_schemes: None,
        }
    }

    pub fn is_enable(&self, option: ParserOption) -> bool {
        self.flags & (1 << option as i32) != 0
    }

    pub fn get_option(&self, option: ParserOption) -> bool {
        (self.flags >> option as i32) & 1 != 0
    }

    pub fn set_option(&mut self, option: ParserOption, flag: bool) {
        if flag {
            self.flags |= 1 << (option as i32);
        } else {
            self.flags &= !(1 << (option as i32));
        }
    }

    /// The maximum number of general entity expansions per document.
    ///
    /// Unless set explicitly, this is [`DEFAULT_ENTITY_EXPANSION_LIMIT`], or
    /// [`SECURE_ENTITY_EXPANSION_LIMIT`] under [`ParserOption::SecureProcessing`].
    pub fn max_entity_expansions(&self) -> usize {
        self.max_entity_expansions.unwrap_or(
            if self.is_enable(ParserOption::SecureProcessing) {
                SECURE_ENTITY_EXPANSION_LIMIT
            } else {
                DEFAULT_ENTITY_EXPANSION_LIMIT
            },
        )
    }

    pub fn set_max_entity_expansions(&mut self, limit: usize) {
        self.max_entity_expansions = Some(limit);
    }

    /// The maximum number of parameter entity expansions per document.
    pub fn max_parameter_entity_expansions(&self) -> usize {
        self.max_parameter_entity_expansions.unwrap_or(
            if self.is_enable(ParserOption::SecureProcessing) {
                SECURE_PARAMETER_ENTITY_EXPANSION_LIMIT
            } else {
                DEFAULT_ENTITY_EXPANSION_LIMIT
            },
        )
    }

    pub fn set_max_parameter_entity_expansions(&mut self, limit: usize) {
        self.max_parameter_entity_expansions = Some(limit);
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.queue_capacity = capacity.max(1);
    }

    pub fn input_buffer_size(&self) -> usize {
        self.input_buffer_size
    }

    pub fn set_input_buffer_size(&mut self, size: usize) {
        self.input_buffer_size = size;
    }

    /// URL schemes the parser may load by itself.
    ///
    /// `None` allows all schemes, or none under [`ParserOption::SecureProcessing`].
    pub fn allowed_schemes(&self) -> Option<&[String]> {
        self.allowed_schemes.as_deref()
    }

    pub fn set_allowed_schemes(&mut self, schemes: Option<Vec<String>>) {
        self.allowed_schemes = schemes;
    }

    pub(crate) fn is_scheme_allowed(&self, scheme: &str) -> bool {
        match self.allowed_schemes.as_deref() {
            Some(schemes) => schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)),
            None => !self.is_enable(ParserOption::SecureProcessing),
        }
    }

    /// Options that change the declarations produced from the same DTD text.
    pub(crate) fn signature(&self) -> String {
        let mask = [
            ParserOption::Namespaces,
            ParserOption::ExternalParameterEntities,
            ParserOption::LoadExternalDTD,
            ParserOption::SecureProcessing,
        ]
        .iter()
        .fold(0u64, |mask, &option| mask | (1 << option as i32));
        format!("{:x}", self.flags & mask)
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserOption::Namespaces
            | ParserOption::ExternalGeneralEntities
            | ParserOption::ExternalParameterEntities
            | ParserOption::LoadExternalDTD
            | ParserOption::ResultCaching
            | ParserOption::WorkerThread
    }
}

impl std::ops::BitOr<Self> for ParserConfig {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self.flags |= rhs.flags;
        self
    }
}

impl std::ops::BitOr<ParserOption> for ParserConfig {
    type Output = Self;

    fn bitor(mut self, rhs: ParserOption) -> Self::Output {
        self.flags |= 1 << rhs as i32;
        self
    }
}

impl std::ops::BitOrAssign<ParserOption> for ParserConfig {
    fn bitor_assign(&mut self, rhs: ParserOption) {
        self.flags |= 1 << rhs as i32;
    }
}

impl std::ops::BitOrAssign<Self> for ParserConfig {
    fn bitor_assign(&mut self, rhs: Self) {
        self.flags |= rhs.flags;
    }
}

/// Runs the producer task of a parse in worker-thread mode.
///
/// Without an executor, each parse spawns a thread named `xmlweave-producer`.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Prefix to namespace name. The default namespace is bound to `""`.
pub(crate) type NamespaceMap = HashMap<Box<str>, Arc<str>>;

pub(crate) struct ElementContext {
    pub(crate) qname: Box<str>,
    pub(crate) prefix_length: usize,
    pub(crate) uri: Option<Arc<str>>,
    /// The bindings in scope before this element.
    pub(crate) parent_namespaces: Arc<NamespaceMap>,
    /// Prefixes declared on this element, in declaration order.
    pub(crate) declared_prefixes: Vec<Option<Box<str>>>,
    /// Whitespace-only character data is ignorable.
    pub(crate) element_content: bool,
}

pub struct XMLReader<H: SAXHandler = DefaultSAXHandler> {
    pub handler: H,
    pub(crate) config: ParserConfig,
    pub(crate) cache: Option<Arc<ResourceCache>>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    /// Set for parsers running on a producer thread.
    pub(crate) queue: Option<Arc<MessageQueue>>,

    pub(crate) source: SourceStack,
    pub(crate) locator: Arc<Locator>,

    // Parser Context
    pub(crate) version: XMLVersion,
    pub(crate) standalone: Option<bool>,
    pub(crate) dtd: Option<Arc<Dtd>>,
    pub(crate) elements: Vec<ElementContext>,
    pub(crate) namespaces: Arc<NamespaceMap>,
    pub(crate) attributes: Attributes,
    pub(crate) entity_expansions: usize,
    pub(crate) parameter_entity_expansions: usize,
    pub(crate) fatal_error_occurred: bool,
}

impl<H: SAXHandler> XMLReader<H> {
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn set_parser_config(&mut self, config: ParserConfig) {
        self.config = config;
    }

    pub fn resource_cache(&self) -> Option<&Arc<ResourceCache>> {
        self.cache.as_ref()
    }

    pub fn set_resource_cache(&mut self, cache: Option<Arc<ResourceCache>>) {
        self.cache = cache;
    }

    /// The DTD of the last parsed document.
    pub fn dtd(&self) -> Option<&Arc<Dtd>> {
        self.dtd.as_ref()
    }

    /// Parse a document held in memory.
    ///
    /// Relative URIs in the document are resolved against `base`,
    /// or the current working directory if `base` is `None`.
    pub fn parse_str(&mut self, input: &str, base: Option<&str>) -> Result<(), XMLError> {
        let base_uri = match base.map(|base| resolve_url(base, None)).transpose() {
            Ok(base_uri) => base_uri.map(Arc::new),
            Err(err) => return self.abort(err),
        };
        self.parse_source(InputSource::from_content(input), base_uri)
    }

    /// Parse a document read from `reader`.
    ///
    /// If `encoding` is `None`, the encoding is detected from the document.
    pub fn parse_reader(
        &mut self,
        reader: impl Read + Send + 'static,
        encoding: Option<&str>,
        base: Option<&str>,
    ) -> Result<(), XMLError> {
        let base_uri = match base.map(|base| resolve_url(base, None)).transpose() {
            Ok(base_uri) => base_uri.map(Arc::new),
            Err(err) => return self.abort(err),
        };
        let source =
            InputSource::with_buffer_size(reader, encoding, self.config.input_buffer_size());
        match source {
            Ok(source) => self.parse_source(source, base_uri),
            Err(err) => self.abort(err),
        }
    }

    /// Parse the document at `uri`.
    ///
    /// The handler is asked to resolve `uri` as the entity `"[document]"` first.
    pub fn parse_uri(&mut self, uri: &str, encoding: Option<&str>) -> Result<(), XMLError> {
        let url = match resolve_url(uri, None) {
            Ok(url) => Arc::new(url),
            Err(err) => return self.abort(err),
        };
        let source = match self
            .handler
            .resolve_entity("[document]", None, None, url.as_str())
        {
            Ok(Some(source)) => Ok(source),
            Ok(None) => open_url(&url, encoding, self.config.input_buffer_size()),
            Err(err) => Err(err),
        };
        match source {
            Ok(mut source) => {
                if source.system_id().is_none() {
                    source.set_system_id(url.as_str());
                }
                self.parse_source(source, Some(url))
            }
            Err(err) => self.abort(err),
        }
    }

    /// Report an error that occurred before the parse could start.
    fn abort(&mut self, err: XMLError) -> Result<(), XMLError> {
        self.fatal_error_occurred = false;
        self.handler.set_document_locator(self.locator.clone());
        self.report_fatal_xml_error(err.clone());
        Err(err)
    }

    fn parse_source(
        &mut self,
        source: InputSource,
        base_uri: Option<Arc<Url>>,
    ) -> Result<(), XMLError> {
        if self.config.is_enable(ParserOption::WorkerThread) {
            self.run_threaded(source, base_uri)
        } else {
            self.run(source, base_uri)
        }
    }

    /// Parse on the current thread.
    pub(crate) fn run(
        &mut self,
        mut source: InputSource,
        base_uri: Option<Arc<Url>>,
    ) -> Result<(), XMLError> {
        self.reset_context();
        if source.system_id().is_none()
            && let Some(base_uri) = base_uri.as_ref()
        {
            source.set_system_id(base_uri.as_str());
        }
        let frame = Frame::new(source, FrameKind::Document, None, base_uri, true);
        let mut result = self.source.push(frame);
        if result.is_ok() {
            result = self.parse_document();
        }
        if let Err(err) = result.as_ref()
            && !self.fatal_error_occurred
        {
            self.report_fatal_xml_error(err.clone());
        }
        self.source.clear(self.locator.clone());
        result
    }

    /// Parse on a producer task, and deliver its events to `self.handler` on this thread.
    fn run_threaded(
        &mut self,
        source: InputSource,
        base_uri: Option<Arc<Url>>,
    ) -> Result<(), XMLError> {
        let (mut consumer, handle) = start_producer(
            &self.config,
            self.cache.clone(),
            self.executor.as_ref(),
            source,
            base_uri,
        )?;
        self.handler.set_document_locator(self.locator.clone());
        let result = consumer.run(&mut self.handler, &self.locator);
        self.dtd = consumer.dtd();
        drop(consumer);
        if let Some(handle) = handle {
            handle.join().ok();
        }
        result
    }

    pub(crate) fn reset_context(&mut self) {
        self.version = XMLVersion::default();
        self.standalone = None;
        self.dtd = None;
        self.elements.clear();
        self.namespaces = Arc::new(NamespaceMap::new());
        self.attributes.clear();
        self.entity_expansions = 0;
        self.parameter_entity_expansions = 0;
        self.fatal_error_occurred = false;
        self.source.clear(self.locator.clone());
    }

    pub(crate) fn grow(&mut self) -> Result<(), XMLError> {
        if self.queue.as_ref().is_some_and(|queue| queue.is_closed()) {
            return Err(XMLError::QueueClosed);
        }
        self.source.grow()
    }

    /// Report a fatal error. Only the first one reaches the handler.
    pub(crate) fn report_fatal_error(&mut self, report: SAXParseError) {
        if !self.fatal_error_occurred {
            self.fatal_error_occurred = true;
            self.handler.fatal_error(report);
        }
    }

    /// Report a fatal error for `err` at the current position.
    pub(crate) fn report_fatal_xml_error(&mut self, err: XMLError) -> XMLError {
        let report = SAXParseError {
            message: Cow::Owned(err.to_string()),
            error: err.clone(),
            level: XMLErrorLevel::FatalError,
            line: self.locator.line(),
            column: self.locator.column(),
            system_id: self.locator.system_id(),
            public_id: self.locator.public_id(),
        };
        self.report_fatal_error(report);
        err
    }

    /// `Err` means that the handler escalated the error.
    pub(crate) fn report_error(&mut self, report: SAXParseError) -> Result<(), XMLError> {
        if self.fatal_error_occurred {
            return Ok(());
        }
        self.handler
            .error(report)
            .inspect_err(|_| self.fatal_error_occurred = true)
    }

    /// `Err` means that the handler escalated the warning.
    pub(crate) fn report_warning(&mut self, report: SAXParseError) -> Result<(), XMLError> {
        if self.fatal_error_occurred {
            return Ok(());
        }
        self.handler
            .warning(report)
            .inspect_err(|_| self.fatal_error_occurred = true)
    }
}

/// Start a parser on a producer task and return the consuming side of its queue.
///
/// The thread handle is returned if no executor is supplied.
pub(crate) fn start_producer(
    config: &ParserConfig,
    cache: Option<Arc<ResourceCache>>,
    executor: Option<&Arc<dyn Executor>>,
    source: InputSource,
    base_uri: Option<Arc<Url>>,
) -> Result<(Consumer, Option<JoinHandle<()>>), XMLError> {
    let queue = Arc::new(MessageQueue::new(config.queue_capacity()));
    let mut config = config.clone();
    config.set_option(ParserOption::WorkerThread, false);
    let mut producer = XMLReaderBuilder::new()
        .set_handler(QueueSink::new(queue.clone()))
        .set_parser_config(config)
        .build();
    producer.cache = cache;
    producer.queue = Some(queue.clone());

    let finish = queue.clone();
    let task = Box::new(move || {
        debug!("producer started");
        let result = catch_unwind(AssertUnwindSafe(|| producer.run(source, base_uri)));
        let result = match result {
            Ok(result) => {
                finish.set_dtd(producer.dtd.take());
                result
            }
            Err(_) => Err(XMLError::ProducerPanicked),
        };
        debug!("producer finished: {result:?}");
        finish.finish(result);
    });
    let handle = match executor {
        Some(executor) => {
            executor.execute(task);
            None
        }
        None => Some(
            std::thread::Builder::new()
                .name("xmlweave-producer".to_owned())
                .spawn(task)?,
        ),
    };
    Ok((Consumer::new(queue), handle))
}

/// Open a `file:` URL.
///
/// # Errors
/// Other schemes fail with [`XMLError::ParserUnsupportedScheme`].
pub(crate) fn open_url(
    url: &Url,
    encoding: Option<&str>,
    buffer_size: usize,
) -> Result<InputSource, XMLError> {
    if url.scheme() != "file" {
        return Err(XMLError::ParserUnsupportedScheme);
    }
    let path = url
        .to_file_path()
        .map_err(|_| XMLError::ParserUnsupportedScheme)?;
    let file = File::open(path)?;
    let mut source = InputSource::with_buffer_size(file, encoding, buffer_size)?;
    source.set_system_id(url.as_str());
    Ok(source)
}

/// Resolve `uri` against `base`, or against the current working directory if `base` is `None`
/// and `uri` is relative.
pub(crate) fn resolve_url(uri: &str, base: Option<&Url>) -> Result<Url, XMLError> {
    if let Some(base) = base {
        return Ok(base.join(uri)?);
    }
    match Url::parse(uri) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let cwd = std::env::current_dir()?;
            let base = Url::from_directory_path(cwd).map_err(|_| XMLError::URLBaseNotAbsolute)?;
            Ok(base.join(uri)?)
        }
        Err(err) => Err(err.into()),
    }
}

pub struct XMLReaderBuilder<H: SAXHandler = DefaultSAXHandler> {
    reader: XMLReader<H>,
}

impl XMLReaderBuilder {
    pub fn new() -> Self {
        let locator = Arc::new(Locator::new("".into(), None, 1, 1));
        Self {
            reader: XMLReader {
                handler: DefaultSAXHandler,
                config: ParserConfig::default(),
                cache: None,
                executor: None,
                queue: None,
                source: SourceStack::new(locator.clone()),
                locator,
                version: XMLVersion::default(),
                standalone: None,
                dtd: None,
                elements: vec![],
                namespaces: Arc::new(NamespaceMap::new()),
                attributes: Attributes::new(),
                entity_expansions: 0,
                parameter_entity_expansions: 0,
                fatal_error_occurred: false,
            },
        }
    }
}

impl Default for XMLReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SAXHandler> XMLReaderBuilder<H> {
    pub fn set_handler<I: SAXHandler>(self, handler: I) -> XMLReaderBuilder<I> {
        let reader = self.reader;
        XMLReaderBuilder {
            reader: XMLReader {
                handler,
                config: reader.config,
                cache: reader.cache,
                executor: reader.executor,
                queue: reader.queue,
                source: reader.source,
                locator: reader.locator,
                version: reader.version,
                standalone: reader.standalone,
                dtd: reader.dtd,
                elements: reader.elements,
                namespaces: reader.namespaces,
                attributes: reader.attributes,
                entity_expansions: reader.entity_expansions,
                parameter_entity_expansions: reader.parameter_entity_expansions,
                fatal_error_occurred: reader.fatal_error_occurred,
            },
        }
    }

    pub fn enable_option(mut self, option: ParserOption) -> Self {
        self.reader.config.set_option(option, true);
        self
    }

    pub fn disable_option(mut self, option: ParserOption) -> Self {
        self.reader.config.set_option(option, false);
        self
    }

    pub fn set_parser_config(mut self, config: ParserConfig) -> Self {
        self.reader.config = config;
        self
    }

    pub fn set_resource_cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.reader.cache = Some(cache);
        self
    }

    pub fn set_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.reader.executor = Some(executor);
        self
    }

    pub fn build(self) -> XMLReader<H> {
        self.reader
    }
}

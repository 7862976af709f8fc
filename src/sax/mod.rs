pub mod attributes;
pub mod error;
pub mod handler;
pub mod parser;
pub mod source;
pub(crate) mod stack;

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicUsize, Ordering},
};

pub use attributes::{Attribute, Attributes};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    CDATA,
    ID,
    IDREF,
    IDREFS,
    ENTITY,
    ENTITIES,
    NMTOKEN,
    NMTOKENS,
    NOTATION(Vec<Box<str>>),
    Enumeration(Vec<Box<str>>),
}

impl AttributeType {
    /// Values of every type except `CDATA` are normalized further after expansion: whitespace
    /// runs collapse to a single space and leading and trailing spaces are removed.
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::CDATA)
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CDATA => write!(f, "CDATA"),
            Self::ID => write!(f, "ID"),
            Self::IDREF => write!(f, "IDREF"),
            Self::IDREFS => write!(f, "IDREFS"),
            Self::ENTITY => write!(f, "ENTITY"),
            Self::ENTITIES => write!(f, "ENTITIES"),
            Self::NMTOKEN => write!(f, "NMTOKEN"),
            Self::NMTOKENS => write!(f, "NMTOKENS"),
            Self::NOTATION(names) => write!(f, "NOTATION ({})", names.join("|")),
            Self::Enumeration(tokens) => write!(f, "({})", tokens.join("|")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultDecl {
    REQUIRED,
    IMPLIED,
    FIXED(Box<str>),
    None(Box<str>),
}

impl DefaultDecl {
    /// The default value, if the declaration provides one.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::FIXED(value) | Self::None(value) => Some(value),
            Self::REQUIRED | Self::IMPLIED => None,
        }
    }
}

impl std::fmt::Display for DefaultDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::REQUIRED => write!(f, "#REQUIRED"),
            Self::IMPLIED => write!(f, "#IMPLIED"),
            Self::FIXED(value) => write!(f, "#FIXED \"{value}\""),
            Self::None(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentSpec {
    EMPTY,
    ANY,
    /// Names allowed together with `#PCDATA`. Empty for `(#PCDATA)`.
    Mixed(Vec<Box<str>>),
    /// The children content model, with whitespaces removed.
    Children(Box<str>),
}

impl std::fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EMPTY => write!(f, "EMPTY"),
            Self::ANY => write!(f, "ANY"),
            Self::Mixed(names) if names.is_empty() => write!(f, "(#PCDATA)"),
            Self::Mixed(names) => write!(f, "(#PCDATA|{})*", names.join("|")),
            Self::Children(model) => write!(f, "{model}"),
        }
    }
}

/// The position of the parser.
///
/// A locator is shared with the handler through
/// [`SAXHandler::set_document_locator`](crate::sax::handler::SAXHandler::set_document_locator).
/// Its values are only meaningful during a callback.
#[derive(Debug, Default)]
pub struct Locator {
    system_id: RwLock<Arc<str>>,
    public_id: RwLock<Option<Arc<str>>>,
    line: AtomicUsize,
    column: AtomicUsize,
}

impl Locator {
    pub(crate) fn new(
        system_id: Arc<str>,
        public_id: Option<Arc<str>>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            system_id: RwLock::new(system_id),
            public_id: RwLock::new(public_id),
            line: line.into(),
            column: column.into(),
        }
    }

    pub fn system_id(&self) -> Arc<str> {
        self.system_id.read().unwrap().clone()
    }

    pub fn public_id(&self) -> Option<Arc<str>> {
        self.public_id.read().unwrap().clone()
    }

    pub fn line(&self) -> usize {
        self.line.load(Ordering::Acquire)
    }

    pub fn column(&self) -> usize {
        self.column.load(Ordering::Acquire)
    }

    pub(crate) fn set_system_id(&self, system_id: Arc<str>) {
        let mut lock = self.system_id.write().unwrap();
        if !Arc::ptr_eq(&lock, &system_id) {
            *lock = system_id;
        }
    }

    pub(crate) fn set_public_id(&self, public_id: Option<Arc<str>>) {
        *self.public_id.write().unwrap() = public_id;
    }

    pub(crate) fn set_line(&self, line: usize) {
        self.line.store(line, Ordering::Release);
    }

    pub(crate) fn set_column(&self, column: usize) {
        self.column.store(column, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> LocatorSnapshot {
        LocatorSnapshot {
            system_id: self.system_id(),
            public_id: self.public_id(),
            line: self.line(),
            column: self.column(),
        }
    }

    pub(crate) fn restore(&self, snapshot: &LocatorSnapshot) {
        self.set_system_id(snapshot.system_id.clone());
        self.set_public_id(snapshot.public_id.clone());
        self.set_line(snapshot.line);
        self.set_column(snapshot.column);
    }
}

/// A copy of [`Locator`] values carried by queued events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LocatorSnapshot {
    pub(crate) system_id: Arc<str>,
    pub(crate) public_id: Option<Arc<str>>,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

//! Declarations collected from document type declarations.
//!
//! A [`Dtd`] is open while its subsets are parsed. Once closed it is immutable and can be
//! shared across parses through [`ResourceCache`](crate::dtd::cache::ResourceCache).

pub mod cache;
pub mod murmur;

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, LazyLock},
};

use indexmap::IndexMap;
use url::Url;

pub use cache::ResourceCache;

use crate::{
    error::XMLError,
    sax::{AttributeType, ContentSpec, DefaultDecl, handler::SAXHandler},
};

/// An entity or a reference target.
///
/// Entities are immutable once constructed.
/// The parser compares them by identity (`Arc::ptr_eq`) to detect recursive references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A character reference such as `&#x20;`.
    Character(char),
    /// One of `lt`, `gt`, `amp`, `apos` and `quot`.
    Predefined {
        name: &'static str,
        value: &'static str,
    },
    Internal {
        name: Box<str>,
        parameter: bool,
        /// The literal entity value after parameter entity and character reference expansion.
        value: Arc<str>,
        base_uri: Option<Arc<Url>>,
        external_markup: bool,
    },
    External {
        name: Box<str>,
        parameter: bool,
        public_id: Option<Box<str>>,
        system_id: Box<str>,
        base_uri: Option<Arc<Url>>,
        /// `Some` for unparsed entities.
        notation: Option<Box<str>>,
        external_markup: bool,
    },
    /// The external subset, handled as an anonymous parameter entity.
    DtdPseudo {
        public_id: Option<Box<str>>,
        system_id: Option<Box<str>>,
        base_uri: Option<Arc<Url>>,
    },
    /// A referenced name that could not be resolved.
    Invalid { name: Box<str> },
}

static PREDEFINED: LazyLock<[Arc<Entity>; 5]> = LazyLock::new(|| {
    [
        ("lt", "<"),
        ("gt", ">"),
        ("amp", "&"),
        ("apos", "'"),
        ("quot", "\""),
    ]
    .map(|(name, value)| Arc::new(Entity::Predefined { name, value }))
});

impl Entity {
    /// Get the predefined entity named `name`.
    pub fn predefined(name: &str) -> Option<Arc<Entity>> {
        PREDEFINED.iter().find(|e| e.name() == name).cloned()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Character(_) => "",
            Self::Predefined { name, .. } => name,
            Self::Internal { name, .. } | Self::External { name, .. } => name,
            Self::DtdPseudo { .. } => "[dtd]",
            Self::Invalid { name } => name,
        }
    }

    pub fn is_parameter(&self) -> bool {
        match self {
            Self::Internal { parameter, .. } | Self::External { parameter, .. } => *parameter,
            Self::DtdPseudo { .. } => true,
            _ => false,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. } | Self::DtdPseudo { .. })
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(
            self,
            Self::External {
                notation: Some(_),
                ..
            }
        )
    }

    /// Check if this entity is declared in the external subset or an external parameter entity.
    pub fn is_declared_in_external_markup(&self) -> bool {
        match self {
            Self::Internal {
                external_markup, ..
            }
            | Self::External {
                external_markup, ..
            } => *external_markup,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: Box<str>,
    pub atype: AttributeType,
    pub default: DefaultDecl,
    pub external_markup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: Box<str>,
    /// `None` if only attribute-list declarations have been seen for this element.
    pub content: Option<ContentSpec>,
    pub attributes: IndexMap<Box<str>, AttributeDecl>,
    pub external_markup: bool,
    has_id: bool,
}

impl ElementDecl {
    /// Check if this element may contain character data.
    ///
    /// Whitespace in elements without text is reported as ignorable whitespace.
    pub fn has_text(&self) -> bool {
        !matches!(
            self.content,
            Some(ContentSpec::Children(_)) | Some(ContentSpec::EMPTY)
        )
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    pub name: Box<str>,
    pub public_id: Option<Box<str>>,
    pub system_id: Option<Box<str>>,
}

/// The result of [`Dtd::add_attribute_decl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttlistResult {
    Added,
    /// The attribute already has a declaration. The first one is binding.
    Duplicate,
    /// The element already has an `ID` attribute.
    MultipleId,
}

/// A declaration event, recorded so that a cached DTD can be reported again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupDecl {
    Element {
        name: Box<str>,
        content: ContentSpec,
    },
    Attribute {
        element: Box<str>,
        name: Box<str>,
        atype: AttributeType,
        default: DefaultDecl,
    },
    InternalEntity {
        name: Box<str>,
        value: Box<str>,
    },
    ExternalEntity {
        name: Box<str>,
        public_id: Option<Box<str>>,
        system_id: Box<str>,
    },
    UnparsedEntity {
        name: Box<str>,
        public_id: Option<Box<str>>,
        system_id: Box<str>,
        notation: Box<str>,
    },
    Notation {
        name: Box<str>,
        public_id: Option<Box<str>>,
        system_id: Option<Box<str>>,
    },
    Comment(Box<str>),
    ProcessingInstruction {
        target: Box<str>,
        data: Option<Box<str>>,
    },
    StartEntity(Box<str>),
    EndEntity(Box<str>),
}

impl MarkupDecl {
    /// Report this declaration to `handler`.
    pub fn replay<H: SAXHandler + ?Sized>(&self, handler: &mut H) {
        match self {
            Self::Element { name, content } => handler.element_decl(name, content),
            Self::Attribute {
                element,
                name,
                atype,
                default,
            } => handler.attribute_decl(element, name, atype, default),
            Self::InternalEntity { name, value } => handler.internal_entity_decl(name, value),
            Self::ExternalEntity {
                name,
                public_id,
                system_id,
            } => handler.external_entity_decl(name, public_id.as_deref(), system_id),
            Self::UnparsedEntity {
                name,
                public_id,
                system_id,
                notation,
            } => handler.unparsed_entity_decl(name, public_id.as_deref(), system_id, notation),
            Self::Notation {
                name,
                public_id,
                system_id,
            } => handler.notation_decl(name, public_id.as_deref(), system_id.as_deref()),
            Self::Comment(data) => handler.comment(data),
            Self::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data.as_deref())
            }
            Self::StartEntity(name) => handler.start_entity(name),
            Self::EndEntity(name) => handler.end_entity(name),
        }
    }
}

/// An external resource read while a DTD was built.
///
/// A cached DTD is reused only while every dependency is unchanged. Dependencies identified
/// by a file URN are checked by their modification time. Others are fetched again and
/// compared by `fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// `"[dtd]"` for the external subset, `"%name"` for parameter entities.
    pub name: Box<str>,
    pub public_id: Option<Box<str>>,
    pub system_id: Box<str>,
    pub base_uri: Option<Arc<Url>>,
    /// The identity URN, if the resource has one.
    pub urn: Option<Box<str>>,
    /// The content fingerprint.
    pub fingerprint: Box<str>,
}

#[derive(Debug, Clone, Default)]
pub struct Dtd {
    name: Box<str>,
    public_id: Option<Box<str>>,
    system_id: Option<Box<str>>,
    base_uri: Option<Arc<Url>>,
    general_entities: HashMap<Box<str>, Arc<Entity>>,
    parameter_entities: HashMap<Box<str>, Arc<Entity>>,
    elements: IndexMap<Box<str>, ElementDecl>,
    notations: IndexMap<Box<str>, Notation>,
    declarations: Vec<MarkupDecl>,
    dependencies: Vec<Dependency>,
    has_external_subset: bool,
    has_pe_reference: bool,
    closed: bool,
}

impl Dtd {
    pub fn new(
        name: impl Into<Box<str>>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base_uri: Option<Arc<Url>>,
    ) -> Self {
        Self {
            name: name.into(),
            public_id: public_id.map(Into::into),
            system_id: system_id.map(Into::into),
            base_uri,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Check if the document type declaration refers to an external subset.
    ///
    /// The subset need not have been read.
    pub fn has_external_subset(&self) -> bool {
        self.has_external_subset
    }

    /// Check if any parameter entity reference has been seen.
    pub fn has_pe_reference(&self) -> bool {
        self.has_pe_reference
    }

    pub fn general_entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.general_entities.get(name)
    }

    pub fn parameter_entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.parameter_entities.get(name)
    }

    pub fn element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementDecl> {
        self.elements.values()
    }

    pub fn notation(&self, name: &str) -> Option<&Notation> {
        self.notations.get(name)
    }

    /// Declarations in the order they were reported.
    pub fn declarations(&self) -> &[MarkupDecl] {
        &self.declarations
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn check_open(&self) -> Result<(), XMLError> {
        if self.closed {
            return Err(XMLError::DtdClosed);
        }
        Ok(())
    }

    pub(crate) fn set_has_external_subset(&mut self) -> Result<(), XMLError> {
        self.check_open()?;
        self.has_external_subset = true;
        Ok(())
    }

    pub(crate) fn set_has_pe_reference(&mut self) -> Result<(), XMLError> {
        self.check_open()?;
        self.has_pe_reference = true;
        Ok(())
    }

    /// Register an entity.
    ///
    /// Returns `Ok(false)` if an entity with the same name already exists.
    /// Declarations of predefined entities are accepted but never replace them.
    pub(crate) fn add_entity(&mut self, entity: Entity) -> Result<bool, XMLError> {
        self.check_open()?;
        let map = if entity.is_parameter() {
            &mut self.parameter_entities
        } else {
            &mut self.general_entities
        };
        match map.entry(entity.name().into()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(entity));
                Ok(true)
            }
        }
    }

    /// Register an element type declaration.
    ///
    /// Returns `Ok(false)` if the element has already been declared.
    pub(crate) fn add_element_decl(
        &mut self,
        name: &str,
        content: ContentSpec,
        external_markup: bool,
    ) -> Result<bool, XMLError> {
        self.check_open()?;
        let decl = self.elements.entry(name.into()).or_insert_with(|| ElementDecl {
            name: name.into(),
            ..Default::default()
        });
        if decl.content.is_some() {
            return Ok(false);
        }
        decl.content = Some(content);
        decl.external_markup = external_markup;
        Ok(true)
    }

    pub(crate) fn add_attribute_decl(
        &mut self,
        element: &str,
        attribute: AttributeDecl,
    ) -> Result<AttlistResult, XMLError> {
        self.check_open()?;
        let decl = self
            .elements
            .entry(element.into())
            .or_insert_with(|| ElementDecl {
                name: element.into(),
                ..Default::default()
            });
        if decl.attributes.contains_key(&attribute.name) {
            return Ok(AttlistResult::Duplicate);
        }
        if attribute.atype == AttributeType::ID {
            if decl.has_id {
                return Ok(AttlistResult::MultipleId);
            }
            decl.has_id = true;
        }
        decl.attributes.insert(attribute.name.clone(), attribute);
        Ok(AttlistResult::Added)
    }

    /// Returns `Ok(false)` if the notation has already been declared.
    pub(crate) fn add_notation(&mut self, notation: Notation) -> Result<bool, XMLError> {
        self.check_open()?;
        match self.notations.entry(notation.name.clone()) {
            indexmap::map::Entry::Occupied(_) => Ok(false),
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(notation);
                Ok(true)
            }
        }
    }

    pub(crate) fn record(&mut self, decl: MarkupDecl) -> Result<(), XMLError> {
        self.check_open()?;
        self.declarations.push(decl);
        Ok(())
    }

    pub(crate) fn add_dependency(&mut self, dependency: Dependency) -> Result<(), XMLError> {
        self.check_open()?;
        self.dependencies.push(dependency);
        Ok(())
    }

    /// Freeze this DTD. Further modification fails with [`XMLError::DtdClosed`].
    pub(crate) fn close(&mut self) {
        self.declarations.shrink_to_fit();
        self.dependencies.shrink_to_fit();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(name: &str, value: &str) -> Entity {
        Entity::Internal {
            name: name.into(),
            parameter: false,
            value: value.into(),
            base_uri: None,
            external_markup: false,
        }
    }

    #[test]
    fn first_entity_binding_wins() {
        let mut dtd = Dtd::new("a", None, None, None);
        assert!(dtd.add_entity(internal("e", "1")).unwrap());
        assert!(!dtd.add_entity(internal("e", "2")).unwrap());
        match dtd.general_entity("e").map(|e| e.as_ref()) {
            Some(Entity::Internal { value, .. }) => assert_eq!(value.as_ref(), "1"),
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn parameter_and_general_entities_are_separated() {
        let mut dtd = Dtd::new("a", None, None, None);
        let pe = Entity::Internal {
            name: "e".into(),
            parameter: true,
            value: "x".into(),
            base_uri: None,
            external_markup: false,
        };
        assert!(dtd.add_entity(pe).unwrap());
        assert!(dtd.add_entity(internal("e", "y")).unwrap());
        assert!(dtd.parameter_entity("e").unwrap().is_parameter());
        assert!(!dtd.general_entity("e").unwrap().is_parameter());
    }

    #[test]
    fn single_id_attribute_per_element() {
        let mut dtd = Dtd::new("a", None, None, None);
        let decl = |name: &str| AttributeDecl {
            name: name.into(),
            atype: AttributeType::ID,
            default: DefaultDecl::IMPLIED,
            external_markup: false,
        };
        assert_eq!(
            dtd.add_attribute_decl("a", decl("id")).unwrap(),
            AttlistResult::Added
        );
        assert_eq!(
            dtd.add_attribute_decl("a", decl("id")).unwrap(),
            AttlistResult::Duplicate
        );
        assert_eq!(
            dtd.add_attribute_decl("a", decl("id2")).unwrap(),
            AttlistResult::MultipleId
        );
        // An attribute-list declaration alone does not declare the element.
        assert!(dtd.element("a").unwrap().content.is_none());
        assert!(dtd.add_element_decl("a", ContentSpec::EMPTY, false).unwrap());
        assert!(!dtd.add_element_decl("a", ContentSpec::ANY, false).unwrap());
    }

    #[test]
    fn closed_dtd_rejects_modification() {
        let mut dtd = Dtd::new("a", None, None, None);
        dtd.close();
        assert!(matches!(
            dtd.add_entity(internal("e", "1")),
            Err(XMLError::DtdClosed)
        ));
        assert!(matches!(
            dtd.record(MarkupDecl::Comment("c".into())),
            Err(XMLError::DtdClosed)
        ));
    }

    #[test]
    fn predefined_entities() {
        let lt = Entity::predefined("lt").unwrap();
        assert_eq!(
            *lt,
            Entity::Predefined {
                name: "lt",
                value: "<"
            }
        );
        assert!(Arc::ptr_eq(&lt, &Entity::predefined("lt").unwrap()));
        assert!(Entity::predefined("nbsp").is_none());
    }
}

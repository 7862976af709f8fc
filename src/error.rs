use std::sync::Arc;

use thiserror::Error;

use crate::encoding::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XMLErrorLevel {
    FatalError,
    Error,
    Warning,
}

impl std::fmt::Display for XMLErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::FatalError => write!(f, "fatal error"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XMLErrorDomain {
    Parser,
    Namespace,
    Cache,
    Queue,
}

impl std::fmt::Display for XMLErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Parser => write!(f, "parser"),
            Self::Namespace => write!(f, "namespace"),
            Self::Cache => write!(f, "cache"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum XMLError {
    // general errors
    #[error("internal error")]
    InternalError,
    // parser errors
    #[error("unsupported encoding")]
    ParserUnsupportedEncoding,
    #[error("unsupported XML version")]
    ParserUnsupportedXMLVersion,
    #[error("XML version number is too long")]
    ParserTooLongXMLVersionNumber,
    #[error("encoding name is too long")]
    ParserTooLongEncodingName,
    #[error("empty name")]
    ParserEmptyName,
    #[error("empty QName")]
    ParserEmptyQName,
    #[error("empty Nmtoken")]
    ParserEmptyNmtoken,
    #[error("invalid name start character")]
    ParserInvalidNameStartChar,
    #[error("invalid QName")]
    ParserInvalidQName,
    #[error("literal is not quoted correctly")]
    ParserIncorrectLiteralQuotation,
    #[error("invalid system literal")]
    ParserInvalidSystemLiteral,
    #[error("system literal contains a fragment identifier")]
    ParserSystemLiteralWithFragment,
    #[error("invalid public ID literal")]
    ParserInvalidPubidLiteral,
    #[error("invalid attribute value")]
    ParserInvalidAttValue,
    #[error("invalid external ID")]
    ParserInvalidExternalID,
    #[error("invalid character")]
    ParserInvalidCharacter,
    #[error("invalid XML declaration")]
    ParserInvalidXMLDecl,
    #[error("invalid text declaration")]
    ParserInvalidTextDecl,
    #[error("invalid XML version")]
    ParserInvalidXMLVersion,
    #[error("invalid encoding name")]
    ParserInvalidEncodingName,
    #[error("invalid standalone document declaration")]
    ParserInvalidSDDecl,
    #[error("invalid comment")]
    ParserInvalidComment,
    #[error("invalid CDATA section")]
    ParserInvalidCDSect,
    #[error("standalone document refers to external markup")]
    ParserInvalidStandaloneDocument,
    #[error("invalid processing instruction")]
    ParserInvalidProcessingInstruction,
    #[error("unacceptable processing instruction target")]
    ParserUnacceptablePITarget,
    #[error("']]>' is not allowed in character data")]
    ParserUnacceptablePatternInCharData,
    #[error("invalid document type declaration")]
    ParserInvalidDoctypeDecl,
    #[error("document type declaration is disallowed")]
    ParserDoctypeDisallowed,
    #[error("multiple document type declarations")]
    ParserMultipleDoctypeDecl,
    #[error("invalid element type declaration")]
    ParserInvalidElementDecl,
    #[error("duplicate element type declaration")]
    ParserDuplicateElementDecl,
    #[error("duplicate element type in mixed content")]
    ParserDuplicateMixedContent,
    #[error("invalid attribute-list declaration")]
    ParserInvalidAttlistDecl,
    #[error("duplicate attribute-list declaration")]
    ParserDuplicateAttlistDecl,
    #[error("multiple ID attributes are declared for an element")]
    ParserMultipleIDAttributePerElement,
    #[error("ID attribute must have a declared default of #IMPLIED or #REQUIRED")]
    ParserInvalidIDAttributeDefault,
    #[error("invalid attribute default")]
    ParserInvalidAttributeDefault,
    #[error("invalid entity declaration")]
    ParserInvalidEntityDecl,
    #[error("duplicate entity declaration")]
    ParserDuplicateEntityDecl,
    #[error("invalid notation declaration")]
    ParserInvalidNotationDecl,
    #[error("duplicate notation declaration")]
    ParserDuplicateNotationDecl,
    #[error("invalid conditional section")]
    ParserInvalidConditionalSect,
    #[error("invalid start tag or empty element tag")]
    ParserInvalidStartOrEmptyTag,
    #[error("invalid end tag")]
    ParserInvalidEndTag,
    #[error("start tag is not closed")]
    ParserUnclosedStartTag,
    #[error("end tag does not match start tag")]
    ParserMismatchElementType,
    #[error("duplicate attributes")]
    ParserDuplicateAttributes,
    #[error("invalid character reference")]
    ParserInvalidCharacterReference,
    #[error("invalid entity reference")]
    ParserInvalidEntityReference,
    #[error("entity is not declared")]
    ParserEntityNotFound,
    #[error("undefined parameter entity")]
    ParserUndefinedParameterEntity,
    #[error("entity refers to itself")]
    ParserEntityRecursion,
    #[error("entity is nested incorrectly")]
    ParserEntityIncorrectNesting,
    #[error("reference to an unparsed entity")]
    ParserUnparsedEntityReference,
    #[error("parameter entity reference is not allowed in markup of the internal subset")]
    ParserInvalidPEReferenceInInternalSubset,
    #[error("entity expansion limit exceeded")]
    ParserEntityExpansionLimitExceeded,
    #[error("parameter entity expansion limit exceeded")]
    ParserParameterEntityExpansionLimitExceeded,
    #[error("access to external resource is denied")]
    ParserExternalAccessDenied,
    #[error("unsupported URL scheme")]
    ParserUnsupportedScheme,
    #[error("unacceptable namespace name")]
    ParserUnacceptableNamespaceName,
    #[error("undefined namespace prefix")]
    ParserUndefinedNamespace,
    #[error("unexpected document content")]
    ParserUnexpectedDocumentContent,
    #[error("unexpected end of input")]
    ParserUnexpectedEOF,
    // DTD and cache errors
    #[error("DTD must be closed before it is cached")]
    CacheDtdNotClosed,
    #[error("DTD is already closed")]
    DtdClosed,
    // concurrency errors
    #[error("event queue is closed")]
    QueueClosed,
    #[error("parser thread panicked")]
    ProducerPanicked,
    // I/O errors
    #[error("I/O error: {0}")]
    IOError(Arc<std::io::Error>),
    // encoding errors
    #[error("decode error: {0}")]
    DecodeError(DecodeError),
    // URL errors
    #[error("URL parse error: {0}")]
    URLParseError(#[from] url::ParseError),
    #[error("base URL is not absolute")]
    URLBaseNotAbsolute,
}

impl XMLError {
    pub fn domain(&self) -> XMLErrorDomain {
        match self {
            Self::ParserUnacceptableNamespaceName | Self::ParserUndefinedNamespace => {
                XMLErrorDomain::Namespace
            }
            Self::CacheDtdNotClosed | Self::DtdClosed => XMLErrorDomain::Cache,
            Self::QueueClosed | Self::ProducerPanicked => XMLErrorDomain::Queue,
            _ => XMLErrorDomain::Parser,
        }
    }
}

impl From<std::io::Error> for XMLError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(Arc::new(value))
    }
}

impl From<DecodeError> for XMLError {
    fn from(value: DecodeError) -> Self {
        Self::DecodeError(value)
    }
}

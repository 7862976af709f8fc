use crate::sax::attributes::Attributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum XMLEventType {
    #[default]
    None,
    StartDocument,
    EndDocument,
    StartElement,
    EndElement,
    Declaration,
    DocumentType,
    Characters,
    CDATASection,
    StartCDATA,
    EndCDATA,
    Space,
    Comment,
    ProcessingInstruction,
    StartEntity,
    EndEntity,
    EntityReference,
    Finished,
}

/// The state of an [`XMLStreamReader`](crate::stax::XMLStreamReader) after it moves.
#[derive(Debug, Clone, Copy)]
pub enum XMLEvent<'a> {
    StartDocument,
    EndDocument,
    StartElement(StartElement<'a>),
    EndElement(EndElement<'a>),
    Declaration(Declaration<'a>),
    /// The document type declaration has been read. Its declarations are not reported.
    DocumentType(&'a str),
    Characters(&'a str),
    /// Character data in a CDATA section.
    CDATASection(&'a str),
    StartCDATA,
    EndCDATA,
    /// Whitespace-only character data in element content.
    Space(&'a str),
    Comment(&'a str),
    ProcessingInstruction(ProcessingInstruction<'a>),
    StartEntity(&'a str),
    EndEntity(&'a str),
    /// A reference to an entity that is not read.
    EntityReference(&'a str),
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct StartElement<'a> {
    pub(super) namespace_name: Option<&'a str>,
    pub(super) local_name: Option<&'a str>,
    pub(super) qname: &'a str,
    pub(super) atts: &'a Attributes,
}

impl StartElement<'_> {
    pub fn name(&self) -> &str {
        self.qname
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name
    }

    pub fn prefix(&self) -> Option<&str> {
        prefix_of(self.qname, self.local_name)
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_name
    }

    pub fn attributes(&self) -> &Attributes {
        self.atts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndElement<'a> {
    pub(super) namespace_name: Option<&'a str>,
    pub(super) local_name: Option<&'a str>,
    pub(super) qname: &'a str,
}

impl EndElement<'_> {
    pub fn name(&self) -> &str {
        self.qname
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name
    }

    pub fn prefix(&self) -> Option<&str> {
        prefix_of(self.qname, self.local_name)
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_name
    }
}

fn prefix_of<'a>(qname: &'a str, local_name: Option<&str>) -> Option<&'a str> {
    let prefix_len = qname.len() - local_name?.len();
    (prefix_len > 0).then_some(&qname[..prefix_len - 1])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration<'a> {
    pub(super) version: &'a str,
    pub(super) encoding: Option<&'a str>,
    pub(super) standalone: Option<bool>,
}

impl Declaration<'_> {
    /// The version as written in the XML declaration.
    pub fn version(&self) -> &str {
        self.version
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding
    }

    /// If explicitly set to `standalone='yes'`, returns `true`.  \
    /// If `standalone='no'` or no standalone declaration exists, returns `false`.
    pub fn is_standalone(&self) -> bool {
        self.standalone == Some(true)
    }

    pub fn standalone(&self) -> Option<bool> {
        self.standalone
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingInstruction<'a> {
    pub(super) target: &'a str,
    pub(super) data: Option<&'a str>,
}

impl ProcessingInstruction<'_> {
    pub fn target(&self) -> &str {
        self.target
    }

    pub fn data(&self) -> Option<&str> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_prefix() {
        let atts = Attributes::new();
        let start = StartElement {
            namespace_name: Some("urn:a"),
            local_name: Some("b"),
            qname: "a:b",
            atts: &atts,
        };
        assert_eq!(start.prefix(), Some("a"));
        let end = EndElement {
            namespace_name: None,
            local_name: Some("b"),
            qname: "b",
        };
        assert_eq!(end.prefix(), None);
        let end = EndElement {
            namespace_name: None,
            local_name: None,
            qname: "a:b",
        };
        assert_eq!(end.prefix(), None);
    }
}

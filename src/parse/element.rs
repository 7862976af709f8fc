use std::sync::Arc;

use crate::{
    XML_NS_NAMESPACE, XML_XML_NAMESPACE,
    dtd::ElementDecl,
    error::XMLError,
    sax::{
        attributes::Attribute,
        error::fatal_error,
        handler::SAXHandler,
        parser::{ElementContext, ParserOption, XMLReader},
    },
};

/// Collapse whitespace runs to a single space and trim the value.
pub(crate) fn normalize_tokenized(value: &str) -> String {
    value
        .split(' ')
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [39] element      ::= EmptyElemTag | STag content ETag
    /// ```
    pub(crate) fn parse_element(&mut self) -> Result<(), XMLError> {
        self.grow()?;
        match self.source.content_bytes() {
            [] => {
                return Err(fatal_error!(
                    self,
                    ParserUnexpectedEOF,
                    "The document element is not found."
                ));
            }
            [b'<', next, ..] if !matches!(next, b'!' | b'?' | b'/') => {}
            _ => {
                return Err(fatal_error!(
                    self,
                    ParserUnexpectedDocumentContent,
                    "Only comments, processing instructions, whitespaces and a document type declaration are allowed before the document element."
                ));
            }
        }
        self.parse_start_tag()?;
        self.parse_content()
    }

    /// ```text
    /// [40] STag         ::= '<' Name (S Attribute)* S? '>'
    /// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'
    /// [41] Attribute    ::= Name Eq AttValue
    /// ```
    pub(crate) fn parse_start_tag(&mut self) -> Result<(), XMLError> {
        let namespaces = self.config.is_enable(ParserOption::Namespaces);
        // skip '<'
        self.source.advance(1)?;
        let mut qname = String::new();
        let prefix_length = if namespaces {
            self.parse_qname(&mut qname)?
        } else {
            self.parse_name(&mut qname)?;
            0
        };

        let dtd = self.dtd.clone();
        let decl = dtd.as_ref().and_then(|dtd| dtd.element(&qname));
        self.attributes.clear();
        let empty = loop {
            let s = self.skip_whitespaces()?;
            self.grow()?;
            match self.source.content_bytes() {
                [b'/', b'>', ..] => {
                    self.source.advance(2)?;
                    break true;
                }
                [b'>', ..] => {
                    self.source.advance(1)?;
                    break false;
                }
                [] => {
                    return Err(fatal_error!(
                        self,
                        ParserUnclosedStartTag,
                        "The start tag '{}' is not closed.",
                        qname
                    ));
                }
                _ if s == 0 => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidStartOrEmptyTag,
                        "Whitespaces are required before attributes in the start tag '{}'.",
                        qname
                    ));
                }
                _ => self.parse_attribute(decl, namespaces)?,
            }
        };
        if let Some(decl) = decl {
            self.add_default_attributes(decl);
        }

        let parent_namespaces = self.namespaces.clone();
        let (uri, declared) = if namespaces {
            self.process_namespaces(&qname, prefix_length)?
        } else {
            (None, vec![])
        };

        let local_name = namespaces.then(|| match prefix_length {
            0 => qname.as_str(),
            len => &qname[len + 1..],
        });
        self.handler
            .start_element(uri.as_deref(), local_name, &qname, &self.attributes);
        for (prefix, uri) in &declared {
            self.handler.start_prefix_mapping(prefix.as_deref(), uri);
        }

        let context = ElementContext {
            prefix_length,
            uri,
            parent_namespaces,
            declared_prefixes: declared.into_iter().map(|(prefix, _)| prefix).collect(),
            element_content: decl.is_some_and(|decl| !decl.has_text()),
            qname: qname.into(),
        };
        if empty {
            self.finish_element(context);
        } else {
            self.elements.push(context);
        }
        Ok(())
    }

    fn parse_attribute(
        &mut self,
        decl: Option<&ElementDecl>,
        namespaces: bool,
    ) -> Result<(), XMLError> {
        let mut name = String::new();
        if namespaces {
            self.parse_qname(&mut name)?;
        } else {
            self.parse_name(&mut name)?;
        }
        self.parse_eq()?;
        let mut value = String::new();
        self.parse_att_value(&mut value)?;

        let attribute_decl = decl.and_then(|decl| decl.attribute(&name));
        if attribute_decl.is_some_and(|decl| decl.atype.is_tokenized()) {
            value = normalize_tokenized(&value);
        }
        let mut attribute = Attribute::new(name.as_str(), value);
        attribute.set_specified();
        if attribute_decl.is_some() {
            attribute.set_declared();
        }
        if let Err((attribute, _)) = self.attributes.push(attribute) {
            return Err(fatal_error!(
                self,
                ParserDuplicateAttributes,
                "The attribute '{}' is duplicated.",
                attribute.qname
            ));
        }
        Ok(())
    }

    /// Add attributes that have default values and are not specified.
    fn add_default_attributes(&mut self, decl: &ElementDecl) {
        for attribute_decl in decl.attributes.values() {
            if let Some(value) = attribute_decl.default.value()
                && !self.attributes.contains_qname(&attribute_decl.name)
            {
                let mut attribute = Attribute::new(&*attribute_decl.name, value);
                attribute.set_declared();
                self.attributes.push(attribute).ok();
            }
        }
    }

    /// Bind the namespace declarations of the current start tag and resolve the names.
    ///
    /// Returns the namespace name of the element and the declared bindings.
    #[allow(clippy::type_complexity)]
    fn process_namespaces(
        &mut self,
        qname: &str,
        prefix_length: usize,
    ) -> Result<(Option<Arc<str>>, Vec<(Option<Box<str>>, Arc<str>)>), XMLError> {
        let mut bindings = vec![];
        for attribute in self.attributes.iter_mut() {
            let prefix: Option<Box<str>> = if &*attribute.qname == "xmlns" {
                None
            } else if let Some(prefix) = attribute.qname.strip_prefix("xmlns:") {
                Some(prefix.into())
            } else {
                continue;
            };
            attribute.set_nsdecl();
            attribute.uri = None;
            attribute.local_name = Some(prefix.as_deref().unwrap_or("xmlns").into());
            bindings.push((prefix, Arc::<str>::from(&*attribute.value)));
        }

        for (prefix, uri) in &bindings {
            self.check_namespace_binding(prefix.as_deref(), uri)?;
            let key = prefix.as_deref().unwrap_or("");
            let map = Arc::make_mut(&mut self.namespaces);
            if uri.is_empty() {
                map.remove(key);
            } else {
                map.insert(key.into(), uri.clone());
            }
        }

        let uri = if prefix_length > 0 {
            let prefix = &qname[..prefix_length];
            match self.resolve_prefix(prefix) {
                Some(uri) => Some(uri),
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserUndefinedNamespace,
                        "The namespace prefix '{}' of the element '{}' is not bound.",
                        prefix,
                        qname
                    ));
                }
            }
        } else {
            self.namespaces.get("").cloned()
        };

        let mut unbound = None;
        for attribute in self.attributes.iter_mut() {
            if attribute.is_nsdecl() {
                continue;
            }
            let (prefix, local_name) = match attribute.qname.split_once(':') {
                Some((prefix, local_name)) => (Some(prefix), local_name),
                None => (None, &*attribute.qname),
            };
            attribute.local_name = Some(local_name.into());
            attribute.uri = match prefix {
                Some("xml") => Some(XML_XML_NAMESPACE.into()),
                Some(prefix) => match self.namespaces.get(prefix) {
                    Some(uri) => Some(uri.clone()),
                    None => {
                        unbound = Some(attribute.qname.clone());
                        break;
                    }
                },
                None => None,
            };
        }
        if let Some(name) = unbound {
            return Err(fatal_error!(
                self,
                ParserUndefinedNamespace,
                "The namespace prefix of the attribute '{}' is not bound.",
                name
            ));
        }

        let keep_nsdecl = self.config.is_enable(ParserOption::NamespacePrefixes);
        if let Err(index) = self
            .attributes
            .retain_and_index(|attribute| keep_nsdecl || !attribute.is_nsdecl())
        {
            let name = self.attributes[index].qname.clone();
            return Err(fatal_error!(
                self,
                ParserDuplicateAttributes,
                "The attribute '{}' has the same expanded name as another attribute.",
                name
            ));
        }
        Ok((uri, bindings))
    }

    /// Namespaces in XML 1.0 (Third Edition) 3 Declaring Namespaces
    fn check_namespace_binding(&mut self, prefix: Option<&str>, uri: &str) -> Result<(), XMLError> {
        match prefix {
            Some("xmlns") => {
                return Err(fatal_error!(
                    self,
                    ParserUnacceptableNamespaceName,
                    "The prefix 'xmlns' must not be declared."
                ));
            }
            Some("xml") if uri != XML_XML_NAMESPACE => {
                return Err(fatal_error!(
                    self,
                    ParserUnacceptableNamespaceName,
                    "The prefix 'xml' must be bound to '{}'.",
                    XML_XML_NAMESPACE
                ));
            }
            Some("xml") => return Ok(()),
            _ => {}
        }
        if uri == XML_XML_NAMESPACE || uri == XML_NS_NAMESPACE {
            return Err(fatal_error!(
                self,
                ParserUnacceptableNamespaceName,
                "The namespace name '{}' must not be bound to other prefixes.",
                uri
            ));
        }
        if let Some(prefix) = prefix
            && uri.is_empty()
            && !self.version.is_xml11()
        {
            return Err(fatal_error!(
                self,
                ParserUnacceptableNamespaceName,
                "The prefix '{}' cannot be undeclared in XML 1.0.",
                prefix
            ));
        }
        Ok(())
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<Arc<str>> {
        match prefix {
            "xml" => Some(XML_XML_NAMESPACE.into()),
            "xmlns" => None,
            prefix => self.namespaces.get(prefix).cloned(),
        }
    }

    /// ```text
    /// [42] ETag ::= '</' Name S? '>'
    /// ```
    pub(crate) fn parse_end_tag(&mut self) -> Result<(), XMLError> {
        // skip '</'
        self.source.advance(2)?;
        let mut qname = String::new();
        self.parse_name(&mut qname)?;
        self.skip_whitespaces()?;
        if self.source.next_char_if(|c| c == '>')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidEndTag,
                "The end tag '{}' is not closed.",
                qname
            ));
        }
        let Some(context) = self.elements.pop() else {
            return Err(fatal_error!(
                self,
                ParserUnexpectedDocumentContent,
                "The end tag '{}' has no start tag.",
                qname
            ));
        };
        if *context.qname != *qname {
            return Err(fatal_error!(
                self,
                ParserMismatchElementType,
                "The end tag '{}' does not match the start tag '{}'.",
                qname,
                context.qname
            ));
        }
        self.finish_element(context);
        Ok(())
    }

    /// Report the end of an element and leave its namespace scope.
    pub(crate) fn finish_element(&mut self, context: ElementContext) {
        let local_name = self
            .config
            .is_enable(ParserOption::Namespaces)
            .then(|| match context.prefix_length {
                0 => &*context.qname,
                len => &context.qname[len + 1..],
            });
        self.handler
            .end_element(context.uri.as_deref(), local_name, &context.qname);
        for prefix in &context.declared_prefixes {
            self.handler.end_prefix_mapping(prefix.as_deref());
        }
        self.namespaces = context.parent_namespaces;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenized_normalization() {
        assert_eq!(normalize_tokenized("  a   b c  "), "a b c");
        assert_eq!(normalize_tokenized("   "), "");
        assert_eq!(normalize_tokenized("id"), "id");
    }
}

use std::{collections::HashMap, ops::Index, sync::Arc};

use crate::error::XMLError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace name. `None` if namespace processing is disabled or the attribute has no prefix.
    pub uri: Option<Arc<str>>,
    /// `None` if namespace processing is disabled.
    pub local_name: Option<Arc<str>>,
    pub qname: Arc<str>,
    pub value: Box<str>,
    // 0: is declared in DTD
    // 1: is specified explicitly (in other words, `value` is not the default value provided by DTD)
    // 2: is namespace declaration attribute
    pub(crate) flag: u8,
}

impl Attribute {
    pub(crate) fn new(qname: impl Into<Arc<str>>, value: impl Into<Box<str>>) -> Self {
        Self {
            uri: None,
            local_name: None,
            qname: qname.into(),
            value: value.into(),
            flag: 0,
        }
    }

    pub(crate) fn set_declared(&mut self) {
        self.flag |= 1 << 0;
    }
    pub(crate) fn set_specified(&mut self) {
        self.flag |= 1 << 1;
    }
    pub(crate) fn set_nsdecl(&mut self) {
        self.flag |= 1 << 2;
    }

    /// Check if this attribute is declared in DTD.
    pub fn is_declared(&self) -> bool {
        self.flag & (1 << 0) != 0
    }
    /// Check if this attribute is specified explicitly.
    ///
    /// In other words, check if this attribute does not originate from the default declaration.
    pub fn is_specified(&self) -> bool {
        self.flag & (1 << 1) != 0
    }
    /// Check if this attribute is a namespace declaration attribute.
    pub fn is_nsdecl(&self) -> bool {
        self.flag & (1 << 2) != 0
    }
}

/// A list of attributes.
///
/// This list contains namespace declarations only if
/// [`ParserOption::NamespacePrefixes`](crate::sax::parser::ParserOption::NamespacePrefixes)
/// is enabled.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    attributes: Vec<Attribute>,
    index_by_qname: HashMap<Arc<str>, usize>,
    // key      : local_name
    // value    : uri_map
    index_by_expanded_name: HashMap<Arc<str>, HashMap<Arc<str>, usize>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the index of an attribute whose QName is `qname`.
    pub fn get_index_by_qname(&self, qname: &str) -> Option<usize> {
        self.index_by_qname.get(qname).copied()
    }

    /// Get the index of an attribute whose extended name is `{namespace_name}local_name`.
    pub fn get_index_by_expanded_name(
        &self,
        namespace_name: Option<&str>,
        local_name: &str,
    ) -> Option<usize> {
        self.index_by_expanded_name
            .get(local_name)?
            .get(namespace_name.unwrap_or(""))
            .copied()
    }

    /// The number of attributes contained in this list.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if this list has no attributes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if this list has an attribute whose QName is `qname`.
    pub fn contains_qname(&self, qname: &str) -> bool {
        self.get_index_by_qname(qname).is_some()
    }

    /// Get the local name of `index`-th attribute in this list.
    pub fn get_local_name(&self, index: usize) -> Option<&str> {
        self.attributes.get(index)?.local_name.as_deref()
    }

    /// Get the QName of `index`-th attribute in this list.
    pub fn get_qname(&self, index: usize) -> Option<&str> {
        Some(self.attributes.get(index)?.qname.as_ref())
    }

    /// Get the namespace name of `index`-th attribute in this list.
    pub fn get_namespace_uri(&self, index: usize) -> Option<&str> {
        self.attributes.get(index)?.uri.as_deref()
    }

    /// Get the value of `index`-th attribute in this list.
    pub fn get_value(&self, index: usize) -> Option<&str> {
        Some(self.attributes.get(index)?.value.as_ref())
    }

    /// Get the value of an attribute whose QName is `qname`.
    pub fn get_value_by_qname(&self, qname: &str) -> Option<&str> {
        let index = self.get_index_by_qname(qname)?;
        self.get_value(index)
    }

    /// Get the value of an attribute whose extended name is `{namespace_name}local_name`.
    pub fn get_value_by_expanded_name(
        &self,
        namespace_name: Option<&str>,
        local_name: &str,
    ) -> Option<&str> {
        let index = self.get_index_by_expanded_name(namespace_name, local_name)?;
        self.get_value(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Attribute> {
        self.attributes.iter_mut()
    }

    pub(crate) fn clear(&mut self) {
        self.attributes.clear();
        self.index_by_qname.clear();
        self.index_by_expanded_name.clear();
    }

    /// Append `attribute`.
    ///
    /// If an attribute with the same QName already exists, `attribute` is returned with
    /// [`XMLError::ParserDuplicateAttributes`].
    pub(crate) fn push(&mut self, attribute: Attribute) -> Result<usize, (Attribute, XMLError)> {
        use std::collections::hash_map::Entry::*;

        let index = self.attributes.len();
        match self.index_by_qname.entry(attribute.qname.clone()) {
            Vacant(entry) => {
                entry.insert(index);
            }
            Occupied(_) => return Err((attribute, XMLError::ParserDuplicateAttributes)),
        }
        self.attributes.push(attribute);
        Ok(index)
    }

    /// Keep only the attributes that satisfy `f`, then rebuild the indexes.
    ///
    /// Expanded names are indexed for the attributes with local names, except namespace
    /// declarations. If two attributes share an expanded name, the index of the later one is
    /// returned as the error.
    pub(crate) fn retain_and_index(
        &mut self,
        f: impl FnMut(&Attribute) -> bool,
    ) -> Result<(), usize> {
        use std::collections::hash_map::Entry::*;

        self.attributes.retain(f);
        self.index_by_qname.clear();
        self.index_by_expanded_name.clear();
        for (index, attribute) in self.attributes.iter().enumerate() {
            self.index_by_qname.insert(attribute.qname.clone(), index);
            let Some(local_name) = attribute.local_name.clone() else {
                continue;
            };
            if attribute.is_nsdecl() {
                continue;
            }
            let namespace_name = attribute.uri.clone().unwrap_or_default();
            match self
                .index_by_expanded_name
                .entry(local_name)
                .or_default()
                .entry(namespace_name)
            {
                Vacant(entry) => {
                    entry.insert(index);
                }
                Occupied(_) => return Err(index),
            }
        }
        Ok(())
    }

    /// Replace the contents of this list with a copy of `other`, reusing allocations.
    pub(crate) fn clone_from_list(&mut self, other: &Attributes) {
        self.clear();
        self.attributes.extend(other.attributes.iter().cloned());
        self.index_by_qname
            .extend(other.index_by_qname.iter().map(|(k, v)| (k.clone(), *v)));
        self.index_by_expanded_name.extend(
            other
                .index_by_expanded_name
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
}

impl Index<usize> for Attributes {
    type Output = Attribute;

    fn index(&self, index: usize) -> &Self::Output {
        &self.attributes[index]
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type IntoIter = std::slice::Iter<'a, Attribute>;
    type Item = &'a Attribute;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_qname_is_rejected() {
        let mut atts = Attributes::new();
        assert!(atts.push(Attribute::new("a", "1")).is_ok());
        let (att, err) = atts.push(Attribute::new("a", "2")).unwrap_err();
        assert_eq!(&*att.value, "2");
        assert!(matches!(err, XMLError::ParserDuplicateAttributes));
    }

    #[test]
    fn duplicate_expanded_name_is_detected() {
        let mut atts = Attributes::new();
        for qname in ["p:x", "q:x"] {
            let mut att = Attribute::new(qname, "v");
            att.uri = Some("urn:x".into());
            att.local_name = Some("x".into());
            atts.push(att).unwrap();
        }
        assert_eq!(atts.retain_and_index(|_| true), Err(1));
    }
}

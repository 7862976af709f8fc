use std::collections::HashSet;

use crate::{
    dtd::MarkupDecl,
    error::XMLError,
    sax::{
        ContentSpec,
        error::{error, fatal_error},
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
    /// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
    /// ```
    pub(crate) fn parse_element_decl(&mut self) -> Result<(), XMLError> {
        // skip '<!ELEMENT'
        self.source.advance(9)?;
        let external_markup = self.source.in_external_markup();
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Whitespaces are required after '<!ELEMENT'."
            ));
        }

        let mut name = String::new();
        self.parse_declared_name(&mut name)?;
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "Whitespaces are required after the element type name '{}'.",
                name
            ));
        }

        let content = if self.skip_literal(b"EMPTY")? {
            ContentSpec::EMPTY
        } else if self.skip_literal(b"ANY")? {
            ContentSpec::ANY
        } else if self.source.next_char_if(|c| c == '(')?.is_some() {
            self.skip_whitespaces_with_pe()?;
            if self.skip_literal(b"#PCDATA")? {
                self.parse_mixed(&name)?
            } else {
                self.parse_children()?
            }
        } else {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "'EMPTY', 'ANY' or a content model is expected for the element '{}'.",
                name
            ));
        };

        self.skip_whitespaces_with_pe()?;
        if self.source.next_char_if(|c| c == '>')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "The element type declaration of '{}' does not end with '>'.",
                name
            ));
        }

        if self
            .dtd_mut()?
            .add_element_decl(&name, content.clone(), external_markup)?
        {
            self.report_decl(MarkupDecl::Element {
                name: name.into(),
                content,
            })
        } else {
            error!(
                self,
                ParserDuplicateElementDecl,
                "The element type '{}' is declared more than once.",
                name
            )
        }
    }

    /// Names in declarations are QNames if namespaces are enabled.
    pub(crate) fn parse_declared_name(&mut self, buffer: &mut String) -> Result<(), XMLError> {
        if self.config.is_enable(ParserOption::Namespaces) {
            self.parse_qname(buffer)?;
        } else {
            self.parse_name(buffer)?;
        }
        Ok(())
    }

    /// ```text
    /// [51] Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*'
    ///                | '(' S? '#PCDATA' S? ')'
    /// ```
    ///
    /// `'(' S? '#PCDATA'` has already been consumed.
    fn parse_mixed(&mut self, element: &str) -> Result<ContentSpec, XMLError> {
        let mut names = vec![];
        let mut seen = HashSet::new();
        self.skip_whitespaces_with_pe()?;
        while self.source.next_char_if(|c| c == '|')?.is_some() {
            self.skip_whitespaces_with_pe()?;
            let mut name = String::new();
            self.parse_declared_name(&mut name)?;
            if !seen.insert(name.clone()) {
                error!(
                    self,
                    ParserDuplicateMixedContent,
                    "'{}' appears more than once in the mixed content of '{}'.",
                    name,
                    element
                )?;
            } else {
                names.push(name.into());
            }
            self.skip_whitespaces_with_pe()?;
        }

        if self.source.next_char_if(|c| c == ')')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "The mixed content of '{}' is not closed by ')'.",
                element
            ));
        }
        let star = self.source.next_char_if(|c| c == '*')?.is_some();
        if !names.is_empty() && !star {
            return Err(fatal_error!(
                self,
                ParserInvalidElementDecl,
                "The mixed content of '{}' with element types must end with ')*'.",
                element
            ));
        }
        Ok(ContentSpec::Mixed(names))
    }

    /// ```text
    /// [47] children ::= (choice | seq) ('?' | '*' | '+')?
    /// [48] cp       ::= (Name | choice | seq) ('?' | '*' | '+')?
    /// [49] choice   ::= '(' S? cp ( S? '|' S? cp )+ S? ')'
    /// [50] seq      ::= '(' S? cp ( S? ',' S? cp )* S? ')'
    /// ```
    ///
    /// The outermost `'('` has already been consumed. The model is returned without
    /// whitespaces. Nested groups are tracked with a stack of separators, so deep models
    /// do not recurse.
    fn parse_children(&mut self) -> Result<ContentSpec, XMLError> {
        let mut model = String::from("(");
        // The separator of each open group, decided by its first separator.
        let mut groups: Vec<Option<char>> = vec![None];
        'cp: loop {
            self.skip_whitespaces_with_pe()?;
            if self.source.next_char_if(|c| c == '(')?.is_some() {
                model.push('(');
                groups.push(None);
                continue;
            }
            self.parse_declared_name(&mut model)?;
            if let Some(c) = self.source.next_char_if(|c| matches!(c, '?' | '*' | '+'))? {
                model.push(c);
            }

            loop {
                self.skip_whitespaces_with_pe()?;
                match self.source.next_char()? {
                    Some(c @ ('|' | ',')) => {
                        let Some(separator) = groups.last_mut() else {
                            return Err(XMLError::InternalError);
                        };
                        match *separator {
                            None => *separator = Some(c),
                            Some(s) if s != c => {
                                return Err(fatal_error!(
                                    self,
                                    ParserInvalidElementDecl,
                                    "'|' and ',' cannot be mixed in a content particle group."
                                ));
                            }
                            Some(_) => {}
                        }
                        model.push(c);
                        continue 'cp;
                    }
                    Some(')') => {
                        groups.pop();
                        model.push(')');
                        if let Some(c) =
                            self.source.next_char_if(|c| matches!(c, '?' | '*' | '+'))?
                        {
                            model.push(c);
                        }
                        if groups.is_empty() {
                            break 'cp;
                        }
                    }
                    _ => {
                        return Err(fatal_error!(
                            self,
                            ParserInvalidElementDecl,
                            "'|', ',' or ')' is expected in the content model."
                        ));
                    }
                }
            }
        }
        Ok(ContentSpec::Children(model.into()))
    }
}

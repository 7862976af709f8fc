use crate::{
    dtd::{MarkupDecl, Notation},
    error::XMLError,
    sax::{
        error::{error, fatal_error},
        handler::SAXHandler,
        parser::XMLReader,
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
    /// [83] PublicID     ::= 'PUBLIC' S PubidLiteral
    /// ```
    pub(crate) fn parse_notation_decl(&mut self) -> Result<(), XMLError> {
        // skip '<!NOTATION'
        self.source.advance(10)?;
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidNotationDecl,
                "Whitespaces are required after '<!NOTATION'."
            ));
        }
        let mut name = String::new();
        self.parse_name(&mut name)?;
        if self.skip_whitespaces_with_pe()? == 0 {
            return Err(fatal_error!(
                self,
                ParserInvalidNotationDecl,
                "Whitespaces are required after the notation name '{}'.",
                name
            ));
        }
        let (public_id, system_id) = self.parse_external_id(true, true)?;
        self.skip_whitespaces_with_pe()?;
        if self.source.next_char_if(|c| c == '>')?.is_none() {
            return Err(fatal_error!(
                self,
                ParserInvalidNotationDecl,
                "The declaration of the notation '{}' does not end with '>'.",
                name
            ));
        }

        let notation = Notation {
            name: name.as_str().into(),
            public_id: public_id.map(Into::into),
            system_id: system_id.map(Into::into),
        };
        let decl = MarkupDecl::Notation {
            name: notation.name.clone(),
            public_id: notation.public_id.clone(),
            system_id: notation.system_id.clone(),
        };
        if self.dtd_mut()?.add_notation(notation)? {
            self.report_decl(decl)
        } else {
            error!(
                self,
                ParserDuplicateNotationDecl,
                "The notation '{}' is declared more than once.",
                name
            )
        }
    }
}

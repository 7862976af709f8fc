use crate::{
    dtd::MarkupDecl,
    error::XMLError,
    sax::{
        error::fatal_error,
        handler::SAXHandler,
        parser::{ParserOption, XMLReader},
    },
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [16] PI       ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
    /// [17] PITarget ::= Name - (('X' | 'x') ('M' | 'm') ('L' | 'l'))
    /// ```
    pub(crate) fn parse_pi(&mut self) -> Result<(), XMLError> {
        // skip '<?'
        self.source.advance(2)?;

        let mut target = String::new();
        self.parse_name(&mut target)?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(fatal_error!(
                self,
                ParserUnacceptablePITarget,
                "The PI target '{}' is reserved.",
                target
            ));
        }
        if self.config.is_enable(ParserOption::Namespaces) && target.contains(':') {
            // Namespaces in XML 1.0 (Third Edition) 7 Conformance of Documents
            // No entity names, processing instruction targets, or notation names contain any colons.
            return Err(fatal_error!(
                self,
                ParserUnacceptablePITarget,
                "The PI target '{}' must not contain ':'.",
                target
            ));
        }

        let s = self.skip_whitespaces()?;
        let mut data = (s > 0).then(String::new);
        loop {
            self.grow()?;
            if self.source.content_bytes().starts_with(b"?>") {
                break;
            }
            let Some(buffer) = data.as_mut() else {
                return Err(fatal_error!(
                    self,
                    ParserInvalidProcessingInstruction,
                    "Whitespaces are required between the PI target and data."
                ));
            };
            match self.source.next_char()? {
                Some(c) => buffer.push(c),
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidProcessingInstruction,
                        "PI does not end with '?>'."
                    ));
                }
            }
        }
        // skip '?>'
        self.source.advance(2)?;

        if self.is_building_dtd() {
            self.report_decl(MarkupDecl::ProcessingInstruction {
                target: target.into(),
                data: data.map(Into::into),
            })
        } else {
            self.handler
                .processing_instruction(&target, data.as_deref());
            Ok(())
        }
    }
}

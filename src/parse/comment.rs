use crate::{
    dtd::MarkupDecl,
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
    /// ```
    pub(crate) fn parse_comment(&mut self) -> Result<(), XMLError> {
        // skip '<!--'
        self.source.advance(4)?;

        let mut buffer = String::new();
        loop {
            self.grow()?;
            let bytes = self.source.content_bytes();
            if bytes.starts_with(b"--") {
                if bytes.starts_with(b"-->") {
                    break;
                }
                return Err(fatal_error!(
                    self,
                    ParserInvalidComment,
                    "Comment must not contain '--' except for delimiters."
                ));
            }
            match self.source.next_char()? {
                Some(c) => buffer.push(c),
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidComment,
                        "Comment does not end with '-->'."
                    ));
                }
            }
        }
        // skip '-->'
        self.source.advance(3)?;

        if self.is_building_dtd() {
            self.report_decl(MarkupDecl::Comment(buffer.into()))
        } else {
            self.handler.comment(&buffer);
            Ok(())
        }
    }
}

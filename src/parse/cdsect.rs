use crate::{
    CHARDATA_CHUNK_LENGTH,
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [18] CDSect  ::= CDStart CData CDEnd
    /// [19] CDStart ::= '<![CDATA['
    /// [20] CData   ::= (Char* - (Char* ']]>' Char*))
    /// [21] CDEnd   ::= ']]>'
    /// ```
    pub(crate) fn parse_cdsect(&mut self) -> Result<(), XMLError> {
        // skip '<![CDATA['
        self.source.advance(9)?;
        self.handler.start_cdata();

        let mut buffer = String::new();
        loop {
            self.grow()?;
            if self.source.content_bytes().starts_with(b"]]>") {
                break;
            }
            match self.source.next_char()? {
                Some(c) => buffer.push(c),
                None => {
                    return Err(fatal_error!(
                        self,
                        ParserInvalidCDSect,
                        "CDATA section does not end with ']]>'."
                    ));
                }
            }
            if buffer.len() >= CHARDATA_CHUNK_LENGTH {
                self.handler.characters(&buffer);
                buffer.clear();
            }
        }
        // skip ']]>'
        self.source.advance(3)?;

        if !buffer.is_empty() {
            self.handler.characters(&buffer);
        }
        self.handler.end_cdata();
        Ok(())
    }
}

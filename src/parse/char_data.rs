use crate::{
    CHARDATA_CHUNK_LENGTH,
    error::XMLError,
    sax::{error::fatal_error, handler::SAXHandler, parser::XMLReader},
};

impl<H: SAXHandler> XMLReader<H> {
    /// ```text
    /// [14] CharData ::= [^<&]* - ([^<&]* ']]>' [^<&]*)
    /// ```
    ///
    /// Character references that follow are included in the character data.
    pub(crate) fn parse_char_data(&mut self) -> Result<(), XMLError> {
        let element_content = self
            .elements
            .last()
            .is_some_and(|context| context.element_content);

        let mut buffer = String::new();
        let mut non_whitespace = 0usize;
        let mut brackets = 0usize;
        loop {
            while let Some(c) = self.source.next_char_if(|c| c != '<' && c != '&')? {
                if c == '>' && brackets >= 2 {
                    return Err(fatal_error!(
                        self,
                        ParserUnacceptablePatternInCharData,
                        "']]>' is not allowed in a character data."
                    ));
                }
                brackets = if c == ']' { brackets + 1 } else { 0 };
                buffer.push(c);
                if !self.version.is_whitespace(c) {
                    non_whitespace += c.len_utf8();
                }
                if buffer.len() >= CHARDATA_CHUNK_LENGTH {
                    self.report_char_data(&buffer, non_whitespace == 0 && element_content);
                    buffer.clear();
                    non_whitespace = 0;
                }
            }

            self.grow()?;
            if !self.source.content_bytes().starts_with(b"&#") {
                break;
            }
            // skip '&#'
            self.source.advance(2)?;
            let c = self.parse_char_ref()?;
            buffer.push(c);
            non_whitespace += c.len_utf8();
            brackets = 0;
            if buffer.len() >= CHARDATA_CHUNK_LENGTH {
                self.report_char_data(&buffer, false);
                buffer.clear();
                non_whitespace = 0;
            }
        }

        if !buffer.is_empty() {
            self.report_char_data(&buffer, non_whitespace == 0 && element_content);
        }
        Ok(())
    }

    fn report_char_data(&mut self, data: &str, ignorable: bool) {
        if ignorable {
            self.handler.ignorable_whitespace(data);
        } else {
            self.handler.characters(data);
        }
    }
}

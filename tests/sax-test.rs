use std::{fs, sync::Arc};

use proptest::prelude::*;
use xmlweave::{
    error::XMLError,
    sax::{
        Locator,
        attributes::Attributes,
        handler::{DebugHandler, EntityResolver, SAXHandler},
        parser::{ParserConfig, ParserOption, XMLReaderBuilder},
    },
};

fn trace(input: &str, config: ParserConfig) -> (String, Result<(), XMLError>) {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .set_parser_config(config)
        .build();
    let result = reader.parse_str(input, Some("file:///tmp/xmlweave/doc.xml"));
    (reader.handler.buffer, result)
}

fn direct() -> ParserConfig {
    let mut config = ParserConfig::default();
    config.set_option(ParserOption::WorkerThread, false);
    config
}

#[derive(Default)]
struct TextCollector {
    text: String,
}

impl EntityResolver for TextCollector {}
impl SAXHandler for TextCollector {
    fn characters(&mut self, data: &str) {
        self.text.push_str(data);
    }
}

const DOCUMENTS: &[&str] = &[
    "<a/>",
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a b="1"><!-- c --><?pi data?>text<![CDATA[<x>]]></a>"#,
    r#"<!DOCTYPE a [
        <!ELEMENT a (b*)>
        <!ELEMENT b (#PCDATA|c)*>
        <!ATTLIST b id ID #IMPLIED kind (x|y) "x">
        <!ENTITY e "<b>expanded</b>">
        <!NOTATION n SYSTEM "viewer">
    ]>
    <a>
        &e;
        <b id="  one "/>
    </a>"#,
    r#"<p:a xmlns:p="urn:p" xmlns="urn:default"><b p:x="1" y="2"/></p:a>"#,
];

#[test]
fn threaded_and_direct_parses_report_the_same_events() {
    for input in DOCUMENTS {
        let (threaded, threaded_result) = trace(input, ParserConfig::default());
        let (direct, direct_result) = trace(input, direct());
        assert!(threaded_result.is_ok(), "{threaded}");
        assert!(direct_result.is_ok(), "{direct}");
        assert_eq!(threaded, direct);
    }
}

#[test]
fn document_events() {
    let (buffer, result) = trace(DOCUMENTS[1], direct());
    result.unwrap();
    assert_eq!(
        buffer,
        r#"setDocumentLocator()
startDocument()
declaration(1.0, Some("UTF-8"), Some(true))
startElement(None, Some("a"), a, {None}b='1')
comment( c )
processingInstruction(pi, Some("data"))
characters(text)
startCDATA()
characters(<x>)
endCDATA()
endElement(None, Some("a"), a)
endDocument()
"#
    );
}

#[test]
fn namespace_events() {
    let (buffer, result) = trace(DOCUMENTS[3], ParserConfig::default());
    result.unwrap();
    assert_eq!(
        buffer,
        r#"setDocumentLocator()
startDocument()
startElement(Some("urn:p"), Some("a"), p:a)
startPrefixMapping(Some("p"), urn:p)
startPrefixMapping(None, urn:default)
startElement(Some("urn:default"), Some("b"), b, {Some("urn:p")}x='1', {None}y='2')
endElement(Some("urn:default"), Some("b"), b)
endElement(Some("urn:p"), Some("a"), p:a)
endPrefixMapping(Some("p"))
endPrefixMapping(None)
endDocument()
"#
    );
}

#[test]
fn namespace_declarations_as_attributes() {
    let mut config = direct();
    config.set_option(ParserOption::NamespacePrefixes, true);
    let (buffer, result) = trace(r#"<a xmlns:p="urn:p"/>"#, config);
    result.unwrap();
    assert!(buffer.contains("startElement(None, Some(\"a\"), a, {None}p='urn:p')"));
}

#[test]
fn namespaces_disabled() {
    let mut config = direct();
    config.set_option(ParserOption::Namespaces, false);
    let (buffer, result) = trace(r#"<p:a xmlns:p="urn:p" p:x="1"/>"#, config);
    result.unwrap();
    assert!(buffer.contains("startElement(None, None, p:a, xmlns:p='urn:p', p:x='1')"));
    assert!(!buffer.contains("startPrefixMapping"));
}

#[test]
fn undeclared_prefix_is_fatal() {
    let (buffer, result) = trace("<p:a/>", direct());
    assert!(matches!(result, Err(XMLError::ParserUndefinedNamespace)));
    assert!(buffer.contains("fatalError(ParserUndefinedNamespace)"));
    assert!(!buffer.contains("endDocument()"));
}

#[test]
fn reserved_namespace_bindings() {
    for input in [
        r#"<a xmlns:xmlns="urn:x"/>"#,
        r#"<a xmlns:xml="urn:x"/>"#,
        r#"<a xmlns:p="http://www.w3.org/2000/xmlns/"/>"#,
        r#"<a xmlns:p=""/>"#,
    ] {
        let (_, result) = trace(input, direct());
        assert!(
            matches!(result, Err(XMLError::ParserUnacceptableNamespaceName)),
            "{input}: {result:?}"
        );
    }
    let (_, result) = trace(r#"<?xml version="1.1"?><a xmlns:p="urn:p"><b xmlns:p=""/></a>"#, direct());
    result.unwrap();
}

#[test]
fn duplicate_expanded_attribute_names() {
    let (_, result) = trace(
        r#"<a xmlns:p="urn:x" xmlns:q="urn:x" p:b="1" q:b="2"/>"#,
        direct(),
    );
    assert!(matches!(result, Err(XMLError::ParserDuplicateAttributes)));
    let (_, result) = trace(r#"<a b="1" b="2"/>"#, direct());
    assert!(matches!(result, Err(XMLError::ParserDuplicateAttributes)));
}

#[test]
fn attribute_defaults_are_not_specified() {
    let (buffer, result) = trace(
        r#"<!DOCTYPE a [<!ATTLIST a b CDATA "x" c NMTOKENS #FIXED "  p   q ">]><a c=" p  q"/>"#,
        direct(),
    );
    result.unwrap();
    assert!(buffer.contains("attributeDecl(a, b, CDATA, None(\"x\"))"));
    assert!(buffer.contains("attributeDecl(a, c, NMTOKENS, FIXED(\"p q\"))"));
    assert!(buffer.contains("startElement(None, Some(\"a\"), a, {None}c='p q', {None}b='x'(default))"));
}

#[test]
fn attribute_value_normalization() {
    let (buffer, result) = trace(
        "<!DOCTYPE a [<!ENTITY t \"&#x9;\">]><a b=\"x\ny\tz&#xA;&t;&lt;\"/>",
        direct(),
    );
    result.unwrap();
    assert!(buffer.contains("{None}b='x y z\n <'"), "{buffer}");
}

#[test]
fn internal_entities_are_expanded() {
    let (buffer, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY e "v&#38;amp;w"><!ENTITY f "[&e;]">]><a>&f;</a>"#,
        direct(),
    );
    result.unwrap();
    assert!(buffer.contains("internalEntityDecl(e, v&amp;w)"));
    assert!(buffer.contains(
        "startEntity(f)\ncharacters([)\nstartEntity(e)\ncharacters(v)\ncharacters(&)\ncharacters(w)\nendEntity(e)\ncharacters(])\nendEntity(f)\n"
    ));
}

#[test]
fn entity_errors() {
    let (_, result) = trace("<a>&undeclared;</a>", direct());
    assert!(matches!(result, Err(XMLError::ParserEntityNotFound)));

    let (_, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY x "&y;"><!ENTITY y "&x;">]><a>&x;</a>"#,
        direct(),
    );
    assert!(matches!(result, Err(XMLError::ParserEntityRecursion)));

    let (_, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY x "<b>">]><a>&x;</b></a>"#,
        direct(),
    );
    assert!(matches!(
        result,
        Err(XMLError::ParserEntityIncorrectNesting)
    ));

    let (_, result) = trace(
        r#"<!DOCTYPE a [<!NOTATION n SYSTEM "v"><!ENTITY u SYSTEM "u.bin" NDATA n>]><a>&u;</a>"#,
        direct(),
    );
    assert!(matches!(result, Err(XMLError::ParserUnparsedEntityReference)));
}

#[test]
fn undefined_parameter_entity_is_fatal() {
    let (buffer, result) = trace("<!DOCTYPE a [%p;]><a/>", direct());
    assert!(matches!(
        result,
        Err(XMLError::ParserUndefinedParameterEntity)
    ));
    assert!(buffer.contains("fatalError(ParserUndefinedParameterEntity)"));
}

#[test]
fn parameter_entities_in_markup_of_the_internal_subset() {
    let (_, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY % t "CDATA"><!ATTLIST a b %t; #IMPLIED>]><a/>"#,
        direct(),
    );
    assert!(matches!(
        result,
        Err(XMLError::ParserInvalidPEReferenceInInternalSubset)
    ));

    let (buffer, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY % d "<!ELEMENT a EMPTY>">%d;]><a/>"#,
        direct(),
    );
    result.unwrap();
    assert!(buffer.contains("startEntity(%d)\nelementDecl(a, EMPTY)\nendEntity(%d)\n"));
}

#[test]
fn entity_expansion_limit() {
    let mut config = direct();
    config.set_max_entity_expansions(3);
    let input = r#"<!DOCTYPE a [<!ENTITY e "x">]><a>&e;&e;&e;&e;</a>"#;
    let (_, result) = trace(input, config.clone());
    assert!(matches!(
        result,
        Err(XMLError::ParserEntityExpansionLimitExceeded)
    ));
    config.set_max_entity_expansions(4);
    let (_, result) = trace(input, config);
    result.unwrap();
}

#[test]
fn billion_laughs_is_stopped_under_secure_processing() {
    let mut input = String::from("<!DOCTYPE a [<!ENTITY l0 \"lol\">");
    for i in 1..10 {
        let refs = format!("&l{};", i - 1).repeat(10);
        input.push_str(&format!("<!ENTITY l{i} \"{refs}\">"));
    }
    input.push_str("]><a>&l9;</a>");
    let mut reader = XMLReaderBuilder::new()
        .set_handler(TextCollector::default())
        .disable_option(ParserOption::WorkerThread)
        .enable_option(ParserOption::SecureProcessing)
        .build();
    assert!(matches!(
        reader.parse_str(&input, None),
        Err(XMLError::ParserEntityExpansionLimitExceeded)
    ));
}

fn expansion_document(references: usize) -> String {
    format!(
        "<!DOCTYPE a [<!ENTITY e \"x\"><!ENTITY big \"{}\">]><a>&big;</a>",
        "&e;".repeat(references)
    )
}

#[test]
fn secure_processing_expansion_ceiling() {
    let parse = |input: &str, secure: bool| {
        let mut reader = XMLReaderBuilder::new()
            .set_handler(TextCollector::default())
            .disable_option(ParserOption::WorkerThread)
            .build();
        if secure {
            let mut config = reader.config().clone();
            config.set_option(ParserOption::SecureProcessing, true);
            reader.set_parser_config(config);
        }
        let result = reader.parse_str(input, None);
        (result, reader.handler.text.len())
    };

    // `&big;` itself and the 10,000 references in its replacement text
    let over = expansion_document(10_000);
    let (result, _) = parse(&over, true);
    assert!(matches!(
        result,
        Err(XMLError::ParserEntityExpansionLimitExceeded)
    ));
    let (result, len) = parse(&over, false);
    result.unwrap();
    assert_eq!(len, 10_000);

    let (result, len) = parse(&expansion_document(9_999), true);
    result.unwrap();
    assert_eq!(len, 9_999);
}

#[derive(Default)]
struct PositionRecorder {
    locator: Option<Arc<Locator>>,
    positions: Vec<(String, usize, usize)>,
}

impl EntityResolver for PositionRecorder {}
impl SAXHandler for PositionRecorder {
    fn set_document_locator(&mut self, locator: Arc<Locator>) {
        self.locator = Some(locator);
    }

    fn start_element(
        &mut self,
        _uri: Option<&str>,
        _local_name: Option<&str>,
        qname: &str,
        _atts: &Attributes,
    ) {
        if let Some(locator) = self.locator.as_ref() {
            self.positions
                .push((qname.to_owned(), locator.line(), locator.column()));
        }
    }
}

fn element_positions(input: &str, config: ParserConfig) -> Vec<(String, usize, usize)> {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(PositionRecorder::default())
        .set_parser_config(config)
        .build();
    reader.parse_str(input, None).unwrap();
    reader.handler.positions
}

#[test]
fn line_endings_do_not_change_positions() {
    const XML10: &str = "<?xml version=\"1.0\"?>\n<a>\n <b>\n\n <c/></b></a>";
    const XML11: &str = "<?xml version=\"1.1\"?>\n<a>\n <b>\n\n <c/></b></a>";
    for config in [ParserConfig::default(), direct()] {
        let expected = element_positions(XML10, config.clone());
        let lines = expected
            .iter()
            .map(|(name, line, _)| (name.as_str(), *line))
            .collect::<Vec<_>>();
        assert_eq!(lines, [("a", 2), ("b", 3), ("c", 5)]);

        for eol in ["\r\n", "\r"] {
            let input = XML10.replace('\n', eol);
            assert_eq!(element_positions(&input, config.clone()), expected, "{eol:?}");
        }
        assert_eq!(element_positions(XML11, config.clone()), expected);
        for eol in ["\r\n", "\r", "\u{85}", "\r\u{85}", "\u{2028}"] {
            let input = XML11.replace('\n', eol);
            assert_eq!(element_positions(&input, config.clone()), expected, "{eol:?}");
        }
    }
}

#[test]
fn line_ending_normalization() {
    let (buffer, result) = trace("<a>x\r\ny\rz\n</a>", direct());
    result.unwrap();
    assert!(buffer.contains("characters(x\ny\nz\n)"));

    let (buffer, result) = trace("<?xml version=\"1.1\"?><a>x\u{85}y\r\u{85}z\u{2028}</a>", direct());
    result.unwrap();
    assert!(buffer.contains("characters(x\ny\nz\n)"), "{buffer}");

    let (buffer, result) = trace("<a>x\u{85}y</a>", direct());
    result.unwrap();
    assert!(buffer.contains("characters(x\u{85}y)"));
}

#[test]
fn ignorable_whitespace_in_element_content() {
    let (buffer, result) = trace(
        "<!DOCTYPE a [<!ELEMENT a (b)><!ELEMENT b ANY>]><a>\n  <b> </b>\n</a>",
        direct(),
    );
    result.unwrap();
    assert!(buffer.contains("ignorableWhitespace(\n  )"));
    assert!(buffer.contains("characters( )"));
}

#[test]
fn malformed_documents() {
    for (input, expected) in [
        ("", "ParserUnexpectedEOF"),
        ("<a>", "ParserUnexpectedEOF"),
        ("<a></b>", "ParserMismatchElementType"),
        ("<a/><b/>", "ParserUnexpectedDocumentContent"),
        ("<a>]]></a>", "ParserUnacceptablePatternInCharData"),
        ("<a><?xml version='1.0'?></a>", "ParserInvalidXMLDecl"),
        ("<a>&#0;</a>", "ParserInvalidCharacterReference"),
        ("<!DOCTYPE a><!DOCTYPE a><a/>", "ParserMultipleDoctypeDecl"),
        ("<a><!-- -- --></a>", "ParserInvalidComment"),
    ] {
        let (buffer, result) = trace(input, direct());
        assert!(result.is_err(), "{input}");
        assert!(
            buffer.contains(&format!("fatalError({expected})")),
            "{input}: {buffer}"
        );
    }
}

#[test]
fn only_the_first_fatal_error_is_reported() {
    let (buffer, result) = trace("<a><b></a>", ParserConfig::default());
    assert!(result.is_err());
    assert_eq!(buffer.matches("fatalError(").count(), 1);
}

#[test]
fn doctype_can_be_disallowed() {
    let mut config = direct();
    config.set_option(ParserOption::DisallowDoctype, true);
    let (_, result) = trace("<!DOCTYPE a><a/>", config);
    assert!(matches!(result, Err(XMLError::ParserDoctypeDisallowed)));
}

#[test]
fn undeclared_entities_are_skipped_with_an_external_subset() {
    let dir = tempfile::tempdir().unwrap();
    let dtd = dir.path().join("doc.dtd");
    fs::write(&dtd, "<!ELEMENT a ANY>").unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(&doc, "<!DOCTYPE a SYSTEM \"doc.dtd\"><a>&unknown;</a>").unwrap();

    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .build();
    reader.parse_uri(doc.to_str().unwrap(), None).unwrap();
    let buffer = &reader.handler.buffer;
    assert!(buffer.contains("elementDecl(a, ANY)"));
    assert!(buffer.contains("skippedEntity(unknown)"));
}

#[test]
fn external_entities_are_read_relative_to_their_base() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("ent")).unwrap();
    fs::write(
        dir.path().join("ent").join("outer.ent"),
        "<?xml encoding=\"UTF-8\"?><b>&inner;</b>",
    )
    .unwrap();
    fs::write(dir.path().join("ent").join("inner.txt"), "inner text").unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(
        &doc,
        r#"<!DOCTYPE a [
            <!ENTITY outer SYSTEM "ent/outer.ent">
            <!ENTITY inner SYSTEM "ent/inner.txt">
        ]><a>&outer;</a>"#,
    )
    .unwrap();

    for threaded in [true, false] {
        let mut reader = XMLReaderBuilder::new()
            .set_handler(DebugHandler::default())
            .build();
        let mut config = reader.config().clone();
        config.set_option(ParserOption::WorkerThread, threaded);
        reader.set_parser_config(config);
        reader.parse_uri(doc.to_str().unwrap(), None).unwrap();
        let buffer = &reader.handler.buffer;
        assert!(buffer.contains("startEntity(outer)"), "{buffer}");
        assert!(buffer.contains("characters(inner text)"), "{buffer}");
        assert!(buffer.contains("endEntity(outer)"), "{buffer}");
    }
}

#[test]
fn external_general_entities_can_be_disabled() {
    let (buffer, result) = {
        let mut config = direct();
        config.set_option(ParserOption::ExternalGeneralEntities, false);
        trace(
            r#"<!DOCTYPE a [<!ENTITY e SYSTEM "missing.ent">]><a>&e;</a>"#,
            config,
        )
    };
    result.unwrap();
    assert!(buffer.contains("skippedEntity(e)"));
}

#[test]
fn secure_processing_denies_external_access() {
    let mut config = direct();
    config.set_option(ParserOption::SecureProcessing, true);
    let (_, result) = trace(
        r#"<!DOCTYPE a [<!ENTITY e SYSTEM "missing.ent">]><a>&e;</a>"#,
        config,
    );
    assert!(matches!(result, Err(XMLError::ParserExternalAccessDenied)));
}

#[test]
fn reader_is_reusable() {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(TextCollector::default())
        .build();
    assert!(reader.parse_str("<a>", None).is_err());
    reader.parse_str("<a>ok</a>", None).unwrap();
    assert_eq!(reader.handler.text, "ok");
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}

#[derive(Default)]
struct AttributeCollector {
    values: Vec<String>,
}

impl EntityResolver for AttributeCollector {}
impl SAXHandler for AttributeCollector {
    fn start_element(
        &mut self,
        _uri: Option<&str>,
        _local_name: Option<&str>,
        _qname: &str,
        atts: &Attributes,
    ) {
        self.values
            .extend(atts.iter().map(|att| att.value.to_string()));
    }
}

proptest! {
    #[test]
    fn predefined_entities_round_trip(text in "[a-z<>&'\" \n]{0,64}") {
        let escaped = escape(&text);
        let mut reader = XMLReaderBuilder::new()
            .set_handler(TextCollector::default())
            .disable_option(ParserOption::WorkerThread)
            .build();
        reader.parse_str(&format!("<a>{escaped}</a>"), None).unwrap();
        prop_assert_eq!(&reader.handler.text, &text);
    }

    #[test]
    fn predefined_entities_round_trip_in_attribute_values(
        text in "[a-z<>&'\" ]{0,64}",
        threaded in any::<bool>(),
    ) {
        let escaped = escape(&text);
        let mut reader = XMLReaderBuilder::new()
            .set_handler(AttributeCollector::default())
            .set_parser_config(if threaded { ParserConfig::default() } else { direct() })
            .build();
        reader
            .parse_str(&format!("<a x=\"{escaped}\" y='{escaped}'/>"), None)
            .unwrap();
        prop_assert_eq!(reader.handler.values.len(), 2);
        for value in &reader.handler.values {
            prop_assert_eq!(value, &text);
            prop_assert_eq!(escape(value), escaped.clone());
        }
    }

    #[test]
    fn character_references_round_trip(c in proptest::char::range('\u{20}', '\u{D7FF}')) {
        let mut reader = XMLReaderBuilder::new()
            .set_handler(TextCollector::default())
            .disable_option(ParserOption::WorkerThread)
            .build();
        reader
            .parse_str(&format!("<a>&#x{:X};&#{};</a>", c as u32, c as u32), None)
            .unwrap();
        prop_assert_eq!(reader.handler.text, format!("{c}{c}"));
    }
}

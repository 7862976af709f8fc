use std::{fmt::Write as _, fs};

use xmlweave::{
    error::XMLError,
    sax::{
        handler::{EntityResolver, SAXHandler},
        parser::ParserOption,
        source::InputSource,
    },
    stax::{XMLStreamReader, XMLStreamReaderBuilder, events::XMLEvent},
};

fn write_event(buffer: &mut String, event: &XMLEvent) {
    match event {
        XMLEvent::StartDocument => writeln!(buffer, "startDocument()").unwrap(),
        XMLEvent::EndDocument => writeln!(buffer, "endDocument()").unwrap(),
        XMLEvent::StartElement(start) => {
            write!(
                buffer,
                "startElement({:?}, {:?}, {}",
                start.namespace_uri(),
                start.prefix(),
                start.name()
            )
            .unwrap();
            for att in start.attributes() {
                write!(buffer, ", {}='{}'", att.qname, att.value).unwrap();
            }
            writeln!(buffer, ")").unwrap();
        }
        XMLEvent::EndElement(end) => writeln!(
            buffer,
            "endElement({:?}, {:?}, {})",
            end.namespace_uri(),
            end.prefix(),
            end.name()
        )
        .unwrap(),
        XMLEvent::Declaration(decl) => writeln!(
            buffer,
            "declaration({}, {:?}, {})",
            decl.version(),
            decl.encoding(),
            decl.is_standalone()
        )
        .unwrap(),
        XMLEvent::DocumentType(name) => writeln!(buffer, "documentType({name})").unwrap(),
        XMLEvent::Characters(data) => writeln!(buffer, "characters({data})").unwrap(),
        XMLEvent::CDATASection(data) => writeln!(buffer, "cdataSection({data})").unwrap(),
        XMLEvent::StartCDATA => writeln!(buffer, "startCDATA()").unwrap(),
        XMLEvent::EndCDATA => writeln!(buffer, "endCDATA()").unwrap(),
        XMLEvent::Space(data) => writeln!(buffer, "space({data:?})").unwrap(),
        XMLEvent::Comment(data) => writeln!(buffer, "comment({data})").unwrap(),
        XMLEvent::ProcessingInstruction(pi) => {
            writeln!(buffer, "pi({}, {:?})", pi.target(), pi.data()).unwrap()
        }
        XMLEvent::StartEntity(name) => writeln!(buffer, "startEntity({name})").unwrap(),
        XMLEvent::EndEntity(name) => writeln!(buffer, "endEntity({name})").unwrap(),
        XMLEvent::EntityReference(name) => writeln!(buffer, "entityReference({name})").unwrap(),
        XMLEvent::Finished => writeln!(buffer, "finished()").unwrap(),
    }
}

fn trace<R: EntityResolver>(reader: &mut XMLStreamReader<R>) -> Result<String, XMLError> {
    let mut buffer = String::new();
    loop {
        let event = reader.next_event()?;
        write_event(&mut buffer, &event);
        if matches!(event, XMLEvent::Finished) {
            break Ok(buffer);
        }
    }
}

#[test]
fn event_sequence() {
    let mut reader = XMLStreamReader::default();
    reader
        .parse_str(
            r#"<?xml version="1.0" standalone="yes"?>
<!DOCTYPE a [
    <!ELEMENT a ANY>
    <!-- not reported -->
    <!ENTITY e "value">
]>
<a xmlns="urn:x" b="1"><!--c--><?pi d?>t<![CDATA[x]]>&e;</a>"#,
            None,
        )
        .unwrap();
    assert_eq!(
        trace(&mut reader).unwrap(),
        r#"startDocument()
declaration(1.0, None, true)
documentType(a)
startElement(Some("urn:x"), None, a, b='1')
comment(c)
pi(pi, Some("d"))
characters(t)
startCDATA()
cdataSection(x)
endCDATA()
startEntity(e)
characters(value)
endEntity(e)
endElement(Some("urn:x"), None, a)
endDocument()
finished()
"#
    );
    assert!(matches!(reader.next_event().unwrap(), XMLEvent::Finished));
}

#[test]
fn namespace_scopes_follow_the_cursor() {
    let mut reader = XMLStreamReader::default();
    reader
        .parse_str(r#"<a xmlns:p="urn:p"><p:b xmlns:p="urn:inner"/><c/></a>"#, None)
        .unwrap();

    assert!(matches!(reader.next_event().unwrap(), XMLEvent::StartDocument));
    match reader.next_event().unwrap() {
        XMLEvent::StartElement(start) => {
            assert_eq!(start.name(), "a");
            assert!(start.attributes().is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(reader.namespace_uri(Some("p")), Some("urn:p"));

    match reader.next_event().unwrap() {
        XMLEvent::StartElement(start) => {
            assert_eq!(start.namespace_uri(), Some("urn:inner"));
            assert_eq!(start.prefix(), Some("p"));
            assert_eq!(start.local_name(), Some("b"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(reader.namespace_uri(Some("p")), Some("urn:inner"));
    assert!(matches!(reader.next_event().unwrap(), XMLEvent::EndElement(_)));
    // still in the scope of the element that has just ended
    assert_eq!(reader.namespace_uri(Some("p")), Some("urn:inner"));

    assert!(matches!(reader.next_event().unwrap(), XMLEvent::StartElement(_)));
    assert_eq!(reader.namespace_uri(Some("p")), Some("urn:p"));
    assert_eq!(reader.namespace_uri(Some("xml")), Some("http://www.w3.org/XML/1998/namespace"));
    assert_eq!(reader.namespace_uri(None), None);
}

#[test]
fn namespace_declarations_can_be_reported() {
    let mut reader = XMLStreamReaderBuilder::new()
        .enable_option(ParserOption::NamespacePrefixes)
        .build();
    reader.parse_str(r#"<a xmlns:p="urn:p" p:x="1"/>"#, None).unwrap();
    let trace = trace(&mut reader).unwrap();
    assert!(trace.contains("startElement(None, None, a, xmlns:p='urn:p', p:x='1')"));
}

#[test]
fn next_tag_skips_other_events() {
    let mut reader = XMLStreamReader::default();
    reader
        .parse_str("<a>text<!--c--><b>more</b></a>", None)
        .unwrap();
    let mut tags = vec![];
    loop {
        match reader.next_tag().unwrap() {
            XMLEvent::StartElement(start) => tags.push(format!("<{}>", start.name())),
            XMLEvent::EndElement(end) => tags.push(format!("</{}>", end.name())),
            XMLEvent::Finished => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(tags, ["<a>", "<b>", "</b>", "</a>"]);
}

#[test]
fn ignorable_whitespace_is_reported_as_space() {
    let mut reader = XMLStreamReader::default();
    reader
        .parse_str("<!DOCTYPE a [<!ELEMENT a (b)*><!ELEMENT b EMPTY>]><a>\n<b/>\n</a>", None)
        .unwrap();
    let trace = trace(&mut reader).unwrap();
    assert_eq!(trace.matches("space(\"\\n\")").count(), 2, "{trace}");
}

#[test]
fn fatal_error_ends_the_stream() {
    let mut reader = XMLStreamReader::default();
    reader.parse_str("<a><b></a>", None).unwrap();
    let mut names = vec![];
    let err = loop {
        match reader.next_event() {
            Ok(XMLEvent::StartElement(start)) => names.push(start.name().to_owned()),
            Ok(XMLEvent::Finished) => panic!("the document must not be accepted"),
            Ok(_) => {}
            Err(err) => break err,
        }
    };
    assert!(matches!(err, XMLError::ParserMismatchElementType));
    assert_eq!(names, ["a", "b"]);
    let report = reader.fatal_error().unwrap();
    assert!(matches!(report.error, XMLError::ParserMismatchElementType));
    assert_eq!(report.line, 1);
    assert!(matches!(reader.next_event().unwrap(), XMLEvent::Finished));
}

#[test]
fn close_releases_the_producer() {
    let mut document = String::from("<root>");
    for i in 0..10_000 {
        write!(document, "<item n='{i}'>{i}</item>").unwrap();
    }
    document.push_str("</root>");

    let mut reader = XMLStreamReader::default();
    reader.parse_str(&document, None).unwrap();
    assert!(matches!(reader.next_tag().unwrap(), XMLEvent::StartElement(_)));
    assert!(matches!(reader.next_tag().unwrap(), XMLEvent::StartElement(_)));
    reader.close();
    assert!(matches!(reader.next_event().unwrap(), XMLEvent::Finished));

    // the reader can start over
    reader.parse_str("<again/>", None).unwrap();
    match reader.next_tag().unwrap() {
        XMLEvent::StartElement(start) => assert_eq!(start.name(), "again"),
        other => panic!("unexpected event: {other:?}"),
    }
}

struct MemoryResolver {
    subset: &'static str,
}

impl EntityResolver for MemoryResolver {
    fn get_external_subset(
        &mut self,
        _name: &str,
        _base_uri: Option<&str>,
    ) -> Result<Option<InputSource>, XMLError> {
        Ok(Some(InputSource::from_content(self.subset)))
    }
}
impl SAXHandler for MemoryResolver {}

#[test]
fn entity_resolver_supplies_the_external_subset() {
    let mut reader = XMLStreamReaderBuilder::new()
        .set_entity_resolver(MemoryResolver {
            subset: r#"<!ENTITY greeting "hello"><!ATTLIST a b CDATA "default">"#,
        })
        .build();
    reader.parse_str("<!DOCTYPE a><a>&greeting;</a>", None).unwrap();
    let trace = trace(&mut reader).unwrap();
    assert!(trace.contains("startElement(None, None, a, b='default')"), "{trace}");
    assert!(trace.contains("characters(hello)"), "{trace}");
    assert_eq!(
        reader.entity_resolver().subset,
        r#"<!ENTITY greeting "hello"><!ATTLIST a b CDATA "default">"#
    );
}

#[test]
fn parse_document_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.xml");
    fs::write(&path, "<?xml version='1.0' encoding='UTF-8'?><a>caf\u{e9}</a>").unwrap();
    let mut reader = XMLStreamReader::default();
    reader.parse_uri(path.to_str().unwrap(), None).unwrap();
    let trace = trace(&mut reader).unwrap();
    assert!(trace.contains("declaration(1.0, Some(\"UTF-8\"), false)"));
    assert!(trace.contains("characters(caf\u{e9})"));
}

#[test]
fn missing_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.xml");
    let mut reader = XMLStreamReader::default();
    assert!(matches!(
        reader.parse_uri(path.to_str().unwrap(), None),
        Err(XMLError::IOError(_))
    ));
}

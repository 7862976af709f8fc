use std::fs;

use xmlweave::{
    dtd::{Entity, MarkupDecl},
    error::XMLError,
    sax::{
        AttributeType, ContentSpec, DefaultDecl,
        error::SAXParseError,
        handler::{DebugHandler, EntityResolver, SAXHandler},
        parser::{ParserOption, XMLReaderBuilder},
    },
};

#[test]
fn dtd_is_kept_after_a_threaded_parse() {
    let mut reader = XMLReaderBuilder::new().build();
    assert!(reader.config().is_enable(ParserOption::WorkerThread));
    reader
        .parse_str(
            r#"<!DOCTYPE a [<!ELEMENT a ANY><!ENTITY e "text">]><a>&e;</a>"#,
            None,
        )
        .unwrap();
    let dtd = reader.dtd().unwrap();
    assert!(dtd.is_closed());
    assert_eq!(dtd.name(), "a");
    assert!(dtd.element("a").is_some());
    assert!(matches!(
        dtd.general_entity("e").map(|entity| entity.as_ref()),
        Some(Entity::Internal { value, .. }) if &**value == "text"
    ));

    reader.parse_str("<b/>", None).unwrap();
    assert!(reader.dtd().is_none());
}

#[test]
fn content_models() {
    let mut reader = XMLReaderBuilder::new()
        .disable_option(ParserOption::WorkerThread)
        .build();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
                <!ELEMENT a ( b , ( c | d )* , e? )+ >
                <!ELEMENT b (#PCDATA)>
                <!ELEMENT c ( #PCDATA | b | d )* >
                <!ELEMENT d EMPTY>
                <!ELEMENT e ANY>
            ]><a><b/></a>"#,
            None,
        )
        .unwrap();
    let dtd = reader.dtd().unwrap();
    assert!(dtd.is_closed());
    assert_eq!(dtd.name(), "a");
    let content = |name: &str| dtd.element(name).and_then(|decl| decl.content.clone());
    assert_eq!(
        content("a"),
        Some(ContentSpec::Children("(b,(c|d)*,e?)+".into()))
    );
    assert_eq!(content("b"), Some(ContentSpec::Mixed(vec![])));
    assert_eq!(
        content("c"),
        Some(ContentSpec::Mixed(vec!["b".into(), "d".into()]))
    );
    assert_eq!(content("d"), Some(ContentSpec::EMPTY));
    assert_eq!(content("e"), Some(ContentSpec::ANY));
    assert!(!dtd.element("a").unwrap().has_text());
    assert!(dtd.element("c").unwrap().has_text());
    assert!(!dtd.element("d").unwrap().has_text());
    assert!(dtd.element("e").unwrap().has_text());
    assert_eq!(
        dtd.elements().map(|decl| &*decl.name).collect::<Vec<_>>(),
        ["a", "b", "c", "d", "e"]
    );
}

#[test]
fn malformed_content_models() {
    for decl in [
        "<!ELEMENT a (b|c,d)>",
        "<!ELEMENT a (#PCDATA|b)>",
        "<!ELEMENT a (b,#PCDATA)>",
        "<!ELEMENT a ()>",
        "<!ELEMENT a EMPTY ANY>",
        "<!ELEMENTa EMPTY>",
    ] {
        let mut reader = XMLReaderBuilder::new()
            .disable_option(ParserOption::WorkerThread)
            .build();
        let result = reader.parse_str(&format!("<!DOCTYPE a [{decl}]><a/>"), None);
        assert!(result.is_err(), "{decl}");
    }
}

#[test]
fn attribute_list_declarations() {
    let mut reader = XMLReaderBuilder::new()
        .disable_option(ParserOption::WorkerThread)
        .build();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
                <!NOTATION gif PUBLIC "-//GIF//EN">
                <!NOTATION png SYSTEM "png-viewer">
                <!ATTLIST a
                    id       ID                #IMPLIED
                    refs     IDREFS            #REQUIRED
                    tokens   NMTOKENS          "  x   y "
                    kind     (one|two)         "one"
                    format   NOTATION (gif|png) #IMPLIED
                    version  CDATA             #FIXED "1.0">
            ]><a refs="r"/>"#,
            None,
        )
        .unwrap();
    let dtd = reader.dtd().unwrap();
    let decl = dtd.element("a").unwrap();
    let names = decl.attributes.keys().map(|name| &**name).collect::<Vec<_>>();
    assert_eq!(names, ["id", "refs", "tokens", "kind", "format", "version"]);
    assert_eq!(decl.attribute("id").unwrap().atype, AttributeType::ID);
    assert_eq!(decl.attribute("refs").unwrap().default, DefaultDecl::REQUIRED);
    assert_eq!(
        decl.attribute("tokens").unwrap().default,
        DefaultDecl::None("x y".into())
    );
    assert_eq!(
        decl.attribute("kind").unwrap().atype,
        AttributeType::Enumeration(vec!["one".into(), "two".into()])
    );
    assert_eq!(
        decl.attribute("format").unwrap().atype,
        AttributeType::NOTATION(vec!["gif".into(), "png".into()])
    );
    assert_eq!(
        decl.attribute("version").unwrap().default,
        DefaultDecl::FIXED("1.0".into())
    );
    assert_eq!(
        dtd.notation("gif").unwrap().public_id.as_deref(),
        Some("-//GIF//EN")
    );
    assert_eq!(dtd.notation("png").unwrap().public_id, None);
}

#[test]
fn entity_declarations() {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .disable_option(ParserOption::WorkerThread)
        .build();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
                <!NOTATION n SYSTEM "viewer">
                <!ENTITY % p "parameter">
                <!ENTITY g "general %p; &#65;">
                <!ENTITY ext PUBLIC "-//EXT//EN" "ext.xml">
                <!ENTITY img SYSTEM "img.png" NDATA n>
            ]><a/>"#,
            Some("file:///tmp/xmlweave/doc.xml"),
        )
        .unwrap_err();
    // '%p;' in an entity value of the internal subset is not allowed
    assert!(
        reader
            .handler
            .buffer
            .contains("fatalError(ParserInvalidPEReferenceInInternalSubset)"),
        "{}",
        reader.handler.buffer
    );

    reader.handler.buffer.clear();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
                <!NOTATION n SYSTEM "viewer">
                <!ENTITY % p "parameter">
                <!ENTITY g "general &#65;">
                <!ENTITY ext PUBLIC "-//EXT//EN" "ext.xml">
                <!ENTITY img SYSTEM "img.png" NDATA n>
            ]><a/>"#,
            Some("file:///tmp/xmlweave/doc.xml"),
        )
        .unwrap();
    let buffer = &reader.handler.buffer;
    assert!(buffer.contains("internalEntityDecl(%p, parameter)"));
    assert!(buffer.contains("internalEntityDecl(g, general A)"));
    assert!(buffer.contains("externalEntityDecl(ext, Some(\"-//EXT//EN\"), ext.xml)"));
    assert!(buffer.contains("unparsedEntityDecl(img, None, img.png, n)"));

    let dtd = reader.dtd().unwrap();
    assert!(dtd.parameter_entity("p").is_some());
    assert!(dtd.general_entity("p").is_none());
    match dtd.general_entity("ext").map(|entity| entity.as_ref()) {
        Some(Entity::External {
            system_id,
            base_uri,
            notation: None,
            ..
        }) => {
            assert_eq!(&**system_id, "ext.xml");
            assert_eq!(
                base_uri.as_ref().map(|url| url.as_str()),
                Some("file:///tmp/xmlweave/doc.xml")
            );
        }
        other => panic!("unexpected entity: {other:?}"),
    }
    assert!(dtd.general_entity("img").unwrap().is_unparsed());
    assert!(matches!(
        dtd.declarations().first(),
        Some(MarkupDecl::Notation { .. })
    ));
}

#[test]
fn duplicate_declarations_are_recoverable() {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .build();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
                <!ENTITY e "first">
                <!ENTITY e "second">
                <!ELEMENT a ANY>
                <!ELEMENT a EMPTY>
                <!ATTLIST a id ID #IMPLIED other ID #IMPLIED>
                <!ATTLIST a id CDATA "x">
                <!NOTATION n SYSTEM "v">
                <!NOTATION n SYSTEM "w">
            ]><a>&e;</a>"#,
            None,
        )
        .unwrap();
    let buffer = &reader.handler.buffer;
    assert!(buffer.contains("warning(ParserDuplicateEntityDecl)"));
    assert!(buffer.contains("error(ParserDuplicateElementDecl)"));
    assert!(buffer.contains("error(ParserMultipleIDAttributePerElement)"));
    assert!(buffer.contains("warning(ParserDuplicateAttlistDecl)"));
    assert!(buffer.contains("error(ParserDuplicateNotationDecl)"));
    assert!(buffer.contains("characters(first)"));
    assert!(!buffer.contains("characters(second)"));
    assert!(buffer.contains("endDocument()"));
}

struct Strict;

impl EntityResolver for Strict {}
impl SAXHandler for Strict {
    fn error(&mut self, error: SAXParseError) -> Result<(), XMLError> {
        Err(error.error)
    }
}

#[test]
fn handlers_can_escalate_errors() {
    for threaded in [true, false] {
        let mut reader = XMLReaderBuilder::new().set_handler(Strict).build();
        let mut config = reader.config().clone();
        config.set_option(ParserOption::WorkerThread, threaded);
        reader.set_parser_config(config);
        let result =
            reader.parse_str("<!DOCTYPE a [<!ELEMENT a ANY><!ELEMENT a ANY>]><a/>", None);
        assert!(
            matches!(result, Err(XMLError::ParserDuplicateElementDecl)),
            "{result:?}"
        );
    }
}

#[test]
fn id_attributes_require_implied_or_required() {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .disable_option(ParserOption::WorkerThread)
        .build();
    reader
        .parse_str(r#"<!DOCTYPE a [<!ATTLIST a id ID "x">]><a/>"#, None)
        .unwrap();
    assert!(
        reader
            .handler
            .buffer
            .contains("error(ParserInvalidIDAttributeDefault)")
    );
}

#[test]
fn external_subset_with_conditional_sections() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("doc.dtd"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!ENTITY % draft "INCLUDE">
<!ENTITY % final "IGNORE">
<!ENTITY % name "title">
<![%draft;[
    <!ELEMENT a (#PCDATA)>
]]>
<![ %final; [
    <!ELEMENT a EMPTY>
    <![INCLUDE[ <!ELEMENT ignored ANY> ]]>
]]>
<!ENTITY % att "<!ATTLIST a kind CDATA 'x'>">
%att;
<!ATTLIST a %name; CDATA #IMPLIED>
<!ENTITY % mod SYSTEM "mod/extra.ent">
%mod;
"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("mod")).unwrap();
    fs::write(
        dir.path().join("mod").join("extra.ent"),
        "<!ENTITY greeting SYSTEM \"greeting.txt\">",
    )
    .unwrap();
    fs::write(dir.path().join("mod").join("greeting.txt"), "hello").unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(
        &doc,
        "<!DOCTYPE a SYSTEM \"doc.dtd\" [<!ENTITY local \"internal first\">]><a>&greeting;</a>",
    )
    .unwrap();

    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .disable_option(ParserOption::WorkerThread)
        .build();
    reader.parse_uri(doc.to_str().unwrap(), None).unwrap();
    let buffer = &reader.handler.buffer;
    assert!(buffer.contains("startEntity([dtd])"), "{buffer}");
    assert!(buffer.contains("endEntity([dtd])"), "{buffer}");
    assert!(buffer.contains("characters(hello)"), "{buffer}");

    let dtd = reader.dtd().unwrap();
    assert!(dtd.has_external_subset());
    assert!(dtd.has_pe_reference());
    assert!(dtd.element("ignored").is_none());
    let a = dtd.element("a").unwrap();
    assert_eq!(a.content, Some(ContentSpec::Mixed(vec![])));
    assert_eq!(a.attribute("kind").unwrap().default, DefaultDecl::None("x".into()));
    assert_eq!(a.attribute("title").unwrap().default, DefaultDecl::IMPLIED);
    assert!(a.attribute("kind").unwrap().external_markup);
    assert!(
        dtd.general_entity("greeting")
            .unwrap()
            .is_declared_in_external_markup()
    );
    assert!(
        !dtd.general_entity("local")
            .unwrap()
            .is_declared_in_external_markup()
    );
}

#[test]
fn external_parameter_entities_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.ent"), "<!ENTITY e \"from module\">").unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(
        &doc,
        "<!DOCTYPE a [<!ENTITY % mod SYSTEM \"mod.ent\">%mod;]><a>&e;</a>",
    )
    .unwrap();

    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .disable_option(ParserOption::ExternalParameterEntities)
        .build();
    reader.parse_uri(doc.to_str().unwrap(), None).unwrap();
    let buffer = &reader.handler.buffer;
    assert!(buffer.contains("skippedEntity(%mod)"), "{buffer}");
    // the DTD may be incomplete, so the undeclared entity is skipped
    assert!(buffer.contains("skippedEntity(e)"), "{buffer}");

    reader.handler.buffer.clear();
    let mut config = reader.config().clone();
    config.set_option(ParserOption::ExternalParameterEntities, true);
    reader.set_parser_config(config);
    reader.parse_uri(doc.to_str().unwrap(), None).unwrap();
    assert!(reader.handler.buffer.contains("characters(from module)"));
}

#[test]
fn standalone_documents_reject_external_markup_entities() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("doc.dtd"), "<!ENTITY e \"external\">").unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(
        &doc,
        "<?xml version=\"1.0\" standalone=\"yes\"?><!DOCTYPE a SYSTEM \"doc.dtd\"><a>&e;</a>",
    )
    .unwrap();
    let mut reader = XMLReaderBuilder::new().build();
    assert!(matches!(
        reader.parse_uri(doc.to_str().unwrap(), None),
        Err(XMLError::ParserInvalidStandaloneDocument)
    ));
}

#[test]
fn text_declaration_is_only_allowed_at_the_start() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("doc.dtd"),
        "<!ELEMENT a ANY>\n<?xml version=\"1.0\"?>",
    )
    .unwrap();
    let doc = dir.path().join("doc.xml");
    fs::write(&doc, "<!DOCTYPE a SYSTEM \"doc.dtd\"><a/>").unwrap();
    let mut reader = XMLReaderBuilder::new().build();
    assert!(matches!(
        reader.parse_uri(doc.to_str().unwrap(), None),
        Err(XMLError::ParserInvalidTextDecl)
    ));
}

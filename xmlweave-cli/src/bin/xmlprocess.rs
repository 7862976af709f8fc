use std::{fmt::Write as _, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use xmlweave::{
    sax::{
        handler::DebugHandler,
        parser::{ParserConfig, ParserOption, XMLReaderBuilder},
    },
    stax::{XMLStreamReaderBuilder, events::XMLEvent},
};

#[derive(Parser)]
#[command(version, about)]
struct CmdArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the event trace of documents
    Inspect {
        #[arg(long, value_enum, default_value_t = Mode::Sax)]
        mode: Mode,
        #[arg(long, help = "disable namespace handling")]
        no_namespace: bool,
        #[arg(long, help = "enable secure processing limits")]
        secure: bool,
        #[arg(help = "path to the target XML document", required = true)]
        file: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// SAX callbacks delivered from a producer thread
    Sax,
    /// SAX callbacks on the current thread
    SaxDirect,
    /// StAX cursor
    Stax,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Command::Inspect {
        mode,
        no_namespace,
        secure,
        file,
    } = CmdArgs::parse().command;

    let mut config = ParserConfig::default();
    config.set_option(ParserOption::Namespaces, !no_namespace);
    config.set_option(ParserOption::SecureProcessing, secure);
    config.set_option(ParserOption::WorkerThread, mode == Mode::Sax);

    for file in file {
        let uri = file.to_string_lossy();
        if mode == Mode::Stax {
            print!("{}", inspect_stax(config.clone(), &uri)?);
        } else {
            let mut reader = XMLReaderBuilder::new()
                .set_handler(DebugHandler::default())
                .set_parser_config(config.clone())
                .build();
            let result = reader.parse_uri(&uri, None);
            print!("{}", reader.handler.buffer);
            result?;
        }
    }
    Ok(())
}

fn inspect_stax(config: ParserConfig, uri: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut reader = XMLStreamReaderBuilder::new()
        .set_parser_config(config)
        .build();
    reader.parse_uri(uri, None)?;
    let mut buffer = String::new();
    loop {
        match reader.next_event()? {
            XMLEvent::StartDocument => writeln!(buffer, "startDocument()")?,
            XMLEvent::EndDocument => writeln!(buffer, "endDocument()")?,
            XMLEvent::StartElement(start) => {
                write!(
                    buffer,
                    "startElement({}, {}, {}, {}",
                    start.namespace_uri().unwrap_or("None"),
                    start.prefix().unwrap_or("None"),
                    start.local_name().unwrap_or("None"),
                    start.name()
                )?;
                for att in start.attributes() {
                    write!(buffer, ", ")?;
                    match (att.local_name.as_deref(), att.uri.as_deref()) {
                        (Some(local_name), Some(uri)) => {
                            write!(buffer, "{{{uri}}}{local_name}='{}'", att.value)?
                        }
                        (Some(local_name), None) => write!(buffer, "{local_name}='{}'", att.value)?,
                        _ => write!(buffer, "{}='{}'", att.qname, att.value)?,
                    }
                }
                writeln!(buffer, ")")?;
            }
            XMLEvent::EndElement(end) => writeln!(
                buffer,
                "endElement({}, {}, {}, {})",
                end.namespace_uri().unwrap_or("None"),
                end.prefix().unwrap_or("None"),
                end.local_name().unwrap_or("None"),
                end.name()
            )?,
            XMLEvent::Declaration(declaration) => writeln!(
                buffer,
                "declaration({}, {:?}, {:?})",
                declaration.version(),
                declaration.encoding(),
                declaration.standalone()
            )?,
            XMLEvent::DocumentType(name) => writeln!(buffer, "documentType({name})")?,
            XMLEvent::Characters(data) => writeln!(buffer, "characters({data})")?,
            XMLEvent::CDATASection(data) => writeln!(buffer, "cdataSection({data})")?,
            XMLEvent::StartCDATA => writeln!(buffer, "startCDATA()")?,
            XMLEvent::EndCDATA => writeln!(buffer, "endCDATA()")?,
            XMLEvent::Space(data) => writeln!(buffer, "space({data})")?,
            XMLEvent::Comment(data) => writeln!(buffer, "comment({data})")?,
            XMLEvent::ProcessingInstruction(pi) => writeln!(
                buffer,
                "processingInstruction({}, {:?})",
                pi.target(),
                pi.data()
            )?,
            XMLEvent::StartEntity(name) => writeln!(buffer, "startEntity({name})")?,
            XMLEvent::EndEntity(name) => writeln!(buffer, "endEntity({name})")?,
            XMLEvent::EntityReference(name) => writeln!(buffer, "entityReference({name})")?,
            XMLEvent::Finished => break,
        }
    }
    Ok(buffer)
}

//! RDF deserializer family (§4.3, §4.4): byte streams in, a [`Cursor`] of
//! quads out. One closed `Format` enum drives dispatch for every deserializer
//! and every serializer (§4.5) so a new wire format is wired into parsing,
//! writing, and HTTP content negotiation all at once or not at all.

pub mod turtle;
pub mod sparql_json;
pub mod sparql_xml;
pub mod jsonld;
pub mod resource_tree;

use std::io::Read;
use thiserror::Error;

pub use turtle::{row_as_triple_parts, Term, TurtleParser};
pub use resource_tree::{ResourceNode, ResourceTreeCursor};

/// The five wire formats this engine speaks, shared by deserializers,
/// serializers, and the endpoint adapter's content negotiation (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    SparqlJson,
    SparqlXml,
    Turtle,
    TriG,
    JsonLd,
}

impl Format {
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::SparqlJson => "application/sparql-results+json",
            Format::SparqlXml => "application/sparql-results+xml",
            Format::Turtle => "text/turtle",
            Format::TriG => "application/trig",
            Format::JsonLd => "application/ld+json",
        }
    }

    pub fn format_iri(self) -> &'static str {
        match self {
            Format::SparqlJson => "http://www.w3.org/ns/formats/SPARQL_Results_JSON",
            Format::SparqlXml => "http://www.w3.org/ns/formats/SPARQL_Results_XML",
            Format::Turtle => "http://www.w3.org/ns/formats/Turtle",
            Format::TriG => "http://www.w3.org/ns/formats/TriG",
            Format::JsonLd => "http://www.w3.org/ns/formats/JSON-LD",
        }
    }

    /// All formats, in the fixed order used for content-negotiation index
    /// lookups (`TRACKER_TEST_PREFERRED_CURSOR_FORMAT`, §6).
    pub const ALL: [Format; 5] = [
        Format::SparqlJson,
        Format::SparqlXml,
        Format::Turtle,
        Format::TriG,
        Format::JsonLd,
    ];

    pub fn from_mime(mime: &str) -> Option<Format> {
        Self::ALL.into_iter().find(|f| f.mime_type() == mime)
    }
}

/// `(line, column, kind, message)` — every parse failure, regardless of
/// format, carries this shape (§7).
#[derive(Error, Debug, Clone)]
#[error("parse error at {line}:{column}: {kind:?}: {message}")]
pub struct ParseError {
    pub line: u64,
    pub column: u64,
    pub kind: ParseErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    UnknownPrefix,
    StringTooLarge,
    UnterminatedString,
    Io,
    UnsupportedConstruct,
}

impl ParseError {
    pub fn new(line: u64, column: u64, kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self { line, column, kind, message: message.into() }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::new(0, 0, ParseErrorKind::Io, e.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Constructs the matching deserializer for a byte stream in one of the
/// three non-Turtle formats sharing the cursor protocol (§4.4). Turtle/TriG
/// go through [`TurtleParser::new`]/[`TurtleParser::new_trig`] directly since
/// they additionally need namespace-manager wiring and a `parse_trig` flag.
pub fn open_deserializer(
    format: Format,
    reader: Box<dyn Read>,
) -> ParseResult<Box<dyn crate::rdf::cursor::Cursor>> {
    match format {
        Format::SparqlJson => Ok(Box::new(sparql_json::SparqlJsonDeserializer::new(reader)?)),
        Format::SparqlXml => Ok(Box::new(sparql_xml::SparqlXmlDeserializer::new(reader)?)),
        Format::JsonLd => Ok(Box::new(jsonld::JsonLdDeserializer::new(reader)?)),
        Format::Turtle | Format::TriG => Err(ParseError::new(
            0,
            0,
            ParseErrorKind::UnsupportedConstruct,
            "Turtle/TriG must be opened via TurtleParser::new/new_trig",
        )),
    }
}

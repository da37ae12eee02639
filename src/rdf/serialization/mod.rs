//! Serializer family (§4.5): each serializer is a byte [`Read`] stream
//! wrapping a [`Cursor`] plus a [`NamespaceManager`]. A `read()` of N bytes
//! pulls as many `cursor.next()` calls as needed to keep the internal text
//! buffer topped up, then copies bytes out — the serializer never
//! materializes the whole result in memory up front except where grouping
//! (Turtle/TriG's per-subject blocks) makes that the natural unit of work.

pub mod jsonld;
pub mod sparql_json;
pub mod sparql_xml;
pub mod trig;
pub mod turtle;

use std::io::{self, Read};

use thiserror::Error;

use crate::rdf::cursor::{CancelToken, Cursor, CursorError, ValueType};
use crate::rdf::namespace::NamespaceManager;
use crate::rdf::parser::Format;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("serializer cannot render value of type {0:?}")]
    UnsupportedValueType(ValueType),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialize error: {0}")]
    Other(String),
}

pub type SerializeResult<T> = Result<T, SerializeError>;

/// A cursor cell rendered into the shape every serializer needs: either a
/// resource reference or a literal with its effective datatype IRI (derived
/// from [`ValueType`] — see [`datatype_iri_for`]).
#[derive(Debug, Clone)]
pub enum TermOut {
    Iri(String),
    BlankNode(String),
    Literal { lexical: String, language: Option<String>, datatype: Option<String> },
    Unbound,
}

/// The `Cursor` trait reports a cell's *kind* (`ValueType`) rather than an
/// arbitrary datatype IRI, so the datatype a literal renders with is derived
/// from its value type, not stored verbatim — the same simplification the
/// cursor protocol itself makes (§4.2, §9's closed-sum-type design note).
pub fn datatype_iri_for(vt: ValueType) -> Option<&'static str> {
    match vt {
        ValueType::Integer => Some("http://www.w3.org/2001/XMLSchema#integer"),
        ValueType::Double => Some("http://www.w3.org/2001/XMLSchema#double"),
        ValueType::Boolean => Some("http://www.w3.org/2001/XMLSchema#boolean"),
        ValueType::Datetime => Some("http://www.w3.org/2001/XMLSchema#dateTime"),
        ValueType::String => Some("http://www.w3.org/2001/XMLSchema#string"),
        ValueType::Literal | ValueType::Iri | ValueType::BlankNode | ValueType::Unbound => None,
    }
}

pub fn term_of(cursor: &dyn Cursor, i: usize) -> SerializeResult<TermOut> {
    match cursor.value_type(i)? {
        ValueType::Unbound => Ok(TermOut::Unbound),
        ValueType::Iri => Ok(TermOut::Iri(cursor.string(i)?.0)),
        ValueType::BlankNode => Ok(TermOut::BlankNode(cursor.string(i)?.0)),
        vt => {
            let (lexical, language, _) = cursor.string(i)?;
            let datatype = if language.is_some() {
                Some("http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".to_string())
            } else {
                datatype_iri_for(vt).map(str::to_string)
            };
            Ok(TermOut::Literal { lexical, language, datatype })
        }
    }
}

/// A source of text chunks, pulled lazily by a [`ChunkReader`]. Each
/// concrete serializer implements this rather than `Read` directly so the
/// buffering/copy-out mechanics live in one place.
pub trait ChunkSource {
    /// Returns the next chunk of rendered text, or `None` once the cursor
    /// (and any closing syntax) is exhausted.
    fn next_chunk(&mut self) -> SerializeResult<Option<String>>;
}

/// Adapts a [`ChunkSource`] into a byte [`Read`] stream, pulling chunks on
/// demand and buffering any leftover bytes between `read()` calls.
pub struct ChunkReader<S: ChunkSource> {
    source: S,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<S: ChunkSource> ChunkReader<S> {
    pub fn new(source: S) -> Self {
        Self { source, buf: Vec::new(), pos: 0, done: false }
    }
}

impl<S: ChunkSource> Read for ChunkReader<S> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() && !self.done {
            match self.source.next_chunk().map_err(|e| io::Error::new(io::ErrorKind::Other, e))? {
                Some(chunk) => {
                    self.buf = chunk.into_bytes();
                    self.pos = 0;
                }
                None => self.done = true,
            }
        }
        let available = &self.buf[self.pos..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Constructs the matching serializer for a cursor of quads/bindings (§4.5).
/// SPARQL-JSON/XML expect a bindings-shaped cursor (named variable columns);
/// Turtle/TriG/JSON-LD expect a quad-shaped cursor (subject, predicate,
/// object, graph).
pub fn open_serializer(
    format: Format,
    cursor: Box<dyn Cursor>,
    namespaces: NamespaceManager,
    cancel: CancelToken,
) -> Box<dyn Read> {
    match format {
        Format::SparqlJson => Box::new(ChunkReader::new(sparql_json::SparqlJsonSerializer::new(cursor, cancel))),
        Format::SparqlXml => Box::new(ChunkReader::new(sparql_xml::SparqlXmlSerializer::new(cursor, cancel))),
        Format::Turtle => Box::new(ChunkReader::new(turtle::TurtleSerializer::new(cursor, namespaces, cancel))),
        Format::TriG => Box::new(ChunkReader::new(trig::TriGSerializer::new(cursor, namespaces, cancel))),
        Format::JsonLd => Box::new(ChunkReader::new(jsonld::JsonLdSerializer::new(cursor, namespaces, cancel))),
    }
}

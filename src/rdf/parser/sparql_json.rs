//! SPARQL-JSON deserializer (§4.4): the inverse of the SPARQL-JSON
//! serializer (§4.5.1). Parses the `head`/`results.bindings` shape into a
//! cursor, one column per declared variable.

use std::io::Read;

use serde_json::Value;

use crate::rdf::cursor::{CancelToken, Cell, Cursor, CursorResult, ValueType, VecCursor};

use super::{ParseError, ParseErrorKind, ParseResult};

pub struct SparqlJsonDeserializer(VecCursor);

impl SparqlJsonDeserializer {
    pub fn new(mut reader: Box<dyn Read>) -> ParseResult<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Io, e.to_string()))?;
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Syntax, e.to_string()))?;

        let vars: Vec<String> = root["head"]["vars"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let bindings = root["results"]["bindings"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let mut row = Vec::with_capacity(vars.len());
            for var in &vars {
                row.push(match binding.get(var) {
                    Some(b) => cell_from_binding(b)?,
                    None => Cell::Unbound,
                });
            }
            rows.push(row);
        }

        let names = vars.into_iter().map(Some).collect();
        Ok(Self(VecCursor::new(names, rows)))
    }
}

fn cell_from_binding(binding: &Value) -> ParseResult<Cell> {
    let kind = binding["type"].as_str().unwrap_or("literal");
    let value = binding["value"].as_str().unwrap_or("").to_string();
    match kind {
        "uri" => Ok(Cell::Iri(value)),
        "bnode" => Ok(Cell::BlankNode(value)),
        "literal" | "typed-literal" => {
            let language = binding["xml:lang"].as_str().map(str::to_string);
            let datatype = binding["datatype"]
                .as_str()
                .unwrap_or("http://www.w3.org/2001/XMLSchema#string")
                .to_string();
            Ok(Cell::Literal { lexical: value, datatype, language })
        }
        other => Err(ParseError::new(
            0,
            0,
            ParseErrorKind::UnsupportedConstruct,
            format!("unknown SPARQL-JSON binding type: {other}"),
        )),
    }
}

impl Cursor for SparqlJsonDeserializer {
    fn column_count(&self) -> usize {
        self.0.column_count()
    }

    fn variable_name(&self, i: usize) -> Option<&str> {
        self.0.variable_name(i)
    }

    fn value_type(&self, i: usize) -> CursorResult<ValueType> {
        self.0.value_type(i)
    }

    fn string(&self, i: usize) -> CursorResult<(String, Option<String>, usize)> {
        self.0.string(i)
    }

    fn integer(&self, i: usize) -> CursorResult<i64> {
        self.0.integer(i)
    }

    fn double(&self, i: usize) -> CursorResult<f64> {
        self.0.double(i)
    }

    fn boolean(&self, i: usize) -> CursorResult<bool> {
        self.0.boolean(i)
    }

    fn datetime(&self, i: usize) -> CursorResult<chrono::DateTime<chrono::Utc>> {
        self.0.datetime(i)
    }

    fn next(&mut self, cancel: &CancelToken) -> CursorResult<bool> {
        self.0.next(cancel)
    }

    fn close(&mut self) {
        self.0.close()
    }
}

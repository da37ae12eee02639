//! SPARQL-XML deserializer (§4.4): the inverse of the SPARQL-XML serializer
//! (§4.5.2). Parses `<sparql><head>…</head><results>…</results></sparql>`.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::rdf::cursor::{CancelToken, Cell, Cursor, CursorResult, ValueType, VecCursor};

use super::{ParseError, ParseErrorKind, ParseResult};

pub struct SparqlXmlDeserializer(VecCursor);

impl SparqlXmlDeserializer {
    pub fn new(mut reader: Box<dyn Read>) -> ParseResult<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Io, e.to_string()))?;

        let mut xml = Reader::from_str(&text);
        xml.config_mut().trim_text = true;

        let mut vars: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<Cell>> = Vec::new();

        let mut current_row: Vec<Option<Cell>> = Vec::new();
        let mut current_binding_name: Option<String> = None;
        let mut current_term_kind: Option<&'static str> = None;
        let mut current_lang: Option<String> = None;
        let mut current_datatype: Option<String> = None;
        let mut text_buf = String::new();
        let mut in_results = false;

        let mut buf = Vec::new();
        loop {
            match xml
                .read_event_into(&mut buf)
                .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Syntax, e.to_string()))?
            {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) => {
                    let name = e.name();
                    let local = String::from_utf8_lossy(name.as_ref()).to_string();
                    match local.as_str() {
                        "variable" => {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"name" {
                                    vars.push(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                        "results" => in_results = true,
                        "result" => {
                            current_row = vec![None; vars.len()];
                        }
                        "binding" => {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"name" {
                                    current_binding_name =
                                        Some(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                        "uri" => current_term_kind = Some("uri"),
                        "bnode" => current_term_kind = Some("bnode"),
                        "literal" => {
                            current_term_kind = Some("literal");
                            current_lang = None;
                            current_datatype = None;
                            for attr in e.attributes().flatten() {
                                match attr.key.as_ref() {
                                    b"xml:lang" => {
                                        current_lang =
                                            Some(String::from_utf8_lossy(&attr.value).to_string())
                                    }
                                    b"datatype" => {
                                        current_datatype =
                                            Some(String::from_utf8_lossy(&attr.value).to_string())
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                    text_buf.clear();
                }
                Event::Text(t) => {
                    text_buf.push_str(
                        &t.unescape()
                            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Syntax, e.to_string()))?,
                    );
                }
                Event::End(e) => {
                    let local = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    match local.as_str() {
                        "uri" | "bnode" | "literal" => {
                            let cell = match current_term_kind {
                                Some("uri") => Cell::Iri(text_buf.clone()),
                                Some("bnode") => Cell::BlankNode(text_buf.clone()),
                                _ => Cell::Literal {
                                    lexical: text_buf.clone(),
                                    datatype: current_datatype
                                        .clone()
                                        .unwrap_or_else(|| "http://www.w3.org/2001/XMLSchema#string".to_string()),
                                    language: current_lang.clone(),
                                },
                            };
                            if let Some(name) = &current_binding_name {
                                if let Some(idx) = vars.iter().position(|v| v == name) {
                                    current_row[idx] = Some(cell);
                                }
                            }
                            current_term_kind = None;
                        }
                        "binding" => current_binding_name = None,
                        "result" => {
                            let row = current_row
                                .drain(..)
                                .map(|c| c.unwrap_or(Cell::Unbound))
                                .collect();
                            rows.push(row);
                        }
                        _ => {}
                    }
                    text_buf.clear();
                }
                _ => {}
            }
            buf.clear();
        }
        let _ = in_results;

        let names = vars.into_iter().map(Some).collect();
        Ok(Self(VecCursor::new(names, rows)))
    }
}

impl Cursor for SparqlXmlDeserializer {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variables_and_bindings() {
        let xml = r#"<?xml version="1.0"?>
<sparql>
  <head><variable name="s"/><variable name="o"/></head>
  <results>
    <result>
      <binding name="s"><uri>http://e/a</uri></binding>
      <binding name="o"><literal xml:lang="en">hello</literal></binding>
    </result>
  </results>
</sparql>"#;
        let mut cursor = SparqlXmlDeserializer::new(Box::new(xml.as_bytes())).unwrap();
        let token = CancelToken::new();
        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/a");
        let (lex, lang, _) = cursor.string(1).unwrap();
        assert_eq!(lex, "hello");
        assert_eq!(lang.as_deref(), Some("en"));
    }
}

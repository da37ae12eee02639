//! JSON-LD deserializer (§4.4): a minimal subset sufficient to round-trip
//! what the JSON-LD serializer (§4.5.5) emits — node objects keyed by
//! `@id` with predicate-keyed arrays of `{"@id":…}`/`{"@value":…}` objects.
//! Full context processing (remote `@context` dereferencing, term aliasing
//! beyond the namespace manager's own prefixes) is out of scope; anything
//! outside this subset fails with `Parse` rather than being silently dropped.

use std::io::Read;

use serde_json::Value;

use crate::rdf::cursor::{CancelToken, Cell, Cursor, CursorResult, ValueType, VecCursor};

use super::{ParseError, ParseErrorKind, ParseResult};

pub struct JsonLdDeserializer(VecCursor);

impl JsonLdDeserializer {
    pub fn new(mut reader: Box<dyn Read>) -> ParseResult<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Io, e.to_string()))?;
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| ParseError::new(0, 0, ParseErrorKind::Syntax, e.to_string()))?;

        let nodes: Vec<Value> = match &root {
            Value::Array(a) => a.clone(),
            Value::Object(_) => vec![root.clone()],
            _ => {
                return Err(ParseError::new(
                    0,
                    0,
                    ParseErrorKind::UnsupportedConstruct,
                    "JSON-LD document must be a node object or array of node objects",
                ))
            }
        };

        let mut rows = Vec::new();
        for node in &nodes {
            let subject = node
                .get("@id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ParseError::new(0, 0, ParseErrorKind::UnsupportedConstruct, "node object missing @id")
                })?
                .to_string();
            let subject_cell = subject_cell(&subject);

            let Value::Object(map) = node else { unreachable!() };
            for (key, value) in map {
                if key == "@id" || key == "@context" {
                    continue;
                }
                let predicate = if key == "@type" {
                    "http://www.w3.org/1999/02/22-rdf-syntax-ns#type".to_string()
                } else {
                    key.clone()
                };
                let values = match value {
                    Value::Array(a) => a.clone(),
                    other => vec![other.clone()],
                };
                for v in values {
                    let object_cell = object_cell(&v)?;
                    rows.push(vec![
                        subject_cell.clone(),
                        Cell::Iri(predicate.clone()),
                        object_cell,
                        Cell::Unbound,
                    ]);
                }
            }
        }

        let names = vec![
            Some("subject".to_string()),
            Some("predicate".to_string()),
            Some("object".to_string()),
            Some("graph".to_string()),
        ];
        Ok(Self(VecCursor::new(names, rows)))
    }
}

fn subject_cell(subject: &str) -> Cell {
    if let Some(label) = subject.strip_prefix("_:") {
        Cell::BlankNode(label.to_string())
    } else {
        Cell::Iri(subject.to_string())
    }
}

fn object_cell(value: &Value) -> ParseResult<Cell> {
    if let Some(s) = value.as_str() {
        // `@type` arrays may carry bare IRI strings rather than `{"@id":…}`.
        return Ok(Cell::Iri(s.to_string()));
    }
    let obj = value.as_object().ok_or_else(|| {
        ParseError::new(0, 0, ParseErrorKind::UnsupportedConstruct, "expected an @id or @value object")
    })?;
    if let Some(id) = obj.get("@id").and_then(Value::as_str) {
        return Ok(subject_cell(id));
    }
    if let Some(v) = obj.get("@value") {
        let lexical = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let language = obj.get("@language").and_then(Value::as_str).map(str::to_string);
        let datatype = obj
            .get("@type")
            .and_then(Value::as_str)
            .unwrap_or("http://www.w3.org/2001/XMLSchema#string")
            .to_string();
        return Ok(Cell::Literal { lexical, datatype, language });
    }
    Err(ParseError::new(0, 0, ParseErrorKind::UnsupportedConstruct, "object has neither @id nor @value"))
}

impl Cursor for JsonLdDeserializer {
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
    fn parses_node_object_with_literal_and_id() {
        let json = r#"[{
            "@id": "http://e/a",
            "http://e/name": [{"@value": "Alice"}],
            "http://e/knows": [{"@id": "http://e/b"}]
        }]"#;
        let mut cursor = JsonLdDeserializer::new(Box::new(json.as_bytes())).unwrap();
        let token = CancelToken::new();
        let mut seen = Vec::new();
        while cursor.next(&token).unwrap() {
            seen.push(cursor.string(2).unwrap().0);
        }
        assert!(seen.contains(&"Alice".to_string()));
        assert!(seen.contains(&"http://e/b".to_string()));
    }
}

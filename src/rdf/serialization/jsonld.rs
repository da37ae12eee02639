//! JSON-LD serializer (§4.5.5): `@context` derived from the namespace
//! manager, followed by an array of node objects keyed by `@id`.
//!
//! The whole document is one JSON array, so unlike Turtle/TriG/SPARQL-JSON
//! this serializer buffers the full row set before rendering — there is no
//! natural prefix it could stream incrementally once nodes may be revisited
//! out of cursor order (the object-term of one row may match the subject of
//! an earlier row already emitted).

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::rdf::cursor::{CancelToken, Cursor};
use crate::rdf::namespace::NamespaceManager;

use super::{term_of, ChunkSource, SerializeResult, TermOut};

pub struct JsonLdSerializer {
    cursor: Box<dyn Cursor>,
    namespaces: NamespaceManager,
    cancel: CancelToken,
    emitted: bool,
}

impl JsonLdSerializer {
    pub fn new(cursor: Box<dyn Cursor>, namespaces: NamespaceManager, cancel: CancelToken) -> Self {
        Self { cursor, namespaces, cancel, emitted: false }
    }

    fn render(&mut self) -> SerializeResult<String> {
        let mut nodes: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();

        while self.cursor.next(&self.cancel)? {
            let subject = term_of(self.cursor.as_ref(), 0)?;
            let predicate = term_of(self.cursor.as_ref(), 1)?;
            let object = term_of(self.cursor.as_ref(), 2)?;

            let subject_id = match &subject {
                TermOut::Iri(s) => s.clone(),
                TermOut::BlankNode(b) => format!("_:{b}"),
                _ => continue,
            };
            let predicate_iri = match &predicate {
                TermOut::Iri(s) => s.clone(),
                _ => continue,
            };

            let entry = nodes.entry(subject_id.clone()).or_insert_with(|| {
                order.push(subject_id.clone());
                let mut m = Map::new();
                m.insert("@id".to_string(), Value::String(subject_id.clone()));
                m
            });

            let key = if predicate_iri == "http://www.w3.org/1999/02/22-rdf-syntax-ns#type" {
                "@type".to_string()
            } else {
                predicate_iri
            };

            let value = render_object_value(&object);
            match entry.get_mut(&key) {
                Some(Value::Array(arr)) => arr.push(value),
                Some(existing) => {
                    let prev = existing.clone();
                    *existing = Value::Array(vec![prev, value]);
                }
                None => {
                    entry.insert(key, Value::Array(vec![value]));
                }
            }
        }

        let context: Map<String, Value> = self
            .namespaces
            .prefixes()
            .into_iter()
            .map(|ns| (ns.prefix.clone(), Value::String(ns.iri.clone())))
            .collect();

        let array: Vec<Value> = order
            .into_iter()
            .map(|id| Value::Object(nodes.remove(&id).unwrap_or_default()))
            .collect();

        let doc = json!({ "@context": Value::Object(context), "@graph": array });
        serde_json::to_string_pretty(&doc).map_err(|e| super::SerializeError::Other(e.to_string()))
    }
}

fn render_object_value(term: &TermOut) -> Value {
    match term {
        TermOut::Iri(s) => json!({ "@id": s }),
        TermOut::BlankNode(b) => json!({ "@id": format!("_:{b}") }),
        TermOut::Literal { lexical, language, datatype } => {
            let mut m = Map::new();
            m.insert("@value".to_string(), Value::String(lexical.clone()));
            if let Some(lang) = language {
                m.insert("@language".to_string(), Value::String(lang.clone()));
            } else if let Some(dt) = datatype {
                if dt != "http://www.w3.org/2001/XMLSchema#string" {
                    m.insert("@type".to_string(), Value::String(dt.clone()));
                }
            }
            Value::Object(m)
        }
        TermOut::Unbound => Value::Null,
    }
}

impl ChunkSource for JsonLdSerializer {
    fn next_chunk(&mut self) -> SerializeResult<Option<String>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(self.render()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::{Cell, VecCursor};

    #[test]
    fn groups_predicates_by_subject_node() {
        let rows = vec![
            vec![
                Cell::Iri("http://e/a".into()),
                Cell::Iri("http://e/name".into()),
                Cell::Literal { lexical: "Alice".into(), datatype: "http://www.w3.org/2001/XMLSchema#string".into(), language: None },
            ],
            vec![
                Cell::Iri("http://e/a".into()),
                Cell::Iri("http://www.w3.org/1999/02/22-rdf-syntax-ns#type".into()),
                Cell::Iri("http://e/Person".into()),
            ],
        ];
        let cursor = Box::new(VecCursor::new(
            vec![Some("s".into()), Some("p".into()), Some("o".into())],
            rows,
        ));
        let mut serializer = JsonLdSerializer::new(cursor, NamespaceManager::new(), CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        let doc: Value = serde_json::from_str(&text).unwrap();
        let graph = doc["@graph"].as_array().unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph[0]["@id"], "http://e/a");
        assert_eq!(graph[0]["@type"][0], "http://e/Person");
    }
}

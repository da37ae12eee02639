//! Adapter deserializer over an in-memory resource tree (§4.4).
//!
//! Walks a caller-built [`ResourceNode`] tree in stable preorder and yields
//! it through the same [`Cursor`] protocol as a file deserializer, so code
//! written against "a cursor of quads" never needs to special-case an
//! in-memory source.

use crate::rdf::cursor::{CancelToken, Cell, Cursor, CursorResult, ValueType, VecCursor};

/// One value attached to a resource's property. `Nested` lets a tree encode
/// an object that is itself a resource, producing one row for the link plus
/// however many rows the nested node itself expands into.
#[derive(Debug, Clone)]
pub enum ResourceValue {
    Iri(String),
    BlankNode(String),
    Literal { lexical: String, language: Option<String> },
    Nested(Box<ResourceNode>),
}

/// One node of the in-memory resource tree: a subject (IRI or blank-node
/// label, the latter written with the `_:` prefix already applied) plus its
/// ordered `(predicate_iri, value)` properties.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub subject: String,
    pub properties: Vec<(String, ResourceValue)>,
}

impl ResourceNode {
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), properties: Vec::new() }
    }

    pub fn with_property(mut self, predicate: impl Into<String>, value: ResourceValue) -> Self {
        self.properties.push((predicate.into(), value));
        self
    }
}

fn flatten(node: &ResourceNode, rows: &mut Vec<Vec<Cell>>) {
    let subject_cell = subject_cell(&node.subject);
    for (predicate, value) in &node.properties {
        let object_cell = match value {
            ResourceValue::Iri(s) => Cell::Iri(s.clone()),
            ResourceValue::BlankNode(b) => Cell::BlankNode(b.clone()),
            ResourceValue::Literal { lexical, language } => Cell::Literal {
                lexical: lexical.clone(),
                datatype: "http://www.w3.org/2001/XMLSchema#string".to_string(),
                language: language.clone(),
            },
            ResourceValue::Nested(child) => subject_cell(&child.subject),
        };
        rows.push(vec![
            subject_cell.clone(),
            Cell::Iri(predicate.clone()),
            object_cell,
            Cell::Unbound,
        ]);
        if let ResourceValue::Nested(child) = value {
            flatten(child, rows);
        }
    }
}

fn subject_cell(subject: &str) -> Cell {
    if let Some(label) = subject.strip_prefix("_:") {
        Cell::BlankNode(label.to_string())
    } else {
        Cell::Iri(subject.to_string())
    }
}

/// Cursor over a flattened resource tree, delegating the `Cursor` protocol to
/// an already-materialized [`VecCursor`] (preorder traversal happens once, up
/// front, at construction).
pub struct ResourceTreeCursor(VecCursor);

impl ResourceTreeCursor {
    pub fn new(root: ResourceNode) -> Self {
        let mut rows = Vec::new();
        flatten(&root, &mut rows);
        let names = vec![
            Some("subject".to_string()),
            Some("predicate".to_string()),
            Some("object".to_string()),
            Some("graph".to_string()),
        ];
        Self(VecCursor::new(names, rows))
    }
}

impl Cursor for ResourceTreeCursor {
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
    fn preorder_yields_parent_before_child() {
        let child = ResourceNode::new("_:b1")
            .with_property("http://e/q", ResourceValue::Literal { lexical: "inner".to_string(), language: None });
        let root = ResourceNode::new("http://e/s")
            .with_property("http://e/p", ResourceValue::Nested(Box::new(child)));

        let mut cursor = ResourceTreeCursor::new(root);
        let token = CancelToken::new();

        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/s");
        assert_eq!(cursor.string(2).unwrap().0, "b1");

        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "b1");
        assert_eq!(cursor.string(2).unwrap().0, "inner");

        assert!(!cursor.next(&token).unwrap());
    }
}

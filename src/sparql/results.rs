//! Turns executor output into the same [`Cursor`] shapes the rest of the
//! crate already knows how to serialize, instead of a separate ad hoc result
//! type: SELECT produces a bindings-shaped [`VecCursor`] (named variable
//! columns), CONSTRUCT/DESCRIBE produce a quad-shaped one (subject,
//! predicate, object, graph — the same column order the Turtle/TriG
//! serializers expect, per `rdf::serialization`).

use std::collections::HashMap;

use crate::rdf::cursor::{Cell, VecCursor};
use crate::rdf::store::{RdfStore, ResourceId, StoredObject};

/// One solution: variable name → bound term, or absent if unbound in this row.
pub type Binding = HashMap<String, StoredObject>;

fn cell_of_resource(store: &RdfStore, id: ResourceId) -> Cell {
    match store.resource_key(id) {
        Some(key) if key.starts_with("_:") => Cell::BlankNode(key.trim_start_matches("_:").to_string()),
        Some(key) => Cell::Iri(key.to_string()),
        None => Cell::Unbound,
    }
}

pub fn cell_of_stored_object(store: &RdfStore, object: &StoredObject) -> Cell {
    match object {
        StoredObject::Resource(id) => cell_of_resource(store, *id),
        StoredObject::Literal { lexical, datatype, language } => Cell::Literal {
            lexical: lexical.clone(),
            datatype: datatype.clone(),
            language: language.clone(),
        },
    }
}

/// Builds a bindings cursor for a SELECT query: one named column per
/// projected variable, in the order the query listed them.
pub fn bindings_cursor(store: &RdfStore, variables: &[String], solutions: &[Binding]) -> VecCursor {
    let names = variables.iter().map(|v| Some(v.clone())).collect();
    let rows = solutions
        .iter()
        .map(|solution| {
            variables
                .iter()
                .map(|v| solution.get(v).map(|o| cell_of_stored_object(store, o)).unwrap_or(Cell::Unbound))
                .collect()
        })
        .collect();
    VecCursor::new(names, rows)
}

/// A graph-shaped row: one quad as four cells, in the serializer's expected
/// column order.
pub struct GraphRow {
    pub subject: Cell,
    pub predicate: Cell,
    pub object: Cell,
    pub graph: Cell,
}

/// Builds the quad-shaped cursor CONSTRUCT/DESCRIBE results and the Turtle/
/// TriG/JSON-LD serializers share.
pub fn graph_cursor(rows: Vec<GraphRow>) -> VecCursor {
    let names = vec![Some("subject".to_string()), Some("predicate".to_string()), Some("object".to_string()), Some("graph".to_string())];
    let rows = rows.into_iter().map(|r| vec![r.subject, r.predicate, r.object, r.graph]).collect();
    VecCursor::new(names, rows)
}

/// Builds a single-row, single-column cursor for ASK results.
pub fn ask_cursor(result: bool) -> VecCursor {
    VecCursor::new(vec![Some("boolean".to_string())], vec![vec![Cell::Boolean(result)]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::{CancelToken, Cursor};

    #[test]
    fn bindings_cursor_renders_iri_and_literal_columns() {
        let mut store = RdfStore::new();
        let s = store.ensure_resource("http://e/s");
        let mut solution = Binding::new();
        solution.insert("s".to_string(), StoredObject::Resource(s));
        solution.insert(
            "label".to_string(),
            StoredObject::Literal { lexical: "hi".to_string(), datatype: "http://www.w3.org/2001/XMLSchema#string".to_string(), language: None },
        );
        let mut cursor = bindings_cursor(&store, &["s".to_string(), "label".to_string()], &[solution]);
        let token = CancelToken::new();
        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/s");
        assert_eq!(cursor.string(1).unwrap().0, "hi");
    }

    #[test]
    fn ask_cursor_yields_one_boolean_row() {
        let mut cursor = ask_cursor(true);
        let token = CancelToken::new();
        assert!(cursor.next(&token).unwrap());
        assert!(cursor.boolean(0).unwrap());
        assert!(!cursor.next(&token).unwrap());
    }
}

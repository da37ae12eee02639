//! tinytriple — a local RDF/SPARQL triple store.
//!
//! Streaming Turtle/TriG ingest, a pull-based cursor shared by queries and
//! deserializers, a five-format serializer family (SPARQL-JSON, SPARQL-XML,
//! Turtle, TriG, JSON-LD), and a transactional update engine with nested
//! savepoints and commit-time change callbacks.
//!
//! # Module map
//!
//! - [`rdf`] — the data model, namespace manager, cursor protocol, the
//!   Turtle/TriG parser family, the serializer family, the resource-interned
//!   store, the update engine, the transaction manager, and prepared
//!   statements.
//! - [`sparql`] — SPARQL 1.1 query/update parsing and execution on top of
//!   `rdf`, plus the thin SPARQL 1.1 Protocol HTTP endpoint.
//! - [`persistence`] — the write-ahead log and RocksDB-backed column-family
//!   store durability relies on.
//!
//! # Example
//!
//! ```rust
//! use tinytriple::rdf::{TransactionManager, UpdateEngine};
//! use tinytriple::sparql::SparqlEngine;
//! use tinytriple::rdf::CancelToken;
//!
//! let mut tx = TransactionManager::new(UpdateEngine::new());
//! tx.begin().unwrap();
//! SparqlEngine::update(tx.engine_mut(), "INSERT DATA { <http://e/s> <http://e/p> <http://e/o> }").unwrap();
//! tx.commit().unwrap();
//!
//! let (mut cursor, _vars) = SparqlEngine::query_select(
//!     tx.engine().store(),
//!     "SELECT ?o WHERE { <http://e/s> <http://e/p> ?o }",
//!     &CancelToken::new(),
//! ).unwrap();
//! use tinytriple::rdf::Cursor;
//! assert!(cursor.next(&CancelToken::new()).unwrap());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod persistence;
pub mod rdf;
pub mod sparql;

pub use rdf::{
    BlankNode, CancelToken, Cell, Cursor, CursorError, CursorResult, Literal, NamedNode, NamespaceManager, RdfError, RdfObject,
    RdfPredicate, RdfStore, RdfStoreError, RdfStoreResult, RdfSubject, ResourceId, TransactionManager,
    TransactionState, UpdateEngine, UpdateError, ValueType, VecCursor,
};

pub use sparql::{SparqlEngine, SparqlError, SparqlResult};

pub use persistence::{PersistenceError, PersistenceManager, PersistenceResult};

/// Crate version, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

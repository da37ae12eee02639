//! RDF/SPARQL triple-store engine core.
//!
//! This module implements the resource-interned quad store and everything
//! built directly on it:
//! - the RDF data model (§3): IRIs, blank nodes, literals, triples/quads
//! - the resource-interned [`store::RdfStore`] (§3, §4.7)
//! - the pull-based [`cursor::Cursor`] abstraction shared by parsers,
//!   serializers, and query results (§4.2)
//! - the RDF parser family (Turtle/TriG) and the resource-tree cursor (§4.3,
//!   §4.4)
//! - the serializer family (Turtle/TriG/JSON-LD/SPARQL-JSON/SPARQL-XML) (§4.5)
//! - the namespace/prefix manager (§4.1)
//! - the update engine and transaction manager (§4.7, §4.8)
//! - prepared statements (§4.6)
//!
//! SPARQL query parsing/execution and the HTTP protocol endpoint live in
//! [`crate::sparql`]; durability lives in [`crate::persistence`].

mod cursor;
mod namespace;
mod parser;
mod serialization;
mod statement;
mod store;
mod transaction;
mod types;
mod update;

pub use cursor::{CancelToken, Cell, Cursor, CursorError, CursorResult, ValueType, VecCursor};

pub use types::{BlankNode, Literal, NamedNode, RdfError, RdfObject, RdfPredicate, RdfResult, RdfSubject};

pub use store::{RdfStore, RdfStoreError, RdfStoreResult, ResourceId, StoredObject, StoredQuad};

pub use namespace::{Namespace, NamespaceManager, PrefixError, PrefixResult};

pub use parser::{open_deserializer, row_as_triple_parts, Format, ParseError, ParseErrorKind, ParseResult, ResourceNode, ResourceTreeCursor, Term, TurtleParser};

pub use serialization::{datatype_iri_for, open_serializer, ChunkReader, ChunkSource, SerializeError, SerializeResult, TermOut};

pub use update::{ChangeEvent, ChangeKind, CallbackHandle as UpdateCallbackHandle, UpdateEngine, UpdateError, UpdateResult};

pub use transaction::{
    CallbackHandle as TransactionCallbackHandle, SavepointOp, TransactionError, TransactionEvent, TransactionManager, TransactionResult, TransactionState,
};

pub use statement::{BindingError, PreparedStatement, StatementError, StatementResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdf_module_exports_the_quad_store_and_update_engine() {
        let mut store = RdfStore::new();
        let a = store.ensure_resource("http://example.org/a");
        assert_eq!(store.resource_key(a), Some("http://example.org/a"));

        let mut engine = UpdateEngine::new();
        let s = engine.ensure_resource("http://example.org/s");
        let p = engine.ensure_resource("http://example.org/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://example.org/o"));
        engine.insert_statement(None, s, p, o);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn namespace_manager_is_constructible() {
        let _ns = NamespaceManager::new();
    }
}

//! Update engine (§4.7): the statement-level INSERT/DELETE path. Resource
//! interning and blank-node generation happen immediately and are never
//! rolled back; statement-level changes are staged into a write buffer and
//! only applied to the store by [`UpdateEngine::flush`] — which is what
//! gives [`crate::rdf::transaction::TransactionManager`] a cheap rollback
//! (discard the buffer) and the atomicity property of §8.4.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::rdf::cursor::{CancelToken, Cursor, CursorError, ValueType};
use crate::rdf::parser::{ParseError, TurtleParser};
use crate::rdf::serialization::datatype_iri_for;

use super::store::{RdfStore, ResourceId, StoredObject, StoredQuad};

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown graph resource {0}")]
    UnknownGraph(u64),

    #[error("SPARQL update parse error: {0}")]
    SparqlSyntax(String),

    #[error("unsupported SPARQL update construct: {0}")]
    UnsupportedConstruct(String),

    #[error("ontology transaction already active")]
    OntologyAlreadyActive,

    #[error("cannot begin an ontology transaction with a pending user transaction buffer")]
    OntologyConflictsWithPendingWrites,
}

pub type UpdateResult<T> = Result<T, UpdateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// One logical statement change (§3), staged until commit and then
/// dispatched to statement callbacks in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub graph: Option<ResourceId>,
    pub subject: ResourceId,
    pub predicate: ResourceId,
    pub object: StoredObject,
}

impl ChangeEvent {
    fn quad(&self) -> StoredQuad {
        StoredQuad {
            graph: self.graph,
            subject: self.subject,
            predicate: self.predicate,
            object: self.object.clone(),
        }
    }
}

type StatementCallback = Box<dyn FnMut(&ChangeEvent) + Send>;

/// Opaque handle returned by `add_statement_callback`, compared by identity
/// for `remove_statement_callback` (closures aren't comparable, so this
/// mirrors the original engine's connect/disconnect-handle pattern rather
/// than function-pointer equality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(u64);

pub struct UpdateEngine {
    store: RdfStore,
    write_buffer: Vec<ChangeEvent>,
    bnode_counter: u64,
    high_water_mark: usize,
    ontology_mode: bool,
    statement_callbacks: Vec<(CallbackHandle, StatementCallback)>,
    next_callback_id: u64,
}

impl UpdateEngine {
    pub fn new() -> Self {
        Self::with_high_water_mark(1024)
    }

    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self {
            store: RdfStore::new(),
            write_buffer: Vec::new(),
            bnode_counter: 0,
            high_water_mark,
            ontology_mode: false,
            statement_callbacks: Vec::new(),
            next_callback_id: 1,
        }
    }

    pub fn store(&self) -> &RdfStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RdfStore {
        &mut self.store
    }

    /// Resumes the blank-node counter from a prior run (see
    /// [`RdfStore::max_engine_bnode_counter`]), so `generate_bnode` never
    /// reissues a synthetic key a restored store already has interned.
    pub fn restore_bnode_counter(&mut self, value: u64) {
        self.bnode_counter = self.bnode_counter.max(value);
    }

    // -- Resource / graph lifecycle (immediate, not staged) -----------------

    pub fn ensure_resource(&mut self, iri: &str) -> ResourceId {
        self.store.ensure_resource(iri)
    }

    pub fn ensure_graph(&mut self, iri: &str) -> ResourceId {
        self.store.ensure_graph(iri)
    }

    /// Stages deletes for every quad currently in `graph`, then removes the
    /// graph from the store's registry immediately; the quad removal itself
    /// happens at the next `flush()`/commit so it participates in the same
    /// callback dispatch as any other delete.
    pub fn delete_graph(&mut self, graph: ResourceId) -> UpdateResult<()> {
        if !self.store.graph_exists(graph) {
            return Err(UpdateError::UnknownGraph(graph.get()));
        }
        let victims: Vec<StoredQuad> = self.store.match_quads(Some(Some(graph)), None, None, None).cloned().collect();
        for q in victims {
            self.write_buffer.push(ChangeEvent {
                kind: ChangeKind::Delete,
                graph: q.graph,
                subject: q.subject,
                predicate: q.predicate,
                object: q.object,
            });
        }
        // The graph registration itself is removed at flush time via the
        // buffered deletes draining its last quad; if it was already empty
        // there is nothing to drain, so drop the registration here too.
        let _ = self.store.delete_graph(graph);
        Ok(())
    }

    /// Fresh blank-node id, unique within this engine instance. Interned
    /// immediately under a synthetic key so it can never collide with a
    /// document-local label reused across independent loads (§8.6).
    pub fn generate_bnode(&mut self) -> ResourceId {
        self.bnode_counter += 1;
        let key = format!("_:engine-bnode-{}", self.bnode_counter);
        self.store.ensure_resource(&key)
    }

    // -- Statement-level staging ---------------------------------------------

    pub fn insert_statement(
        &mut self,
        graph: Option<ResourceId>,
        subject: ResourceId,
        predicate: ResourceId,
        object: StoredObject,
    ) {
        self.write_buffer.push(ChangeEvent { kind: ChangeKind::Insert, graph, subject, predicate, object });
    }

    pub fn delete_statement(
        &mut self,
        graph: Option<ResourceId>,
        subject: ResourceId,
        predicate: ResourceId,
        object: StoredObject,
    ) {
        self.write_buffer.push(ChangeEvent { kind: ChangeKind::Delete, graph, subject, predicate, object });
    }

    /// Replaces the object for the (graph, subject, predicate) triple:
    /// stages a delete for every currently-matching quad, then an insert of
    /// the new value.
    pub fn update_statement(
        &mut self,
        graph: Option<ResourceId>,
        subject: ResourceId,
        predicate: ResourceId,
        new_object: StoredObject,
    ) {
        let existing: Vec<StoredQuad> =
            self.store.match_quads(Some(graph), Some(subject), Some(predicate), None).cloned().collect();
        for q in existing {
            self.delete_statement(q.graph, q.subject, q.predicate, q.object);
        }
        self.insert_statement(graph, subject, predicate, new_object);
    }

    // -- Write buffer ---------------------------------------------------------

    pub fn pending_len(&self) -> usize {
        self.write_buffer.len()
    }

    /// The staged changes, in insertion order, without consuming them —
    /// used by the transaction manager to persist the WAL entries for a
    /// commit before calling [`UpdateEngine::flush`].
    pub fn peek_pending(&self) -> &[ChangeEvent] {
        &self.write_buffer
    }

    /// Discards every staged change recorded after `len`, used by
    /// `ROLLBACK TO SAVEPOINT` to undo only what happened since the
    /// savepoint was set.
    pub fn truncate_pending(&mut self, len: usize) {
        self.write_buffer.truncate(len);
    }

    pub fn might_flush(&self) -> bool {
        self.write_buffer.len() >= self.high_water_mark
    }

    /// Discards staged changes without applying them (rollback).
    pub fn discard_pending(&mut self) {
        self.write_buffer.clear();
    }

    /// Applies every staged change to the store, deduplicating by distinct
    /// (kind, graph, subject, predicate, object) while preserving first-seen
    /// order (§8.5's callback-completeness property), dispatches statement
    /// callbacks for the deduplicated list, then clears the buffer.
    ///
    /// Returns the list of events actually dispatched.
    pub fn flush(&mut self) -> Vec<ChangeEvent> {
        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::with_capacity(self.write_buffer.len());
        for event in self.write_buffer.drain(..) {
            let key = (event.kind, event.graph, event.subject, event.predicate, event.object.clone());
            if seen.insert(key) {
                deduped.push(event);
            }
        }
        for event in &deduped {
            match event.kind {
                ChangeKind::Insert => {
                    self.store.insert_quad(event.quad());
                }
                ChangeKind::Delete => {
                    self.store.delete_quad(&event.quad());
                }
            }
        }
        for event in &deduped {
            for (_, cb) in &mut self.statement_callbacks {
                cb(event);
            }
        }
        deduped
    }

    // -- Callback registration --------------------------------------------

    pub fn add_statement_callback(&mut self, cb: StatementCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_callback_id);
        self.next_callback_id += 1;
        self.statement_callbacks.push((handle, cb));
        handle
    }

    pub fn remove_statement_callback(&mut self, handle: CallbackHandle) {
        self.statement_callbacks.retain(|(h, _)| *h != handle);
    }

    // -- Ontology transaction mode -----------------------------------------

    pub fn is_ontology_mode(&self) -> bool {
        self.ontology_mode
    }

    /// Schema-defining loads relax nothing structurally in this
    /// implementation (the store never enforced uniqueness constraints to
    /// begin with) but the mode flag still enforces §4.7's "never
    /// interleaved with user transactions" invariant.
    pub fn begin_ontology_transaction(&mut self) -> UpdateResult<()> {
        if self.ontology_mode {
            return Err(UpdateError::OntologyAlreadyActive);
        }
        if !self.write_buffer.is_empty() {
            return Err(UpdateError::OntologyConflictsWithPendingWrites);
        }
        self.ontology_mode = true;
        Ok(())
    }

    pub fn end_ontology_transaction(&mut self) -> Vec<ChangeEvent> {
        let applied = self.flush();
        self.ontology_mode = false;
        applied
    }

    // -- Bulk ingest ----------------------------------------------------------

    fn resolve_bnode(&mut self, label: &str, bnode_table: &mut HashMap<String, ResourceId>) -> ResourceId {
        if let Some(id) = bnode_table.get(label) {
            return *id;
        }
        let id = self.generate_bnode();
        bnode_table.insert(label.to_string(), id);
        id
    }

    /// Consumes a quad-shaped cursor (`subject, predicate, object, graph`
    /// columns) until exhausted, staging an insert for every row. Blank
    /// nodes are resolved through the caller-supplied `bnode_table`, shared
    /// across calls by the caller to unify blank nodes across documents.
    pub fn load_from_deserializer(
        &mut self,
        cursor: &mut dyn Cursor,
        default_graph: Option<ResourceId>,
        bnode_table: &mut HashMap<String, ResourceId>,
        cancel: &CancelToken,
    ) -> UpdateResult<usize> {
        let mut count = 0usize;
        while cursor.next(cancel)? {
            let subject = match cursor.value_type(0)? {
                ValueType::Iri => self.store.ensure_resource(&cursor.string(0)?.0),
                ValueType::BlankNode => self.resolve_bnode(&cursor.string(0)?.0, bnode_table),
                other => {
                    return Err(UpdateError::UnsupportedConstruct(format!(
                        "subject column is not a resource ({other:?})"
                    )))
                }
            };
            let predicate = match cursor.value_type(1)? {
                ValueType::Iri => self.store.ensure_resource(&cursor.string(1)?.0),
                other => {
                    return Err(UpdateError::UnsupportedConstruct(format!(
                        "predicate column is not an IRI ({other:?})"
                    )))
                }
            };
            let object_vt = cursor.value_type(2)?;
            let object = match object_vt {
                ValueType::Iri => StoredObject::Resource(self.store.ensure_resource(&cursor.string(2)?.0)),
                ValueType::BlankNode => {
                    StoredObject::Resource(self.resolve_bnode(&cursor.string(2)?.0, bnode_table))
                }
                vt => {
                    let (lexical, language, _) = cursor.string(2)?;
                    let datatype = if language.is_some() {
                        "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".to_string()
                    } else {
                        datatype_iri_for(vt)
                            .unwrap_or("http://www.w3.org/2001/XMLSchema#string")
                            .to_string()
                    };
                    StoredObject::Literal { lexical, datatype, language }
                }
            };
            let graph = match cursor.value_type(3)? {
                ValueType::Unbound => default_graph,
                ValueType::Iri => Some(self.store.ensure_graph(&cursor.string(3)?.0)),
                other => {
                    return Err(UpdateError::UnsupportedConstruct(format!(
                        "graph column is not an IRI ({other:?})"
                    )))
                }
            };
            self.insert_statement(graph, subject, predicate, object);
            count += 1;
        }
        Ok(count)
    }

    /// Opens `path` as Turtle or TriG (chosen by extension: `.trig` vs
    /// anything else defaulting to Turtle) and ingests it with a fresh
    /// blank-node table.
    pub fn load_rdf_file(&mut self, path: &Path, default_graph: Option<ResourceId>) -> UpdateResult<usize> {
        let is_trig = path.extension().and_then(|e| e.to_str()) == Some("trig");
        let file = std::fs::File::open(path)?;
        let reader: Box<dyn Read> = Box::new(file);
        let mut parser = if is_trig { TurtleParser::new_trig(reader) } else { TurtleParser::new(reader) };
        let mut bnode_table = HashMap::new();
        let cancel = CancelToken::new();
        self.load_from_deserializer(&mut parser, default_graph, &mut bnode_table, &cancel)
    }

    // -- SPARQL Update ----------------------------------------------------

    /// Executes a SPARQL `INSERT DATA`/`DELETE DATA` update. Pattern-driven
    /// forms (`DELETE/INSERT ... WHERE`, `LOAD`, `CLEAR`, `CREATE`, `DROP`)
    /// require a query evaluator this core does not provide and fail with
    /// `UnsupportedConstruct`.
    pub fn update_sparql(&mut self, text: &str) -> UpdateResult<()> {
        self.update_sparql_blank(text).map(|_| ())
    }

    /// As `update_sparql`, but returns the blank-node labels encountered in
    /// any `INSERT DATA` block mapped to their engine-assigned ids.
    pub fn update_sparql_blank(&mut self, text: &str) -> UpdateResult<HashMap<String, ResourceId>> {
        let update = spargebra::Update::parse(text, None).map_err(|e| UpdateError::SparqlSyntax(e.to_string()))?;
        let mut bnode_table = HashMap::new();

        for operation in update.operations {
            match operation {
                spargebra::algebra::GraphUpdateOperation::InsertData { data } => {
                    for quad in data {
                        let graph = self.graph_name_to_resource(&quad.graph_name)?;
                        let subject = self.subject_to_resource(&quad.subject, &mut bnode_table);
                        let predicate = self.store.ensure_resource(quad.predicate.as_str());
                        let object = self.term_to_stored_object(&quad.object, &mut bnode_table);
                        self.insert_statement(graph, subject, predicate, object);
                    }
                }
                spargebra::algebra::GraphUpdateOperation::DeleteData { data } => {
                    for quad in data {
                        let graph = self.graph_name_to_resource(&quad.graph_name)?;
                        let Some(subject) = self.store.lookup(quad.subject.as_str()) else { continue };
                        let Some(predicate) = self.store.lookup(quad.predicate.as_str()) else { continue };
                        let Some(object) = self.ground_term_to_stored_object(&quad.object) else { continue };
                        self.delete_statement(graph, subject, predicate, object);
                    }
                }
                other => {
                    return Err(UpdateError::UnsupportedConstruct(format!(
                        "pattern-driven or graph-management update not supported: {other:?}"
                    )))
                }
            }
        }
        Ok(bnode_table)
    }

    fn graph_name_to_resource(
        &mut self,
        graph_name: &spargebra::term::GraphName,
    ) -> UpdateResult<Option<ResourceId>> {
        match graph_name {
            spargebra::term::GraphName::DefaultGraph => Ok(None),
            spargebra::term::GraphName::NamedNode(n) => Ok(Some(self.store.ensure_graph(n.as_str()))),
            spargebra::term::GraphName::BlankNode(_) => Err(UpdateError::UnsupportedConstruct(
                "blank node graph names are not supported".to_string(),
            )),
        }
    }

    fn subject_to_resource(
        &mut self,
        subject: &spargebra::term::Subject,
        bnode_table: &mut HashMap<String, ResourceId>,
    ) -> ResourceId {
        match subject {
            spargebra::term::Subject::NamedNode(n) => self.store.ensure_resource(n.as_str()),
            spargebra::term::Subject::BlankNode(b) => self.resolve_bnode(b.as_str(), bnode_table),
            #[allow(unreachable_patterns)]
            _ => panic!("RDF-star triples not supported"),
        }
    }

    fn term_to_stored_object(
        &mut self,
        term: &spargebra::term::Term,
        bnode_table: &mut HashMap<String, ResourceId>,
    ) -> StoredObject {
        match term {
            spargebra::term::Term::NamedNode(n) => StoredObject::Resource(self.store.ensure_resource(n.as_str())),
            spargebra::term::Term::BlankNode(b) => {
                StoredObject::Resource(self.resolve_bnode(b.as_str(), bnode_table))
            }
            spargebra::term::Term::Literal(l) => StoredObject::Literal {
                lexical: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(str::to_string),
            },
            #[allow(unreachable_patterns)]
            _ => panic!("RDF-star triples not supported"),
        }
    }

    fn ground_term_to_stored_object(&self, term: &spargebra::term::GroundTerm) -> Option<StoredObject> {
        match term {
            spargebra::term::GroundTerm::NamedNode(n) => self.store.lookup(n.as_str()).map(StoredObject::Resource),
            spargebra::term::GroundTerm::Literal(l) => Some(StoredObject::Literal {
                lexical: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(str::to_string),
            }),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_flush_is_visible_in_store() {
        let mut engine = UpdateEngine::new();
        let s = engine.ensure_resource("http://e/s");
        let p = engine.ensure_resource("http://e/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://e/o"));
        engine.insert_statement(None, s, p, o.clone());
        assert_eq!(engine.store().len(), 0);
        let applied = engine.flush();
        assert_eq!(applied.len(), 1);
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn discard_pending_drops_staged_changes() {
        let mut engine = UpdateEngine::new();
        let s = engine.ensure_resource("http://e/s");
        let p = engine.ensure_resource("http://e/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://e/o"));
        engine.insert_statement(None, s, p, o);
        engine.discard_pending();
        engine.flush();
        assert_eq!(engine.store().len(), 0);
    }

    #[test]
    fn duplicate_staged_events_dedupe_for_callback_completeness() {
        let mut engine = UpdateEngine::new();
        let s = engine.ensure_resource("http://e/s");
        let p = engine.ensure_resource("http://e/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://e/o"));
        engine.insert_statement(None, s, p, o.clone());
        engine.insert_statement(None, s, p, o);
        let applied = engine.flush();
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn generate_bnode_never_collides_across_independent_calls() {
        let mut engine = UpdateEngine::new();
        let a = engine.generate_bnode();
        let b = engine.generate_bnode();
        assert_ne!(a, b);
    }

    #[test]
    fn statement_callback_fires_once_per_distinct_change() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut engine = UpdateEngine::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        engine.add_statement_callback(Box::new(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let s = engine.ensure_resource("http://e/s");
        let p = engine.ensure_resource("http://e/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://e/o"));
        engine.insert_statement(None, s, p, o);
        engine.flush();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_graph_stages_deletes_for_its_quads() {
        let mut engine = UpdateEngine::new();
        let g = engine.ensure_graph("http://g/1");
        let s = engine.ensure_resource("http://e/s");
        let p = engine.ensure_resource("http://e/p");
        let o = StoredObject::Resource(engine.ensure_resource("http://e/o"));
        engine.insert_statement(Some(g), s, p, o);
        engine.flush();
        assert_eq!(engine.store().len(), 1);

        engine.delete_graph(g).unwrap();
        engine.flush();
        assert_eq!(engine.store().len(), 0);
    }
}

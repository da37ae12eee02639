//! Quad store (§3, §4.7): resource-interned storage indexed by
//! (graph, subject, predicate, object). Every IRI and blank-node label an
//! engine sees is interned to a stable, non-zero [`ResourceId`] the first
//! time it is encountered; interning is idempotent within one store.
//!
//! Blank-node scoping (two loads' `_:x` must not collide) is the update
//! engine's job, not this module's: callers intern a synthetic per-load
//! label (see [`crate::rdf::update::UpdateEngine::generate_bnode`]), never
//! the raw document-local label, so this store never needs to know which
//! resource keys came from blank nodes versus IRIs.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU64;

use thiserror::Error;

use super::types::{Literal, NamedNode, RdfObject, RdfSubject};

/// A stable, non-zero identifier assigned the first time a resource key is
/// interned. Opaque; callers never construct one directly except via
/// [`RdfStore::ensure_resource`]/[`RdfStore::ensure_graph`].
pub type ResourceId = NonZeroU64;

#[derive(Error, Debug)]
pub enum RdfStoreError {
    #[error("unknown resource id {0}")]
    UnknownResource(u64),

    #[error("graph {0} not found")]
    GraphNotFound(u64),
}

pub type RdfStoreResult<T> = Result<T, RdfStoreError>;

/// A stored object term: either a resource (IRI/blank node) or a literal
/// value. Predicates and graph/subject positions are always resources, so
/// only the object position needs this widened shape (§3's Quad invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoredObject {
    Resource(ResourceId),
    Literal { lexical: String, datatype: String, language: Option<String> },
}

/// One stored quad, fully resolved to resource ids. `graph = None` means
/// the default graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredQuad {
    pub graph: Option<ResourceId>,
    pub subject: ResourceId,
    pub predicate: ResourceId,
    pub object: StoredObject,
}

/// Resource-interned quad store with straightforward (graph, subject,
/// predicate, object) indexing. This is the engine's in-memory working set;
/// [`crate::persistence`] mirrors committed state to RocksDB for durability.
#[derive(Default)]
pub struct RdfStore {
    next_id: u64,
    key_to_id: HashMap<String, ResourceId>,
    id_to_key: HashMap<ResourceId, String>,
    /// Named graphs that exist even if currently empty (`ensure_graph` is
    /// idempotent and must be observable before any quad lands in them).
    graphs: HashSet<ResourceId>,
    quads: HashSet<StoredQuad>,
}

impl RdfStore {
    pub fn new() -> Self {
        Self { next_id: 1, ..Default::default() }
    }

    fn fresh_id(&mut self) -> ResourceId {
        let id = self.next_id;
        self.next_id += 1;
        NonZeroU64::new(id).expect("next_id starts at 1 and only increments")
    }

    /// Interns `key` (an IRI string, or a synthetic blank-node label
    /// assigned by the update engine), returning the same id for the same
    /// key on every call.
    pub fn ensure_resource(&mut self, key: &str) -> ResourceId {
        if let Some(id) = self.key_to_id.get(key) {
            return *id;
        }
        let id = self.fresh_id();
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        id
    }

    /// Reinstates a resource mapping at a caller-chosen id, bumping the
    /// allocator past it so later `ensure_resource` calls for genuinely new
    /// keys never collide. Used only by [`crate::persistence`] to rebuild a
    /// store from durable storage with the same ids a prior run assigned —
    /// ordinary ingest always goes through `ensure_resource`.
    pub fn restore_resource(&mut self, id: ResourceId, key: &str) {
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        if id.get() >= self.next_id {
            self.next_id = id.get() + 1;
        }
    }

    pub fn resource_key(&self, id: ResourceId) -> Option<&str> {
        self.id_to_key.get(&id).map(String::as_str)
    }

    pub fn lookup(&self, key: &str) -> Option<ResourceId> {
        self.key_to_id.get(key).copied()
    }

    /// The highest suffix among interned `_:engine-bnode-N` keys, or 0 if
    /// none are interned. Used to resume [`crate::rdf::update::UpdateEngine`]'s
    /// blank-node counter after a restore from persistence, so a freshly
    /// started engine never reissues a suffix a prior run already used.
    pub fn max_engine_bnode_counter(&self) -> u64 {
        const PREFIX: &str = "_:engine-bnode-";
        self.key_to_id
            .keys()
            .filter_map(|k| k.strip_prefix(PREFIX))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
    }

    /// Idempotent: registers `iri` as a named graph, interning it as a
    /// resource if needed, and returns its id regardless of whether it was
    /// already known.
    pub fn ensure_graph(&mut self, iri: &str) -> ResourceId {
        let id = self.ensure_resource(iri);
        self.graphs.insert(id);
        id
    }

    /// Removes a named graph and every quad in it, atomically from the
    /// caller's perspective (a single in-memory mutation under the store's
    /// write lock — see `crate::rdf::transaction`).
    pub fn delete_graph(&mut self, graph: ResourceId) -> RdfStoreResult<()> {
        if !self.graphs.remove(&graph) {
            return Err(RdfStoreError::GraphNotFound(graph.get()));
        }
        self.quads.retain(|q| q.graph != Some(graph));
        Ok(())
    }

    pub fn graph_exists(&self, graph: ResourceId) -> bool {
        self.graphs.contains(&graph)
    }

    pub fn list_graphs(&self) -> Vec<ResourceId> {
        self.graphs.iter().copied().collect()
    }

    /// Inserts a quad; returns `true` if it was not already present.
    pub fn insert_quad(&mut self, quad: StoredQuad) -> bool {
        if let Some(g) = quad.graph {
            self.graphs.insert(g);
        }
        self.quads.insert(quad)
    }

    /// Removes a quad; returns `true` if it had been present.
    pub fn delete_quad(&mut self, quad: &StoredQuad) -> bool {
        self.quads.remove(quad)
    }

    pub fn contains_quad(&self, quad: &StoredQuad) -> bool {
        self.quads.contains(quad)
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn clear(&mut self) {
        self.quads.clear();
        self.graphs.clear();
        self.key_to_id.clear();
        self.id_to_key.clear();
        self.next_id = 1;
    }

    /// Every quad whose (graph, subject, predicate, object) each either
    /// matches the corresponding `Some(_)` filter or is unconstrained by
    /// `None`. Used both by `DELETE` statement resolution and by the SPARQL
    /// executor's basic graph pattern matcher.
    pub fn match_quads<'a>(
        &'a self,
        graph: Option<Option<ResourceId>>,
        subject: Option<ResourceId>,
        predicate: Option<ResourceId>,
        object: Option<&'a StoredObject>,
    ) -> impl Iterator<Item = &'a StoredQuad> + 'a {
        self.quads.iter().filter(move |q| {
            graph.map(|g| q.graph == g).unwrap_or(true)
                && subject.map(|s| q.subject == s).unwrap_or(true)
                && predicate.map(|p| q.predicate == p).unwrap_or(true)
                && object.map(|o| &q.object == o).unwrap_or(true)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredQuad> {
        self.quads.iter()
    }

    /// Interns an [`RdfSubject`]'s key and returns its resource id.
    pub fn ensure_subject(&mut self, subject: &RdfSubject) -> ResourceId {
        self.ensure_resource(&subject_key(subject))
    }

    pub fn ensure_named_node(&mut self, node: &NamedNode) -> ResourceId {
        self.ensure_resource(node.as_str())
    }

    pub fn stored_object_of(&mut self, object: &RdfObject) -> StoredObject {
        match object {
            RdfObject::NamedNode(n) => StoredObject::Resource(self.ensure_named_node(n)),
            RdfObject::BlankNode(b) => StoredObject::Resource(self.ensure_resource(&format!("_:{}", b.as_str()))),
            RdfObject::Literal(l) => StoredObject::Literal {
                lexical: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(str::to_string),
            },
        }
    }

    pub fn stored_object_of_literal(&self, l: &Literal) -> StoredObject {
        StoredObject::Literal {
            lexical: l.value().to_string(),
            datatype: l.datatype().as_str().to_string(),
            language: l.language().map(str::to_string),
        }
    }
}

fn subject_key(subject: &RdfSubject) -> String {
    match subject {
        RdfSubject::NamedNode(n) => n.as_str().to_string(),
        RdfSubject::BlankNode(b) => format!("_:{}", b.as_str()),
    }
}

//! Transaction manager (§4.8): the only component allowed to call
//! [`UpdateEngine::flush`]. Owns WAL persistence ordering so that a crash or
//! an `Err` from `commit()` never leaves the store ahead of durable state —
//! the write buffer is only applied in-memory *after* its WAL entries are
//! flushed to disk.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::persistence::wal::{WalEntry, WalError, WalObject};
use crate::persistence::{PersistenceError, PersistenceManager};
use crate::rdf::store::{ResourceId, StoredObject};
use crate::rdf::update::{ChangeEvent, ChangeKind, UpdateEngine, UpdateError};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("no transaction is active")]
    NotActive,

    #[error("transaction has failed and must be rolled back before reuse")]
    Failed,

    #[error("no savepoint named {0:?} on the stack")]
    UnknownSavepoint(String),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
    Failed,
}

/// A `TrackerSavepointOp`-style marker: remembers the write-buffer length at
/// the moment the savepoint was set, so `Rollback` can truncate back to it.
struct SavepointMark {
    name: String,
    buffer_mark: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointOp {
    Set,
    Release,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Commit,
    Rollback,
}

type StatementCallback = Box<dyn FnMut(ChangeKind, Option<ResourceId>, ResourceId, ResourceId, &StoredObject, &[ResourceId]) + Send>;
type TransactionCallback = Box<dyn FnMut(TransactionEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(u64);

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Wraps an [`UpdateEngine`] with begin/commit/rollback, nested savepoints,
/// and the richer statement/transaction callback pair the original engine
/// exposes at this layer (§4.8).
pub struct TransactionManager {
    engine: UpdateEngine,
    persistence: Option<Arc<PersistenceManager>>,
    state: TransactionState,
    savepoints: Vec<SavepointMark>,
    logged_resources: HashSet<ResourceId>,
    statement_callbacks: Vec<(CallbackHandle, StatementCallback)>,
    transaction_callbacks: Vec<(CallbackHandle, TransactionCallback)>,
    next_callback_id: u64,
}

impl TransactionManager {
    pub fn new(engine: UpdateEngine) -> Self {
        Self {
            engine,
            persistence: None,
            state: TransactionState::Idle,
            savepoints: Vec::new(),
            logged_resources: HashSet::new(),
            statement_callbacks: Vec::new(),
            transaction_callbacks: Vec::new(),
            next_callback_id: 1,
        }
    }

    /// Wraps `engine` with durable storage: commits append to the WAL and,
    /// once the WAL write succeeds, mirror into `persistence`'s column-family
    /// store (`PersistenceManager::mirror_commit`) so a later
    /// `PersistenceManager::rebuild` sees every committed quad without
    /// replaying WAL history.
    pub fn with_persistence(engine: UpdateEngine, persistence: Arc<PersistenceManager>) -> Self {
        let mut tx = Self::new(engine);
        tx.persistence = Some(persistence);
        tx
    }

    pub fn engine(&self) -> &UpdateEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut UpdateEngine {
        &mut self.engine
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// `Idle -> Active`. Nested `begin` while already `Active` is a no-op,
    /// matching a single flat write buffer rather than true nested
    /// transactions (savepoints cover that need instead).
    pub fn begin(&mut self) -> TransactionResult<()> {
        match self.state {
            TransactionState::Idle => {
                self.state = TransactionState::Active;
                info!("transaction begin");
                Ok(())
            }
            TransactionState::Active => Ok(()),
            TransactionState::Failed => Err(TransactionError::Failed),
        }
    }

    /// Persists the pending write buffer to the WAL and mirrors it into the
    /// column-family store before touching the in-memory store at all, then
    /// drains the buffer and dispatches callbacks. If either durability step
    /// fails, the write buffer and the store are both left exactly as they
    /// were before `commit` was called, so a retried `commit` (after fixing
    /// the underlying I/O problem) or an explicit `rollback` both observe
    /// exactly the pre-commit state (§8.4).
    pub fn commit(&mut self) -> TransactionResult<Vec<ChangeEvent>> {
        if self.state != TransactionState::Active {
            return Err(TransactionError::NotActive);
        }

        let resource_keys = match self.persist_pending() {
            Ok(keys) => keys,
            Err(e) => {
                self.state = TransactionState::Failed;
                return Err(e.into());
            }
        };

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.mirror_commit(self.engine.peek_pending(), &resource_keys) {
                self.state = TransactionState::Failed;
                return Err(e.into());
            }
        }

        let applied = self.engine.flush();
        self.dispatch_statement_callbacks(&applied);
        self.savepoints.clear();
        self.logged_resources.clear();
        self.state = TransactionState::Idle;
        info!(count = applied.len(), "transaction commit");
        for (_, cb) in &mut self.transaction_callbacks {
            cb(TransactionEvent::Commit);
        }
        Ok(applied)
    }

    /// Discards the write buffer; no statement callbacks fire. Transaction
    /// callbacks still receive `Rollback`.
    pub fn rollback(&mut self) {
        self.engine.discard_pending();
        self.savepoints.clear();
        self.logged_resources.clear();
        self.state = TransactionState::Idle;
        info!("transaction rollback");
        for (_, cb) in &mut self.transaction_callbacks {
            cb(TransactionEvent::Rollback);
        }
    }

    /// Appends WAL entries for the pending buffer and returns the
    /// (id, key) pairs newly logged this commit, for `mirror_commit` to
    /// intern into the column-family store with the same ids the WAL used.
    fn persist_pending(&mut self) -> Result<Vec<(ResourceId, String)>, WalError> {
        let Some(persistence) = self.persistence.as_ref() else { return Ok(Vec::new()) };
        let wal_handle = persistence.wal();
        let mut wal = wal_handle.lock().unwrap();
        let mut resource_keys = Vec::new();
        for event in self.engine.peek_pending() {
            log_resource_if_new(&mut wal, &self.engine, event.subject, &mut self.logged_resources, &mut resource_keys)?;
            log_resource_if_new(&mut wal, &self.engine, event.predicate, &mut self.logged_resources, &mut resource_keys)?;
            if let Some(g) = event.graph {
                log_resource_if_new(&mut wal, &self.engine, g, &mut self.logged_resources, &mut resource_keys)?;
            }
            if let StoredObject::Resource(r) = &event.object {
                log_resource_if_new(&mut wal, &self.engine, *r, &mut self.logged_resources, &mut resource_keys)?;
            }
            let wal_object = wal_object_of(&event.object);
            let entry = match event.kind {
                ChangeKind::Insert => WalEntry::InsertQuad {
                    graph: event.graph.map(|g| g.get()),
                    subject: event.subject.get(),
                    predicate: event.predicate.get(),
                    object: wal_object,
                },
                ChangeKind::Delete => WalEntry::DeleteQuad {
                    graph: event.graph.map(|g| g.get()),
                    subject: event.subject.get(),
                    predicate: event.predicate.get(),
                    object: wal_object,
                },
            };
            wal.append(entry)?;
        }
        wal.flush()?;
        Ok(resource_keys)
    }

    fn dispatch_statement_callbacks(&mut self, applied: &[ChangeEvent]) {
        for event in applied {
            let rdf_types: Vec<ResourceId> = self
                .engine
                .store()
                .lookup(RDF_TYPE)
                .map(|type_pred| {
                    self.engine
                        .store()
                        .match_quads(None, Some(event.subject), Some(type_pred), None)
                        .filter_map(|q| match &q.object {
                            StoredObject::Resource(r) => Some(*r),
                            StoredObject::Literal { .. } => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            for (_, cb) in &mut self.statement_callbacks {
                cb(event.kind, event.graph, event.subject, event.predicate, &event.object, &rdf_types);
            }
        }
    }

    // -- Savepoints --------------------------------------------------------

    pub fn savepoint(&mut self, op: SavepointOp, name: impl Into<String>) -> TransactionResult<()> {
        let name = name.into();
        match op {
            SavepointOp::Set => {
                debug!(%name, "savepoint set");
                self.savepoints.push(SavepointMark { name, buffer_mark: self.engine.pending_len() });
                Ok(())
            }
            SavepointOp::Release => {
                let pos = self
                    .savepoints
                    .iter()
                    .rposition(|s| s.name == name)
                    .ok_or_else(|| TransactionError::UnknownSavepoint(name.clone()))?;
                debug!(%name, "savepoint release");
                self.savepoints.truncate(pos);
                Ok(())
            }
            SavepointOp::Rollback => {
                let pos = self
                    .savepoints
                    .iter()
                    .rposition(|s| s.name == name)
                    .ok_or_else(|| TransactionError::UnknownSavepoint(name.clone()))?;
                let mark = self.savepoints[pos].buffer_mark;
                debug!(%name, "savepoint rollback");
                self.engine.truncate_pending(mark);
                self.savepoints.truncate(pos + 1);
                Ok(())
            }
        }
    }

    // -- Callback registration ----------------------------------------------

    pub fn add_statement_callback(&mut self, cb: StatementCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_callback_id);
        self.next_callback_id += 1;
        self.statement_callbacks.push((handle, cb));
        handle
    }

    pub fn remove_statement_callback(&mut self, handle: CallbackHandle) {
        self.statement_callbacks.retain(|(h, _)| *h != handle);
    }

    pub fn add_transaction_callback(&mut self, cb: TransactionCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_callback_id);
        self.next_callback_id += 1;
        self.transaction_callbacks.push((handle, cb));
        handle
    }

    pub fn remove_transaction_callback(&mut self, handle: CallbackHandle) {
        self.transaction_callbacks.retain(|(h, _)| *h != handle);
    }
}

fn wal_object_of(object: &StoredObject) -> WalObject {
    match object {
        StoredObject::Resource(r) => WalObject::Resource(r.get()),
        StoredObject::Literal { lexical, datatype, language } => {
            WalObject::Literal { lexical: lexical.clone(), datatype: datatype.clone(), language: language.clone() }
        }
    }
}

fn log_resource_if_new(
    wal: &mut crate::persistence::wal::Wal,
    engine: &UpdateEngine,
    id: ResourceId,
    logged: &mut HashSet<ResourceId>,
    resource_keys: &mut Vec<(ResourceId, String)>,
) -> Result<(), WalError> {
    if logged.insert(id) {
        if let Some(key) = engine.store().resource_key(id) {
            wal.append(WalEntry::InternResource { resource_id: id.get(), key: key.to_string() })?;
            resource_keys.push((id, key.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::store::StoredObject;

    fn sample_engine() -> UpdateEngine {
        UpdateEngine::new()
    }

    #[test]
    fn begin_commit_applies_buffer_and_fires_transaction_callback() {
        let mut tx = TransactionManager::new(sample_engine());
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = events.clone();
        tx.add_transaction_callback(Box::new(move |e| events_clone.lock().unwrap().push(e)));

        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let p = tx.engine_mut().ensure_resource("http://e/p");
        let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
        tx.engine_mut().insert_statement(None, s, p, o);
        tx.commit().unwrap();

        assert_eq!(tx.engine().store().len(), 1);
        assert_eq!(*events.lock().unwrap(), vec![TransactionEvent::Commit]);
        assert_eq!(tx.state(), TransactionState::Idle);
    }

    #[test]
    fn rollback_discards_buffer_and_fires_rollback_callback() {
        let mut tx = TransactionManager::new(sample_engine());
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = events.clone();
        tx.add_transaction_callback(Box::new(move |e| events_clone.lock().unwrap().push(e)));

        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let p = tx.engine_mut().ensure_resource("http://e/p");
        let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
        tx.engine_mut().insert_statement(None, s, p, o);
        tx.rollback();

        assert_eq!(tx.engine().store().len(), 0);
        assert_eq!(*events.lock().unwrap(), vec![TransactionEvent::Rollback]);
    }

    #[test]
    fn commit_without_begin_fails() {
        let mut tx = TransactionManager::new(sample_engine());
        assert!(matches!(tx.commit(), Err(TransactionError::NotActive)));
    }

    #[test]
    fn savepoint_rollback_discards_only_changes_since_the_mark() {
        let mut tx = TransactionManager::new(sample_engine());
        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let p = tx.engine_mut().ensure_resource("http://e/p");
        let o1 = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o1"));
        let o2 = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o2"));

        tx.engine_mut().insert_statement(None, s, p, o1);
        tx.savepoint(SavepointOp::Set, "sp1").unwrap();
        tx.engine_mut().insert_statement(None, s, p, o2);
        assert_eq!(tx.engine().pending_len(), 2);

        tx.savepoint(SavepointOp::Rollback, "sp1").unwrap();
        assert_eq!(tx.engine().pending_len(), 1);

        tx.commit().unwrap();
        assert_eq!(tx.engine().store().len(), 1);
    }

    #[test]
    fn statement_callback_receives_rdf_type_array() {
        let mut tx = TransactionManager::new(sample_engine());
        let seen_types = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_types_clone = seen_types.clone();
        tx.add_statement_callback(Box::new(move |_kind, _g, _s, _p, _o, types| {
            seen_types_clone.lock().unwrap().push(types.to_vec());
        }));

        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let type_pred = tx.engine_mut().ensure_resource(RDF_TYPE);
        let person = tx.engine_mut().ensure_resource("http://e/Person");
        let name_pred = tx.engine_mut().ensure_resource("http://e/name");
        let name_val = StoredObject::Literal {
            lexical: "Alice".to_string(),
            datatype: "http://www.w3.org/2001/XMLSchema#string".to_string(),
            language: None,
        };
        tx.engine_mut().insert_statement(None, s, type_pred, StoredObject::Resource(person));
        tx.engine_mut().insert_statement(None, s, name_pred, name_val);
        tx.commit().unwrap();

        let recorded = seen_types.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|types| types.contains(&person)));
    }

    #[test]
    fn committed_quads_survive_a_rebuild_from_persistence() {
        use crate::persistence::PersistenceManager;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let persistence = Arc::new(PersistenceManager::open(temp_dir.path()).unwrap());

        let mut tx = TransactionManager::with_persistence(sample_engine(), persistence.clone());
        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let p = tx.engine_mut().ensure_resource("http://e/p");
        let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
        tx.engine_mut().insert_statement(None, s, p, o.clone());
        tx.commit().unwrap();

        let rebuilt = persistence.rebuild().unwrap();
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.contains_quad(&crate::rdf::store::StoredQuad { graph: None, subject: s, predicate: p, object: o }));
    }

    #[test]
    fn a_failed_wal_write_leaves_the_write_buffer_untouched() {
        use crate::persistence::PersistenceManager;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let persistence = Arc::new(PersistenceManager::open(temp_dir.path()).unwrap());
        std::fs::remove_dir_all(temp_dir.path().join("wal")).unwrap();

        let mut tx = TransactionManager::with_persistence(sample_engine(), persistence);
        tx.begin().unwrap();
        let s = tx.engine_mut().ensure_resource("http://e/s");
        let p = tx.engine_mut().ensure_resource("http://e/p");
        let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
        tx.engine_mut().insert_statement(None, s, p, o);

        assert!(tx.commit().is_err());
        assert_eq!(tx.state(), TransactionState::Failed);
        assert_eq!(tx.engine().store().len(), 0);
    }
}

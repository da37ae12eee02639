//! Durability layer: a write-ahead log plus a RocksDB-backed column-family
//! store for the resource dictionary and quad indices (§10.4). The
//! transaction manager is the only caller — it persists each commit's WAL
//! entries, then mirrors them into [`PersistentStorage`] so a restart can
//! rebuild the in-memory [`crate::rdf::store::RdfStore`] without replaying
//! the full WAL history.

pub mod storage;
pub mod wal;

pub use storage::{PersistentStorage, StorageError, StorageResult};
pub use wal::{Wal, WalEntry, WalError, WalObject, WalResult};

use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::rdf::store::{RdfStore, ResourceId, StoredObject, StoredQuad};
use crate::rdf::update::ChangeEvent;

use storage::StoredObjectRepr;

/// Opens the WAL and column-family store under `base_path` (`<base_path>/wal`
/// and `<base_path>/data` respectively). Call [`PersistenceManager::rebuild`]
/// afterwards to reconstruct an [`RdfStore`] from whatever was durably
/// mirrored by a previous run.
pub struct PersistenceManager {
    base_path: std::path::PathBuf,
    storage: Arc<PersistentStorage>,
    wal: Arc<std::sync::Mutex<Wal>>,
}

impl PersistenceManager {
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let base_path = base_path.as_ref().to_path_buf();
        let storage_path = base_path.join("data");
        let wal_path = base_path.join("wal");

        std::fs::create_dir_all(&storage_path)?;
        std::fs::create_dir_all(&wal_path)?;

        info!(?base_path, "opening persistence manager");
        let storage = PersistentStorage::open(&storage_path)?;
        let wal = Wal::new(&wal_path)?;

        Ok(Self { base_path, storage: Arc::new(storage), wal: Arc::new(std::sync::Mutex::new(wal)) })
    }

    pub fn storage(&self) -> &PersistentStorage {
        &self.storage
    }

    /// Reconstructs an [`RdfStore`] from the column-family mirror: every
    /// interned resource at its original id, then every committed quad.
    /// Resources are restored before quads so every id a quad references is
    /// already known (mirrors the WAL's own intern-before-quad ordering, see
    /// `rdf::transaction::log_resource_if_new`).
    pub fn rebuild(&self) -> Result<RdfStore, PersistenceError> {
        let mut store = RdfStore::new();
        for (id, key) in self.storage.scan_resources()? {
            store.restore_resource(id, &key);
        }
        for repr in self.storage.scan_quads()? {
            let object = match repr.object {
                StoredObjectRepr::Resource(r) => StoredObject::Resource(nonzero(r)?),
                StoredObjectRepr::Literal { lexical, datatype, language } => StoredObject::Literal { lexical, datatype, language },
            };
            let quad = StoredQuad {
                graph: repr.graph.map(nonzero).transpose()?,
                subject: nonzero(repr.subject)?,
                predicate: nonzero(repr.predicate)?,
                object,
            };
            store.insert_quad(quad);
        }
        Ok(store)
    }

    pub fn wal(&self) -> Arc<std::sync::Mutex<Wal>> {
        Arc::clone(&self.wal)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Mirrors one committed change into the column-family store. Called by
    /// the transaction manager immediately after a WAL-persisted commit, so
    /// `storage` and the WAL never disagree about what has been durably
    /// committed.
    pub fn mirror_commit(&self, applied: &[ChangeEvent], resource_keys: &[(ResourceId, String)]) -> Result<(), PersistenceError> {
        for (id, key) in resource_keys {
            self.storage.put_resource(*id, key)?;
        }
        for event in applied {
            match event.kind {
                crate::rdf::update::ChangeKind::Insert => self.storage.put_quad(event)?,
                crate::rdf::update::ChangeKind::Delete => self.storage.delete_quad(event)?,
            }
        }
        Ok(())
    }

    /// Creates a WAL checkpoint at the WAL's current sequence number and
    /// flushes both the WAL and the column-family store to disk.
    pub fn checkpoint(&self) -> Result<(), PersistenceError> {
        let mut wal = self.wal.lock().unwrap();
        wal.flush()?;
        self.storage.flush()?;
        let sequence = wal.current_sequence();
        wal.checkpoint(sequence)?;
        info!(sequence, "checkpoint created");
        Ok(())
    }

    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.wal.lock().unwrap().flush()?;
        self.storage.flush()?;
        Ok(())
    }
}

/// Errors surfaced by the persistence layer to `rdf::transaction`.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage: zero resource id found where one was expected")]
    ZeroResourceId,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

fn nonzero(id: u64) -> Result<ResourceId, PersistenceError> {
    NonZeroU64::new(id).ok_or(PersistenceError::ZeroResourceId)
}

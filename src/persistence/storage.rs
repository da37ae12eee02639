//! RocksDB-backed storage for the resource dictionary and quad indices:
//! one column family mapping resource id → key string (so a restart can
//! rebuild [`crate::rdf::store::RdfStore`] without re-interning everything
//! in document order) and one column family storing the committed quads.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::rdf::store::{ResourceId, StoredObject};
use crate::rdf::update::ChangeEvent;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("column family missing: {0}")]
    ColumnFamily(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum StoredObjectRepr {
    Resource(u64),
    Literal { lexical: String, datatype: String, language: Option<String> },
}

impl From<&StoredObject> for StoredObjectRepr {
    fn from(o: &StoredObject) -> Self {
        match o {
            StoredObject::Resource(r) => StoredObjectRepr::Resource(r.get()),
            StoredObject::Literal { lexical, datatype, language } => {
                StoredObjectRepr::Literal { lexical: lexical.clone(), datatype: datatype.clone(), language: language.clone() }
            }
        }
    }
}

/// The on-disk shape of a quad's storage key (§10.4): every field
/// `pub(crate)` so [`crate::persistence::PersistenceManager::rebuild`] can
/// read it back into [`crate::rdf::store::StoredQuad`] without this module
/// needing to know about `RdfStore` reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredQuadRepr {
    pub(crate) graph: Option<u64>,
    pub(crate) subject: u64,
    pub(crate) predicate: u64,
    pub(crate) object: StoredObjectRepr,
}

const CF_RESOURCES: &str = "resources";
const CF_QUADS: &str = "quads";

pub struct PersistentStorage {
    db: Arc<DB>,
}

impl PersistentStorage {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path_str = path.as_ref().to_str().unwrap_or_default().to_string();
        info!(path = %path_str, "opening persistent storage");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_min_write_buffer_number_to_merge(1);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_RESOURCES, Self::resources_cf_options()),
            ColumnFamilyDescriptor::new(CF_QUADS, Self::quads_cf_options()),
        ];

        let db = DB::open_cf_descriptors(&opts, &path_str, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn resources_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn quads_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    /// Records a resource's interned key so a restart can reassign the same
    /// id on replay without re-deriving it from WAL order alone.
    pub fn put_resource(&self, id: ResourceId, key: &str) -> StorageResult<()> {
        let cf = self.db.cf_handle(CF_RESOURCES).ok_or_else(|| StorageError::ColumnFamily(CF_RESOURCES.to_string()))?;
        self.db.put_cf(&cf, id.get().to_le_bytes(), key.as_bytes())?;
        debug!(resource_id = id.get(), "stored resource key");
        Ok(())
    }

    pub fn get_resource(&self, id: ResourceId) -> StorageResult<Option<String>> {
        let cf = self.db.cf_handle(CF_RESOURCES).ok_or_else(|| StorageError::ColumnFamily(CF_RESOURCES.to_string()))?;
        match self.db.get_cf(&cf, id.get().to_le_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    pub fn scan_resources(&self) -> StorageResult<Vec<(ResourceId, String)>> {
        let cf = self.db.cf_handle(CF_RESOURCES).ok_or_else(|| StorageError::ColumnFamily(CF_RESOURCES.to_string()))?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item?;
            let id_bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| StorageError::ColumnFamily(CF_RESOURCES.to_string()))?;
            let id = std::num::NonZeroU64::new(u64::from_le_bytes(id_bytes))
                .ok_or_else(|| StorageError::ColumnFamily("zero resource id in storage".to_string()))?;
            out.push((id, String::from_utf8_lossy(&value).into_owned()));
        }
        Ok(out)
    }

    fn quad_key(event: &ChangeEvent) -> Vec<u8> {
        let repr = StoredQuadRepr {
            graph: event.graph.map(|g| g.get()),
            subject: event.subject.get(),
            predicate: event.predicate.get(),
            object: StoredObjectRepr::from(&event.object),
        };
        bincode::serialize(&repr).unwrap_or_default()
    }

    pub fn put_quad(&self, event: &ChangeEvent) -> StorageResult<()> {
        let cf = self.db.cf_handle(CF_QUADS).ok_or_else(|| StorageError::ColumnFamily(CF_QUADS.to_string()))?;
        let key = Self::quad_key(event);
        self.db.put_cf(&cf, &key, [])?;
        Ok(())
    }

    pub fn delete_quad(&self, event: &ChangeEvent) -> StorageResult<()> {
        let cf = self.db.cf_handle(CF_QUADS).ok_or_else(|| StorageError::ColumnFamily(CF_QUADS.to_string()))?;
        let key = Self::quad_key(event);
        self.db.delete_cf(&cf, &key)?;
        Ok(())
    }

    pub fn scan_quads(&self) -> StorageResult<Vec<StoredQuadRepr>> {
        let cf = self.db.cf_handle(CF_QUADS).ok_or_else(|| StorageError::ColumnFamily(CF_QUADS.to_string()))?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, _) = item?;
            out.push(bincode::deserialize(&key)?);
        }
        Ok(out)
    }

    pub fn create_snapshot(&self) -> rocksdb::Snapshot<'_> {
        self.db.snapshot()
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        debug!("flushed storage to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::store::StoredObject;
    use crate::rdf::update::ChangeKind;
    use std::num::NonZeroU64;
    use tempfile::TempDir;

    fn rid(n: u64) -> ResourceId {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn storage_opens_with_both_column_families() {
        let temp_dir = TempDir::new().unwrap();
        let storage = PersistentStorage::open(temp_dir.path()).unwrap();
        drop(storage);
    }

    #[test]
    fn put_and_get_resource_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let storage = PersistentStorage::open(temp_dir.path()).unwrap();
        storage.put_resource(rid(1), "http://e/a").unwrap();
        assert_eq!(storage.get_resource(rid(1)).unwrap().as_deref(), Some("http://e/a"));
    }

    #[test]
    fn put_then_delete_quad_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let storage = PersistentStorage::open(temp_dir.path()).unwrap();
        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            graph: None,
            subject: rid(1),
            predicate: rid(2),
            object: StoredObject::Resource(rid(3)),
        };
        storage.put_quad(&event).unwrap();
        assert_eq!(storage.scan_quads().unwrap().len(), 1);
        storage.delete_quad(&event).unwrap();
        assert_eq!(storage.scan_quads().unwrap().len(), 0);
    }

    #[test]
    fn scan_resources_returns_every_interned_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = PersistentStorage::open(temp_dir.path()).unwrap();
        storage.put_resource(rid(1), "http://e/a").unwrap();
        storage.put_resource(rid(2), "http://e/b").unwrap();
        let mut scanned = storage.scan_resources().unwrap();
        scanned.sort_by_key(|(id, _)| id.get());
        assert_eq!(scanned, vec![(rid(1), "http://e/a".to_string()), (rid(2), "http://e/b".to_string())]);
    }
}

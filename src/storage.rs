use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),
    #[error("Batch transaction aborted")]
    TransactionAborted,
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Independent key spaces. Keys are raw address bytes in every namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Accounts,
    Locked,
}

impl Namespace {
    pub fn tree_name(&self) -> &'static str {
        match self {
            Namespace::Accounts => "accounts",
            Namespace::Locked => "locked",
        }
    }
}

/// Synchronous keyed store, namespaced per record kind.
pub trait Storage: Send + Sync {
    fn has(&self, namespace: Namespace, key: &[u8]) -> Result<bool, StorageError>;
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Apply every write in `batch` or none of them.
    fn apply_batch(&self, batch: StorageBatch) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageBatch {
    pub ops: Vec<StorageWrite>,
}

impl StorageBatch {
    pub fn put(&mut self, namespace: Namespace, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(StorageWrite { namespace, key, value });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWrite {
    pub namespace: Namespace,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

pub struct SledStorage {
    db: Db,
    accounts_tree: Tree,
    locked_tree: Tree,
}

impl SledStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            accounts_tree: db.open_tree(Namespace::Accounts.tree_name())?,
            locked_tree: db.open_tree(Namespace::Locked.tree_name())?,
            db,
        })
    }

    /// Flush dirty pages to disk, returning the number of bytes written.
    pub fn flush(&self) -> Result<usize, StorageError> {
        Ok(self.db.flush()?)
    }

    fn tree(&self, namespace: Namespace) -> &Tree {
        match namespace {
            Namespace::Accounts => &self.accounts_tree,
            Namespace::Locked => &self.locked_tree,
        }
    }
}

impl Storage for SledStorage {
    fn has(&self, namespace: Namespace, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.tree(namespace).contains_key(key)?)
    }

    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let encoded = self.tree(namespace).get(key)?;
        Ok(encoded.map(|e| e.to_vec()))
    }

    fn set(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.tree(namespace).insert(key, value)?;
        Ok(())
    }

    fn apply_batch(&self, batch: StorageBatch) -> Result<(), StorageError> {
        let ops = &batch.ops;
        (&self.accounts_tree, &self.locked_tree)
            .transaction(|(accounts, locked)| {
                for op in ops {
                    let tree = match op.namespace {
                        Namespace::Accounts => accounts,
                        Namespace::Locked => locked,
                    };
                    tree.insert(op.key.as_slice(), op.value.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Abort(()) => StorageError::TransactionAborted,
                TransactionError::Storage(err) => StorageError::DatabaseError(err),
            })?;
        debug!(writes = ops.len(), "applied sled batch");
        Ok(())
    }
}

type KeyedRecords = BTreeMap<(Namespace, Vec<u8>), Vec<u8>>;

/// In-memory store. Used by tests and by embedders that keep state elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<KeyedRecords>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl Storage for MemoryStorage {
    fn has(&self, namespace: Namespace, key: &[u8]) -> Result<bool, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.contains_key(&(namespace, key.to_vec())))
    }

    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(&(namespace, key.to_vec())).cloned())
    }

    fn set(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert((namespace, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn apply_batch(&self, batch: StorageBatch) -> Result<(), StorageError> {
        // One write guard for the whole batch, so readers never see half of it.
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        for op in batch.ops {
            records.insert((op.namespace, op.key), op.value);
        }
        Ok(())
    }
}

/// Write-staging overlay over a parent store.
///
/// Reads consult staged writes first and fall through to the parent.
/// Writes never reach the parent until [`CacheStorage::write`] flushes them
/// as a single batch; dropping the cache discards them.
pub struct CacheStorage<'a> {
    parent: &'a dyn Storage,
    staged: Mutex<KeyedRecords>,
}

impl<'a> CacheStorage<'a> {
    pub fn new(parent: &'a dyn Storage) -> Self {
        Self {
            parent,
            staged: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of distinct keys currently staged.
    pub fn staged_len(&self) -> Result<usize, StorageError> {
        let staged = self.staged.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(staged.len())
    }

    /// Flush all staged writes to the parent atomically.
    pub fn write(self) -> Result<usize, StorageError> {
        let staged = self.staged.into_inner().map_err(|_| StorageError::LockPoisoned)?;
        let mut batch = StorageBatch::default();
        for ((namespace, key), value) in staged {
            batch.put(namespace, key, value);
        }
        let written = batch.len();
        if written > 0 {
            self.parent.apply_batch(batch)?;
        }
        Ok(written)
    }
}

impl Storage for CacheStorage<'_> {
    fn has(&self, namespace: Namespace, key: &[u8]) -> Result<bool, StorageError> {
        {
            let staged = self.staged.lock().map_err(|_| StorageError::LockPoisoned)?;
            if staged.contains_key(&(namespace, key.to_vec())) {
                return Ok(true);
            }
        }
        self.parent.has(namespace, key)
    }

    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        {
            let staged = self.staged.lock().map_err(|_| StorageError::LockPoisoned)?;
            if let Some(value) = staged.get(&(namespace, key.to_vec())) {
                return Ok(Some(value.clone()));
            }
        }
        self.parent.get(namespace, key)
    }

    fn set(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut staged = self.staged.lock().map_err(|_| StorageError::LockPoisoned)?;
        staged.insert((namespace, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn apply_batch(&self, batch: StorageBatch) -> Result<(), StorageError> {
        let mut staged = self.staged.lock().map_err(|_| StorageError::LockPoisoned)?;
        for op in batch.ops {
            staged.insert((op.namespace, op.key), op.value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_namespaces_are_independent() {
        let storage = MemoryStorage::new();
        storage.set(Namespace::Accounts, b"alice", b"free").unwrap();

        assert!(storage.has(Namespace::Accounts, b"alice").unwrap());
        assert!(!storage.has(Namespace::Locked, b"alice").unwrap());
        assert_eq!(storage.get(Namespace::Accounts, b"alice").unwrap(), Some(b"free".to_vec()));
        assert_eq!(storage.get(Namespace::Locked, b"alice").unwrap(), None);
    }

    #[test]
    fn test_cache_reads_through_and_shadows_parent() {
        let parent = MemoryStorage::new();
        parent.set(Namespace::Accounts, b"alice", b"old").unwrap();

        let cache = CacheStorage::new(&parent);
        assert_eq!(cache.get(Namespace::Accounts, b"alice").unwrap(), Some(b"old".to_vec()));

        cache.set(Namespace::Accounts, b"alice", b"new").unwrap();
        cache.set(Namespace::Locked, b"alice", b"locked").unwrap();
        assert_eq!(cache.get(Namespace::Accounts, b"alice").unwrap(), Some(b"new".to_vec()));
        assert!(cache.has(Namespace::Locked, b"alice").unwrap());

        // Parent is untouched until the cache is written
        assert_eq!(parent.get(Namespace::Accounts, b"alice").unwrap(), Some(b"old".to_vec()));
        assert!(!parent.has(Namespace::Locked, b"alice").unwrap());
    }

    #[test]
    fn test_cache_write_and_discard() {
        let parent = MemoryStorage::new();

        let discarded = CacheStorage::new(&parent);
        discarded.set(Namespace::Accounts, b"bob", b"x").unwrap();
        drop(discarded);
        assert!(parent.is_empty().unwrap());

        let cache = CacheStorage::new(&parent);
        cache.set(Namespace::Accounts, b"bob", b"x").unwrap();
        cache.set(Namespace::Locked, b"bob", b"y").unwrap();
        assert_eq!(cache.staged_len().unwrap(), 2);
        assert_eq!(cache.write().unwrap(), 2);
        assert_eq!(parent.get(Namespace::Locked, b"bob").unwrap(), Some(b"y".to_vec()));
        assert_eq!(parent.len().unwrap(), 2);
    }

    #[test]
    fn test_sled_batch_spans_trees() {
        let dir = TempDir::new().unwrap();
        let storage = SledStorage::new(dir.path().join("db")).unwrap();

        let mut batch = StorageBatch::default();
        batch.put(Namespace::Accounts, b"carol".to_vec(), b"free".to_vec());
        batch.put(Namespace::Locked, b"carol".to_vec(), b"held".to_vec());
        storage.apply_batch(batch).unwrap();

        assert_eq!(storage.get(Namespace::Accounts, b"carol").unwrap(), Some(b"free".to_vec()));
        assert_eq!(storage.get(Namespace::Locked, b"carol").unwrap(), Some(b"held".to_vec()));
        assert!(!storage.has(Namespace::Accounts, b"dave").unwrap());
    }
}

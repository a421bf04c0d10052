//! # Node-Object Store
//!
//! Content-addressed storage for everything durable: ledger headers,
//! transaction blobs, fetch-pack chunks. Objects are opaque byte strings
//! keyed by their 256-bit hash; the store neither interprets nor
//! re-hashes them.
//!
//! The store is a *capability set*: `fetch`, `store`, `for_each`,
//! `write_load`, `close`. Backends implement those five things and nothing
//! else. Two backends ship: an in-memory map (tests, devnet ephemera) and
//! sled (real persistence). Backends register by name and are selected
//! from configuration at startup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::crypto::hash::Hash256;

/// A stored object: hash plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeObject {
    /// Content hash the object is keyed by.
    pub hash: Hash256,
    /// The object bytes. Opaque to the store.
    pub data: Vec<u8>,
}

/// Errors surfaced by node-store operations.
///
/// Anything here is fatal as far as the consensus core is concerned: a
/// node that cannot read or write its own store has nothing to say to the
/// network.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying engine failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// No backend registered under the requested name.
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    /// The backend requires a filesystem path and none was given.
    #[error("storage backend {0} requires a path")]
    PathRequired(&'static str),
}

/// The node-store capability set.
pub trait NodeStore: Send + Sync {
    /// Fetch an object by hash. `Ok(None)` means "definitely absent".
    fn fetch(&self, hash: &Hash256) -> Result<Option<NodeObject>, StoreError>;

    /// Store an object. Idempotent: storing the same hash twice is fine.
    fn store(&self, object: NodeObject) -> Result<(), StoreError>;

    /// Visit every stored object. Used by integrity scans and migration.
    fn for_each(&self, visit: &mut dyn FnMut(&NodeObject)) -> Result<(), StoreError>;

    /// Pending-write pressure, for backoff decisions upstream. Zero means
    /// "keep them coming".
    fn write_load(&self) -> usize;

    /// Flush and release the backend. Further calls may fail.
    fn close(&self);

    /// The backend's registered name.
    fn name(&self) -> &'static str;
}

/// Open a backend by registered name.
///
/// Names: `"memory"` (no path) and `"sled"` (path required).
pub fn open_backend(
    name: &str,
    path: Option<&Path>,
) -> Result<Arc<dyn NodeStore>, StoreError> {
    match name {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sled" => {
            let path = path.ok_or(StoreError::PathRequired("sled"))?;
            Ok(Arc::new(SledStore::open(path)?))
        }
        other => Err(StoreError::UnknownBackend(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory backend. Vanishes on drop; exactly what tests and throwaway
/// devnet nodes want.
pub struct MemoryStore {
    objects: RwLock<HashMap<Hash256, NodeObject>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryStore {
    fn fetch(&self, hash: &Hash256) -> Result<Option<NodeObject>, StoreError> {
        Ok(self.objects.read().get(hash).cloned())
    }

    fn store(&self, object: NodeObject) -> Result<(), StoreError> {
        self.objects.write().insert(object.hash, object);
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&NodeObject)) -> Result<(), StoreError> {
        for object in self.objects.read().values() {
            visit(object);
        }
        Ok(())
    }

    fn write_load(&self) -> usize {
        0
    }

    fn close(&self) {}

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Persistent backend on sled.
///
/// Keys are raw hash bytes, values are raw object bytes. `write_load`
/// reports writes accumulated since the last flush, which is exactly the
/// pressure an upstream throttle wants to see.
pub struct SledStore {
    db: sled::Db,
    unflushed: AtomicUsize,
}

impl SledStore {
    /// Open (or create) a sled store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        info!(path = %path.display(), "sled node store opened");
        Ok(Self {
            db,
            unflushed: AtomicUsize::new(0),
        })
    }
}

impl NodeStore for SledStore {
    fn fetch(&self, hash: &Hash256) -> Result<Option<NodeObject>, StoreError> {
        let value = self
            .db
            .get(hash)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(value.map(|bytes| NodeObject {
            hash: *hash,
            data: bytes.to_vec(),
        }))
    }

    fn store(&self, object: NodeObject) -> Result<(), StoreError> {
        self.db
            .insert(object.hash, object.data)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.unflushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&NodeObject)) -> Result<(), StoreError> {
        for entry in self.db.iter() {
            let (key, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            if key.len() != 32 {
                continue;
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&key);
            visit(&NodeObject {
                hash,
                data: value.to_vec(),
            });
        }
        Ok(())
    }

    fn write_load(&self) -> usize {
        self.unflushed.load(Ordering::Relaxed)
    }

    fn close(&self) {
        if self.db.flush().is_ok() {
            self.unflushed.store(0, Ordering::Relaxed);
        }
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}

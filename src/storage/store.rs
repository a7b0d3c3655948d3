//! Async blob-store trait and the in-memory backend
//!
//! All IO the engine performs goes through [`BlobStore`]. Blobs are
//! length-addressable byte arrays under flat string names; the engine
//! owns every byte of framing inside them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::ops::Range;
use std::sync::Arc;

/// Owned bytes with cheap cloning (Arc-backed slice view)
#[derive(Debug, Clone)]
pub struct OwnedBytes {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            range: 0..0,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        assert!(end <= self.range.end, "slice out of bounds");
        Self {
            data: Arc::clone(&self.data),
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::Deref for OwnedBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

/// Named blob storage the engine runs on
///
/// Contracts the engine relies on:
/// - `write` replaces a blob wholesale and is atomic from the caller's view
/// - `append` creates the blob if absent; the blob grows by `bytes.len()`
/// - `read`/`read_range` yield `None` for an absent blob, never an error
/// - `read_range` is half-open and clamps to the available suffix
/// - `size` is 0 for an absent blob; `remove` is idempotent
#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Replace the blob's contents.
    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    /// Append at the end, creating the blob if needed. Returns the new length.
    async fn append(&self, name: &str, bytes: &[u8]) -> io::Result<u64>;

    /// Read the whole blob, or `None` if it does not exist.
    async fn read(&self, name: &str) -> io::Result<Option<OwnedBytes>>;

    /// Read `[start, end)`, clamped to the blob length. `None` if absent.
    async fn read_range(&self, name: &str, start: u64, end: u64) -> io::Result<Option<OwnedBytes>>;

    /// Blob length in bytes, 0 if absent.
    async fn size(&self, name: &str) -> io::Result<u64>;

    /// Delete the blob. Deleting an absent blob succeeds.
    async fn remove(&self, name: &str) -> io::Result<()>;

    /// Names of all blobs in this store's namespace.
    async fn list(&self) -> io::Result<Vec<String>>;

    /// Delete every blob in this store's namespace.
    async fn clear_all(&self) -> io::Result<()>;
}

/// Named blob storage the engine runs on (wasm version - no Send requirement)
#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
pub trait BlobStore: 'static {
    /// Replace the blob's contents.
    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    /// Append at the end, creating the blob if needed. Returns the new length.
    async fn append(&self, name: &str, bytes: &[u8]) -> io::Result<u64>;

    /// Read the whole blob, or `None` if it does not exist.
    async fn read(&self, name: &str) -> io::Result<Option<OwnedBytes>>;

    /// Read `[start, end)`, clamped to the blob length. `None` if absent.
    async fn read_range(&self, name: &str, start: u64, end: u64) -> io::Result<Option<OwnedBytes>>;

    /// Blob length in bytes, 0 if absent.
    async fn size(&self, name: &str) -> io::Result<u64>;

    /// Delete the blob. Deleting an absent blob succeeds.
    async fn remove(&self, name: &str) -> io::Result<()>;

    /// Names of all blobs in this store's namespace.
    async fn list(&self) -> io::Result<Vec<String>>;

    /// Delete every blob in this store's namespace.
    async fn clear_all(&self) -> io::Result<()>;
}

/// In-memory blob store for tests, wasm, and small indexes
///
/// Clones share the same namespace, so a test can hand the engine one
/// handle and keep another for inspection.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl Clone for MemoryBlobStore {
    fn clone(&self) -> Self {
        Self {
            blobs: Arc::clone(&self.blobs),
        }
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs
            .write()
            .insert(name.to_string(), Arc::new(bytes.to_vec()));
        Ok(())
    }

    async fn append(&self, name: &str, bytes: &[u8]) -> io::Result<u64> {
        let mut blobs = self.blobs.write();
        let blob = blobs.entry(name.to_string()).or_default();
        Arc::make_mut(blob).extend_from_slice(bytes);
        Ok(blob.len() as u64)
    }

    async fn read(&self, name: &str) -> io::Result<Option<OwnedBytes>> {
        Ok(self.blobs.read().get(name).map(|data| OwnedBytes {
            data: Arc::clone(data),
            range: 0..data.len(),
        }))
    }

    async fn read_range(&self, name: &str, start: u64, end: u64) -> io::Result<Option<OwnedBytes>> {
        let blobs = self.blobs.read();
        let Some(data) = blobs.get(name) else {
            return Ok(None);
        };
        let start = (start as usize).min(data.len());
        let end = (end as usize).min(data.len()).max(start);
        Ok(Some(OwnedBytes {
            data: Arc::clone(data),
            range: start..end,
        }))
    }

    async fn size(&self, name: &str) -> io::Result<u64> {
        Ok(self
            .blobs
            .read()
            .get(name)
            .map(|data| data.len() as u64)
            .unwrap_or(0))
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        self.blobs.write().remove(name);
        Ok(())
    }

    async fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }

    async fn clear_all(&self) -> io::Result<()> {
        self.blobs.write().clear();
        Ok(())
    }
}

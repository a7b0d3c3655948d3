//! Durable catalog of segments plus the added/tombstone id sets
//!
//! The catalog is one JSON blob (`search_meta.json`); the id sets are two
//! binary blobs framed as `u32-LE | 0x1E` pairs. All three are rewritten
//! wholesale on save, which is the engine's commit point: on-disk state
//! is always consistent with the last successful save.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::RECORD_SEPARATOR;
use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// Catalog blob name.
pub const META_FILENAME: &str = "search_meta.json";
/// Added-id set blob name.
pub const ADDED_IDS_FILENAME: &str = "added_ids.bin";
/// Tombstone set blob name.
pub const DELETED_IDS_FILENAME: &str = "deleted_ids.bin";

/// The two intake pipelines: multi-code-point tokens vs single ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Word,
    Char,
}

impl IndexKind {
    pub const ALL: [IndexKind; 2] = [IndexKind::Word, IndexKind::Char];

    /// Intake log blob for this kind.
    pub fn cache_name(self) -> &'static str {
        match self {
            IndexKind::Word => "word_cache.bin",
            IndexKind::Char => "char_cache.bin",
        }
    }

    /// Segment file name for the 1-based ordinal `n`.
    pub fn segment_filename(self, n: usize) -> String {
        match self {
            IndexKind::Word => format!("word_seg_{n}.bin"),
            IndexKind::Char => format!("char_seg_{n}.bin"),
        }
    }
}

/// Catalog entry: which byte range of the intake log a segment covers.
///
/// `[start, end)` indexes into the kind's log file; only the last
/// descriptor of each kind may grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDescriptor {
    pub filename: String,
    pub start: u64,
    pub end: u64,
    pub token_count: u64,
}

/// The catalog blob, serialized as `search_meta.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    #[serde(default)]
    pub word_segments: Vec<SegmentDescriptor>,
    #[serde(default)]
    pub char_segments: Vec<SegmentDescriptor>,
}

impl IndexMeta {
    fn segments(&self, kind: IndexKind) -> &Vec<SegmentDescriptor> {
        match kind {
            IndexKind::Word => &self.word_segments,
            IndexKind::Char => &self.char_segments,
        }
    }

    fn segments_mut(&mut self, kind: IndexKind) -> &mut Vec<SegmentDescriptor> {
        match kind {
            IndexKind::Word => &mut self.word_segments,
            IndexKind::Char => &mut self.char_segments,
        }
    }
}

/// Encode an id set as a sorted `u32-LE | 0x1E` stream.
fn encode_id_set(ids: &FxHashSet<u32>) -> Vec<u8> {
    let mut sorted: Vec<u32> = ids.iter().copied().collect();
    sorted.sort_unstable();
    let mut buf = Vec::with_capacity(sorted.len() * 5);
    for id in sorted {
        buf.extend_from_slice(&id.to_le_bytes());
        buf.push(RECORD_SEPARATOR);
    }
    buf
}

/// Decode an id stream, stopping at the first bad frame.
fn decode_id_set(bytes: &[u8]) -> FxHashSet<u32> {
    let mut ids = FxHashSet::default();
    let mut pos = 0usize;
    while pos + 5 <= bytes.len() {
        if bytes[pos + 4] != RECORD_SEPARATOR {
            log::warn!("id set: missing separator at offset {pos}, stopping scan");
            break;
        }
        ids.insert(u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()));
        pos += 5;
    }
    ids
}

/// In-memory view of the catalog and id sets, with wholesale persistence
pub struct MetaManager<S> {
    store: Arc<S>,
    meta: IndexMeta,
    added: FxHashSet<u32>,
    deleted: FxHashSet<u32>,
}

impl<S: BlobStore> MetaManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            meta: IndexMeta::default(),
            added: FxHashSet::default(),
            deleted: FxHashSet::default(),
        }
    }

    /// Load all three blobs; absent blobs yield empty state.
    pub async fn load(&mut self) -> Result<()> {
        self.meta = match self
            .store
            .read(META_FILENAME)
            .await
            .map_err(Error::storage("read", META_FILENAME))?
        {
            Some(bytes) => serde_json::from_slice(bytes.as_slice())
                .map_err(|e| Error::Serialization(format!("{META_FILENAME}: {e}")))?,
            None => IndexMeta::default(),
        };
        self.added = self.load_id_set(ADDED_IDS_FILENAME).await?;
        self.deleted = self.load_id_set(DELETED_IDS_FILENAME).await?;
        Ok(())
    }

    async fn load_id_set(&self, name: &'static str) -> Result<FxHashSet<u32>> {
        let bytes = self
            .store
            .read(name)
            .await
            .map_err(Error::storage("read", name))?;
        Ok(match bytes {
            Some(bytes) => decode_id_set(&bytes),
            None => FxHashSet::default(),
        })
    }

    /// Rewrite all three blobs. An empty id set removes its blob.
    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.meta)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        self.store
            .write(META_FILENAME, &json)
            .await
            .map_err(Error::storage("write", META_FILENAME))?;
        self.save_id_set(ADDED_IDS_FILENAME, &self.added).await?;
        self.save_id_set(DELETED_IDS_FILENAME, &self.deleted).await?;
        Ok(())
    }

    async fn save_id_set(&self, name: &'static str, ids: &FxHashSet<u32>) -> Result<()> {
        if ids.is_empty() {
            self.store
                .remove(name)
                .await
                .map_err(Error::storage("remove", name))
        } else {
            self.store
                .write(name, &encode_id_set(ids))
                .await
                .map_err(Error::storage("write", name))
        }
    }

    pub fn segments(&self, kind: IndexKind) -> &[SegmentDescriptor] {
        self.meta.segments(kind)
    }

    pub fn last_segment(&self, kind: IndexKind) -> Option<&SegmentDescriptor> {
        self.meta.segments(kind).last()
    }

    /// Push a new tail descriptor or grow the current one in place.
    ///
    /// Non-tail descriptors are immutable; callers only ever hand this the
    /// tail's replacement state.
    pub fn update_segment(
        &mut self,
        kind: IndexKind,
        filename: String,
        start: u64,
        end: u64,
        token_count: u64,
        is_new: bool,
    ) {
        let segments = self.meta.segments_mut(kind);
        let descriptor = SegmentDescriptor {
            filename,
            start,
            end,
            token_count,
        };
        match segments.last_mut() {
            Some(tail) if !is_new => {
                debug_assert_eq!(tail.filename, descriptor.filename);
                *tail = descriptor;
            }
            _ => segments.push(descriptor),
        }
    }

    pub fn add_added_id(&mut self, id: u32) {
        self.added.insert(id);
    }

    pub fn remove_added_id(&mut self, id: u32) {
        self.added.remove(&id);
    }

    pub fn is_added(&self, id: u32) -> bool {
        self.added.contains(&id)
    }

    /// Tombstones are monotone: ids are never removed from this set.
    pub fn add_deleted_id(&mut self, id: u32) {
        self.deleted.insert(id);
    }

    pub fn is_deleted(&self, id: u32) -> bool {
        self.deleted.contains(&id)
    }

    /// Whether the id was ever accepted, live or tombstoned.
    pub fn has_document(&self, id: u32) -> bool {
        self.is_added(id) || self.is_deleted(id)
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Drop all in-memory state. Does not touch storage.
    pub fn reset(&mut self) {
        self.meta = IndexMeta::default();
        self.added.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn manager() -> (Arc<MemoryBlobStore>, MetaManager<MemoryBlobStore>) {
        let store = Arc::new(MemoryBlobStore::new());
        let mgr = MetaManager::new(Arc::clone(&store));
        (store, mgr)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (store, mut mgr) = manager();

        mgr.update_segment(IndexKind::Word, "word_seg_1.bin".into(), 0, 120, 30, true);
        mgr.update_segment(IndexKind::Char, "char_seg_1.bin".into(), 0, 40, 8, true);
        mgr.add_added_id(1);
        mgr.add_added_id(2);
        mgr.add_deleted_id(3);
        mgr.save().await.unwrap();

        let mut reloaded = MetaManager::new(store);
        reloaded.load().await.unwrap();

        assert_eq!(reloaded.segments(IndexKind::Word), mgr.segments(IndexKind::Word));
        assert_eq!(reloaded.segments(IndexKind::Char), mgr.segments(IndexKind::Char));
        assert!(reloaded.is_added(1) && reloaded.is_added(2));
        assert!(reloaded.is_deleted(3));
        assert!(reloaded.has_document(3));
        assert!(!reloaded.has_document(4));
    }

    #[tokio::test]
    async fn test_tail_extension_mutates_in_place() {
        let (_, mut mgr) = manager();

        mgr.update_segment(IndexKind::Word, "word_seg_1.bin".into(), 0, 100, 10, true);
        mgr.update_segment(IndexKind::Word, "word_seg_1.bin".into(), 0, 250, 24, false);

        let segments = mgr.segments(IndexKind::Word);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, 250);
        assert_eq!(segments[0].token_count, 24);

        mgr.update_segment(IndexKind::Word, "word_seg_2.bin".into(), 250, 300, 5, true);
        let segments = mgr.segments(IndexKind::Word);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end, segments[1].start);
    }

    #[tokio::test]
    async fn test_empty_id_set_removes_blob() {
        let (store, mut mgr) = manager();

        mgr.add_added_id(7);
        mgr.save().await.unwrap();
        assert!(store.read(ADDED_IDS_FILENAME).await.unwrap().is_some());
        assert!(store.read(DELETED_IDS_FILENAME).await.unwrap().is_none());

        mgr.remove_added_id(7);
        mgr.add_deleted_id(7);
        mgr.save().await.unwrap();
        assert!(store.read(ADDED_IDS_FILENAME).await.unwrap().is_none());
        assert!(store.read(DELETED_IDS_FILENAME).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_meta_json_uses_camel_case() {
        let (store, mut mgr) = manager();
        mgr.update_segment(IndexKind::Word, "word_seg_1.bin".into(), 0, 10, 2, true);
        mgr.save().await.unwrap();

        let bytes = store.read(META_FILENAME).await.unwrap().unwrap();
        let json = std::str::from_utf8(bytes.as_slice()).unwrap();
        assert!(json.contains("wordSegments"));
        assert!(json.contains("charSegments"));
        assert!(json.contains("tokenCount"));
    }

    #[test]
    fn test_id_stream_tolerates_bad_frames() {
        let mut ids = FxHashSet::default();
        ids.insert(10);
        ids.insert(20);
        let mut bytes = encode_id_set(&ids);
        bytes[9] = 0xFF; // corrupt second separator
        bytes.extend_from_slice(&[1, 2, 3, 4, RECORD_SEPARATOR]);

        let decoded = decode_id_set(&bytes);
        assert_eq!(decoded.len(), 1);
        assert!(decoded.contains(&10));
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let (_, mut mgr) = manager();
        mgr.update_segment(IndexKind::Char, "char_seg_1.bin".into(), 0, 5, 1, true);
        mgr.add_added_id(1);
        mgr.add_deleted_id(2);

        mgr.reset();
        assert!(mgr.segments(IndexKind::Char).is_empty());
        assert!(!mgr.has_document(1));
        assert_eq!(mgr.deleted_count(), 0);
    }
}

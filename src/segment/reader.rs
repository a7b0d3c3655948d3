//! Segment handle: build, load, and query one inverted file
//!
//! A handle holds the segment's full bytes in memory once loaded (reads
//! happen once; lookups index into the buffer). Search on an unloaded
//! handle returns nothing, which is how descriptors below the min-save
//! threshold behave until their segment is materialized.

use std::sync::Arc;

use crate::cache::TokenizedDoc;
use crate::error::{Error, Result};
use crate::hash::{HashWidth, TokenHasher};
use crate::storage::{BlobStore, OwnedBytes};

use super::builder::build_segment;
use super::format::{SEGMENT_MAGIC, WIDTH_TAG_64, entry_len, header_len};

/// One on-disk inverted file plus its in-memory image
pub struct IndexSegment {
    filename: String,
    hasher: Arc<dyn TokenHasher>,
    data: Option<OwnedBytes>,
}

impl IndexSegment {
    pub fn new(filename: impl Into<String>, hasher: Arc<dyn TokenHasher>) -> Self {
        Self {
            filename: filename.into(),
            hasher,
            data: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Build the inverted file from `docs`, persist it wholesale, and keep
    /// the buffer as the live index.
    pub async fn build_and_save<S: BlobStore>(
        &mut self,
        store: &S,
        docs: &[TokenizedDoc],
    ) -> Result<()> {
        let buf = build_segment(docs, self.hasher.as_ref())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        store
            .write(&self.filename, &buf)
            .await
            .map_err(Error::storage("write", &self.filename))?;
        self.data = Some(OwnedBytes::new(buf));
        Ok(())
    }

    /// Read the whole file and validate its header. A no-op once loaded;
    /// an absent file leaves the handle unloaded (descriptor-only tail).
    pub async fn load<S: BlobStore>(&mut self, store: &S) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        let Some(bytes) = store
            .read(&self.filename)
            .await
            .map_err(Error::storage("read", &self.filename))?
        else {
            log::debug!("segment {} not materialized, skipping load", self.filename);
            return Ok(());
        };
        self.validate(&bytes)?;
        self.data = Some(bytes);
        Ok(())
    }

    fn validate(&self, bytes: &[u8]) -> Result<()> {
        let width = self.hasher.width();
        let header = header_len(width);
        if bytes.len() < header {
            return Err(Error::Corruption(format!(
                "segment {}: {} bytes is shorter than the header",
                self.filename,
                bytes.len()
            )));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != SEGMENT_MAGIC {
            return Err(Error::Corruption(format!(
                "segment {}: bad magic {magic:#010x}",
                self.filename
            )));
        }
        if width == HashWidth::B64 {
            let tag = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
            if tag != WIDTH_TAG_64 {
                return Err(Error::Corruption(format!(
                    "segment {}: hash width tag {tag} does not match 64-bit reader",
                    self.filename
                )));
            }
        }
        let entry_count = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let tokens_start = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let dict_end = header + entry_count * entry_len(width);
        if dict_end > tokens_start || tokens_start > bytes.len() {
            return Err(Error::Corruption(format!(
                "segment {}: impossible offsets (entries {entry_count}, tokens at {tokens_start}, file {})",
                self.filename,
                bytes.len()
            )));
        }
        Ok(())
    }

    /// Look up one exact token; returns the ids of every document whose
    /// token set contained it, or empty when absent or unloaded.
    pub fn search(&self, term: &str) -> Vec<u32> {
        let Some(data) = &self.data else {
            return Vec::new();
        };
        let view = SegmentView {
            bytes: data.as_slice(),
            width: self.hasher.width(),
        };
        let count = view.entry_count();
        if count == 0 {
            return Vec::new();
        }

        let target = view.narrow(self.hasher.hash(term));
        let Some(mut idx) = binary_search_hash(&view, count, target) else {
            return Vec::new();
        };

        // Fast path: no neighbour shares this hash.
        let lone = (idx == 0 || view.hash_at(idx - 1) != target)
            && (idx + 1 >= count || view.hash_at(idx + 1) != target);
        if lone {
            return view.postings_at(idx);
        }

        // Collision run: rewind to its start, then compare raw token bytes.
        while idx > 0 && view.hash_at(idx - 1) == target {
            idx -= 1;
        }
        let term_bytes = term.as_bytes();
        while idx < count && view.hash_at(idx) == target {
            if view.token_at(idx) == term_bytes {
                return view.postings_at(idx);
            }
            idx += 1;
        }
        Vec::new()
    }
}

/// Decoded positions inside a validated segment buffer.
struct SegmentView<'a> {
    bytes: &'a [u8],
    width: HashWidth,
}

impl<'a> SegmentView<'a> {
    fn entry_count(&self) -> usize {
        u32::from_le_bytes(self.bytes[4..8].try_into().unwrap()) as usize
    }

    fn tokens_start(&self) -> usize {
        u32::from_le_bytes(self.bytes[8..12].try_into().unwrap()) as usize
    }

    fn postings_start(&self) -> usize {
        header_len(self.width) + self.entry_count() * entry_len(self.width)
    }

    /// Truncate a hash to the stored width so comparisons see disk values.
    fn narrow(&self, hash: u64) -> u64 {
        match self.width {
            HashWidth::B32 => hash as u32 as u64,
            HashWidth::B64 => hash,
        }
    }

    fn entry_at(&self, idx: usize) -> &'a [u8] {
        let start = header_len(self.width) + idx * entry_len(self.width);
        &self.bytes[start..start + entry_len(self.width)]
    }

    fn hash_at(&self, idx: usize) -> u64 {
        let entry = self.entry_at(idx);
        match self.width {
            HashWidth::B32 => u32::from_le_bytes(entry[0..4].try_into().unwrap()) as u64,
            HashWidth::B64 => u64::from_le_bytes(entry[0..8].try_into().unwrap()),
        }
    }

    fn token_at(&self, idx: usize) -> &'a [u8] {
        let entry = self.entry_at(idx);
        let h = self.width.hash_len();
        let len = u32::from_le_bytes(entry[h..h + 4].try_into().unwrap()) as usize;
        let offset = u32::from_le_bytes(entry[h + 4..h + 8].try_into().unwrap()) as usize;
        let start = self.tokens_start() + offset;
        match self.bytes.get(start..start + len) {
            Some(token) => token,
            None => {
                log::warn!("segment token offset out of bounds at entry {idx}");
                &[]
            }
        }
    }

    fn postings_at(&self, idx: usize) -> Vec<u32> {
        let entry = self.entry_at(idx);
        let h = self.width.hash_len();
        let offset = u32::from_le_bytes(entry[h + 8..h + 12].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(entry[h + 12..h + 16].try_into().unwrap()) as usize;
        let start = self.postings_start() + offset;
        let Some(region) = self.bytes.get(start..start + count * 4) else {
            log::warn!("segment postings offset out of bounds at entry {idx}");
            return Vec::new();
        };
        region
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }
}

/// Binary search for any entry with the given (width-narrowed) hash.
fn binary_search_hash(view: &SegmentView<'_>, count: usize, target: u64) -> Option<usize> {
    let mut lo = 0usize;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let hash = view.hash_at(mid);
        if hash == target {
            return Some(mid);
        }
        if hash < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Murmur32, Murmur64};
    use crate::storage::MemoryBlobStore;

    fn doc(id: u32, tokens: &[&str]) -> TokenizedDoc {
        TokenizedDoc::new(id, tokens.iter().map(|t| t.to_string()).collect())
    }

    /// Forces every token into one hash bucket to exercise collision runs.
    struct CollidingHasher;

    impl TokenHasher for CollidingHasher {
        fn width(&self) -> HashWidth {
            HashWidth::B64
        }

        fn hash(&self, _token: &str) -> u64 {
            42
        }
    }

    #[tokio::test]
    async fn test_build_then_search() {
        let store = MemoryBlobStore::new();
        let mut seg = IndexSegment::new("word_seg_1.bin", Arc::new(Murmur64));

        let docs = vec![
            doc(1, &["hello", "world"]),
            doc(2, &["hello", "rust"]),
            doc(3, &["quiet"]),
        ];
        seg.build_and_save(&store, &docs).await.unwrap();

        assert_eq!(seg.search("hello"), vec![1, 2]);
        assert_eq!(seg.search("world"), vec![1]);
        assert_eq!(seg.search("quiet"), vec![3]);
        assert!(seg.search("absent").is_empty());
    }

    #[tokio::test]
    async fn test_reload_equals_build() {
        let store = MemoryBlobStore::new();
        let docs = vec![doc(10, &["alpha", "beta"]), doc(11, &["beta"])];

        let mut built = IndexSegment::new("seg.bin", Arc::new(Murmur64));
        built.build_and_save(&store, &docs).await.unwrap();

        let mut loaded = IndexSegment::new("seg.bin", Arc::new(Murmur64));
        loaded.load(&store).await.unwrap();
        assert!(loaded.is_loaded());

        for term in ["alpha", "beta", "gamma"] {
            assert_eq!(built.search(term), loaded.search(term));
        }
    }

    #[tokio::test]
    async fn test_search_unloaded_is_empty() {
        let seg = IndexSegment::new("never_loaded.bin", Arc::new(Murmur64));
        assert!(seg.search("anything").is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_stays_unloaded() {
        let store = MemoryBlobStore::new();
        let mut seg = IndexSegment::new("absent.bin", Arc::new(Murmur64));
        seg.load(&store).await.unwrap();
        assert!(!seg.is_loaded());
    }

    #[tokio::test]
    async fn test_load_rejects_bad_magic() {
        let store = MemoryBlobStore::new();
        store.write("bad.bin", &[0u8; 32]).await.unwrap();

        let mut seg = IndexSegment::new("bad.bin", Arc::new(Murmur64));
        let err = seg.load(&store).await.unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
        assert!(!seg.is_loaded());
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_header() {
        let store = MemoryBlobStore::new();
        store
            .write("short.bin", &SEGMENT_MAGIC.to_le_bytes())
            .await
            .unwrap();

        let mut seg = IndexSegment::new("short.bin", Arc::new(Murmur64));
        assert!(matches!(
            seg.load(&store).await,
            Err(Error::Corruption(_))
        ));
    }

    #[tokio::test]
    async fn test_collision_run_resolves_by_token_bytes() {
        let store = MemoryBlobStore::new();
        let mut seg = IndexSegment::new("collide.bin", Arc::new(CollidingHasher));

        let docs = vec![
            doc(1, &["aa", "bb"]),
            doc(2, &["bb", "cc"]),
            doc(3, &["cc"]),
        ];
        seg.build_and_save(&store, &docs).await.unwrap();

        assert_eq!(seg.search("aa"), vec![1]);
        assert_eq!(seg.search("bb"), vec![1, 2]);
        assert_eq!(seg.search("cc"), vec![2, 3]);
        assert!(seg.search("dd").is_empty());
    }

    #[tokio::test]
    async fn test_32_bit_variant_roundtrip() {
        let store = MemoryBlobStore::new();
        let mut seg = IndexSegment::new("seg32.bin", Arc::new(Murmur32));
        seg.build_and_save(&store, &[doc(5, &["thirty", "two"])])
            .await
            .unwrap();

        let mut reloaded = IndexSegment::new("seg32.bin", Arc::new(Murmur32));
        reloaded.load(&store).await.unwrap();
        assert_eq!(reloaded.search("thirty"), vec![5]);
        assert_eq!(reloaded.search("two"), vec![5]);
    }

    #[tokio::test]
    async fn test_width_mismatch_is_corruption() {
        let store = MemoryBlobStore::new();
        let mut seg32 = IndexSegment::new("seg.bin", Arc::new(Murmur32));
        seg32
            .build_and_save(&store, &[doc(1, &["abcdefg"])])
            .await
            .unwrap();

        // A 64-bit reader must refuse the 32-bit file rather than
        // misinterpret its dictionary.
        let mut seg64 = IndexSegment::new("seg.bin", Arc::new(Murmur64));
        assert!(matches!(
            seg64.load(&store).await,
            Err(Error::Corruption(_))
        ));
    }
}

//! Engine - the orchestrator and sole public surface of the core
//!
//! Ties the pieces together: tokenization, word/char routing, intake-log
//! appends, segment rollover and builds, the metadata commit point, and
//! query fan-out with scoring.
//!
//! One engine instance assumes externally serialized calls (await each
//! operation before issuing the next); it holds no locks. Two engines on
//! the same base directory are unsupported - their metadata rewrites race.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::cache::{IntakeLog, TokenizedDoc};
use crate::document::{DocRecord, Document};
use crate::error::{Error, Result};
use crate::hash::{TokenHasher, default_hasher};
use crate::meta::{IndexKind, MetaManager};
use crate::segment::IndexSegment;
use crate::storage::BlobStore;
use crate::tokenizer::default_tokenize;
use crate::{DocId, Score};

#[cfg(test)]
mod tests;

/// Produces index tokens from a whole document.
pub type IndexingTokenizer<D> = Arc<dyn Fn(&D) -> Vec<String> + Send + Sync>;
/// Produces query terms from a query string.
pub type SearchTokenizer = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Engine configuration
///
/// Thresholds cap how many tokens a tail segment may accumulate before
/// intake rolls over to a fresh one; min-save gates how many tokens a
/// tail needs before it is materialized to disk at all.
pub struct EngineConfig<D = Document> {
    pub indexing_tokenizer: IndexingTokenizer<D>,
    pub search_tokenizer: SearchTokenizer,
    pub word_segment_token_threshold: u64,
    pub char_segment_token_threshold: u64,
    pub min_word_token_save: u64,
    pub min_char_token_save: u64,
    pub hasher: Arc<dyn TokenHasher>,
}

impl<D> Clone for EngineConfig<D> {
    fn clone(&self) -> Self {
        Self {
            indexing_tokenizer: Arc::clone(&self.indexing_tokenizer),
            search_tokenizer: Arc::clone(&self.search_tokenizer),
            word_segment_token_threshold: self.word_segment_token_threshold,
            char_segment_token_threshold: self.char_segment_token_threshold,
            min_word_token_save: self.min_word_token_save,
            min_char_token_save: self.min_char_token_save,
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl Default for EngineConfig<Document> {
    fn default() -> Self {
        Self {
            indexing_tokenizer: Arc::new(|doc: &Document| default_tokenize(&doc.text)),
            search_tokenizer: Arc::new(|query: &str| default_tokenize(query)),
            word_segment_token_threshold: 100_000,
            char_segment_token_threshold: 500_000,
            min_word_token_save: 0,
            min_char_token_save: 0,
            hasher: default_hasher(),
        }
    }
}

impl<D> EngineConfig<D> {
    fn threshold(&self, kind: IndexKind) -> u64 {
        match kind {
            IndexKind::Word => self.word_segment_token_threshold,
            IndexKind::Char => self.char_segment_token_threshold,
        }
    }

    fn min_save(&self, kind: IndexKind) -> u64 {
        match kind {
            IndexKind::Word => self.min_word_token_save,
            IndexKind::Char => self.min_char_token_save,
        }
    }

    fn validate(&self) -> Result<()> {
        for kind in IndexKind::ALL {
            if self.min_save(kind) >= self.threshold(kind) {
                return Err(Error::ConfigInvalid(format!(
                    "{kind:?} min token save {} must be below the segment threshold {}",
                    self.min_save(kind),
                    self.threshold(kind)
                )));
            }
        }
        Ok(())
    }
}

/// One scored query match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocId,
    pub score: Score,
    /// Query terms that matched this document, in query order.
    pub tokens: Vec<String>,
}

/// Snapshot of engine state for callers and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub word_segments: usize,
    pub char_segments: usize,
    pub deleted: usize,
    pub word_cache_size: u64,
    pub char_cache_size: u64,
    pub in_batch: bool,
}

/// Token deltas accumulated while a batch is open.
#[derive(Debug, Default, Clone, Copy)]
struct PendingTokens {
    word: u64,
    character: u64,
}

impl PendingTokens {
    fn get(&self, kind: IndexKind) -> u64 {
        match kind {
            IndexKind::Word => self.word,
            IndexKind::Char => self.character,
        }
    }

    fn add(&mut self, kind: IndexKind, delta: u64) {
        match kind {
            IndexKind::Word => self.word += delta,
            IndexKind::Char => self.character += delta,
        }
    }

    fn clear(&mut self, kind: IndexKind) {
        match kind {
            IndexKind::Word => self.word = 0,
            IndexKind::Char => self.character = 0,
        }
    }
}

/// Embeddable full-text indexing and retrieval engine
///
/// Generic over the blob store it persists to and the document type it
/// indexes; the indexing tokenizer is the only code that looks inside a
/// document.
pub struct Engine<S: BlobStore, D: DocRecord = Document> {
    store: Arc<S>,
    config: EngineConfig<D>,
    cache: IntakeLog<S>,
    meta: MetaManager<S>,
    /// Live segment handles keyed by filename.
    segments: FxHashMap<String, IndexSegment>,
    initialized: bool,
    in_batch: bool,
    pending: PendingTokens,
}

impl<S: BlobStore, D: DocRecord> std::fmt::Debug for Engine<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("initialized", &self.initialized)
            .field("in_batch", &self.in_batch)
            .finish_non_exhaustive()
    }
}

impl<S: BlobStore, D: DocRecord> Engine<S, D> {
    /// Validate the configuration and wrap the store. No IO happens here;
    /// the first operation (or an explicit [`Engine::init`]) loads state.
    pub fn new(store: S, config: EngineConfig<D>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        Ok(Self {
            cache: IntakeLog::new(Arc::clone(&store)),
            meta: MetaManager::new(Arc::clone(&store)),
            store,
            config,
            segments: FxHashMap::default(),
            initialized: false,
            in_batch: false,
            pending: PendingTokens::default(),
        })
    }

    /// Load the catalog and open every catalogued segment. Idempotent;
    /// every public operation calls this, so an explicit call is only
    /// useful to front-load the IO.
    pub async fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.meta.load().await?;
        let filenames: Vec<String> = IndexKind::ALL
            .iter()
            .flat_map(|&kind| self.meta.segments(kind))
            .map(|d| d.filename.clone())
            .collect();
        for filename in filenames {
            self.ensure_segment_loaded(&filename).await?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Get or create the handle for `filename` and try to load it.
    /// Corruption downgrades to a warning: the segment stays unloaded and
    /// searches over it come back empty.
    async fn ensure_segment_loaded(&mut self, filename: &str) -> Result<()> {
        let hasher = Arc::clone(&self.config.hasher);
        let segment = self
            .segments
            .entry(filename.to_string())
            .or_insert_with(|| IndexSegment::new(filename, hasher));
        match segment.load(self.store.as_ref()).await {
            Ok(()) => Ok(()),
            Err(Error::Corruption(msg)) => {
                log::warn!("treating segment as missing: {msg}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Index one document. Fails with [`Error::IdConflict`] /
    /// [`Error::IdTombstoned`] if the id was ever seen.
    pub async fn add_document(&mut self, doc: &D) -> Result<()> {
        self.ingest(std::slice::from_ref(doc), true).await
    }

    /// Index a batch of documents in array order, strict id checking.
    pub async fn add_documents(&mut self, docs: &[D]) -> Result<()> {
        self.ingest(docs, true).await
    }

    /// Like [`Engine::add_document`] but silently skips already-added and
    /// tombstoned ids. This is the recovery path after a crash between a
    /// log append and the metadata save: re-feeding the same input is safe.
    pub async fn add_document_if_missing(&mut self, doc: &D) -> Result<()> {
        self.ingest(std::slice::from_ref(doc), false).await
    }

    /// Lenient batch variant of [`Engine::add_documents`].
    pub async fn add_documents_if_missing(&mut self, docs: &[D]) -> Result<()> {
        self.ingest(docs, false).await
    }

    async fn ingest(&mut self, docs: &[D], strict: bool) -> Result<()> {
        self.init().await?;
        if docs.is_empty() {
            return Ok(());
        }

        let mut word_batch: Vec<TokenizedDoc> = Vec::new();
        let mut char_batch: Vec<TokenizedDoc> = Vec::new();
        let mut new_ids: Vec<u32> = Vec::new();

        for doc in docs {
            let id = doc.doc_id();
            if self.meta.is_deleted(id) {
                if strict {
                    return Err(Error::IdTombstoned(id));
                }
                continue;
            }
            if self.meta.is_added(id) || new_ids.contains(&id) {
                if strict {
                    return Err(Error::IdConflict(id));
                }
                continue;
            }

            let (word_tokens, char_tokens) = partition_tokens((self.config.indexing_tokenizer)(doc));
            if !word_tokens.is_empty() {
                word_batch.push(TokenizedDoc::new(id, word_tokens));
            }
            if !char_tokens.is_empty() {
                char_batch.push(TokenizedDoc::new(id, char_tokens));
            }
            new_ids.push(id);
        }

        if new_ids.is_empty() {
            return Ok(());
        }

        let word_delta: u64 = word_batch.iter().map(|d| d.tokens.len() as u64).sum();
        let char_delta: u64 = char_batch.iter().map(|d| d.tokens.len() as u64).sum();

        // The log append lands before any id or catalog mutation; on
        // failure the caller sees the error and no engine state changed.
        if !word_batch.is_empty() {
            self.cache
                .append_batch(IndexKind::Word.cache_name(), &word_batch)
                .await?;
        }
        if !char_batch.is_empty() {
            self.cache
                .append_batch(IndexKind::Char.cache_name(), &char_batch)
                .await?;
        }
        for id in new_ids {
            self.meta.add_added_id(id);
        }

        if self.in_batch {
            self.pending.add(IndexKind::Word, word_delta);
            self.pending.add(IndexKind::Char, char_delta);
        } else {
            if word_delta > 0 {
                self.process_segment(IndexKind::Word, word_delta).await?;
            }
            if char_delta > 0 {
                self.process_segment(IndexKind::Char, char_delta).await?;
            }
            self.meta.save().await?;
        }
        Ok(())
    }

    /// Decide where newly logged tokens land - extend the tail segment or
    /// open the next one - and rebuild it from the log unless it is still
    /// below the kind's min-save size.
    ///
    /// Rollover never spills: a delta that would push the tail past the
    /// threshold starts a fresh segment instead of crossing it, so tail
    /// token counts grow monotonically up to the threshold.
    async fn process_segment(&mut self, kind: IndexKind, added_tokens: u64) -> Result<()> {
        let cache_size = self.cache.size(kind.cache_name()).await?;
        let threshold = self.config.threshold(kind);
        let min_save = self.config.min_save(kind);

        let (filename, is_new, start, new_total) = match self.meta.last_segment(kind) {
            None => (kind.segment_filename(1), true, 0u64, added_tokens),
            Some(last)
                if last.token_count >= threshold
                    || last.token_count + added_tokens >= threshold =>
            {
                let next = self.meta.segments(kind).len() + 1;
                (kind.segment_filename(next), true, last.end, added_tokens)
            }
            Some(last) => (
                last.filename.clone(),
                false,
                last.start,
                last.token_count + added_tokens,
            ),
        };

        if new_total < min_save {
            // Tokens stay in the log; only the descriptor advances.
            self.meta
                .update_segment(kind, filename, start, cache_size, new_total, is_new);
            return Ok(());
        }

        let docs = self
            .cache
            .read_range(kind.cache_name(), start, cache_size)
            .await?;
        let hasher = Arc::clone(&self.config.hasher);
        let segment = self
            .segments
            .entry(filename.clone())
            .or_insert_with(|| IndexSegment::new(filename.as_str(), hasher));
        segment.build_and_save(self.store.as_ref(), &docs).await?;
        self.meta
            .update_segment(kind, filename, start, cache_size, new_total, is_new);
        Ok(())
    }

    // ========================================================================
    // Batch mode
    // ========================================================================

    /// Enter batch mode: intake only appends to the logs until
    /// [`Engine::end_batch`]. Re-entering just re-resets the pending counts.
    pub fn start_batch(&mut self) {
        self.in_batch = true;
        self.pending = PendingTokens::default();
    }

    /// Flush accumulated intake into segments and save. A no-op outside
    /// batch mode. On failure the batch stays open with its remaining
    /// pending counts, so calling again retries exactly the unfinished work.
    pub async fn end_batch(&mut self) -> Result<()> {
        if !self.in_batch {
            return Ok(());
        }
        self.init().await?;
        for kind in IndexKind::ALL {
            let delta = self.pending.get(kind);
            if delta > 0 {
                self.process_segment(kind, delta).await?;
                self.pending.clear(kind);
            }
        }
        self.meta.save().await?;
        self.in_batch = false;
        Ok(())
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Tokenize the query, fan out over every catalogued segment, and
    /// return tombstone-filtered hits sorted by descending score.
    ///
    /// Each term contributes `1 + 0.1 x its code-point length` per segment
    /// it matches a document in. `limit` of `None` or `Some(0)` returns
    /// all matches.
    pub async fn search(&mut self, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        self.init().await?;

        let (word_terms, char_terms) = partition_tokens((self.config.search_tokenizer)(query));

        // Segments catalogued after init (or by a crashed peer) load lazily.
        let filenames: Vec<String> = IndexKind::ALL
            .iter()
            .flat_map(|&kind| self.meta.segments(kind))
            .map(|d| d.filename.clone())
            .collect();
        for filename in filenames {
            self.ensure_segment_loaded(&filename).await?;
        }

        // First-hit insertion order keeps tie ordering deterministic.
        let mut order: Vec<u32> = Vec::new();
        let mut hits: FxHashMap<u32, (f32, Vec<String>)> = FxHashMap::default();

        let terms = word_terms
            .iter()
            .map(|t| (IndexKind::Word, t))
            .chain(char_terms.iter().map(|t| (IndexKind::Char, t)));
        for (kind, term) in terms {
            let weight = 1.0 + 0.1 * term.chars().count() as f32;
            for descriptor in self.meta.segments(kind) {
                let Some(segment) = self.segments.get(&descriptor.filename) else {
                    continue;
                };
                for id in segment.search(term) {
                    if self.meta.is_deleted(id) {
                        continue;
                    }
                    let (score, tokens) = hits.entry(id).or_insert_with(|| {
                        order.push(id);
                        (0.0, Vec::new())
                    });
                    *score += weight;
                    if !tokens.contains(term) {
                        tokens.push(term.clone());
                    }
                }
            }
        }

        let mut results: Vec<SearchHit> = order
            .into_iter()
            .filter_map(|id| {
                hits.remove(&id).map(|(score, tokens)| SearchHit {
                    id,
                    score,
                    tokens,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = limit
            && limit > 0
        {
            results.truncate(limit);
        }
        Ok(results)
    }

    // ========================================================================
    // Deletion and inspection
    // ========================================================================

    /// Tombstone an id. Postings are never rewritten; search-time
    /// filtering hides the document from every future query.
    pub async fn remove_document(&mut self, id: DocId) -> Result<()> {
        self.init().await?;
        self.meta.add_deleted_id(id);
        self.meta.remove_added_id(id);
        self.meta.save().await
    }

    /// Whether the id was ever accepted, live or tombstoned.
    pub async fn has_document(&mut self, id: DocId) -> Result<bool> {
        self.init().await?;
        Ok(self.meta.has_document(id))
    }

    pub async fn get_status(&mut self) -> Result<EngineStatus> {
        self.init().await?;
        Ok(EngineStatus {
            word_segments: self.meta.segments(IndexKind::Word).len(),
            char_segments: self.meta.segments(IndexKind::Char).len(),
            deleted: self.meta.deleted_count(),
            word_cache_size: self.cache.size(IndexKind::Word.cache_name()).await?,
            char_cache_size: self.cache.size(IndexKind::Char.cache_name()).await?,
            in_batch: self.in_batch,
        })
    }

    /// Wipe the store's namespace and reset to a blank, uninitialized
    /// engine. The next operation re-initializes from the (empty) store.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.store
            .clear_all()
            .await
            .map_err(Error::storage("clear_all", "*"))?;
        self.segments.clear();
        self.meta.reset();
        self.initialized = false;
        self.in_batch = false;
        self.pending = PendingTokens::default();
        Ok(())
    }
}

#[cfg(feature = "native")]
impl<D: DocRecord> Engine<crate::storage::FsBlobStore, D> {
    /// Engine over a flat directory on the local filesystem.
    pub fn with_base_dir(
        path: impl AsRef<std::path::Path>,
        config: EngineConfig<D>,
    ) -> Result<Self> {
        Self::new(crate::storage::FsBlobStore::new(path), config)
    }
}

/// Dedupe tokens (first occurrence wins) and split them by code-point
/// length: single code points feed the char index, longer tokens the word
/// index, empties are dropped.
fn partition_tokens(tokens: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut words = Vec::new();
    let mut chars = Vec::new();
    for token in tokens {
        if token.is_empty() || seen.contains(&token) {
            continue;
        }
        seen.insert(token.clone());
        if token.chars().count() == 1 {
            chars.push(token);
        } else {
            words.push(token);
        }
    }
    (words, chars)
}

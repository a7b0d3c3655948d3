//! Mneme - an embeddable async full-text indexing core
//!
//! A serverless indexing and retrieval engine: numbered documents go in,
//! ranked document ids come out, and every byte of state lives in files
//! behind a narrow blob-storage abstraction. The library provides:
//! - Fully async IO through the [`BlobStore`] trait (memory, filesystem,
//!   or caller-supplied backends such as a sandboxed browser FS)
//! - A two-tier intake pipeline that routes multi-code-point tokens to a
//!   word index and single code points to a char index
//! - An append-only intake log per index kind; segments are rebuilt from
//!   log byte ranges, which is the crash-tolerance story
//! - Compact binary segment files with a hash-ordered dictionary and
//!   byte-wise collision resolution
//! - Threshold-based segment rollover with a don't-spill rule, plus a
//!   min-save gate that keeps tiny tails out of storage
//! - Tombstone deletion filtered at query time, never rewriting postings
//!
//! One engine instance expects externally serialized calls; point two
//! engines at the same base directory and the metadata rewrites will race.

pub mod cache;
pub mod document;
pub mod engine;
pub mod error;
pub mod hash;
pub mod meta;
pub mod segment;
pub mod storage;
pub mod tokenizer;

pub use cache::{IntakeLog, TokenizedDoc};
pub use document::{DocRecord, Document};
pub use engine::{
    Engine, EngineConfig, EngineStatus, IndexingTokenizer, SearchHit, SearchTokenizer,
};
pub use error::{Error, Result};
pub use hash::{HASH_SEED, HashWidth, Murmur32, Murmur64, TokenHasher};
pub use meta::{
    ADDED_IDS_FILENAME, DELETED_IDS_FILENAME, IndexKind, IndexMeta, META_FILENAME, MetaManager,
    SegmentDescriptor,
};
pub use segment::{IndexSegment, SEGMENT_MAGIC};
#[cfg(feature = "native")]
pub use storage::FsBlobStore;
pub use storage::{BlobStore, MemoryBlobStore, OwnedBytes};
pub use tokenizer::default_tokenize;

pub type DocId = u32;
pub type Score = f32;

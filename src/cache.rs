//! Append-only intake log of tokenized documents
//!
//! One log per index kind (`word_cache.bin`, `char_cache.bin`). Intake is
//! persisted here before any segment is touched; the open tail of each
//! kind's catalog is always rebuildable from a byte range of its log.
//!
//! Record framing, all little-endian:
//! ```text
//! id: u32 | token_count: u32 | (len: u16 | utf8 bytes) * token_count | 0x1E
//! ```
//! The trailing sentinel makes scans tolerant: a reader that hits a
//! truncated or mangled frame stops cleanly and returns what it has.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// Sentinel byte closing every log record.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Token byte length is framed as u16; longer tokens are clamped.
pub const MAX_TOKEN_BYTES: usize = u16::MAX as usize;

/// A document reduced to its id and deduplicated tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedDoc {
    pub id: u32,
    pub tokens: Vec<String>,
}

impl TokenizedDoc {
    pub fn new(id: u32, tokens: Vec<String>) -> Self {
        Self { id, tokens }
    }
}

/// Clamp a token to [`MAX_TOKEN_BYTES`] without splitting a code point.
fn clamped_bytes(token: &str) -> &[u8] {
    if token.len() <= MAX_TOKEN_BYTES {
        return token.as_bytes();
    }
    let mut end = MAX_TOKEN_BYTES;
    while !token.is_char_boundary(end) {
        end -= 1;
    }
    &token.as_bytes()[..end]
}

/// Frame one record into `buf`.
fn encode_record(buf: &mut Vec<u8>, doc: &TokenizedDoc) {
    buf.extend_from_slice(&doc.id.to_le_bytes());
    buf.extend_from_slice(&(doc.tokens.len() as u32).to_le_bytes());
    for token in &doc.tokens {
        let bytes = clamped_bytes(token);
        buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf.push(RECORD_SEPARATOR);
}

/// Scan framed records out of `bytes`, stopping at the first bad frame.
fn decode_records(bytes: &[u8]) -> Vec<TokenizedDoc> {
    let mut docs = Vec::new();
    let mut pos = 0usize;

    'records: while pos + 8 <= bytes.len() {
        let id = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        let token_count = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
        let mut cursor = pos + 8;

        let mut tokens = Vec::with_capacity(token_count as usize);
        for _ in 0..token_count {
            if cursor + 2 > bytes.len() {
                break 'records;
            }
            let len = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
            cursor += 2;
            if cursor + len > bytes.len() {
                break 'records;
            }
            match std::str::from_utf8(&bytes[cursor..cursor + len]) {
                Ok(token) => tokens.push(token.to_string()),
                Err(_) => {
                    log::warn!("intake log: non-UTF-8 token bytes at offset {cursor}, stopping scan");
                    break 'records;
                }
            }
            cursor += len;
        }

        if cursor >= bytes.len() {
            break;
        }
        if bytes[cursor] != RECORD_SEPARATOR {
            log::warn!("intake log: missing record separator at offset {cursor}, stopping scan");
            break;
        }

        docs.push(TokenizedDoc::new(id, tokens));
        pos = cursor + 1;
    }

    docs
}

/// Durable, byte-offset-addressable log of tokenized documents
pub struct IntakeLog<S> {
    store: Arc<S>,
}

impl<S: BlobStore> IntakeLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Frame all `docs` into one buffer and append it in a single call.
    ///
    /// The single append is the crash-safety primitive: either the whole
    /// batch lands in the log or none of it does. Returns the new log size.
    pub async fn append_batch(&self, name: &str, docs: &[TokenizedDoc]) -> Result<u64> {
        if docs.is_empty() {
            return self.size(name).await;
        }
        let mut buf = Vec::new();
        for doc in docs {
            encode_record(&mut buf, doc);
        }
        self.store
            .append(name, &buf)
            .await
            .map_err(Error::storage("append", name))
    }

    /// Decode the records inside `[start, end)`, tolerating a truncated tail.
    pub async fn read_range(&self, name: &str, start: u64, end: u64) -> Result<Vec<TokenizedDoc>> {
        let bytes = self
            .store
            .read_range(name, start, end)
            .await
            .map_err(Error::storage("read_range", name))?;
        Ok(match bytes {
            Some(bytes) => decode_records(&bytes),
            None => Vec::new(),
        })
    }

    pub async fn size(&self, name: &str) -> Result<u64> {
        self.store
            .size(name)
            .await
            .map_err(Error::storage("size", name))
    }
}

//! Seeded token hashing
//!
//! The dictionary inside every segment file is ordered by token hash, so
//! the hash function is durable schema: two engines opened on the same
//! base directory must hash identical tokens to identical values or
//! lookups fail silently. Both built-in variants are MurmurHash3 with a
//! fixed seed.

use std::io::Cursor;
use std::sync::Arc;

/// Fixed seed shared by every built-in hasher.
pub const HASH_SEED: u32 = 0x1234_5678;

/// On-disk width of dictionary hash values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashWidth {
    B32,
    B64,
}

impl HashWidth {
    /// Size in bytes of one hash value at this width.
    pub fn hash_len(self) -> usize {
        match self {
            HashWidth::B32 => 4,
            HashWidth::B64 => 8,
        }
    }
}

/// Deterministic token hash used to key the segment dictionary
///
/// Implementations must be stable across processes and platforms; the
/// value (truncated to `width()`) is written into segment files. 32-bit
/// hashers must return values that fit in 32 bits.
pub trait TokenHasher: Send + Sync + 'static {
    fn width(&self) -> HashWidth;

    fn hash(&self, token: &str) -> u64;
}

/// MurmurHash3 x86 32-bit
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur32;

impl TokenHasher for Murmur32 {
    fn width(&self) -> HashWidth {
        HashWidth::B32
    }

    fn hash(&self, token: &str) -> u64 {
        murmur3::murmur3_32(&mut Cursor::new(token.as_bytes()), HASH_SEED).unwrap_or(0) as u64
    }
}

/// MurmurHash3 x64, low 64 bits of the 128-bit variant (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur64;

impl TokenHasher for Murmur64 {
    fn width(&self) -> HashWidth {
        HashWidth::B64
    }

    fn hash(&self, token: &str) -> u64 {
        murmur3::murmur3_x64_128(&mut Cursor::new(token.as_bytes()), HASH_SEED).unwrap_or(0) as u64
    }
}

/// The default hasher used when the config does not override it.
pub fn default_hasher() -> Arc<dyn TokenHasher> {
    Arc::new(Murmur64)
}

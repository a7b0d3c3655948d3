//! Segment construction
//!
//! Builds the full inverted file in one in-memory buffer; the caller
//! writes it wholesale and keeps the buffer as the live index.

use byteorder::{LittleEndian, WriteBytesExt};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, Write};

use crate::cache::TokenizedDoc;
use crate::hash::{HashWidth, TokenHasher};

use super::format::{SEGMENT_MAGIC, WIDTH_TAG_64, entry_len, header_len};

struct Bucket {
    hash: u64,
    postings: Vec<u32>,
}

/// Build a complete segment file image from tokenized documents.
///
/// Tokens are deduplicated per document, so each (token, doc) pair
/// contributes at most one posting. The dictionary is emitted sorted by
/// (hash asc, token bytes asc); the byte tie-break keeps collision runs
/// deterministic for the reader's scan.
pub fn build_segment(docs: &[TokenizedDoc], hasher: &dyn TokenHasher) -> io::Result<Vec<u8>> {
    let mut buckets: FxHashMap<&str, Bucket> = FxHashMap::default();

    for doc in docs {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for token in &doc.tokens {
            if token.is_empty() || !seen.insert(token.as_str()) {
                continue;
            }
            let bucket = buckets.entry(token.as_str()).or_insert_with(|| Bucket {
                hash: hasher.hash(token),
                postings: Vec::new(),
            });
            if bucket.postings.last() != Some(&doc.id) {
                bucket.postings.push(doc.id);
            }
        }
    }

    let mut entries: Vec<(&str, Bucket)> = buckets.into_iter().collect();
    entries.sort_unstable_by(|(a_token, a), (b_token, b)| {
        a.hash
            .cmp(&b.hash)
            .then_with(|| a_token.as_bytes().cmp(b_token.as_bytes()))
    });

    let width = hasher.width();
    let dict_start = header_len(width);
    let dict_len = entries.len() * entry_len(width);
    let postings_start = dict_start + dict_len;
    let postings_len: usize = entries.iter().map(|(_, b)| b.postings.len() * 4).sum();
    let tokens_start = postings_start + postings_len;
    let tokens_len: usize = entries.iter().map(|(t, _)| t.len() + 1).sum();

    let mut buf = Vec::with_capacity(tokens_start + tokens_len);
    write_segment(&mut buf, width, tokens_start as u32, &entries)?;
    Ok(buf)
}

fn write_segment<W: Write>(
    writer: &mut W,
    width: HashWidth,
    tokens_start: u32,
    entries: &[(&str, Bucket)],
) -> io::Result<()> {
    // Header
    writer.write_u32::<LittleEndian>(SEGMENT_MAGIC)?;
    writer.write_u32::<LittleEndian>(entries.len() as u32)?;
    writer.write_u32::<LittleEndian>(tokens_start)?;
    if width == HashWidth::B64 {
        writer.write_u32::<LittleEndian>(WIDTH_TAG_64)?;
    }

    // Dictionary
    let mut token_offset = 0u32;
    let mut postings_offset = 0u32;
    for (token, bucket) in entries {
        match width {
            HashWidth::B32 => writer.write_u32::<LittleEndian>(bucket.hash as u32)?,
            HashWidth::B64 => writer.write_u64::<LittleEndian>(bucket.hash)?,
        }
        writer.write_u32::<LittleEndian>(token.len() as u32)?;
        writer.write_u32::<LittleEndian>(token_offset)?;
        writer.write_u32::<LittleEndian>(postings_offset)?;
        writer.write_u32::<LittleEndian>(bucket.postings.len() as u32)?;
        token_offset += token.len() as u32 + 1;
        postings_offset += bucket.postings.len() as u32 * 4;
    }

    // Postings region
    for (_, bucket) in entries {
        for &doc_id in &bucket.postings {
            writer.write_u32::<LittleEndian>(doc_id)?;
        }
    }

    // Tokens region; the 0x00 terminator is a sanity marker, decoding
    // relies on the stored lengths.
    for (token, _) in entries {
        writer.write_all(token.as_bytes())?;
        writer.write_all(&[0x00])?;
    }

    Ok(())
}

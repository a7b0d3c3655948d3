//! Binary layout constants for segment files.
//!
//! ```text
//! [header]
//! [dictionary: entry_count records, sorted by (hash asc, token bytes asc)]
//! [postings region: u32-LE doc ids]
//! [tokens region: utf8 bytes + 0x00 per token]
//! ```
//! Header: magic(4) + entry_count(4) + tokens_offset(4), and for the
//! 64-bit hash width a trailing width tag(4) = 64. All integers LE.
//!
//! Dictionary entry: hash (4 or 8 by width) + token_byte_len(4) +
//! token_offset(4) + postings_offset(4) + postings_len(4).
//! `token_offset` is relative to the tokens region, `postings_offset` is a
//! byte offset relative to the postings region, `postings_len` counts doc
//! ids. The postings region therefore starts right after the dictionary
//! and ends at `tokens_offset`.

use crate::hash::HashWidth;

/// Magic number in every segment header (0x494E4458, "INDX").
pub const SEGMENT_MAGIC: u32 = 0x494E_4458;

/// Width tag value written by the 64-bit variant.
pub const WIDTH_TAG_64: u32 = 64;

/// Header length for a given hash width.
pub const fn header_len(width: HashWidth) -> usize {
    match width {
        HashWidth::B32 => 12,
        HashWidth::B64 => 16,
    }
}

/// Dictionary entry length for a given hash width.
pub const fn entry_len(width: HashWidth) -> usize {
    match width {
        HashWidth::B32 => 20,
        HashWidth::B64 => 24,
    }
}

//! Segmented inverted-index files
//!
//! Each segment is one on-disk inverted file: header, dictionary sorted
//! by (hash, token bytes), postings region, token bytes region. Sealed
//! segments are immutable; only the catalog tail is ever rebuilt.

mod builder;
mod format;
mod reader;

pub use builder::build_segment;
pub use format::{SEGMENT_MAGIC, entry_len, header_len};
pub use reader::IndexSegment;

//! End-to-end engine scenarios over the in-memory store.

use std::sync::Arc;

use crate::document::Document;
use crate::storage::{BlobStore, MemoryBlobStore};

use super::{Engine, EngineConfig};

mod batching;

/// Engine with default config over a fresh shared store.
fn test_engine() -> (MemoryBlobStore, Engine<MemoryBlobStore>) {
    let store = MemoryBlobStore::new();
    let engine = Engine::new(store.clone(), EngineConfig::default()).unwrap();
    (store, engine)
}

/// Engine whose word threshold/min-save are easy to hit in tests.
fn small_engine(
    store: &MemoryBlobStore,
    word_threshold: u64,
    min_word_save: u64,
) -> Engine<MemoryBlobStore> {
    let config = EngineConfig {
        word_segment_token_threshold: word_threshold,
        min_word_token_save: min_word_save,
        ..EngineConfig::default()
    };
    Engine::new(store.clone(), config).unwrap()
}

fn doc(id: u32, text: &str) -> Document {
    Document::new(id, text)
}

/// Config whose indexing tokenizer ignores the text and always produces
/// the given tokens.
fn fixed_tokens_config(tokens: &[&str]) -> EngineConfig<Document> {
    let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    EngineConfig {
        indexing_tokenizer: Arc::new(move |_doc: &Document| tokens.clone()),
        search_tokenizer: Arc::new(|query: &str| vec![query.to_string()]),
        ..EngineConfig::default()
    }
}

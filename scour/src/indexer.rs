//! Per-field token indexes.
//!
//! String values are split into lowercase tokens; int32 values become a single
//! four-byte key whose byte order matches numeric order. Both land in a
//! radix tree mapping key → posting list of seq_ids.

use crate::art::ArtTree;
use crate::config::{Field, FieldType, WordBoundary};
use crate::models::FieldValue;
use std::collections::BTreeSet;

/// Split `text` into lowercase tokens, in order of appearance.
pub(crate) fn tokenize(text: &str, boundary: WordBoundary) -> Vec<String> {
    let is_separator = |c: char| match boundary {
        WordBoundary::Punctuation => !c.is_alphanumeric(),
        WordBoundary::Whitespace => c.is_whitespace(),
    };
    text.split(is_separator)
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Order-preserving key for an int32: flip the sign bit, then big-endian.
pub fn encode_int32(value: i32) -> [u8; 4] {
    ((value as u32) ^ 0x8000_0000).to_be_bytes()
}

pub fn decode_int32(key: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = key.try_into().ok()?;
    Some((u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32)
}

/// Split a query into `field`'s tokens.
pub(crate) fn query_tokens(field: &Field, query: &str) -> Vec<String> {
    match field.field_type {
        FieldType::String => tokenize(query, field.word_boundary),
        FieldType::Int32 => query.split_whitespace().map(str::to_string).collect(),
    }
}

/// One schema field's index.
#[derive(Debug, Clone)]
pub enum FieldIndex {
    String { tree: ArtTree, boundary: WordBoundary },
    Int32 { tree: ArtTree },
}

impl FieldIndex {
    pub fn new(field: &Field) -> Self {
        match field.field_type {
            FieldType::String => FieldIndex::String {
                tree: ArtTree::new(),
                boundary: field.word_boundary,
            },
            FieldType::Int32 => FieldIndex::Int32 { tree: ArtTree::new() },
        }
    }

    pub fn tree(&self) -> &ArtTree {
        match self {
            FieldIndex::String { tree, .. } | FieldIndex::Int32 { tree } => tree,
        }
    }

    /// Index keys for a value. A token repeated within one value yields one key.
    pub fn keys(&self, value: &FieldValue) -> Vec<Vec<u8>> {
        match (self, value) {
            (FieldIndex::String { boundary, .. }, FieldValue::String(text)) => {
                let unique: BTreeSet<String> = tokenize(text, *boundary).into_iter().collect();
                unique.into_iter().map(String::into_bytes).collect()
            }
            (FieldIndex::Int32 { .. }, FieldValue::Int32(n)) => vec![encode_int32(*n).to_vec()],
            _ => Vec::new(),
        }
    }

    /// Add `seq_id` under every key of `value`. `score` is the document's
    /// primary rank score, kept in the posting list for rank ordering.
    pub fn index(&mut self, value: &FieldValue, seq_id: u32, score: i64) {
        let keys = self.keys(value);
        let tree = self.tree_mut();
        for key in keys {
            tree.insert(&key, seq_id, score);
        }
    }

    pub fn unindex(&mut self, value: &FieldValue, seq_id: u32) {
        let keys = self.keys(value);
        let tree = self.tree_mut();
        for key in keys {
            tree.remove(&key, seq_id);
        }
    }

    fn tree_mut(&mut self) -> &mut ArtTree {
        match self {
            FieldIndex::String { tree, .. } | FieldIndex::Int32 { tree } => tree,
        }
    }
}

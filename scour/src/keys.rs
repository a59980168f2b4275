//! Key encoding for the records a collection persists.
//!
//! Layout:
//! - `$CS<name>`                                  next seq_id (u32 BE)
//! - `$SI<collection_id BE><seq_id BE>`           document JSON
//! - `$DI<collection_id BE><doc_id bytes>`        seq_id (u32 BE)
//!
//! `$` sorts below digits and letters, so these records stay ahead of ordinary
//! keys in an ordered store. Big-endian numbers keep numeric order under a
//! byte-wise comparison, so a prefix scan over `$SI` yields documents in
//! seq_id order.

const COUNTER_PREFIX: &[u8] = b"$CS";
const SEQUENCE_PREFIX: &[u8] = b"$SI";
const DOCUMENT_ID_PREFIX: &[u8] = b"$DI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpace<'a> {
    Counter { collection: &'a str },
    Sequence { collection_id: u32, seq_id: u32 },
    DocumentId { collection_id: u32, doc_id: &'a str },
}

impl KeySpace<'_> {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            KeySpace::Counter { collection } => {
                let mut key = Vec::with_capacity(COUNTER_PREFIX.len() + collection.len());
                key.extend_from_slice(COUNTER_PREFIX);
                key.extend_from_slice(collection.as_bytes());
                key
            }
            KeySpace::Sequence { collection_id, seq_id } => {
                let mut key = sequence_prefix(collection_id);
                key.extend_from_slice(&seq_id.to_be_bytes());
                key
            }
            KeySpace::DocumentId { collection_id, doc_id } => {
                let mut key = Vec::with_capacity(DOCUMENT_ID_PREFIX.len() + 4 + doc_id.len());
                key.extend_from_slice(DOCUMENT_ID_PREFIX);
                key.extend_from_slice(&collection_id.to_be_bytes());
                key.extend_from_slice(doc_id.as_bytes());
                key
            }
        }
    }
}

/// Prefix shared by every sequence record of a collection.
pub fn sequence_prefix(collection_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(SEQUENCE_PREFIX.len() + 8);
    key.extend_from_slice(SEQUENCE_PREFIX);
    key.extend_from_slice(&collection_id.to_be_bytes());
    key
}

/// Recover the seq_id from a sequence record key of `collection_id`.
pub fn decode_seq_id(key: &[u8], collection_id: u32) -> Option<u32> {
    let rest = key.strip_prefix(sequence_prefix(collection_id).as_slice())?;
    decode_u32(rest)
}

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Exactly four big-endian bytes.
pub fn decode_u32(bytes: &[u8]) -> Option<u32> {
    let array: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(array))
}

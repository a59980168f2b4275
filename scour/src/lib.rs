//! Scour - typo-tolerant collection index
//!
//! Ingests JSON documents against a fixed schema, keeps one radix-tree token
//! index per field, and answers ranked queries that tolerate typos. Ranking
//! blends edit-distance cost and matched-token count with two precomputed
//! integer rank signals per document.
//!
//! Documents persist through the `Store` trait; `Database` is the SQLite
//! implementation.

pub mod art;
pub(crate) mod candidate;
mod collection;
pub mod config;
pub mod database;
pub mod indexer;
pub mod interface;
pub mod keys;
pub mod models;
pub mod ranking;
mod search;
pub mod topk;

pub use collection::Collection;
pub use config::{CollectionConfig, Field, FieldType, SearchLimits, WordBoundary};
pub use database::{Database, Store, WriteBatch};
pub use interface::*;

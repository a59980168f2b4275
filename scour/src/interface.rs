//! Public types and errors for the collection engine.

use crate::database::DatabaseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// SEARCH OPTIONS AND RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// How leaves sharing an edit-distance cost are ordered before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenOrdering {
    /// Longer posting lists first.
    #[default]
    Frequency,
    /// Highest primary rank score in the posting list first.
    Rank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub num_typos: u8,
    pub num_results: usize,
    pub token_order: TokenOrdering,
    /// Treat every query token as a prefix of the indexed token.
    pub prefix: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_typos: 0,
            num_results: 10,
            token_order: TokenOrdering::Frequency,
            prefix: false,
        }
    }
}

impl SearchOptions {
    pub fn typos(mut self, num_typos: u8) -> Self {
        self.num_typos = num_typos;
        self
    }

    pub fn results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn order(mut self, token_order: TokenOrdering) -> Self {
        self.token_order = token_order;
        self
    }

    pub fn prefix(mut self, prefix: bool) -> Self {
        self.prefix = prefix;
        self
    }
}

/// Ranked documents plus the number of distinct documents that matched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SearchResult {
    pub hits: Vec<Value>,
    pub num_found: usize,
}

impl SearchResult {
    /// The `id` of every hit, in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits
            .iter()
            .filter_map(|hit| hit.get("id").and_then(Value::as_str))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("invalid document{}: {source}", describe_doc(.doc_id))]
    Validation {
        doc_id: Option<String>,
        source: ValidationError,
    },
    #[error("document `{0}` not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("invalid query: {0}")]
    Query(#[from] QueryError),
    #[error("invalid collection config: {0}")]
    Config(String),
    #[error("sequence ids exhausted")]
    SequenceExhausted,
}

pub type CollectionResult<T> = Result<T, CollectionError>;

fn describe_doc(doc_id: &Option<String>) -> String {
    match doc_id {
        Some(id) => format!(" `{id}`"),
        None => String::new(),
    }
}

/// Why a document was rejected. Raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("`id` must be a non-empty string")]
    InvalidId,
    #[error("`id` `{0}` uses the reserved `$` prefix")]
    ReservedId(String),
    #[error("field `{field}` is missing")]
    MissingField { field: String },
    #[error("field `{field}` must be {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("field `{field}` value {value} does not fit in {expected}")]
    OutOfRange {
        field: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("no search fields given")]
    NoFields,
    #[error("field `{0}` is not in the schema")]
    UnknownField(String),
    #[error("field `{field}` is {actual}, expected {expected}")]
    WrongFieldType {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("query has {count} tokens for field `{field}`, at most {max} allowed")]
    TooManyTokens { field: String, count: usize, max: usize },
    #[error("num_typos {requested} exceeds the maximum of {max}")]
    TooManyTypos { requested: u8, max: u8 },
}

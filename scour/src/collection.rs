//! Collection: schema, per-field indexes, rank signals and the store bridge.
//!
//! Concurrency model:
//! - `add`/`remove` are serialized by the writer mutex, which also guards the
//!   sequence counter
//! - indexes and rank maps sit behind one `RwLock`; a writer holds it across
//!   the store batch and the index update, and a search holds the read side
//!   until its hits are loaded, so a reader sees the index and the stored
//!   records from the same side of every write
//! - searches run fields in parallel on the rayon pool

use crate::config::{CollectionConfig, FieldType, Schema, MAX_RESULTS};
use crate::database::{DatabaseError, Store, WriteBatch};
use crate::indexer::{self, FieldIndex};
use crate::interface::{
    CollectionError, CollectionResult, QueryError, SearchOptions, SearchResult, ValidationError,
};
use crate::keys::{self, KeySpace};
use crate::models::Document;
use crate::ranking::RankScores;
use crate::search::{self, FieldMatches};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;

struct WriterState {
    next_seq_id: u32,
}

struct IndexState {
    fields: Vec<FieldIndex>,
    ranks: RankScores,
    num_documents: usize,
}

impl IndexState {
    fn new(schema: &Schema) -> Self {
        Self {
            fields: schema.fields().iter().map(FieldIndex::new).collect(),
            ranks: RankScores::default(),
            num_documents: 0,
        }
    }

    fn apply(&mut self, doc: &Document, seq_id: u32) {
        for (index, value) in self.fields.iter_mut().zip(doc.values()) {
            index.index(value, seq_id, doc.primary_score());
        }
        self.ranks.insert(seq_id, doc.primary_score(), doc.secondary_score());
        self.num_documents += 1;
    }

    fn retract(&mut self, doc: &Document, seq_id: u32) {
        for (index, value) in self.fields.iter_mut().zip(doc.values()) {
            index.unindex(value, seq_id);
        }
        self.ranks.remove(seq_id);
        self.num_documents = self.num_documents.saturating_sub(1);
    }
}

pub struct Collection {
    config: CollectionConfig,
    schema: Schema,
    store: Arc<dyn Store>,
    writer: Mutex<WriterState>,
    state: RwLock<IndexState>,
}

impl Collection {
    /// Open a collection over `store`, rebuilding indexes from its stored documents.
    pub fn open(config: CollectionConfig, store: Arc<dyn Store>) -> CollectionResult<Self> {
        config.check()?;
        let schema = config.schema();

        let counter_key = KeySpace::Counter { collection: &config.name }.encode();
        let counter = match store.get(&counter_key)? {
            Some(bytes) => keys::decode_u32(&bytes)
                .ok_or_else(|| DatabaseError::corrupt(&counter_key, "sequence counter is not a u32"))?,
            None => 0,
        };

        let records = store.scan_prefix(&keys::sequence_prefix(config.collection_id))?;
        let documents: Vec<(u32, Document)> = records
            .par_iter()
            .map(|(key, value)| -> Result<(u32, Document), DatabaseError> {
                let seq_id = keys::decode_seq_id(key, config.collection_id)
                    .ok_or_else(|| DatabaseError::corrupt(key, "malformed sequence key"))?;
                let doc = decode_document(key, value, &schema, &config.rank_fields)?;
                Ok((seq_id, doc))
            })
            .collect::<Result<_, DatabaseError>>()?;

        let mut state = IndexState::new(&schema);
        for (seq_id, doc) in &documents {
            state.apply(doc, *seq_id);
        }

        // Never hand out a seq_id that is already on disk.
        let next_seq_id = documents
            .last()
            .map(|(seq_id, _)| seq_id.saturating_add(1))
            .map_or(counter, |after_last| counter.max(after_last));

        tracing::info!(
            collection = %config.name,
            documents = documents.len(),
            next_seq_id,
            "opened collection"
        );

        Ok(Self {
            config,
            schema,
            store,
            writer: Mutex::new(WriterState { next_seq_id }),
            state: RwLock::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_documents(&self) -> usize {
        self.state.read().num_documents
    }

    /// The seq_id the next successful `add` will use.
    pub fn next_seq_id(&self) -> u32 {
        self.writer.lock().next_seq_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // WRITES
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate, persist and index a JSON document. Returns its id.
    ///
    /// Adding an id that already exists replaces the old document, which gets
    /// a fresh seq_id. A rejected document consumes no seq_id.
    pub fn add(&self, document: &str) -> CollectionResult<String> {
        let mut doc = Document::parse(document, &self.schema, &self.config.rank_fields).map_err(
            |source| CollectionError::Validation {
                doc_id: peek_doc_id(document),
                source,
            },
        )?;

        let mut writer = self.writer.lock();
        let seq_id = writer.next_seq_id;
        let next_seq_id = seq_id.checked_add(1).ok_or(CollectionError::SequenceExhausted)?;
        let doc_id = doc.assign_id(seq_id);

        let previous = match self.lookup_seq_id(&doc_id)? {
            Some(old_seq_id) => self.load_document(old_seq_id)?.map(|old| (old_seq_id, old)),
            None => None,
        };

        let mut batch = WriteBatch::new();
        batch
            .put(
                KeySpace::Counter { collection: &self.config.name }.encode(),
                keys::encode_u32(next_seq_id).to_vec(),
            )
            .put(self.sequence_key(seq_id), doc.to_bytes())
            .put(self.document_id_key(&doc_id), keys::encode_u32(seq_id).to_vec());
        if let Some((old_seq_id, _)) = &previous {
            batch.delete(self.sequence_key(*old_seq_id));
        }
        {
            let mut state = self.state.write();
            self.store.write(&batch)?;
            writer.next_seq_id = next_seq_id;
            if let Some((old_seq_id, old)) = &previous {
                state.retract(old, *old_seq_id);
            }
            state.apply(&doc, seq_id);
        }

        tracing::debug!(
            doc_id = %doc_id,
            seq_id,
            ops = batch.len(),
            replaced = ?previous.as_ref().map(|(old, _)| *old),
            "added document"
        );
        Ok(doc_id)
    }

    /// Remove a document by id.
    pub fn remove(&self, doc_id: &str) -> CollectionResult<()> {
        let _writer = self.writer.lock();
        let seq_id = self
            .lookup_seq_id(doc_id)?
            .ok_or_else(|| CollectionError::NotFound(doc_id.to_string()))?;
        let stored = self.load_document(seq_id)?;

        let mut batch = WriteBatch::new();
        batch
            .delete(self.sequence_key(seq_id))
            .delete(self.document_id_key(doc_id));
        let mut state = self.state.write();
        self.store.write(&batch)?;

        if let Some(doc) = &stored {
            state.retract(doc, seq_id);
        } else {
            tracing::warn!(doc_id, seq_id, "removed id had no stored document");
        }

        tracing::debug!(doc_id, seq_id, "removed document");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // READS
    // ─────────────────────────────────────────────────────────────────────────

    /// Typo-tolerant search of `query` over `fields`.
    ///
    /// Hits from earlier fields come first. `num_found` counts every distinct
    /// document matched in any field, so it may exceed the number of hits.
    pub fn search(&self, query: &str, fields: &[&str], options: &SearchOptions) -> CollectionResult<SearchResult> {
        let limits = &self.config.limits;
        if fields.is_empty() {
            return Err(QueryError::NoFields.into());
        }
        if options.num_typos > limits.max_typos {
            return Err(QueryError::TooManyTypos {
                requested: options.num_typos,
                max: limits.max_typos,
            }
            .into());
        }

        let capacity = (limits.max_results as usize).min(MAX_RESULTS);
        let num_results = options.num_results.min(capacity);
        let max_tokens = (limits.max_search_tokens as usize).min(crate::config::MAX_SEARCH_TOKENS);

        let plans = fields
            .iter()
            .map(|&name| {
                let position = self
                    .schema
                    .position(name)
                    .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
                let tokens = indexer::query_tokens(&self.schema.fields()[position], query);
                if tokens.len() > max_tokens {
                    return Err(QueryError::TooManyTokens {
                        field: name.to_string(),
                        count: tokens.len(),
                        max: max_tokens,
                    });
                }
                Ok((position, tokens))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let state = self.state.read();
        let index: &IndexState = &state;
        let per_field: Vec<FieldMatches> = plans
            .par_iter()
            .map(|(position, tokens)| {
                search::search_field(
                    &index.fields[*position],
                    tokens,
                    options,
                    limits,
                    &index.ranks,
                    num_results,
                    capacity,
                )
            })
            .collect();

        let (seq_ids, num_found) = search::merge_fields(per_field, num_results);
        let hits = self.fetch_documents(&seq_ids)?;
        drop(state);
        Ok(SearchResult { hits, num_found })
    }

    /// Documents whose int32 `field` lies in `range`, ordered by rank.
    pub fn search_range(
        &self,
        field: &str,
        range: RangeInclusive<i32>,
        num_results: usize,
    ) -> CollectionResult<SearchResult> {
        let position = self
            .schema
            .position(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        let field_type = self.schema.fields()[position].field_type;
        if field_type != FieldType::Int32 {
            return Err(QueryError::WrongFieldType {
                field: field.to_string(),
                expected: FieldType::Int32.as_str(),
                actual: field_type.as_str(),
            }
            .into());
        }

        let capacity = (self.config.limits.max_results as usize).min(MAX_RESULTS);
        let num_results = num_results.min(capacity);
        let state = self.state.read();
        let matches =
            search::search_range(&state.fields[position], *range.start(), *range.end(), &state.ranks, capacity);

        let (seq_ids, num_found) = search::merge_fields(vec![matches], num_results);
        let hits = self.fetch_documents(&seq_ids)?;
        drop(state);
        Ok(SearchResult { hits, num_found })
    }

    /// Stored document for `doc_id`.
    pub fn get(&self, doc_id: &str) -> CollectionResult<Option<Value>> {
        let Some(seq_id) = self.lookup_seq_id(doc_id)? else {
            return Ok(None);
        };
        let key = self.sequence_key(seq_id);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(parse_json(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn seq_id(&self, doc_id: &str) -> CollectionResult<Option<u32>> {
        self.lookup_seq_id(doc_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // STORE HELPERS
    // ─────────────────────────────────────────────────────────────────────────

    fn sequence_key(&self, seq_id: u32) -> Vec<u8> {
        KeySpace::Sequence {
            collection_id: self.config.collection_id,
            seq_id,
        }
        .encode()
    }

    fn document_id_key(&self, doc_id: &str) -> Vec<u8> {
        KeySpace::DocumentId {
            collection_id: self.config.collection_id,
            doc_id,
        }
        .encode()
    }

    fn lookup_seq_id(&self, doc_id: &str) -> CollectionResult<Option<u32>> {
        let key = self.document_id_key(doc_id);
        match self.store.get(&key)? {
            Some(bytes) => {
                let seq_id = keys::decode_u32(&bytes)
                    .ok_or_else(|| DatabaseError::corrupt(&key, "seq_id is not a u32"))?;
                Ok(Some(seq_id))
            }
            None => Ok(None),
        }
    }

    fn load_document(&self, seq_id: u32) -> CollectionResult<Option<Document>> {
        let key = self.sequence_key(seq_id);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode_document(
                &key,
                &bytes,
                &self.schema,
                &self.config.rank_fields,
            )?)),
            None => Ok(None),
        }
    }

    /// Load hits in order, skipping any whose record has vanished.
    fn fetch_documents(&self, seq_ids: &[u32]) -> CollectionResult<Vec<Value>> {
        let loaded = seq_ids
            .par_iter()
            .map(|&seq_id| -> Result<Option<Value>, DatabaseError> {
                let key = self.sequence_key(seq_id);
                match self.store.get(&key)? {
                    Some(bytes) => Ok(Some(parse_json(&key, &bytes)?)),
                    None => {
                        tracing::warn!(seq_id, "indexed document missing from store");
                        Ok(None)
                    }
                }
            })
            .collect::<Result<Vec<Option<Value>>, DatabaseError>>()?;
        Ok(loaded.into_iter().flatten().collect())
    }
}

fn parse_json(key: &[u8], bytes: &[u8]) -> Result<Value, DatabaseError> {
    serde_json::from_slice(bytes).map_err(|e| DatabaseError::corrupt(key, e.to_string()))
}

fn decode_document(
    key: &[u8],
    bytes: &[u8],
    schema: &Schema,
    rank_fields: &[String],
) -> Result<Document, DatabaseError> {
    let value = parse_json(key, bytes)?;
    Document::from_value(value, schema, rank_fields).map_err(|e: ValidationError| DatabaseError::corrupt(key, e.to_string()))
}

/// Best-effort id of a rejected document, for the error message.
fn peek_doc_id(document: &str) -> Option<String> {
    let value: Value = serde_json::from_str(document).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Field;
    use crate::database::Database;
    use serde_json::json;

    fn books() -> Collection {
        let config = CollectionConfig::new("books")
            .field(Field::string("title"))
            .field(Field::int32("popularity"))
            .rank_field("popularity");
        let store = Arc::new(Database::open_in_memory().unwrap());
        Collection::open(config, store).unwrap()
    }

    fn add(collection: &Collection, id: &str, title: &str, popularity: i32) {
        let doc = json!({"id": id, "title": title, "popularity": popularity});
        collection.add(&doc.to_string()).unwrap();
    }

    #[test]
    fn test_add_then_search_each_token() {
        let c = books();
        add(&c, "a", "The quick brown fox", 1);
        for token in ["the", "quick", "BROWN", "fox"] {
            let result = c.search(token, &["title"], &SearchOptions::default()).unwrap();
            assert_eq!(result.ids(), vec!["a"], "token {token}");
        }
        assert_eq!(c.num_documents(), 1);
    }

    #[test]
    fn test_exact_match_beats_popularity() {
        for (exact_pop, typo_pop) in [(10, 5), (5, 10)] {
            let c = books();
            add(&c, "exact", "quick brown fox", exact_pop);
            add(&c, "plural", "quick brown foxes", typo_pop);
            let options = SearchOptions::default().typos(1);
            let result = c.search("fox", &["title"], &options).unwrap();
            assert_eq!(result.ids(), vec!["exact", "plural"], "popularities {exact_pop}/{typo_pop}");
            assert_eq!(result.num_found, 2);
        }
    }

    #[test]
    fn test_popularity_orders_equal_matches() {
        let c = books();
        add(&c, "low", "red apple", 1);
        add(&c, "high", "green apple", 50);
        add(&c, "mid", "apple pie", 20);
        let result = c.search("apple", &["title"], &SearchOptions::default()).unwrap();
        assert_eq!(result.ids(), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_remove() {
        let c = books();
        add(&c, "a", "lonely word", 1);
        c.remove("a").unwrap();
        let result = c.search("lonely", &["title"], &SearchOptions::default()).unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(c.num_documents(), 0);
        assert!(c.get("a").unwrap().is_none());
        assert!(matches!(c.remove("a"), Err(CollectionError::NotFound(id)) if id == "a"));
    }

    #[test]
    fn test_re_add_replaces() {
        let c = books();
        add(&c, "a", "old title", 1);
        let first_seq = c.seq_id("a").unwrap();
        add(&c, "a", "new title", 2);

        assert!(c.search("old", &["title"], &SearchOptions::default()).unwrap().hits.is_empty());
        let result = c.search("new", &["title"], &SearchOptions::default()).unwrap();
        assert_eq!(result.ids(), vec!["a"]);
        assert_eq!(result.hits[0]["popularity"], json!(2));
        assert_ne!(c.seq_id("a").unwrap(), first_seq, "re-add gets a fresh seq_id");
        assert_eq!(c.num_documents(), 1);
    }

    #[test]
    fn test_missing_id_is_assigned_from_seq() {
        let c = books();
        add(&c, "x", "first", 1);
        let id = c.add(r#"{"title": "second", "popularity": 1}"#).unwrap();
        assert_eq!(id, "$1");
        assert_eq!(c.get("$1").unwrap().unwrap()["id"], json!("$1"));
    }

    #[test]
    fn test_generated_id_never_replaces_client_document() {
        let c = books();
        add(&c, "1", "client owned apple", 1);
        let id = c.add(r#"{"title": "anonymous pear", "popularity": 1}"#).unwrap();
        assert_ne!(id, "1");
        assert_eq!(c.num_documents(), 2);

        let apple = c.search("apple", &["title"], &SearchOptions::default()).unwrap();
        assert_eq!(apple.ids(), vec!["1"]);
        let pear = c.search("pear", &["title"], &SearchOptions::default()).unwrap();
        assert_eq!(pear.ids(), vec![id.as_str()]);

        let err = c.add(&json!({"id": id, "title": "spoof", "popularity": 1}).to_string()).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::Validation { source: ValidationError::ReservedId(_), .. }
        ));
        assert_eq!(c.num_documents(), 2);
    }

    #[test]
    fn test_invalid_document_consumes_nothing() {
        let c = books();
        let err = c
            .add(r#"{"id": "bad", "title": "rejected zebra", "popularity": "high"}"#)
            .unwrap_err();
        match err {
            CollectionError::Validation { doc_id, source } => {
                assert_eq!(doc_id.as_deref(), Some("bad"));
                assert!(matches!(source, ValidationError::TypeMismatch { ref field, .. } if field == "popularity"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(c.next_seq_id(), 0);
        assert!(c.get("bad").unwrap().is_none());

        add(&c, "good", "plain words", 1);
        let options = SearchOptions::default().typos(1);
        for query in ["rejected", "zebra", "rejected zebra"] {
            let result = c.search(query, &["title"], &options).unwrap();
            assert_eq!(result.num_found, 0, "query {query}");
            assert!(result.hits.is_empty());
        }
        assert_eq!(c.num_documents(), 1);
        assert_eq!(c.seq_id("good").unwrap(), Some(0));
    }

    #[test]
    fn test_query_validation() {
        let c = books();
        let options = SearchOptions::default();
        assert!(matches!(c.search("x", &[], &options), Err(CollectionError::Query(QueryError::NoFields))));
        assert!(matches!(
            c.search("x", &["nope"], &options),
            Err(CollectionError::Query(QueryError::UnknownField(_)))
        ));
        assert!(matches!(
            c.search("x", &["title"], &options.clone().typos(3)),
            Err(CollectionError::Query(QueryError::TooManyTypos { requested: 3, max: 2 }))
        ));
        let long_query = vec!["word"; 21].join(" ");
        assert!(matches!(
            c.search(&long_query, &["title"], &options),
            Err(CollectionError::Query(QueryError::TooManyTokens { count: 21, .. }))
        ));
    }

    #[test]
    fn test_empty_query_has_no_hits() {
        let c = books();
        add(&c, "a", "something", 1);
        let result = c.search("  ,, ", &["title"], &SearchOptions::default()).unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.num_found, 0);
    }

    #[test]
    fn test_multi_field_merge() {
        let config = CollectionConfig::new("posts")
            .field(Field::string("title"))
            .field(Field::string("body"));
        let c = Collection::open(config, Arc::new(Database::open_in_memory().unwrap())).unwrap();
        c.add(r#"{"id": "1", "title": "rust tips", "body": "nothing here"}"#).unwrap();
        c.add(r#"{"id": "2", "title": "cooking", "body": "rust removal from pans"}"#).unwrap();
        c.add(r#"{"id": "3", "title": "rust", "body": "rust everywhere"}"#).unwrap();

        let result = c.search("rust", &["title", "body"], &SearchOptions::default()).unwrap();
        assert_eq!(result.ids(), vec!["1", "3", "2"]);
        assert_eq!(result.num_found, 3);

        let result = c.search("rust", &["body", "title"], &SearchOptions::default()).unwrap();
        assert_eq!(result.ids(), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_num_results_limits_hits_not_found() {
        let c = books();
        for i in 0..5 {
            add(&c, &format!("d{i}"), "shared", i);
        }
        let result = c.search("shared", &["title"], &SearchOptions::default().results(2)).unwrap();
        assert_eq!(result.ids(), vec!["d4", "d3"]);
        assert!(result.num_found >= 2);
    }

    #[test]
    fn test_int32_field_search_and_range() {
        let c = books();
        add(&c, "a", "one", 10);
        add(&c, "b", "two", -3);
        add(&c, "c", "three", 42);

        let exact = c.search("42", &["popularity"], &SearchOptions::default()).unwrap();
        assert_eq!(exact.ids(), vec!["c"]);

        let range = c.search_range("popularity", -5..=10, 10).unwrap();
        assert_eq!(range.ids(), vec!["a", "b"]);
        assert_eq!(range.num_found, 2);

        assert!(matches!(
            c.search_range("title", 0..=1, 10),
            Err(CollectionError::Query(QueryError::WrongFieldType { .. }))
        ));
    }

    #[test]
    fn test_reopen_rebuilds_state() {
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        let config = CollectionConfig::new("books")
            .field(Field::string("title"))
            .field(Field::int32("popularity"))
            .rank_field("popularity");
        {
            let c = Collection::open(config.clone(), store.clone()).unwrap();
            c.add(r#"{"id": "a", "title": "persistent fox", "popularity": 1}"#).unwrap();
            c.add(r#"{"id": "b", "title": "gone", "popularity": 1}"#).unwrap();
            c.remove("b").unwrap();
        }
        let c = Collection::open(config, store).unwrap();
        assert_eq!(c.num_documents(), 1);
        assert_eq!(c.next_seq_id(), 2);
        let result = c.search("fox", &["title"], &SearchOptions::default()).unwrap();
        assert_eq!(result.ids(), vec!["a"]);
    }
}

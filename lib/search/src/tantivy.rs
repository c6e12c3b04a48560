use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::Value as TantivyValue;
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::error::SearchError;
use crate::traits::{SearchEngine, SearchHit, SearchPage};

/// Per-collection index state.
struct CollectionIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    id_field: Field,
    body_field: Field,
}

/// TantivyEngine is a SearchEngine implementation backed by Tantivy.
///
/// Each collection gets its own Tantivy index in a subdirectory.
/// Documents have two fields:
/// - `_id` (STRING | STORED): exact-match document ID, untokenized
/// - `_body` (TEXT): concatenated field values for full-text search
///
/// Original field values are never read back from the index — callers
/// re-fetch records from the authoritative store by ID.
pub struct TantivyEngine {
    base_dir: std::path::PathBuf,
    collections: RwLock<HashMap<String, CollectionIndex>>,
}

impl TantivyEngine {
    /// Create a new TantivyEngine with indexes stored under `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, SearchError> {
        std::fs::create_dir_all(base_dir).map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Get or create a collection index.
    fn get_or_create_collection(&self, collection: &str) -> Result<(), SearchError> {
        // Fast path: already exists.
        {
            let collections = self.collections.read().unwrap();
            if collections.contains_key(collection) {
                return Ok(());
            }
        }

        // Slow path: create.
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(collection) {
            return Ok(());
        }

        let col_dir = self.base_dir.join(collection);
        std::fs::create_dir_all(&col_dir).map_err(|e| SearchError::Index(e.to_string()))?;

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("_id", STRING | STORED);
        let body_field = schema_builder.add_text_field("_body", TEXT);
        let schema = schema_builder.build();

        let dir = tantivy::directory::MmapDirectory::open(&col_dir)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let index = Index::open_or_create(dir, schema)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let writer = index
            .writer(15_000_000) // 15 MB heap
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| SearchError::Index(e.to_string()))?;

        collections.insert(
            collection.to_string(),
            CollectionIndex {
                index,
                reader,
                writer: RwLock::new(writer),
                id_field,
                body_field,
            },
        );

        Ok(())
    }
}

impl SearchEngine for TantivyEngine {
    fn index(
        &self,
        collection: &str,
        id: &str,
        doc_fields: HashMap<String, String>,
    ) -> Result<(), SearchError> {
        self.get_or_create_collection(collection)?;

        let collections = self.collections.read().unwrap();
        let col = collections
            .get(collection)
            .ok_or_else(|| SearchError::Index("collection not found".into()))?;

        // _body: concatenated field values only (no keys polluting the index).
        let mut values: Vec<String> = doc_fields.into_values().collect();
        values.sort(); // stable body text regardless of map iteration order
        let body_text = values.join(" ");

        let mut writer = col.writer.write().unwrap();

        // Delete existing document with same ID (upsert).
        let term = tantivy::Term::from_field_text(col.id_field, id);
        writer.delete_term(term);

        writer
            .add_document(doc!(
                col.id_field => id,
                col.body_field => body_text,
            ))
            .map_err(|e| SearchError::Index(e.to_string()))?;

        writer
            .commit()
            .map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError> {
        self.get_or_create_collection(collection)?;

        let collections = self.collections.read().unwrap();
        let col = collections
            .get(collection)
            .ok_or_else(|| SearchError::Index("collection not found".into()))?;

        let mut writer = col.writer.write().unwrap();
        let term = tantivy::Term::from_field_text(col.id_field, id);
        writer.delete_term(term);
        writer
            .commit()
            .map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError> {
        self.get_or_create_collection(collection)?;

        let collections = self.collections.read().unwrap();
        let col = collections
            .get(collection)
            .ok_or_else(|| SearchError::Index("collection not found".into()))?;

        // Reload the reader to pick up latest commits (read-your-own-write
        // on the synchronous write path).
        col.reader
            .reload()
            .map_err(|e| SearchError::Query(e.to_string()))?;

        let searcher = col.reader.searcher();
        // Only search the _body field. _id is STRING (untokenized) and
        // not suitable for full-text queries.
        let query_parser = QueryParser::for_index(&col.index, vec![col.body_field]);

        let parsed = query_parser
            .parse_query(query)
            .map_err(|e| SearchError::Query(e.to_string()))?;

        if limit == 0 {
            let total = searcher
                .search(&parsed, &Count)
                .map_err(|e| SearchError::Query(e.to_string()))?;
            return Ok(SearchPage { hits: Vec::new(), total });
        }

        let (top_docs, total) = searcher
            .search(&parsed, &(TopDocs::with_limit(limit).and_offset(offset), Count))
            .map_err(|e| SearchError::Query(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, doc_addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_addr)
                .map_err(|e| SearchError::Query(e.to_string()))?;

            let id = doc
                .get_first(col.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            hits.push(SearchHit { id, score });
        }

        Ok(SearchPage { hits, total })
    }
}

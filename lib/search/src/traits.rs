use std::collections::HashMap;

use crate::error::SearchError;

/// A single search hit: document ID plus relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// One page of ranked hits plus the total number of matches across
/// all pages.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total: usize,
}

/// SearchEngine provides full-text search over indexed documents.
///
/// Documents are organized by collection, one collection per record
/// type (e.g. "post"). Each document has an ID — the record's primary
/// identifier in the authoritative store — and a set of string fields
/// that are indexed. The engine is a derived cache: every document
/// must be reproducible from the record store.
pub trait SearchEngine: Send + Sync {
    /// Index a document. If a document with the same ID already exists
    /// in the collection, it is replaced (last-write-wins).
    fn index(
        &self,
        collection: &str,
        id: &str,
        doc: HashMap<String, String>,
    ) -> Result<(), SearchError>;

    /// Delete a document by ID from a collection. Deleting a document
    /// that does not exist is not an error.
    fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError>;

    /// Search a collection with a query string. Returns up to `limit`
    /// hits starting at `offset`, ordered by relevance score (highest
    /// first), plus the total match count.
    fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError>;
}

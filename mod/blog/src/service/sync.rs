//! Search index synchronizer.
//!
//! Store mutations collect their searchable-record changes into a
//! [`Changeset`] while they execute; once the store write has committed,
//! [`BlogService::replay`] mirrors the changeset into the search index.
//!
//! The index is a soft cache of the store: a missing engine or a failed
//! engine call is logged and dropped, never retried, and never rolls
//! back the committed store write. Drift introduced this way is repaired
//! with [`BlogService::reindex`].

use std::collections::HashMap;

use tracing::{debug, warn};

use microblog_sql::Value;

use crate::service::{BlogError, BlogService};

/// Capability marker for record types that are mirrored into the
/// search index.
pub trait Searchable {
    /// Collection name in the index; by convention the store table name.
    const INDEX: &'static str;

    /// Primary identifier shared between store and index.
    fn search_id(&self) -> i64;

    /// The declared searchable fields and their current values.
    fn search_fields(&self) -> HashMap<String, String>;
}

/// A document projection snapshotted from a searchable record.
#[derive(Debug, Clone)]
pub struct Document {
    pub index: &'static str,
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Reference to a document scheduled for deletion.
#[derive(Debug, Clone)]
pub struct DocRef {
    pub index: &'static str,
    pub id: String,
}

/// The set of searchable-record changes made by one store operation,
/// snapshotted before the operation returns and replayed after its
/// writes have committed.
#[derive(Debug, Default)]
pub struct Changeset {
    pub inserted: Vec<Document>,
    pub updated: Vec<Document>,
    pub deleted: Vec<DocRef>,
}

impl Changeset {
    pub fn record_insert<T: Searchable>(&mut self, record: &T) {
        self.inserted.push(Document {
            index: T::INDEX,
            id: record.search_id().to_string(),
            fields: record.search_fields(),
        });
    }

    pub fn record_update<T: Searchable>(&mut self, record: &T) {
        self.updated.push(Document {
            index: T::INDEX,
            id: record.search_id().to_string(),
            fields: record.search_fields(),
        });
    }

    pub fn record_delete<T: Searchable>(&mut self, record: &T) {
        self.deleted.push(DocRef {
            index: T::INDEX,
            id: record.search_id().to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

impl BlogService {
    /// Mirror a committed changeset into the search index.
    ///
    /// Runs synchronously on the caller's thread, one engine call per
    /// document. Every failure is logged and swallowed: the store write
    /// has already committed and must stay visible regardless of what
    /// the index does. Operations on distinct ids are order-insensitive;
    /// for the same id the last write wins.
    pub(crate) fn replay(&self, changeset: Changeset) {
        if changeset.is_empty() {
            return;
        }

        let Some(engine) = &self.search else {
            debug!(
                inserted = changeset.inserted.len(),
                updated = changeset.updated.len(),
                deleted = changeset.deleted.len(),
                "search index not configured; dropping changeset"
            );
            return;
        };

        for doc in changeset.inserted.iter().chain(changeset.updated.iter()) {
            if let Err(e) = engine.index(doc.index, &doc.id, doc.fields.clone()) {
                warn!(index = doc.index, id = %doc.id, error = %e, "index upsert failed; document dropped");
            }
        }

        for doc in &changeset.deleted {
            if let Err(e) = engine.delete(doc.index, &doc.id) {
                warn!(index = doc.index, id = %doc.id, error = %e, "index delete failed; document dropped");
            }
        }
    }

    /// Rebuild the post index from the store, e.g. after enabling the
    /// index for the first time or recovering from drift.
    ///
    /// Unlike the commit-path sync this is an explicit administrative
    /// operation, so a missing engine is an error. Per-document failures
    /// are logged and skipped. Returns the number of documents indexed.
    pub fn reindex(&self) -> Result<usize, BlogError> {
        use crate::model::Post;

        let Some(engine) = &self.search else {
            return Err(BlogError::Validation(
                "search index is not configured".into(),
            ));
        };

        let rows = self
            .sql
            .query(
                "SELECT id, body, timestamp, user_id, language FROM post ORDER BY id",
                &[] as &[Value],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let mut indexed = 0;
        for row in &rows {
            let post = Self::post_from_row(row)?;
            match engine.index(Post::INDEX, &post.search_id().to_string(), post.search_fields()) {
                Ok(()) => indexed += 1,
                Err(e) => {
                    warn!(id = post.id, error = %e, "reindex: document skipped");
                }
            }
        }

        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;
    use crate::service::testutil::*;
    use crate::service::BlogConfig;
    use microblog_search::{SearchEngine, SearchError, SearchPage};
    use microblog_sql::SqliteStore;
    use std::sync::Arc;

    /// Engine whose every operation fails, standing in for an
    /// unreachable index endpoint.
    struct DownEngine;

    impl SearchEngine for DownEngine {
        fn index(
            &self,
            _collection: &str,
            _id: &str,
            _doc: HashMap<String, String>,
        ) -> Result<(), SearchError> {
            Err(SearchError::Index("connection refused".into()))
        }

        fn delete(&self, _collection: &str, _id: &str) -> Result<(), SearchError> {
            Err(SearchError::Index("connection refused".into()))
        }

        fn search(
            &self,
            _collection: &str,
            _query: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<SearchPage, SearchError> {
            Err(SearchError::Query("connection refused".into()))
        }
    }

    fn down_engine_service() -> Arc<crate::service::BlogService> {
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        crate::service::BlogService::new(
            sql,
            Some(Arc::new(DownEngine)),
            Arc::new(LogMailer),
            BlogConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_is_visible_in_index() {
        let (svc, _dir) = indexed_service();
        let user = make_user(&svc, "alice");
        let post = svc.create_post(user.id, "tantivy makes search easy").unwrap();

        let (ids, total) = svc.query_index("post", "tantivy", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(ids, vec![post.id]);
    }

    #[test]
    fn test_delete_removes_from_index() {
        let (svc, _dir) = indexed_service();
        let user = make_user(&svc, "alice");
        let post = svc.create_post(user.id, "ephemeral thought").unwrap();

        svc.delete_post(post.id).unwrap();

        let (ids, total) = svc.query_index("post", "ephemeral", 1, 10);
        assert_eq!(total, 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn test_update_reindexes_body() {
        let (svc, _dir) = indexed_service();
        let user = make_user(&svc, "alice");
        let post = svc.create_post(user.id, "original wording").unwrap();

        svc.update_post(post.id, "revised wording").unwrap();

        let (_, total) = svc.query_index("post", "original", 1, 10);
        assert_eq!(total, 0);
        let (ids, total) = svc.query_index("post", "revised", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(ids, vec![post.id]);
    }

    #[test]
    fn test_upsert_idempotence() {
        let (svc, _dir) = indexed_service();
        let user = make_user(&svc, "alice");
        let post = svc.create_post(user.id, "idempotent body").unwrap();

        // Same document, same field values, indexed again.
        let engine = svc.search.as_ref().unwrap();
        engine
            .index("post", &post.id.to_string(), post.search_fields())
            .unwrap();

        let (ids, total) = svc.query_index("post", "idempotent", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(ids, vec![post.id]);
    }

    #[test]
    fn test_index_failure_never_blocks_store_write() {
        let svc = down_engine_service();
        let user = make_user(&svc, "alice");

        // Engine errors are swallowed; the post still commits.
        let post = svc.create_post(user.id, "written despite index outage").unwrap();
        assert_eq!(svc.get_post(post.id).unwrap().body, "written despite index outage");

        svc.delete_post(post.id).unwrap();
        assert!(svc.get_post(post.id).is_err());
    }

    #[test]
    fn test_reindex_matches_incremental() {
        // Build the same store state twice: once indexed incrementally,
        // once bulk-reindexed from scratch. Query results must agree.
        let (inc, _d1) = indexed_service();
        let user = make_user(&inc, "alice");
        for body in ["red balloon", "blue balloon", "green kite"] {
            inc.create_post(user.id, body).unwrap();
            tick();
        }

        let (bulk, _d2) = indexed_service();
        let user2 = make_user(&bulk, "alice");
        {
            // Write the posts while the engine is detached so the index
            // starts empty.
            let sql = bulk.sql.clone();
            let dark = crate::service::BlogService::new(
                sql,
                None,
                Arc::new(LogMailer),
                BlogConfig::default(),
            )
            .unwrap();
            for body in ["red balloon", "blue balloon", "green kite"] {
                dark.create_post(user2.id, body).unwrap();
                tick();
            }
        }

        let (_, before) = bulk.query_index("post", "balloon", 1, 10);
        assert_eq!(before, 0);

        assert_eq!(bulk.reindex().unwrap(), 3);

        let (inc_ids, inc_total) = inc.query_index("post", "balloon", 1, 10);
        let (bulk_ids, bulk_total) = bulk.query_index("post", "balloon", 1, 10);
        assert_eq!(inc_total, bulk_total);
        let sorted = |mut v: Vec<i64>| {
            v.sort();
            v
        };
        assert_eq!(sorted(inc_ids), sorted(bulk_ids));
    }

    #[test]
    fn test_reindex_requires_engine() {
        let svc = store_only_service();
        assert!(matches!(svc.reindex(), Err(BlogError::Validation(_))));
    }
}

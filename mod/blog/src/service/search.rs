//! Query façade: index-backed search with a degraded SQL fallback.
//!
//! Neither path raises past this module. The index being down, a query
//! it rejects, or a store hiccup during fallback all degrade to "no
//! results"; callers never see a search-specific error.

use std::collections::HashMap;

use tracing::warn;

use microblog_sql::Value;

use crate::model::Post;
use crate::service::{BlogError, BlogService};

/// The one record type the SQL fallback understands. Kept deliberately
/// narrow: fallback of any other type returns nothing.
const FALLBACK_TYPE: &str = "post";

impl BlogService {
    /// Resolve a free-text query against a record type. Returns one page
    /// of matching record ids in ranked order plus the total match count.
    ///
    /// `page` is 1-based. Prefers the search index; falls back to a
    /// case-insensitive substring match in the store (posts only,
    /// recency-ordered rather than relevance-ranked) when the index is
    /// absent or errors.
    pub fn query_index(
        &self,
        record_type: &str,
        query: &str,
        page: usize,
        page_size: usize,
    ) -> (Vec<i64>, usize) {
        let offset = page.saturating_sub(1).saturating_mul(page_size);

        if let Some(engine) = &self.search {
            match engine.search(record_type, query, page_size, offset) {
                Ok(result) => {
                    let ids = result
                        .hits
                        .iter()
                        .filter_map(|h| h.id.parse::<i64>().ok())
                        .collect();
                    return (ids, result.total);
                }
                Err(e) => {
                    warn!(record_type, query, error = %e, "index query failed; using fallback");
                }
            }
        }

        self.fallback_search(record_type, query, page_size, offset)
    }

    /// Degraded search directly against the record store. Substring
    /// match on `post.body`, case-insensitive, newest first.
    fn fallback_search(
        &self,
        record_type: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> (Vec<i64>, usize) {
        if record_type != FALLBACK_TYPE {
            return (Vec::new(), 0);
        }

        let pattern = format!("%{}%", escape_like(query));
        let params = [
            Value::Text(pattern.clone()),
            Value::Integer(crate::service::sql_bound(limit)),
            Value::Integer(crate::service::sql_bound(offset)),
        ];

        let total = match self.sql.query(
            "SELECT COUNT(*) AS cnt FROM post WHERE body LIKE ?1 ESCAPE '\\'",
            &params[..1],
        ) {
            Ok(rows) => rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize,
            Err(e) => {
                warn!(query, error = %e, "fallback search failed");
                return (Vec::new(), 0);
            }
        };

        let rows = match self.sql.query(
            "SELECT id FROM post WHERE body LIKE ?1 ESCAPE '\\'
             ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
            &params,
        ) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(query, error = %e, "fallback search failed");
                return (Vec::new(), 0);
            }
        };

        let ids = rows.iter().filter_map(|r| r.get_i64("id")).collect();
        (ids, total)
    }

    /// Search posts and return them in the rank order the search step
    /// produced. The store's natural key order is not authoritative for
    /// display, so fetched posts are re-ordered to match the ids.
    pub fn search_posts(&self, query: &str, page: usize, page_size: usize) -> (Vec<Post>, usize) {
        let (ids, total) = self.query_index(FALLBACK_TYPE, query, page, page_size);
        if total == 0 || ids.is_empty() {
            return (Vec::new(), total);
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT id, body, timestamp, user_id, language FROM post WHERE id IN ({})",
            placeholders.join(", ")
        );
        let params: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();

        let rows = match self.sql.query(&sql, &params) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(query, error = %e, "post fetch after search failed");
                return (Vec::new(), 0);
            }
        };

        let mut by_id: HashMap<i64, Post> = HashMap::new();
        for row in &rows {
            if let Ok(post) = Self::post_from_row(row) {
                by_id.insert(post.id, post);
            }
        }

        // Restore rank order; ids the store no longer has (index drift)
        // are silently skipped.
        let posts = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        (posts, total)
    }
}

/// Escape LIKE wildcards in user input so the query is a literal
/// substring match.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;
    use crate::service::testutil::*;
    use crate::service::BlogConfig;
    use microblog_search::{SearchEngine, SearchError, SearchHit, SearchPage};
    use microblog_sql::SqliteStore;
    use std::sync::Arc;

    #[test]
    fn test_fallback_substring_case_insensitive() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        svc.create_post(alice.id, "Hello World").unwrap();
        tick();
        svc.create_post(alice.id, "say hello twice").unwrap();
        tick();
        svc.create_post(alice.id, "unrelated").unwrap();

        let (ids, total) = svc.query_index("post", "HELLO", 1, 10);
        assert_eq!(total, 2);
        assert_eq!(ids.len(), 2);

        // Recency order: the newer hit first.
        let first = svc.get_post(ids[0]).unwrap();
        let second = svc.get_post(ids[1]).unwrap();
        assert_eq!(first.body, "say hello twice");
        assert_eq!(second.body, "Hello World");
    }

    #[test]
    fn test_fallback_pagination_page_two() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        for i in 0..12 {
            svc.create_post(alice.id, &format!("hello number {}", i)).unwrap();
            tick();
        }

        let (page1, total1) = svc.query_index("post", "hello", 1, 10);
        assert_eq!(total1, 12);
        assert_eq!(page1.len(), 10);

        let (page2, total2) = svc.query_index("post", "hello", 2, 10);
        assert_eq!(total2, 12);
        assert_eq!(page2.len(), 2);

        // Pages must not overlap, and page 2 holds the two oldest posts.
        for id in &page2 {
            assert!(!page1.contains(id));
        }
        let oldest = svc.get_post(page2[1]).unwrap();
        assert_eq!(oldest.body, "hello number 0");
    }

    #[test]
    fn test_huge_page_number_does_not_overflow() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        svc.create_post(alice.id, "hello there").unwrap();

        // Offset arithmetic must saturate, not wrap, for any page the
        // query string can carry.
        let (ids, total) = svc.query_index("post", "hello", usize::MAX, 10);
        assert!(ids.is_empty());
        assert_eq!(total, 1);
    }

    #[test]
    fn test_fallback_only_supports_posts() {
        let svc = store_only_service();
        make_user(&svc, "alice");

        let (ids, total) = svc.query_index("user", "alice", 1, 10);
        assert!(ids.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_fallback_escapes_wildcards() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        svc.create_post(alice.id, "100% organic").unwrap();
        svc.create_post(alice.id, "fully inorganic").unwrap();

        let (ids, total) = svc.query_index("post", "100%", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(svc.get_post(ids[0]).unwrap().body, "100% organic");

        // A literal '%' is not a wildcard: "1%c" must not match "1...c".
        let (_, total) = svc.query_index("post", "1%o", 1, 10);
        assert_eq!(total, 0);
    }

    #[test]
    fn test_search_posts_restores_rank_order() {
        // Stub engine that returns ids in an order deliberately
        // different from the store's key order.
        struct RiggedEngine;
        impl SearchEngine for RiggedEngine {
            fn index(
                &self,
                _c: &str,
                _id: &str,
                _d: HashMap<String, String>,
            ) -> Result<(), SearchError> {
                Ok(())
            }
            fn delete(&self, _c: &str, _id: &str) -> Result<(), SearchError> {
                Ok(())
            }
            fn search(
                &self,
                _c: &str,
                _q: &str,
                _limit: usize,
                _offset: usize,
            ) -> Result<SearchPage, SearchError> {
                Ok(SearchPage {
                    hits: vec![
                        SearchHit { id: "2".into(), score: 3.0 },
                        SearchHit { id: "3".into(), score: 2.0 },
                        SearchHit { id: "1".into(), score: 1.0 },
                    ],
                    total: 3,
                })
            }
        }

        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = crate::service::BlogService::new(
            sql,
            Some(Arc::new(RiggedEngine)),
            Arc::new(LogMailer),
            BlogConfig::default(),
        )
        .unwrap();
        let alice = make_user(&svc, "alice");
        svc.create_post(alice.id, "post one").unwrap();
        svc.create_post(alice.id, "post two").unwrap();
        svc.create_post(alice.id, "post three").unwrap();

        let (posts, total) = svc.search_posts("anything", 1, 10);
        assert_eq!(total, 3);
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_engine_error_falls_back() {
        struct DownEngine;
        impl SearchEngine for DownEngine {
            fn index(
                &self,
                _c: &str,
                _id: &str,
                _d: HashMap<String, String>,
            ) -> Result<(), SearchError> {
                Err(SearchError::Index("down".into()))
            }
            fn delete(&self, _c: &str, _id: &str) -> Result<(), SearchError> {
                Err(SearchError::Index("down".into()))
            }
            fn search(
                &self,
                _c: &str,
                _q: &str,
                _limit: usize,
                _offset: usize,
            ) -> Result<SearchPage, SearchError> {
                Err(SearchError::Query("down".into()))
            }
        }

        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = crate::service::BlogService::new(
            sql,
            Some(Arc::new(DownEngine)),
            Arc::new(LogMailer),
            BlogConfig::default(),
        )
        .unwrap();
        let alice = make_user(&svc, "alice");
        svc.create_post(alice.id, "resilient hello").unwrap();

        // The engine rejects the query; fallback still finds the post.
        let (ids, total) = svc.query_index("post", "hello", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(ids.len(), 1);

        // And a non-post type degrades to empty rather than erroring.
        let (ids, total) = svc.query_index("user", "alice", 1, 10);
        assert!(ids.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_zero_total_short_circuits() {
        let (svc, _dir) = indexed_service();
        let (posts, total) = svc.search_posts("nothing-matches-this", 1, 10);
        assert!(posts.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_index_backed_search_end_to_end() {
        let (svc, _dir) = indexed_service();
        let alice = make_user(&svc, "alice");
        let p1 = svc.create_post(alice.id, "rust is delightful").unwrap();
        svc.create_post(alice.id, "python is fine too").unwrap();

        let (posts, total) = svc.search_posts("delightful", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(posts[0].id, p1.id);
    }
}

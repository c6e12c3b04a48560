use microblog_core::{now_utc, ListResult};
use microblog_sql::Value;

use crate::model::Post;
use crate::service::sync::Changeset;
use crate::service::{sql_bound, BlogError, BlogService};

/// Best-effort language detection for a post body. Returns None when
/// the text is too short or ambiguous for a reliable guess.
pub(crate) fn detect_language(body: &str) -> Option<String> {
    whatlang::detect(body)
        .filter(|info| info.is_reliable())
        .map(|info| info.lang().code().to_string())
}

impl BlogService {
    /// Create a post and mirror it into the search index.
    pub fn create_post(&self, user_id: i64, body: &str) -> Result<Post, BlogError> {
        self.validate_body(body)?;
        // Author must exist.
        self.get_user(user_id)?;

        let post = Post {
            id: 0, // assigned by the store below
            body: body.to_string(),
            timestamp: now_utc(),
            user_id,
            language: detect_language(body),
        };

        let id = self
            .sql
            .insert(
                "INSERT INTO post (body, timestamp, user_id, language) VALUES (?1, ?2, ?3, ?4)",
                &[
                    Value::Text(post.body.clone()),
                    Value::Text(post.timestamp.clone()),
                    Value::Integer(user_id),
                    match &post.language {
                        Some(l) => Value::Text(l.clone()),
                        None => Value::Null,
                    },
                ],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let post = Post { id, ..post };

        let mut changeset = Changeset::default();
        changeset.record_insert(&post);
        self.replay(changeset);

        Ok(post)
    }

    /// Edit a post body. The language is re-detected and the index
    /// document is upserted with the new field values.
    pub fn update_post(&self, id: i64, body: &str) -> Result<Post, BlogError> {
        self.validate_body(body)?;
        let mut post = self.get_post(id)?;

        post.body = body.to_string();
        post.language = detect_language(body);

        self.sql
            .exec(
                "UPDATE post SET body = ?1, language = ?2 WHERE id = ?3",
                &[
                    Value::Text(post.body.clone()),
                    match &post.language {
                        Some(l) => Value::Text(l.clone()),
                        None => Value::Null,
                    },
                    Value::Integer(id),
                ],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let mut changeset = Changeset::default();
        changeset.record_update(&post);
        self.replay(changeset);

        Ok(post)
    }

    /// Delete a post and remove its index document.
    pub fn delete_post(&self, id: i64) -> Result<(), BlogError> {
        let post = self.get_post(id)?;

        let affected = self
            .sql
            .exec("DELETE FROM post WHERE id = ?1", &[Value::Integer(id)])
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(BlogError::NotFound(format!("post {}", id)));
        }

        let mut changeset = Changeset::default();
        changeset.record_delete(&post);
        self.replay(changeset);

        Ok(())
    }

    /// Get a post by id.
    pub fn get_post(&self, id: i64) -> Result<Post, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT id, body, timestamp, user_id, language FROM post WHERE id = ?1",
                &[Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| BlogError::NotFound(format!("post {}", id)))?;
        Self::post_from_row(row)
    }

    /// Posts authored by the user or by anyone the user follows,
    /// deduplicated, newest first. A post reachable through both join
    /// paths collapses via GROUP BY. Timestamp ties have unspecified
    /// relative order.
    pub fn timeline(&self, user_id: i64, limit: usize, offset: usize) -> Result<Vec<Post>, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT p.id, p.body, p.timestamp, p.user_id, p.language
                 FROM post p
                 JOIN user u ON u.id = p.user_id
                 LEFT JOIN followers f ON f.followed_id = u.id
                 WHERE f.follower_id = ?1 OR u.id = ?1
                 GROUP BY p.id
                 ORDER BY p.timestamp DESC
                 LIMIT ?2 OFFSET ?3",
                &[
                    Value::Integer(user_id),
                    Value::Integer(sql_bound(limit)),
                    Value::Integer(sql_bound(offset)),
                ],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        rows.iter().map(Self::post_from_row).collect()
    }

    /// All posts, newest first, with a total count.
    pub fn explore(&self, limit: usize, offset: usize) -> Result<ListResult<Post>, BlogError> {
        let total = self.count_posts("SELECT COUNT(*) AS cnt FROM post", &[])?;
        let rows = self
            .sql
            .query(
                "SELECT id, body, timestamp, user_id, language FROM post
                 ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2",
                &[Value::Integer(sql_bound(limit)), Value::Integer(sql_bound(offset))],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let items = rows.iter().map(Self::post_from_row).collect::<Result<_, _>>()?;
        Ok(ListResult { items, total })
    }

    /// One author's posts, newest first, with a total count.
    pub fn user_posts(
        &self,
        user_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<ListResult<Post>, BlogError> {
        let total = self.count_posts(
            "SELECT COUNT(*) AS cnt FROM post WHERE user_id = ?1",
            &[Value::Integer(user_id)],
        )?;
        let rows = self
            .sql
            .query(
                "SELECT id, body, timestamp, user_id, language FROM post
                 WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                &[
                    Value::Integer(user_id),
                    Value::Integer(sql_bound(limit)),
                    Value::Integer(sql_bound(offset)),
                ],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let items = rows.iter().map(Self::post_from_row).collect::<Result<_, _>>()?;
        Ok(ListResult { items, total })
    }

    fn count_posts(&self, sql: &str, params: &[Value]) -> Result<usize, BlogError> {
        let rows = self
            .sql
            .query(sql, params)
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize)
    }

    fn validate_body(&self, body: &str) -> Result<(), BlogError> {
        if body.trim().is_empty() {
            return Err(BlogError::Validation("post body must not be empty".into()));
        }
        let len = body.chars().count();
        if len > self.config.max_post_len {
            return Err(BlogError::Validation(format!(
                "post body exceeds {} characters ({})",
                self.config.max_post_len, len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testutil::*;

    #[test]
    fn test_post_crud() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");

        let post = svc.create_post(alice.id, "first!").unwrap();
        assert!(post.id > 0);
        assert_eq!(post.user_id, alice.id);

        let fetched = svc.get_post(post.id).unwrap();
        assert_eq!(fetched.body, "first!");

        let updated = svc.update_post(post.id, "edited").unwrap();
        assert_eq!(updated.body, "edited");
        assert_eq!(svc.get_post(post.id).unwrap().body, "edited");

        svc.delete_post(post.id).unwrap();
        assert!(svc.get_post(post.id).is_err());
    }

    #[test]
    fn test_body_bounds() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");

        assert!(matches!(
            svc.create_post(alice.id, "   "),
            Err(BlogError::Validation(_))
        ));
        let long = "x".repeat(141);
        assert!(matches!(
            svc.create_post(alice.id, &long),
            Err(BlogError::Validation(_))
        ));
        // Exactly at the bound is fine.
        let max = "x".repeat(140);
        assert!(svc.create_post(alice.id, &max).is_ok());
    }

    #[test]
    fn test_language_detection_best_effort() {
        assert_eq!(
            detect_language(
                "The quick brown fox jumps over the lazy dog while the rest of the world keeps scrolling through their timelines"
            )
            .as_deref(),
            Some("eng")
        );
        // Too short / ambiguous: no tag rather than a bad guess.
        assert_eq!(detect_language("ok"), None);
    }

    #[test]
    fn test_timeline_own_posts_newest_first() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");

        for body in ["one", "two", "three"] {
            svc.create_post(alice.id, body).unwrap();
            tick();
        }

        let feed = svc.timeline(alice.id, 50, 0).unwrap();
        let bodies: Vec<&str> = feed.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["three", "two", "one"]);
    }

    #[test]
    fn test_timeline_merges_followed_users() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        let bob = make_user(&svc, "bob");

        svc.create_post(alice.id, "a1").unwrap();
        tick();
        svc.create_post(bob.id, "b1").unwrap();
        tick();
        svc.create_post(alice.id, "a2").unwrap();
        tick();
        svc.create_post(bob.id, "b2").unwrap();
        tick();
        svc.create_post(alice.id, "a3").unwrap();

        // Before following: only alice's own 3 posts.
        let feed = svc.timeline(alice.id, 50, 0).unwrap();
        let bodies: Vec<&str> = feed.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["a3", "a2", "a1"]);

        // After following bob: 5 posts merged, strictly time-ordered.
        svc.follow(alice.id, bob.id).unwrap();
        let feed = svc.timeline(alice.id, 50, 0).unwrap();
        let bodies: Vec<&str> = feed.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["a3", "b2", "a2", "b1", "a1"]);

        // No duplicates even though alice's own posts could match both
        // join paths if she followed herself through data corruption.
        let ids: std::collections::HashSet<i64> = feed.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), feed.len());
    }

    #[test]
    fn test_timeline_excludes_strangers() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        let mallory = make_user(&svc, "mallory");

        svc.create_post(mallory.id, "unrelated").unwrap();
        let feed = svc.timeline(alice.id, 50, 0).unwrap();
        assert!(feed.is_empty());
    }

    #[test]
    fn test_explore_and_user_posts_pagination() {
        let svc = store_only_service();
        let alice = make_user(&svc, "alice");
        for i in 0..7 {
            svc.create_post(alice.id, &format!("post {}", i)).unwrap();
            tick();
        }

        let page1 = svc.explore(3, 0).unwrap();
        assert_eq!(page1.total, 7);
        assert_eq!(page1.items.len(), 3);
        assert_eq!(page1.items[0].body, "post 6");

        let page3 = svc.explore(3, 6).unwrap();
        assert_eq!(page3.items.len(), 1);
        assert_eq!(page3.items[0].body, "post 0");

        let mine = svc.user_posts(alice.id, 10, 0).unwrap();
        assert_eq!(mine.total, 7);
        assert_eq!(mine.items.len(), 7);
    }
}

use microblog_sql::Value;

use crate::service::{BlogError, BlogService};

impl BlogService {
    /// Make `follower_id` follow `followed_id`. Following someone twice
    /// is a no-op; following yourself is rejected.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<(), BlogError> {
        if follower_id == followed_id {
            return Err(BlogError::Validation("you cannot follow yourself".into()));
        }
        // Both ends must exist; FK enforcement would catch this too but
        // a NotFound reads better than a constraint message.
        self.get_user(followed_id)?;
        self.get_user(follower_id)?;

        self.sql
            .exec(
                "INSERT OR IGNORE INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
                &[Value::Integer(follower_id), Value::Integer(followed_id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Remove a follow edge. Unfollowing someone you do not follow is a
    /// no-op.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<(), BlogError> {
        if follower_id == followed_id {
            return Err(BlogError::Validation("you cannot unfollow yourself".into()));
        }
        self.sql
            .exec(
                "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                &[Value::Integer(follower_id), Value::Integer(followed_id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Whether `follower_id` follows `followed_id`.
    pub fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT 1 AS hit FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                &[Value::Integer(follower_id), Value::Integer(followed_id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        Ok(!rows.is_empty())
    }

    /// Number of users following `user_id`.
    pub fn followers_count(&self, user_id: i64) -> Result<usize, BlogError> {
        self.count_edges("followed_id", user_id)
    }

    /// Number of users `user_id` follows.
    pub fn following_count(&self, user_id: i64) -> Result<usize, BlogError> {
        self.count_edges("follower_id", user_id)
    }

    fn count_edges(&self, column: &str, user_id: i64) -> Result<usize, BlogError> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM followers WHERE {} = ?1",
            column
        );
        let rows = self
            .sql
            .query(&sql, &[Value::Integer(user_id)])
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize)
    }
}

pub mod follow;
pub mod post;
pub mod schema;
pub mod search;
pub mod sync;
pub mod user;

use std::sync::Arc;

use thiserror::Error;

use microblog_search::SearchEngine;
use microblog_sql::{Row, SQLStore};

use crate::mailer::Mailer;
use crate::model::{Post, User};

/// Clamp a usize to the i64 range for LIMIT/OFFSET binding. SQLite
/// treats a negative OFFSET as zero, so a plain `as i64` cast would
/// turn a huge offset into "no offset".
pub(crate) fn sql_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Blog service error type.
#[derive(Debug, Error)]
pub enum BlogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<BlogError> for microblog_core::ServiceError {
    fn from(e: BlogError) -> Self {
        match e {
            BlogError::NotFound(m) => microblog_core::ServiceError::NotFound(m),
            BlogError::Conflict(m) => microblog_core::ServiceError::Conflict(m),
            BlogError::Validation(m) => microblog_core::ServiceError::Validation(m),
            BlogError::Unauthorized(m) => microblog_core::ServiceError::Unauthorized(m),
            BlogError::Storage(m) => microblog_core::ServiceError::Storage(m),
            BlogError::Internal(m) => microblog_core::ServiceError::Internal(m),
        }
    }
}

/// Configuration for the blog service.
#[derive(Debug, Clone)]
pub struct BlogConfig {
    /// JWT signing secret (login + password-reset tokens).
    pub jwt_secret: String,
    /// Login token lifetime in seconds (default: 24h).
    pub login_token_ttl: i64,
    /// Password-reset token lifetime in seconds (default: 10 min).
    pub reset_token_ttl: i64,
    /// Maximum post body length in characters.
    pub max_post_len: usize,
    /// Default page size for feeds and search.
    pub page_size: usize,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "microblog-dev-secret-change-me".to_string(),
            login_token_ttl: 86400, // 24h
            reset_token_ttl: 600,   // 10 min
            max_post_len: 140,
            page_size: 25,
        }
    }
}

/// The blog service. Holds storage backends and configuration.
///
/// `search` is optional: when absent the service runs store-only and
/// search queries degrade to the SQL fallback path.
pub struct BlogService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) search: Option<Arc<dyn SearchEngine>>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) config: BlogConfig,
}

impl BlogService {
    /// Create a new BlogService, initializing the DB schema.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        search: Option<Arc<dyn SearchEngine>>,
        mailer: Arc<dyn Mailer>,
        config: BlogConfig,
    ) -> Result<Arc<Self>, BlogError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Arc::new(Self {
            sql,
            search,
            mailer,
            config,
        }))
    }

    /// Resolve a caller-supplied page size against the configured
    /// default. API handlers route all pagination defaults through
    /// here so `BlogConfig::page_size` is authoritative.
    pub fn page_size_or(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.page_size)
    }

    // ── Row mapping helpers ──

    pub(crate) fn user_from_row(row: &Row) -> Result<User, BlogError> {
        Ok(User {
            id: row
                .get_i64("id")
                .ok_or_else(|| BlogError::Internal("user row missing id".into()))?,
            username: row
                .get_str("username")
                .ok_or_else(|| BlogError::Internal("user row missing username".into()))?
                .to_string(),
            email: row
                .get_str("email")
                .ok_or_else(|| BlogError::Internal("user row missing email".into()))?
                .to_string(),
            about_me: row.get_str("about_me").map(|s| s.to_string()),
            last_seen: row.get_str("last_seen").map(|s| s.to_string()),
        })
    }

    pub(crate) fn post_from_row(row: &Row) -> Result<Post, BlogError> {
        Ok(Post {
            id: row
                .get_i64("id")
                .ok_or_else(|| BlogError::Internal("post row missing id".into()))?,
            body: row
                .get_str("body")
                .ok_or_else(|| BlogError::Internal("post row missing body".into()))?
                .to_string(),
            timestamp: row
                .get_str("timestamp")
                .ok_or_else(|| BlogError::Internal("post row missing timestamp".into()))?
                .to_string(),
            user_id: row
                .get_i64("user_id")
                .ok_or_else(|| BlogError::Internal("post row missing user_id".into()))?,
            language: row.get_str("language").map(|s| s.to_string()),
        })
    }
}


#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::mailer::LogMailer;
    use crate::model::CreateUser;
    use microblog_search::TantivyEngine;
    use microblog_sql::SqliteStore;

    /// Service with no search engine configured (fallback-only).
    pub(crate) fn store_only_service() -> Arc<BlogService> {
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        BlogService::new(sql, None, Arc::new(LogMailer), BlogConfig::default()).unwrap()
    }

    /// Service backed by a tantivy index in a temp dir. The TempDir must
    /// outlive the service.
    pub(crate) fn indexed_service() -> (Arc<BlogService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = Arc::new(TantivyEngine::open(dir.path()).unwrap());
        let svc = BlogService::new(
            sql,
            Some(engine),
            Arc::new(LogMailer),
            BlogConfig::default(),
        )
        .unwrap();
        (svc, dir)
    }

    pub(crate) fn make_user(svc: &BlogService, username: &str) -> User {
        svc.create_user(CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "hunter2!".to_string(),
        })
        .unwrap()
    }

    /// Timestamps carry microsecond precision; a short sleep keeps
    /// consecutive posts strictly ordered in tests.
    pub(crate) fn tick() {
        std::thread::sleep(std::time::Duration::from_millis(3));
    }
}

use microblog_sql::SQLStore;

use crate::service::BlogError;

/// Initialize the SQLite schema for all blog resources.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), BlogError> {
    let statements = [
        // Users: identity + credentials + profile
        "CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            about_me TEXT,
            last_seen TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_user_username ON user(username)",
        "CREATE INDEX IF NOT EXISTS idx_user_email ON user(email)",

        // Posts: short text updates, one author each
        "CREATE TABLE IF NOT EXISTS post (
            id INTEGER PRIMARY KEY,
            body TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            language TEXT,
            FOREIGN KEY (user_id) REFERENCES user(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_post_timestamp ON post(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_post_user ON post(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_post_language ON post(language)",

        // Follow edges: pure join records. Self-follow is representable
        // here; the service rejects it.
        "CREATE TABLE IF NOT EXISTS followers (
            follower_id INTEGER NOT NULL,
            followed_id INTEGER NOT NULL,
            PRIMARY KEY (follower_id, followed_id),
            FOREIGN KEY (follower_id) REFERENCES user(id),
            FOREIGN KEY (followed_id) REFERENCES user(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_followers_followed ON followers(followed_id)",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])
            .map_err(|e| BlogError::Storage(e.to_string()))?;
    }

    Ok(())
}

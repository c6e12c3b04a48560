use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::service::sync::Searchable;

/// A short text update. The only searchable record type: `body` is the
/// one indexed field.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Row id in the `post` table; doubles as the search document id.
    pub id: i64,

    /// Post text, bounded length.
    pub body: String,

    /// RFC 3339 creation timestamp. Feeds all recency ordering.
    pub timestamp: String,

    /// Author's user id.
    pub user_id: i64,

    /// Best-effort detected language tag; None when detection was
    /// unreliable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Searchable for Post {
    const INDEX: &'static str = "post";

    fn search_id(&self) -> i64 {
        self.id
    }

    fn search_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("body".to_string(), self.body.clone());
        fields
    }
}

/// Input for creating a new post.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePost {
    /// Author's username.
    pub author: String,
    pub body: String,
}

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// A registered user. The credential hash lives in the `user` table but
/// is never serialized out of the service layer.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Row id in the `user` table.
    pub id: i64,

    /// Unique handle.
    pub username: String,

    /// Unique email address.
    pub email: String,

    /// Short profile text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,

    /// RFC 3339 timestamp of the user's last request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

impl User {
    /// Gravatar URL for this user's email, `size` pixels square.
    /// Gravatar keys avatars on the md5 of the trimmed, lowercased
    /// address; unknown addresses render a generated identicon.
    pub fn avatar_url(&self, size: u32) -> String {
        let digest = Md5::digest(self.email.trim().to_lowercase().as_bytes());
        format!(
            "https://www.gravatar.com/avatar/{:x}?d=identicon&s={}",
            digest, size
        )
    }
}

/// Input for registering a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
}


/// Partial profile update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
}

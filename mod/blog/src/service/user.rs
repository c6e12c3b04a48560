use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;

use microblog_core::now_utc;
use microblog_sql::Value;

use crate::mailer;
use crate::model::{CreateUser, UpdateProfile, User};
use crate::service::sync::Changeset;
use crate::service::{BlogError, BlogService};

/// Claims for password-reset tokens. The claim name matches the
/// token's single purpose so a login token can never pass as one.
#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    reset_password: i64,
    exp: i64,
}

/// Hash a plain password with argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, BlogError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| BlogError::Internal(e.to_string()))
}

/// Verify a password against an argon2id hash.
pub(crate) fn check_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

impl BlogService {
    /// Register a new user.
    pub fn create_user(&self, input: CreateUser) -> Result<User, BlogError> {
        if input.username.trim().is_empty() {
            return Err(BlogError::Validation("username must not be empty".into()));
        }
        if !input.email.contains('@') {
            return Err(BlogError::Validation("email address is invalid".into()));
        }
        if input.password.is_empty() {
            return Err(BlogError::Validation("password must not be empty".into()));
        }

        let password_hash = hash_password(&input.password)?;
        let now = now_utc();

        let id = self
            .sql
            .insert(
                "INSERT INTO user (username, email, password_hash, last_seen)
                 VALUES (?1, ?2, ?3, ?4)",
                &[
                    Value::Text(input.username.clone()),
                    Value::Text(input.email.clone()),
                    Value::Text(password_hash),
                    Value::Text(now.clone()),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    BlogError::Conflict(format!(
                        "username or email already taken: {}",
                        input.username
                    ))
                } else {
                    BlogError::Storage(msg)
                }
            })?;

        Ok(User {
            id,
            username: input.username,
            email: input.email,
            about_me: None,
            last_seen: Some(now),
        })
    }

    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> Result<User, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT id, username, email, about_me, last_seen FROM user WHERE id = ?1",
                &[Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| BlogError::NotFound(format!("user {}", id)))?;
        Self::user_from_row(row)
    }

    /// Get a user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<User, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT id, username, email, about_me, last_seen FROM user WHERE username = ?1",
                &[Value::Text(username.to_string())],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| BlogError::NotFound(format!("user '{}'", username)))?;
        Self::user_from_row(row)
    }

    /// Update profile fields. Absent fields keep their current value.
    pub fn update_profile(&self, id: i64, patch: UpdateProfile) -> Result<User, BlogError> {
        let mut current = self.get_user(id)?;

        if let Some(username) = patch.username {
            if username.trim().is_empty() {
                return Err(BlogError::Validation("username must not be empty".into()));
            }
            current.username = username;
        }
        if let Some(about_me) = patch.about_me {
            current.about_me = Some(about_me);
        }

        self.sql
            .exec(
                "UPDATE user SET username = ?1, about_me = ?2 WHERE id = ?3",
                &[
                    Value::Text(current.username.clone()),
                    match &current.about_me {
                        Some(s) => Value::Text(s.clone()),
                        None => Value::Null,
                    },
                    Value::Integer(id),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    BlogError::Conflict(format!("username already taken: {}", current.username))
                } else {
                    BlogError::Storage(msg)
                }
            })?;

        Ok(current)
    }

    /// Record that the user was just seen.
    pub fn touch_last_seen(&self, id: i64) -> Result<(), BlogError> {
        let affected = self
            .sql
            .exec(
                "UPDATE user SET last_seen = ?1 WHERE id = ?2",
                &[Value::Text(now_utc()), Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(BlogError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    /// Delete a user, their follow edges, and their posts. Deleted posts
    /// flow through the index synchronizer like any other delete.
    pub fn delete_user(&self, id: i64) -> Result<(), BlogError> {
        // Snapshot the user's posts before removing them so the index
        // deletions replay after the store writes commit.
        let rows = self
            .sql
            .query(
                "SELECT id, body, timestamp, user_id, language FROM post WHERE user_id = ?1",
                &[Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        let mut changeset = Changeset::default();
        for row in &rows {
            changeset.record_delete(&Self::post_from_row(row)?);
        }

        self.sql
            .exec(
                "DELETE FROM followers WHERE follower_id = ?1 OR followed_id = ?1",
                &[Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        self.sql
            .exec("DELETE FROM post WHERE user_id = ?1", &[Value::Integer(id)])
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let affected = self
            .sql
            .exec("DELETE FROM user WHERE id = ?1", &[Value::Integer(id)])
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(BlogError::NotFound(format!("user {}", id)));
        }

        self.replay(changeset);
        Ok(())
    }

    /// Check a username/password pair, returning the user when valid.
    pub fn verify_password(&self, username: &str, password: &str) -> Result<User, BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT id, username, email, about_me, last_seen, password_hash
                 FROM user WHERE username = ?1",
                &[Value::Text(username.to_string())],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| BlogError::Unauthorized("invalid username or password".into()))?;

        let hash = row.get_str("password_hash").unwrap_or_default();
        if !check_password(password, hash) {
            return Err(BlogError::Unauthorized("invalid username or password".into()));
        }
        Self::user_from_row(row)
    }

    /// Replace a user's password.
    pub fn set_password(&self, id: i64, password: &str) -> Result<(), BlogError> {
        if password.is_empty() {
            return Err(BlogError::Validation("password must not be empty".into()));
        }
        let hash = hash_password(password)?;
        let affected = self
            .sql
            .exec(
                "UPDATE user SET password_hash = ?1 WHERE id = ?2",
                &[Value::Text(hash), Value::Integer(id)],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(BlogError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    /// Issue a short-lived password-reset token for a user.
    pub fn reset_password_token(&self, user_id: i64) -> Result<String, BlogError> {
        let claims = ResetClaims {
            reset_password: user_id,
            exp: chrono_now() + self.config.reset_token_ttl,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| BlogError::Internal(e.to_string()))
    }

    /// Redeem a reset token and set the new password.
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<(), BlogError> {
        let data = jsonwebtoken::decode::<ResetClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| BlogError::Unauthorized("invalid or expired reset token".into()))?;

        self.set_password(data.claims.reset_password, new_password)
    }

    /// Look up the account for `email` and dispatch a reset mail on a
    /// detached thread. Always succeeds from the caller's perspective
    /// when the address is unknown, to avoid leaking which emails exist.
    pub fn request_password_reset(&self, email: &str) -> Result<(), BlogError> {
        let rows = self
            .sql
            .query(
                "SELECT id, username, email, about_me, last_seen FROM user WHERE email = ?1",
                &[Value::Text(email.to_string())],
            )
            .map_err(|e| BlogError::Storage(e.to_string()))?;

        let Some(row) = rows.first() else {
            info!(email, "password reset requested for unknown address");
            return Ok(());
        };
        let user = Self::user_from_row(row)?;
        let token = self.reset_password_token(user.id)?;

        mailer::send_detached(
            self.mailer.clone(),
            user.email,
            "Reset your password".to_string(),
            format!("Hi {},\n\nyour password reset token: {}\n", user.username, token),
        );
        Ok(())
    }
}

fn chrono_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testutil::*;

    #[test]
    fn test_user_crud() {
        let svc = store_only_service();

        let user = make_user(&svc, "alice");
        assert_eq!(user.username, "alice");
        assert!(user.last_seen.is_some());

        let fetched = svc.get_user(user.id).unwrap();
        assert_eq!(fetched.email, "alice@example.com");
        let by_name = svc.get_user_by_username("alice").unwrap();
        assert_eq!(by_name.id, user.id);

        let updated = svc
            .update_profile(
                user.id,
                UpdateProfile {
                    username: None,
                    about_me: Some("rustacean".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.about_me.as_deref(), Some("rustacean"));
        assert_eq!(updated.username, "alice");

        svc.delete_user(user.id).unwrap();
        assert!(svc.get_user(user.id).is_err());
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let svc = store_only_service();
        make_user(&svc, "alice");
        let err = svc
            .create_user(CreateUser {
                username: "alice".into(),
                email: "other@example.com".into(),
                password: "pw".into(),
            })
            .unwrap_err();
        assert!(matches!(err, BlogError::Conflict(_)));
    }

    #[test]
    fn test_password_verify() {
        let svc = store_only_service();
        let user = make_user(&svc, "alice");

        let ok = svc.verify_password("alice", "hunter2!").unwrap();
        assert_eq!(ok.id, user.id);

        assert!(matches!(
            svc.verify_password("alice", "wrong"),
            Err(BlogError::Unauthorized(_))
        ));
        assert!(matches!(
            svc.verify_password("nobody", "hunter2!"),
            Err(BlogError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_reset_token_roundtrip() {
        let svc = store_only_service();
        let user = make_user(&svc, "alice");

        let token = svc.reset_password_token(user.id).unwrap();
        svc.reset_password(&token, "new-password").unwrap();

        assert!(svc.verify_password("alice", "new-password").is_ok());
        assert!(svc.verify_password("alice", "hunter2!").is_err());

        assert!(matches!(
            svc.reset_password("garbage-token", "x"),
            Err(BlogError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_touch_last_seen() {
        let svc = store_only_service();
        let user = make_user(&svc, "alice");
        let before = svc.get_user(user.id).unwrap().last_seen.unwrap();
        tick();
        svc.touch_last_seen(user.id).unwrap();
        let after = svc.get_user(user.id).unwrap().last_seen.unwrap();
        assert!(after > before);
    }
}

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};

use microblog_core::ServiceError;

use crate::api::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/reset_password", post(request_reset).put(confirm_reset))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginClaims {
    sub: i64,
    exp: i64,
}

async fn login(
    State(svc): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = svc
        .verify_password(&req.username, &req.password)
        .map_err(ServiceError::from)?;
    svc.touch_last_seen(user.id).map_err(ServiceError::from)?;

    let claims = LoginClaims {
        sub: user.id,
        exp: chrono::Utc::now().timestamp() + svc.config.login_token_ttl,
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(svc.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ServiceError::Internal(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "token": token,
        "user": user,
    })))
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: String,
}

async fn request_reset(
    State(svc): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.request_password_reset(&req.email)
        .map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct ConfirmResetRequest {
    token: String,
    password: String,
}

async fn confirm_reset(
    State(svc): State<AppState>,
    Json(req): Json<ConfirmResetRequest>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.reset_password(&req.token, &req.password)
        .map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

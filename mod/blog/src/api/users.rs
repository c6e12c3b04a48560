use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use microblog_core::{ListParams, ServiceError};

use crate::api::AppState;
use crate::model::{CreateUser, UpdateProfile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route(
            "/users/{username}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{username}/posts", get(get_user_posts))
        .route(
            "/users/{username}/follow",
            post(follow_user).delete(unfollow_user),
        )
        .route("/users/{username}/follow/{other}", get(is_following))
}

async fn create_user(
    State(svc): State<AppState>,
    Json(input): Json<CreateUser>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    let user = svc.create_user(input).map_err(ServiceError::from)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::to_value(user).unwrap()),
    ))
}

async fn get_user(
    State(svc): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    let followers = svc.followers_count(user.id).map_err(ServiceError::from)?;
    let following = svc.following_count(user.id).map_err(ServiceError::from)?;
    let mut body = serde_json::to_value(&user).unwrap();
    body["followers_count"] = serde_json::json!(followers);
    body["following_count"] = serde_json::json!(following);
    body["avatar_url"] = serde_json::json!(user.avatar_url(128));
    Ok(Json(body))
}

async fn update_user(
    State(svc): State<AppState>,
    Path(username): Path<String>,
    Json(patch): Json<UpdateProfile>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    let updated = svc.update_profile(user.id, patch).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(updated).unwrap()))
}

async fn delete_user(
    State(svc): State<AppState>,
    Path(username): Path<String>,
) -> Result<axum::http::StatusCode, ServiceError> {
    let user = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    svc.delete_user(user.id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn get_user_posts(
    State(svc): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    let result = svc
        .user_posts(user.id, svc.page_size_or(params.limit), params.offset)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

/// Body for follow/unfollow: the acting user.
#[derive(Debug, Deserialize)]
struct FollowRequest {
    follower: String,
}

async fn follow_user(
    State(svc): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<FollowRequest>,
) -> Result<axum::http::StatusCode, ServiceError> {
    let follower = svc
        .get_user_by_username(&req.follower)
        .map_err(ServiceError::from)?;
    let followed = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    svc.follow(follower.id, followed.id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn unfollow_user(
    State(svc): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<FollowRequest>,
) -> Result<axum::http::StatusCode, ServiceError> {
    let follower = svc
        .get_user_by_username(&req.follower)
        .map_err(ServiceError::from)?;
    let followed = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    svc.unfollow(follower.id, followed.id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn is_following(
    State(svc): State<AppState>,
    Path((username, other)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let follower = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    let followed = svc.get_user_by_username(&other).map_err(ServiceError::from)?;
    let following = svc
        .is_following(follower.id, followed.id)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({ "following": following })))
}

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use microblog_core::{ListParams, ServiceError};

use crate::api::AppState;
use crate::model::CreatePost;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", axum::routing::post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/timeline/{username}", get(timeline))
        .route("/explore", get(explore))
}

async fn create_post(
    State(svc): State<AppState>,
    Json(input): Json<CreatePost>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    let author = svc
        .get_user_by_username(&input.author)
        .map_err(ServiceError::from)?;
    // Posting counts as activity.
    svc.touch_last_seen(author.id).map_err(ServiceError::from)?;
    let post = svc
        .create_post(author.id, &input.body)
        .map_err(ServiceError::from)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::to_value(post).unwrap()),
    ))
}

async fn get_post(
    State(svc): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let post = svc.get_post(id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(post).unwrap()))
}

#[derive(Debug, Deserialize)]
struct UpdatePostRequest {
    body: String,
}

async fn update_post(
    State(svc): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let post = svc.update_post(id, &req.body).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(post).unwrap()))
}

async fn delete_post(
    State(svc): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.delete_post(id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn timeline(
    State(svc): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = svc.get_user_by_username(&username).map_err(ServiceError::from)?;
    svc.touch_last_seen(user.id).map_err(ServiceError::from)?;
    let limit = svc.page_size_or(params.limit);
    let posts = svc
        .timeline(user.id, limit, params.offset)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({ "items": posts })))
}

async fn explore(
    State(svc): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc
        .explore(svc.page_size_or(params.limit), params.offset)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use microblog_core::ServiceError;

use crate::api::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_posts))
        .route("/search/reindex", post(reindex))
}

/// Upper bound on one search page, whatever the query string asks for.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_page")]
    page: usize,
    /// Missing means the service's configured page size.
    #[serde(default)]
    page_size: Option<usize>,
}

fn default_page() -> usize {
    1
}

async fn search_posts(
    State(svc): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    if params.page < 1 {
        return Err(ServiceError::Validation("page must be >= 1".into()));
    }
    let page_size = svc.page_size_or(params.page_size);
    if page_size < 1 || page_size > MAX_PAGE_SIZE {
        return Err(ServiceError::Validation(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let (posts, total) = svc.search_posts(&params.q, params.page, page_size);
    Ok(Json(serde_json::json!({
        "items": posts,
        "total": total,
        "page": params.page,
        "page_size": page_size,
    })))
}

async fn reindex(
    State(svc): State<AppState>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let indexed = svc.reindex().map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({ "indexed": indexed })))
}

mod auth;
mod posts;
mod search;
mod users;

use std::sync::Arc;

use axum::Router;

use crate::service::BlogService;

/// Shared application state.
pub type AppState = Arc<BlogService>;

/// Build the complete blog API router.
///
/// All routes are relative — the caller nests them under `/blog`.
pub fn build_router(svc: Arc<BlogService>) -> Router {
    Router::new()
        .merge(users::routes())
        .merge(posts::routes())
        .merge(search::routes())
        .merge(auth::routes())
        .with_state(svc)
}

//! Blog module — users, posts, follow graph, and searchable timelines.
//!
//! # Resources
//!
//! - **User** — identity with credentials, profile text, and last-seen
//! - **Post** — short text update, owned by exactly one user, indexed
//!   for full-text search on its body
//! - **Follow edge** — directed user-to-user relation feeding the timeline
//!
//! The relational store is authoritative. Post changes are mirrored into
//! an optional search index after they commit; index failures never roll
//! back or retry the store write, so the index may drift and can always
//! be rebuilt from the store with a reindex.
//!
//! # Usage
//!
//! ```ignore
//! use blog::{BlogModule, service::BlogConfig};
//!
//! let module = BlogModule::new(sql, Some(search), mailer, BlogConfig::default())?;
//! let router = module.routes(); // Mount under /blog
//! ```

pub mod api;
pub mod mailer;
pub mod model;
pub mod service;

use std::sync::Arc;

use axum::Router;

use microblog_core::Module;

use crate::mailer::Mailer;
use crate::service::{BlogConfig, BlogService};

/// Blog module implementing the Module trait.
///
/// Holds the BlogService and provides HTTP routes for all blog endpoints.
pub struct BlogModule {
    service: Arc<BlogService>,
}

impl BlogModule {
    /// Create a new BlogModule.
    pub fn new(
        sql: Arc<dyn microblog_sql::SQLStore>,
        search: Option<Arc<dyn microblog_search::SearchEngine>>,
        mailer: Arc<dyn Mailer>,
        config: BlogConfig,
    ) -> Result<Self, microblog_core::ServiceError> {
        let service = BlogService::new(sql, search, mailer, config)
            .map_err(microblog_core::ServiceError::from)?;
        Ok(Self { service })
    }

    /// Get a reference to the underlying BlogService.
    pub fn service(&self) -> &Arc<BlogService> {
        &self.service
    }
}

impl Module for BlogModule {
    fn name(&self) -> &str {
        "blog"
    }

    fn routes(&self) -> Router {
        api::build_router(self.service.clone())
    }
}

//! `microblogd` — the microblog server binary.
//!
//! Usage:
//!   microblogd --data-dir <dir> [--listen <addr>] [--no-search]
//!
//! The SQLite store is authoritative; the tantivy index under
//! `{data_dir}/search` is a derived cache and can be disabled or
//! rebuilt (`POST /blog/search/reindex`) at any time.

mod routes;

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use microblog_core::Module;

/// Microblog server.
#[derive(Parser, Debug)]
#[command(name = "microblogd", about = "Microblog server")]
struct Cli {
    /// Base directory for all persistent data.
    #[arg(long = "data-dir", required = true)]
    data_dir: std::path::PathBuf,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Disable the search index; search degrades to the SQL fallback.
    #[arg(long = "no-search", default_value_t = false)]
    no_search: bool,

    /// JWT signing secret (login + password-reset tokens).
    #[arg(long = "jwt-secret", env = "MICROBLOG_JWT_SECRET")]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let core_config = microblog_core::ServiceConfig {
        data_dir: Some(cli.data_dir.clone()),
        search_enabled: !cli.no_search,
        listen: cli.listen.clone(),
        ..Default::default()
    };

    std::fs::create_dir_all(&cli.data_dir)?;

    // Initialize embedded stores.
    let sql: Arc<dyn microblog_sql::SQLStore> = Arc::new(
        microblog_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    let search: Option<Arc<dyn microblog_search::SearchEngine>> = if core_config.search_enabled {
        let engine = microblog_search::TantivyEngine::open(&core_config.resolve_search_dir())
            .map_err(|e| anyhow::anyhow!("failed to open search engine: {}", e))?;
        Some(Arc::new(engine))
    } else {
        info!("search index disabled; queries will use the SQL fallback");
        None
    };

    let mut blog_config = blog::service::BlogConfig::default();
    if let Some(secret) = cli.jwt_secret {
        blog_config.jwt_secret = secret;
    }

    let mailer: Arc<dyn blog::mailer::Mailer> = Arc::new(blog::mailer::LogMailer);

    let blog_module = blog::BlogModule::new(sql, search, mailer, blog_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize blog module: {}", e))?;
    info!("Blog module initialized");

    let module_routes = vec![(blog_module.name().to_string(), blog_module.routes())];

    let app = routes::build_router(module_routes);

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("microblog server listening on {}", cli.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

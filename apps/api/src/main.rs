mod config;
mod db;
mod documents;
mod drafts;
mod errors;
mod generation;
mod llm_client;
mod models;
mod projects;
mod routes;
mod state;
mod store;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::documents::analyzer::PdfTextAnalyzer;
use crate::generation::orchestrator::Orchestrator;
use crate::generation::progress::ProgressChannel;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemoryStore, PgProjectStore, ProjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Redraft API v{}", env!("CARGO_PKG_VERSION"));

    // Project store: PostgreSQL when configured, otherwise in-memory
    let store: Arc<dyn ProjectStore> = match &config.database_url {
        Some(url) => Arc::new(PgProjectStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set; projects are kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.sampling);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let progress = ProgressChannel::new();
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(llm),
        progress.clone(),
        config.generation,
    ));
    info!(
        "Generation: concurrency {}, section timeout {:?}, context ceiling {} chars",
        config.generation.concurrency,
        config.generation.section_timeout,
        config.generation.max_context_chars
    );

    // Build app state
    let state = AppState {
        store,
        orchestrator,
        progress,
        analyzer: Arc::new(PdfTextAnalyzer),
        s3,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "redraft-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}

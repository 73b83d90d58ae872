use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::config::Config;
use crate::documents::analyzer::DocumentAnalyzer;
use crate::generation::orchestrator::Orchestrator;
use crate::generation::progress::ProgressChannel;
use crate::store::ProjectStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres-backed, or in-memory when no database is configured.
    pub store: Arc<dyn ProjectStore>,
    pub orchestrator: Arc<Orchestrator>,
    /// Same channel the orchestrator publishes on.
    pub progress: ProgressChannel,
    /// Pluggable document analyzer. Default: PdfTextAnalyzer.
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub s3: S3Client,
    pub config: Config,
}

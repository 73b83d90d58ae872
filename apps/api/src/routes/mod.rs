pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::documents::handlers as documents;
use crate::drafts::handlers as drafts;
use crate::generation::handlers as generation;
use crate::projects::handlers as projects;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Projects
        .route("/api/v1/projects", post(projects::handle_create_project))
        .route(
            "/api/v1/projects/:id",
            get(projects::handle_get_project).delete(projects::handle_delete_project),
        )
        .route(
            "/api/v1/projects/:id/section-mapping",
            put(projects::handle_update_section_mapping),
        )
        .route(
            "/api/v1/projects/:id/template",
            put(projects::handle_set_template),
        )
        // Source documents
        .route(
            "/api/v1/projects/:id/documents",
            post(documents::handle_upload_document),
        )
        // Generation
        .route(
            "/api/v1/projects/:id/generate",
            post(generation::handle_generate),
        )
        .route(
            "/api/v1/projects/:id/generation-status",
            get(generation::handle_generation_status),
        )
        // Drafts
        .route("/api/v1/projects/:id/draft", get(drafts::handle_get_draft))
        .route(
            "/api/v1/projects/:id/draft/export",
            post(drafts::handle_export_draft),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::documents::analyzer::{analyze_text, AnalysisError, DocumentAnalyzer};
    use crate::generation::orchestrator::{GenerationSettings, Orchestrator};
    use crate::generation::progress::ProgressChannel;
    use crate::llm_client::{LlmError, ModelClient, SamplingParams};
    use crate::models::document::SourceDocument;
    use crate::models::project::ProjectStatus;
    use crate::store::{MemoryStore, ProjectStore};

    const BODY_LIMIT: usize = 1024 * 1024;

    struct FixedModel {
        hang: bool,
    }

    #[async_trait]
    impl ModelClient for FixedModel {
        async fn generate_content(&self, _prompt: &str) -> Result<String, LlmError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok("The rewritten section covers the motivation, the approach and the \
                headline results reported by the source."
                .to_string())
        }
    }

    /// Treats the upload as already-extracted UTF-8 text.
    struct PlainTextAnalyzer;

    impl DocumentAnalyzer for PlainTextAnalyzer {
        fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, AnalysisError> {
            let text = String::from_utf8_lossy(bytes);
            if text.trim().is_empty() {
                return Err(AnalysisError::NoText(filename.to_string()));
            }
            Ok(analyze_text(filename, &text))
        }
    }

    fn config() -> Config {
        Config {
            database_url: None,
            s3_bucket: "redraft-test".to_string(),
            s3_endpoint: "http://127.0.0.1:1".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            anthropic_api_key: "test".to_string(),
            port: 0,
            rust_log: "info".to_string(),
            generation: GenerationSettings::default(),
            sampling: SamplingParams::default(),
        }
    }

    /// Points at a closed port with retries off, so S3 calls fail fast.
    fn offline_s3(config: &Config) -> aws_sdk_s3::Client {
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(&config.s3_endpoint)
            .retry_config(RetryConfig::disabled())
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(s3_config)
    }

    fn test_state(hang: bool) -> (AppState, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn ProjectStore> = memory.clone();
        let progress = ProgressChannel::new();
        let config = config();
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(FixedModel { hang }),
            progress.clone(),
            config.generation,
        ));
        let state = AppState {
            store,
            orchestrator,
            progress,
            analyzer: Arc::new(PlainTextAnalyzer),
            s3: offline_s3(&config),
            config,
        };
        (state, memory)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn upload_request(project_id: &str, filename: &str, content: &str) -> Request<Body> {
        let boundary = "redraft-test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/pdf\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/projects/{project_id}/documents"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    const PAPER: &str = "Sparse Attention for Long Documents\n\
        Abstract\n\
        We study sparse attention patterns over very long inputs and show large savings.\n\
        Methods\n\
        Block sparse kernels are benchmarked on long-document summarisation tasks.\n";

    fn new_project(template: bool) -> Value {
        let template_id = template.then(Uuid::new_v4);
        json!({
            "name": "Attention report",
            "mode": "single",
            "purpose": "summary",
            "templateId": template_id,
            "sectionMapping": [{
                "templateSectionId": "summary",
                "templateSectionTitle": "Summary",
                "sourceMapping": { "sourceSections": ["abstract", "methods"], "sourceDocuments": ["all"] }
            }]
        })
    }

    /// Creates a project and uploads one document; returns the project id.
    async fn ready_project(app: &Router) -> String {
        let (status, project) =
            send(app, json_request("POST", "/api/v1/projects", new_project(true))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = project["id"].as_str().unwrap().to_string();

        let (status, _) = send(app, upload_request(&id, "paper.pdf", PAPER)).await;
        assert_eq!(status, StatusCode::CREATED);
        id
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let (status, body) = send(&app, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "redraft-api");
    }

    #[tokio::test]
    async fn test_create_and_get_project() {
        let (state, _) = test_state(false);
        let app = build_router(state);

        let (status, created) =
            send(&app, json_request("POST", "/api/v1/projects", new_project(true))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "draft");
        assert_eq!(created["sectionMapping"][0]["templateSectionId"], "summary");

        let uri = format!("/api/v1/projects/{}", created["id"].as_str().unwrap());
        let (status, fetched) = send(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_comparative_purpose_requires_multi_mode() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let mut body = new_project(true);
        body["purpose"] = json!("comparative");

        let (status, error) = send(&app, json_request("POST", "/api/v1/projects", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_project_is_404() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let uri = format!("/api/v1/projects/{}", Uuid::new_v4());
        let (status, body) = send(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_upload_attaches_analyzed_document() {
        let (state, memory) = test_state(false);
        let app = build_router(state);
        let id = ready_project(&app).await;
        let project_id: Uuid = id.parse().unwrap();

        let documents = memory.list_documents(project_id).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].display_title(), "Sparse Attention for Long Documents");
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_rejected() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let (_, project) =
            send(&app, json_request("POST", "/api/v1/projects", new_project(true))).await;
        let id = project["id"].as_str().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/projects/{id}/documents"))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=b")
            .body(Body::from("--b\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--b--\r\n"))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_without_template_is_unprocessable() {
        let (state, memory) = test_state(false);
        let app = build_router(state);
        let (_, project) =
            send(&app, json_request("POST", "/api/v1/projects", new_project(false))).await;
        let id = project["id"].as_str().unwrap();
        send(&app, upload_request(id, "paper.pdf", PAPER)).await;

        let (status, body) =
            send(&app, empty_request("POST", &format!("/api/v1/projects/{id}/generate"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no template"));

        let stored = memory.get_project(id.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Draft);
    }

    #[tokio::test]
    async fn test_generate_accepts_then_rejects_second_trigger() {
        let (state, _) = test_state(true);
        let app = build_router(state);
        let id = ready_project(&app).await;
        let uri = format!("/api/v1/projects/{id}/generate");

        let (status, body) = send(&app, empty_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({ "status": "generating" }));

        let (status, body) = send(&app, empty_request("POST", &uri)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let mapping = json!({ "sectionMapping": [] });
        let (status, _) = send(
            &app,
            json_request("PUT", &format!("/api/v1/projects/{id}/section-mapping"), mapping),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_status_stream_reports_run_until_complete() {
        let (state, _) = test_state(false);
        let orchestrator = state.orchestrator.clone();
        let app = build_router(state);
        let id = ready_project(&app).await;

        let response = app
            .clone()
            .oneshot(empty_request(
                "GET",
                &format!("/api/v1/projects/{id}/generation-status"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        orchestrator.start(id.parse().unwrap()).await.unwrap();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("event: progress"));
        assert!(text.contains("event: section-complete"));
        assert!(text.contains("event: complete"));
        assert!(text.contains("\"sectionId\":\"summary\""));
    }

    #[tokio::test]
    async fn test_draft_available_after_run() {
        let (state, _) = test_state(false);
        let orchestrator = state.orchestrator.clone();
        let app = build_router(state);
        let id = ready_project(&app).await;
        let draft_uri = format!("/api/v1/projects/{id}/draft");

        let (status, _) = send(&app, empty_request("GET", &draft_uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        orchestrator.generate(id.parse().unwrap()).await.unwrap();

        let (status, draft) = send(&app, empty_request("GET", &draft_uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["sections"][0]["templateSectionTitle"], "Summary");
        assert!(draft["sections"][0]["content"]
            .as_str()
            .unwrap()
            .starts_with("The rewritten section"));
    }

    #[tokio::test]
    async fn test_set_template_and_delete_project() {
        let (state, memory) = test_state(false);
        let app = build_router(state);
        let (_, project) =
            send(&app, json_request("POST", "/api/v1/projects", new_project(false))).await;
        let id = project["id"].as_str().unwrap();
        let template_id = Uuid::new_v4();

        let (status, updated) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/v1/projects/{id}/template"),
                json!({ "templateId": template_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["templateId"], json!(template_id));

        let uri = format!("/api/v1/projects/{id}");
        let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(memory
            .get_project(id.parse().unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_section_ids_rejected() {
        let (state, _) = test_state(false);
        let app = build_router(state);
        let (_, project) =
            send(&app, json_request("POST", "/api/v1/projects", new_project(true))).await;
        let id = project["id"].as_str().unwrap();
        let section = json!({
            "templateSectionId": "intro",
            "templateSectionTitle": "Introduction",
            "sourceMapping": { "sourceSections": [], "sourceDocuments": ["all"] }
        });

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/v1/projects/{id}/section-mapping"),
                json!({ "sectionMapping": [section.clone(), section] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

use crate::application::use_cases::csv_import::template_csv;
use crate::application::use_cases::reconciler::ManualTestCaseInput;
use crate::application::{
    CsvImportUseCase, GenerationInput, GenerationPipeline, JobTracker, ReconcileUseCase,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::storage::Storage;
use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{dev::Server, get, post, put, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_ID_LEN: usize = 128;

pub struct HttpState {
    pub pipeline: Arc<GenerationPipeline>,
    pub tracker: Arc<JobTracker>,
    pub csv_import: CsvImportUseCase,
    pub reconciler: ReconcileUseCase,
    pub storage: Arc<dyn Storage>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateRequest {
    #[validate(length(min = 1, message = "Document title is required."))]
    pub document_title: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[validate(length(min = 1, message = "Document content is required."))]
    pub content: String,
    #[serde(default)]
    pub requirements: Option<String>,
    /// Model identifier to use instead of the configured one.
    #[serde(default)]
    #[validate(length(max = 200, message = "Model identifier is too long."))]
    pub model: Option<String>,
}

fn default_document_type() -> String {
    "document".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSetRequest {
    pub test_cases: Vec<ManualTestCaseInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub document_id: Option<String>,
}

fn validate_id(value: &str, label: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "{} has an invalid format.",
            label
        )))
    }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Import(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &AppError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        error!(status = status.as_u16(), "Request failed: {}", err);
    } else {
        warn!(status = status.as_u16(), "Request rejected: {}", err);
    }
    HttpResponse::build(status).json(json!({ "error": err.to_string() }))
}

fn csv_response(body: String, filename: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body)
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[post("/documents/{document_id}/generate")]
async fn generate(
    data: web::Data<HttpState>,
    path: web::Path<String>,
    req: web::Json<GenerateRequest>,
) -> impl Responder {
    let document_id = path.into_inner();
    if let Err(e) = validate_id(&document_id, "Document id") {
        return error_response(&e);
    }
    if let Err(e) = req.validate() {
        return error_response(&e.into());
    }

    let req = req.into_inner();
    info!(document_id = %document_id, "Dispatching test case generation");
    let input = GenerationInput {
        document_id,
        document_title: req.document_title,
        document_type: req.document_type,
        content: req.content,
        requirements: req.requirements,
        model: req.model,
    };

    match data.pipeline.dispatch(input).await {
        Ok(job) => HttpResponse::Accepted().json(json!({ "job": job })),
        Err(e) => error_response(&e),
    }
}

#[get("/jobs/{job_id}")]
async fn job_status(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    if let Err(e) = validate_id(&job_id, "Job id") {
        return error_response(&e);
    }
    match data.tracker.status(&job_id).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(&e),
    }
}

#[post("/test-cases/import")]
async fn import_test_cases(
    data: web::Data<HttpState>,
    query: web::Query<DocumentQuery>,
    body: web::Bytes,
) -> impl Responder {
    let document_id = query.into_inner().document_id;
    if let Some(id) = document_id.as_deref() {
        if let Err(e) = validate_id(id, "Document id") {
            return error_response(&e);
        }
    }

    match data
        .csv_import
        .import_csv(&body, document_id.as_deref())
        .await
    {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => error_response(&e),
    }
}

#[get("/test-cases/template")]
async fn download_template() -> impl Responder {
    match template_csv() {
        Ok(body) => csv_response(body, "test-case-template.csv"),
        Err(e) => error_response(&e),
    }
}

#[get("/test-cases")]
async fn list_test_cases(
    data: web::Data<HttpState>,
    query: web::Query<DocumentQuery>,
) -> impl Responder {
    let document_id = query.into_inner().document_id;
    match data.storage.get_test_cases(document_id.as_deref()).await {
        Ok(cases) => HttpResponse::Ok().json(cases),
        Err(e) => error_response(&e),
    }
}

#[get("/documents/{document_id}/test-cases/export")]
async fn export_test_cases(
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> impl Responder {
    let document_id = path.into_inner();
    if let Err(e) = validate_id(&document_id, "Document id") {
        return error_response(&e);
    }
    match data.csv_import.export(&document_id).await {
        Ok(body) => csv_response(body, &format!("test-cases-{}.csv", document_id)),
        Err(e) => error_response(&e),
    }
}

#[put("/documents/{document_id}/test-cases/manual")]
async fn submit_manual_test_cases(
    data: web::Data<HttpState>,
    path: web::Path<String>,
    req: web::Json<ManualSetRequest>,
) -> impl Responder {
    let document_id = path.into_inner();
    if let Err(e) = validate_id(&document_id, "Document id") {
        return error_response(&e);
    }

    match data
        .reconciler
        .submit_manual_set(&document_id, req.into_inner().test_cases)
        .await
    {
        Ok(cases) => HttpResponse::Ok().json(cases),
        Err(e) => error_response(&e),
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = error_response(&AppError::ValidationError(err.to_string()));
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

pub fn api_scope() -> actix_web::Scope {
    web::scope("/api")
        .app_data(json_config())
        .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .service(health)
        .service(generate)
        .service(job_status)
        .service(download_template)
        .service(import_test_cases)
        .service(list_test_cases)
        .service(export_test_cases)
        .service(submit_manual_test_cases)
}

pub fn start_server(state: web::Data<HttpState>, host: &str, port: u16) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .service(api_scope())
    })
    .bind((host, port))?
    .run();

    info!(host, port, "HTTP server listening");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::embedding_service::HashingEmbedder;
    use crate::domain::error::Result as AppResult;
    use crate::domain::llm_config::{LLMConfig, LlmResponse};
    use crate::domain::processing_job::{JobStatus, JobStatusView};
    use crate::domain::test_case::TestCase;
    use crate::domain::csv_import::ImportResult;
    use crate::infrastructure::config::PipelineConfig;
    use crate::infrastructure::llm_clients::LLMClient;
    use crate::infrastructure::storage::MemoryStorage;
    use actix_web::test;
    use async_trait::async_trait;

    struct FixedClient;

    #[async_trait]
    impl LLMClient for FixedClient {
        async fn generate(&self, _: &LLMConfig, _: &str, _: &str) -> AppResult<LlmResponse> {
            let cases: Vec<_> = (0..2)
                .map(|i| {
                    json!({
                        "title": format!("Generated {i}"),
                        "description": "d",
                        "category": "integration",
                        "priority": "medium",
                        "steps": ["a", "b", "c", "d", "e"],
                        "expected_result": "ok"
                    })
                })
                .collect();
            Ok(LlmResponse::text(format!("```json\n{}\n```", json!(cases))))
        }
    }

    fn state() -> web::Data<HttpState> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let tracker = Arc::new(JobTracker::new(storage.clone()));
        let pipeline = Arc::new(GenerationPipeline::new(
            tracker.clone(),
            storage.clone(),
            Arc::new(FixedClient),
            Arc::new(HashingEmbedder::default()),
            LLMConfig::default(),
            &PipelineConfig::default(),
        ));
        web::Data::new(HttpState {
            pipeline,
            tracker,
            csv_import: CsvImportUseCase::new(storage.clone()),
            reconciler: ReconcileUseCase::new(storage.clone()),
            storage,
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).service(api_scope())).await
        };
    }

    #[actix_web::test]
    async fn test_health() {
        let state = state();
        let app = app!(state);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_generate_and_poll() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/documents/doc-1/generate")
            .set_json(json!({
                "documentTitle": "Payments",
                "documentType": "prd",
                "content": "Card payments are captured on checkout.\n\nRefunds go back to the card."
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let job_id = body["job"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["job"]["documentId"], "doc-1");

        let mut view: Option<JobStatusView> = None;
        for _ in 0..200 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/jobs/{}", job_id))
                .to_request();
            let current: JobStatusView = test::call_and_read_body_json(&app, req).await;
            if current.status.is_terminal() {
                view = Some(current);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let view = view.unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 100);

        let req = test::TestRequest::get()
            .uri("/api/test-cases?documentId=doc-1")
            .to_request();
        let cases: Vec<TestCase> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cases.len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/documents/doc-1/test-cases/export")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Generated 0"));
        assert!(text.contains("generated"));
    }

    #[actix_web::test]
    async fn test_generate_validation_errors() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/documents/doc-1/generate")
            .set_json(json!({"documentTitle": "T", "content": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("content"));

        let req = test::TestRequest::post()
            .uri("/api/documents/bad%20id/generate")
            .set_json(json!({"documentTitle": "T", "content": "x"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/documents/doc-1/generate")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_generate_accepts_model_but_not_provider_settings() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/documents/doc-3/generate")
            .set_json(json!({
                "documentTitle": "T",
                "content": "x",
                "config": {"provider": "OpenAI", "base_url": "http://169.254.169.254", "model": "m"}
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/documents/doc-3/generate")
            .set_json(json!({"documentTitle": "T", "content": "x", "model": "other-model"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);
    }

    #[actix_web::test]
    async fn test_unknown_job_is_404() {
        let state = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/api/jobs/missing").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_import_and_template() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/test-cases/import?documentId=doc-9")
            .set_payload("title,description,category,priority\nA,\"two\nlines\",,\n")
            .to_request();
        let result: ImportResult = test::call_and_read_body_json(&app, req).await;
        assert_eq!(result.created, 1);
        assert!(result.errors.is_empty());

        let req = test::TestRequest::post()
            .uri("/api/test-cases/import")
            .set_payload("name,priority\nA,low\n")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let req = test::TestRequest::get().uri("/api/test-cases/template").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/csv; charset=utf-8"
        );
        let body = test::read_body(resp).await;
        assert!(body.starts_with(
            b"title,description,category,priority,preconditions,steps,expected_result,source\n"
        ));
    }

    #[actix_web::test]
    async fn test_manual_submission_replaces_set() {
        let state = state();
        let app = app!(state);

        let submit = |titles: Vec<&str>| {
            let cases: Vec<_> = titles
                .iter()
                .map(|t| json!({"title": t, "description": "d"}))
                .collect();
            test::TestRequest::put()
                .uri("/api/documents/doc-2/test-cases/manual")
                .set_json(json!({ "testCases": cases }))
                .to_request()
        };

        let first: Vec<TestCase> = test::call_and_read_body_json(&app, submit(vec!["a", "b"])).await;
        assert_eq!(first.len(), 2);
        let second: Vec<TestCase> = test::call_and_read_body_json(&app, submit(vec!["c"])).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].title, "c");

        let invalid = test::call_service(&app, submit(vec![""])).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let stored = state.storage.get_test_cases(Some("doc-2")).await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}

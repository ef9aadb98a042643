//! HTTP API over the chat service.
//!
//! - GET / - liveness banner
//! - POST /upload - multipart PDF upload (field `file`)
//! - POST /chat - answer a question from the uploaded documents
//! - GET /documents - uploaded documents with chunk counts
//! - DELETE /documents - forget everything

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_chat_core::{
    is_pdf_filename, ChatReply, ChatService, DocumentSummary, IngestError, StoreError,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub top_k: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload))
        .route("/chat", post(chat))
        .route("/documents", get(list_documents).delete(clear_documents))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(signal_error) = tokio::signal::ctrl_c().await {
                error!(error = %signal_error, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("http server stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct RootBody {
    message: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct UploadBody {
    message: &'static str,
    document_id: String,
    chunks_count: usize,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct DocumentsBody {
    documents: Vec<DocumentSummary>,
}

async fn root() -> Json<RootBody> {
    Json(RootBody {
        message: "PDF Chat API",
        status: "running",
    })
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadBody>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !is_pdf_filename(&filename) {
            return Err(ApiError::InvalidInput(
                "Only PDF files are allowed".to_string(),
            ));
        }

        let bytes = field.bytes().await?;
        let mut spooled = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        spooled.write_all(&bytes)?;
        spooled.flush()?;

        let receipt = state.service.upload(spooled.path(), &filename).await?;
        return Ok(Json(UploadBody {
            message: "PDF processed successfully",
            document_id: receipt.document_id,
            chunks_count: receipt.chunks_count,
        }));
    }

    Err(ApiError::InvalidInput(
        "multipart field 'file' is required".to_string(),
    ))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = payload?;
    let reply = state.service.chat(&request.message, state.top_k).await?;
    Ok(Json(reply))
}

async fn list_documents(State(state): State<AppState>) -> Json<DocumentsBody> {
    Json(DocumentsBody {
        documents: state.service.documents().await,
    })
}

async fn clear_documents(State(state): State<AppState>) -> Json<MessageBody> {
    state.service.clear().await;
    Json(MessageBody {
        message: "All documents cleared",
    })
}

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Ingest(IngestError),
    Store(StoreError),
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Ingest(ingest_error) if ingest_error.is_invalid_input() => "INVALID_INPUT",
            Self::Ingest(IngestError::PdfParse(_)) => "PDF_PROCESSING_FAILED",
            Self::Ingest(_) => "INGEST_FAILED",
            Self::Store(StoreError::InvalidInput(_)) => "INVALID_INPUT",
            Self::Store(_) => "STORE_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput(message) => message.clone(),
            Self::Ingest(ingest_error) => format!("Error processing PDF: {ingest_error}"),
            Self::Store(store_error) => store_error.to_string(),
            Self::Internal(internal) => internal.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self.message(), "request failed");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(ingest_error: IngestError) -> Self {
        Self::Ingest(ingest_error)
    }
}

impl From<StoreError> for ApiError {
    fn from(store_error: StoreError) -> Self {
        Self::Store(store_error)
    }
}

impl From<MultipartError> for ApiError {
    fn from(multipart_error: MultipartError) -> Self {
        Self::InvalidInput(multipart_error.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(io_error: std::io::Error) -> Self {
        Self::Internal(io_error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use pdf_chat_core::testing::write_text_pdf;
    use pdf_chat_core::{
        BackendCapabilities, ChatHandler, ChunkingConfig, LocalEmbedder, StoreConfig,
        VectorStore, DEFAULT_TOP_K,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdf-chat-test-boundary";

    struct Harness {
        app: Router,
        dir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().expect("create temp dir");
            let store = VectorStore::open(
                StoreConfig::in_dir(dir.path()),
                BackendCapabilities::detect(),
            );
            let service = ChatService::new(
                store,
                ChatHandler::offline(LocalEmbedder::default()),
                ChunkingConfig::default(),
            );
            let app = router(AppState {
                service: Arc::new(service),
                top_k: DEFAULT_TOP_K,
            });
            Self { app, dir }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self
                .app
                .clone()
                .oneshot(request)
                .await
                .expect("router is infallible");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("read body")
                .to_bytes();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }

        async fn upload(&self, filename: &str, contents: &[u8]) -> (StatusCode, Value) {
            let mut body = Vec::new();
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                     filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(contents);
            body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

            let request = Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("build request");
            self.send(request).await
        }

        async fn upload_sample(&self, filename: &str) -> (StatusCode, Value) {
            let source = self.dir.path().join("sample-source.pdf");
            write_text_pdf(&source, &["The sky is blue.", "Water is wet."])
                .expect("write sample pdf");
            let contents = std::fs::read(&source).expect("read sample pdf");
            self.upload(filename, &contents).await
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("build request")
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .expect("build request")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn root_reports_running() {
        let harness = Harness::new();
        let (status, body) = harness.send(get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "PDF Chat API", "status": "running"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_start_empty() {
        let harness = Harness::new();
        let (status, body) = harness.send(get("/documents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"documents": []}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_message_is_a_bad_request() {
        let harness = Harness::new();
        let (status, body) = harness
            .send(post_json("/chat", json!({"message": "  "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_or_malformed_chat_body_is_a_bad_request() {
        let harness = Harness::new();

        let (status, body) = harness.send(post_json("/chat", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
        assert_eq!(body["message"], "invalid input: message is required");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("build request");
        let (status, body) = harness.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_pdf_upload_is_rejected() {
        let harness = Harness::new();
        let (status, body) = harness.upload("notes.txt", b"hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only PDF files are allowed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_pdf_is_a_server_error() {
        let harness = Harness::new();
        let (status, body) = harness.upload("broken.pdf", b"%PDF-1.4\n%broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "PDF_PROCESSING_FAILED");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_chat_list_and_clear() {
        let harness = Harness::new();

        let (status, body) = harness.upload_sample("Report.PDF").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "PDF processed successfully");
        assert_eq!(body["document_id"], "0");
        assert_eq!(body["chunks_count"], 1);

        let (status, body) = harness.send(get("/documents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"documents": [{"id": "0", "filename": "Report.PDF", "chunks_count": 1}]})
        );

        let (status, body) = harness
            .send(post_json("/chat", json!({"message": "What colour is the sky?"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let sources = body["sources"].as_array().expect("sources array");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0]["id"], "0_0");
        assert_eq!(sources[0]["filename"], "Report.PDF");
        assert!(sources[0]["similarity_score"].is_number());
        assert!(body["response"]
            .as_str()
            .is_some_and(|response| response.contains("sky")));

        let (status, body) = harness.send(delete("/documents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "All documents cleared"}));

        let (_, body) = harness.send(get("/documents")).await;
        assert_eq!(body, json!({"documents": []}));
    }

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(
            ApiError::Store(StoreError::InvalidInput("x".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Store(StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Ingest(IngestError::InvalidArgument("empty".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Ingest(IngestError::PdfParse("bad".to_string())).code(),
            "PDF_PROCESSING_FAILED"
        );
    }
}

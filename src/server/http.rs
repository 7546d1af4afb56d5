//! HTTP server for the web UI
//!
//! Every browser tab creates its own session; each session owns one
//! interaction controller. Idle sessions are expired in the background.

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::assets;
use super::markdown::render_markdown;
use crate::config::Config;
use crate::controller::{
    AnalyzeOutcome, ControllerError, ControllerView, FollowUpOutcome, InputError,
    InteractionController,
};
use crate::gateway::{AnalysisMode, ModelGateway};
use crate::session::{StagedImage, UploadError};

/// Slack on top of the upload limit for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct Server {
    state: Arc<AppState>,
}

struct SessionEntry {
    controller: Arc<Mutex<InteractionController>>,
    created_at: DateTime<Utc>,
    last_accessed: Instant,
}

pub struct AppState {
    config: Config,
    gateway: Arc<dyn ModelGateway>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn ModelGateway>) -> Arc<Self> {
        Arc::new(Self {
            config,
            gateway,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.session_timeout_secs)
    }
}

impl Server {
    pub fn new(config: &Config, gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            state: AppState::new(config.clone(), gateway),
        }
    }

    pub async fn run(&self) -> Result<()> {
        // Spawn session cleanup task
        let cleanup_state = self.state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                cleanup_expired_sessions(&cleanup_state).await;
            }
        });

        let app = router(self.state.clone());
        let config = &self.state.config;

        let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(state.config.uploads.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(assets::index))
        .route("/assets/{*path}", get(assets::asset))
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/mode", put(set_mode))
        .route("/api/sessions/{id}/image", post(upload_image))
        .route("/api/sessions/{id}/analyze", post(analyze))
        .route("/api/sessions/{id}/follow-up", post(follow_up))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// Error response type
struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        let status = match e {
            UploadError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Empty => StatusCode::BAD_REQUEST,
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError(status, e.to_string())
    }
}

impl From<ControllerError> for AppError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::Gateway(e) => AppError(StatusCode::BAD_GATEWAY, e.to_string()),
            ControllerError::Upload(e) => e.into(),
        }
    }
}

// Session cleanup task
async fn cleanup_expired_sessions(state: &Arc<AppState>) {
    let timeout = state.session_timeout();
    let mut sessions = state.sessions.lock().await;
    let before_count = sessions.len();

    sessions.retain(|id, entry| {
        let expired = entry.last_accessed.elapsed() >= timeout;
        if expired {
            debug!("Expiring session: {}", id);
        }
        !expired
    });

    let removed = before_count - sessions.len();
    if removed > 0 {
        info!("Cleaned up {} expired sessions", removed);
    }
}

async fn new_session(state: &Arc<AppState>) -> (String, DateTime<Utc>) {
    let mut sessions = state.sessions.lock().await;

    if sessions.len() >= state.config.server.max_sessions {
        // Make room by dropping the least recently used session
        if let Some(oldest_id) = sessions
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(id, _)| id.clone())
        {
            sessions.remove(&oldest_id);
            info!("Removed oldest session {} to make room", oldest_id);
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now();
    sessions.insert(
        id.clone(),
        SessionEntry {
            controller: Arc::new(Mutex::new(InteractionController::new(
                state.gateway.clone(),
            ))),
            created_at,
            last_accessed: Instant::now(),
        },
    );

    info!("Created new session: {}", id);
    (id, created_at)
}

async fn find_session(
    state: &Arc<AppState>,
    id: &str,
) -> Result<Arc<Mutex<InteractionController>>, AppError> {
    let mut sessions = state.sessions.lock().await;
    match sessions.get_mut(id) {
        Some(entry) => {
            entry.last_accessed = Instant::now();
            Ok(entry.controller.clone())
        }
        None => Err(AppError(
            StatusCode::NOT_FOUND,
            format!("Session not found: {}", id),
        )),
    }
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    vision_model: String,
    text_model: String,
    active_sessions: usize,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (vision_model, text_model) = state.gateway.models();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        vision_model,
        text_model,
        active_sessions: state.session_count().await,
    })
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
    created_at: DateTime<Utc>,
}

async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    let (session_id, created_at) = new_session(&state).await;

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            created_at,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct SessionView {
    session_id: String,
    #[serde(flatten)]
    view: ControllerView,
    result_html: Option<String>,
    answer_html: Option<String>,
}

impl SessionView {
    fn new(session_id: String, view: ControllerView) -> Self {
        let result_html = view.session.last_result.as_deref().map(render_markdown);
        let answer_html = view.last_answer.as_deref().map(render_markdown);
        Self {
            session_id,
            view,
            result_html,
            answer_html,
        }
    }
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let controller = find_session(&state, &id).await?;
    let view = controller.lock().await.view();
    Ok(Json(SessionView::new(id, view)))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.sessions.lock().await.remove(&id) {
        Some(_) => {
            info!("Ended session: {}", id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(AppError(
            StatusCode::NOT_FOUND,
            format!("Session not found: {}", id),
        )),
    }
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: AnalysisMode,
}

async fn set_mode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<SessionView>, AppError> {
    let controller = find_session(&state, &id).await?;
    let mut controller = controller.lock().await;
    controller.select_mode(request.mode);
    Ok(Json(SessionView::new(id, controller.view())))
}

#[derive(Serialize)]
struct UploadResponse {
    name: String,
    media_type: String,
    size: u64,
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let controller = find_session(&state, &id).await?;
    let max_size = state.config.uploads.max_file_size_bytes;
    let upload_dir = state.config.upload_dir();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError(e.status(), e.body_text()))?;

        let image = StagedImage::stage(&name, &bytes, max_size, &upload_dir)?;
        let response = UploadResponse {
            name: image.name().to_string(),
            media_type: image.media_type().to_string(),
            size: image.size(),
        };
        controller.lock().await.stage_image(image);
        return Ok(Json(response));
    }

    Err(AppError(
        StatusCode::BAD_REQUEST,
        "Missing multipart field 'file'".to_string(),
    ))
}

#[derive(Deserialize, Default)]
struct AnalyzeRequest {
    #[serde(default)]
    mode: Option<AnalysisMode>,
    #[serde(default)]
    symptoms: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AnalyzeResponse {
    Completed { result: String, result_html: String },
    Ignored { reason: InputError, message: String },
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let controller = find_session(&state, &id).await?;
    let mut controller = controller.lock().await;

    if let Some(mode) = request.mode {
        controller.select_mode(mode);
    }

    let response = match controller.analyze(request.symptoms.as_deref()).await {
        Ok(AnalyzeOutcome::Completed(result)) => AnalyzeResponse::Completed {
            result_html: render_markdown(&result),
            result,
        },
        Ok(AnalyzeOutcome::Ignored(reason)) => AnalyzeResponse::Ignored {
            message: reason.to_string(),
            reason,
        },
        Err(e) => {
            warn!("Analysis failed for session {}: {}", id, e);
            return Err(e.into());
        }
    };

    Ok(Json(response))
}

#[derive(Deserialize)]
struct FollowUpRequest {
    query: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FollowUpResponse {
    Answered { answer: String, answer_html: String },
    Ignored { reason: InputError, message: String },
}

async fn follow_up(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, AppError> {
    let controller = find_session(&state, &id).await?;
    let mut controller = controller.lock().await;

    let response = match controller.follow_up(&request.query).await {
        Ok(FollowUpOutcome::Answered(answer)) => FollowUpResponse::Answered {
            answer_html: render_markdown(&answer),
            answer,
        },
        Ok(FollowUpOutcome::Ignored(reason)) => FollowUpResponse::Ignored {
            message: reason.to_string(),
            reason,
        },
        Err(e) => {
            warn!("Follow-up failed for session {}: {}", id, e);
            return Err(e.into());
        }
    };

    Ok(Json(response))
}

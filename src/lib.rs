pub mod channels;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod phone;
pub mod relay;
pub mod resolver;
pub mod session;
pub mod transcode;
pub mod types;

pub use config::Config;
pub use error::{RelayError, RelayResult};

use self::channels::gateway::{GatewayApi, GatewayClient, GatewayWebhook};
use self::channels::support::{SupportApi, SupportClient, SupportWebhook};
use self::config::{load_config, resolve_database_url};
use self::db::{SessionStore, SqlSessionStore};
use self::relay::RelayEngine;
use self::session::{DeleteReport, SessionRegistry};
use self::transcode::{FfmpegTranscoder, Transcoder};
use self::types::{InstanceStatus, RelayOutcome, SupportCredentials};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const API_KEY_HEADER: &str = "Api-Key";
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub support: Arc<dyn SupportApi>,
    pub gateway: Arc<dyn GatewayApi>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        support: Arc<dyn SupportApi>,
        gateway: Arc<dyn GatewayApi>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let sessions = SessionRegistry::new(store, gateway.clone(), &config.server.public_url);
        Self {
            config,
            sessions,
            support,
            gateway,
            transcoder,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub support: SupportCredentials,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub description: String,
    pub instance: String,
    pub support_webhook_url: String,
    pub gateway_webhook_url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub description: String,
    pub support_webhook_url: String,
    pub connection: InstanceStatus,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub base64: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn create_app() -> anyhow::Result<(AppState, Router)> {
    sqlx::any::install_default_drivers();

    let config = load_config();
    let db_url = resolve_database_url(&config);
    let db_kind = db::db_kind_from_url(&db_url);
    let pool = AnyPool::connect(&db_url).await?;
    db::init_db(&pool, db_kind).await?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_seconds))
        .build()?;
    let support = SupportClient::new(http.clone(), &config.support.base_url);
    let gateway = GatewayClient::new(
        http,
        &config.gateway.base_url,
        config.gateway.global_token.clone(),
    );

    if config.auth.api_key.is_none() {
        warn!("no API key configured, session endpoints will reject every request");
    }

    let state = AppState::new(
        config.clone(),
        Arc::new(SqlSessionStore::new(pool, db_kind)),
        Arc::new(support),
        Arc::new(gateway),
        Arc::new(FfmpegTranscoder::new(config.media.ffmpeg_path.clone())),
    );
    let app = build_router(state.clone());
    Ok((state, app))
}

pub fn build_router(state: AppState) -> Router {
    let authed_routes = Router::new()
        .route("/session", post(create_session))
        .route("/session/:id", get(get_session).delete(delete_session))
        .route("/session/:id/connect", post(connect_session))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/gateway/webhook/:session", post(gateway_webhook))
        .route("/support/webhook/:session", post(support_webhook));

    Router::new()
        .merge(authed_routes)
        .merge(public_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> impl IntoResponse {
    // No configured key means no caller can be authorized.
    let Some(key) = state.config.auth.api_key.as_deref() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let header = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if header != Some(key) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(req).await
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|err| RelayError::Decode(err.to_string()))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let req: CreateSessionRequest = parse_body(&body)?;
    let description = req.description.unwrap_or_default();
    let session = state
        .sessions
        .create(req.session_id.as_deref(), &description, req.support)
        .await?;
    let resp = CreateSessionResponse {
        support_webhook_url: state.sessions.support_webhook_url(&session.id),
        gateway_webhook_url: state.sessions.gateway_webhook_url(&session.id),
        session_id: session.id,
        description: session.description,
        instance: session.gateway.name,
    };
    Ok((StatusCode::CREATED, Json(resp)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, RelayError> {
    let session = state.sessions.get(&id).await?;
    let connection = state.sessions.status(&id).await?;
    Ok(Json(SessionView {
        support_webhook_url: state.sessions.support_webhook_url(&session.id),
        session_id: session.id,
        description: session.description,
        connection,
    }))
}

async fn connect_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectResponse>, RelayError> {
    let base64 = state.sessions.connect(&id).await?;
    Ok(Json(ConnectResponse {
        session_id: id,
        base64,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, RelayError> {
    Ok(Json(state.sessions.delete(&id).await?))
}

async fn gateway_webhook(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<RelayOutcome>, RelayError> {
    let event: GatewayWebhook = parse_body(&body)?;
    let session = state.sessions.get(&session_id).await?;
    let engine = RelayEngine::new(
        &session,
        state.support.as_ref(),
        state.gateway.as_ref(),
        state.transcoder.as_ref(),
    );
    Ok(Json(engine.relay_from_gateway(&event).await?))
}

async fn support_webhook(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<RelayOutcome>, RelayError> {
    let event: SupportWebhook = parse_body(&body)?;
    let session = state.sessions.get(&session_id).await?;
    let engine = RelayEngine::new(
        &session,
        state.support.as_ref(),
        state.gateway.as_ref(),
        state.transcoder.as_ref(),
    );
    Ok(Json(engine.relay_from_support(&event).await?))
}

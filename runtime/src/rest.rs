//! HTTP REST API for the imagery console.
//!
//! Every endpoint runs one fetch/filter/render cycle against the shared
//! [`AppState`]. The fetcher sits behind one async mutex; analyst calls
//! are made without holding it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use imint::filter::apply_table;
use imint::{views, Conversation, ExportKind, FilterColumns, ImintError, QualityBands};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::cli::export_cmd;
use crate::config::Config;
use crate::conversations::ConversationStore;
use crate::fetcher::Fetcher;
use crate::loitering::{self, LoiterThresholds};
use crate::pages::{self, DashboardData, FilterInput, InteractionState, Page};
use crate::proxy::{self, ProxyError, QueryProxy};

/// State shared by all handlers.
pub struct AppState {
    pub fetcher: Mutex<Fetcher>,
    pub proxy: Option<QueryProxy>,
    /// Conversations between requests. A conversation is taken out of the
    /// store while a request is using it.
    pub conversations: Mutex<ConversationStore>,
    pub quality_bands: QualityBands,
    pub loitering: LoiterThresholds,
    pub history_window: usize,
}

impl AppState {
    pub fn new(fetcher: Fetcher, proxy: Option<QueryProxy>, config: &Config) -> Self {
        Self {
            fetcher: Mutex::new(fetcher),
            proxy,
            conversations: Mutex::new(ConversationStore::new(
                config.max_conversations,
                Duration::from_secs(config.conversation_idle_secs),
            )),
            quality_bands: config.quality_bands,
            loitering: config.loitering,
            history_window: config.history_window,
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/dashboard/:page", get(handle_dashboard))
        .route("/api/v1/images/:id", get(handle_image))
        .route("/api/v1/export/:kind", get(handle_export))
        .route("/api/v1/ask", post(handle_ask))
        .route("/api/v1/loitering", get(handle_loitering))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("REST API listening on http://{addr}");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Start the REST API server on the given port.
pub async fn start(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

// ── Helpers ─────────────────────────────────────────────────────

fn error(status: StatusCode, code: &str, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message.to_string() }
        })),
    )
        .into_response()
}

fn warehouse_error(e: impl std::fmt::Display) -> Response {
    tracing::warn!("warehouse request failed: {e}");
    error(StatusCode::BAD_GATEWAY, "E_WAREHOUSE", e)
}

/// Filter controls as query parameters. Values are kept as strings so a
/// malformed one falls back instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    start: Option<String>,
    end: Option<String>,
    /// Comma-separated; present but empty selects nothing.
    sensors: Option<String>,
    min_quality: Option<String>,
    selected: Option<String>,
}

impl FilterParams {
    fn to_input(&self) -> FilterInput {
        FilterInput {
            start: self.start.clone(),
            end: self.end.clone(),
            sensors: self.sensors.as_ref().map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }),
            min_quality: self
                .min_quality
                .as_deref()
                .and_then(|q| q.trim().parse().ok()),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "analyst": state.proxy.is_some(),
    }))
}

async fn handle_dashboard(
    State(state): State<Arc<AppState>>,
    Path(page): Path<String>,
    Query(params): Query<FilterParams>,
) -> Response {
    let page: Page = match page.parse() {
        Ok(p) => p,
        Err(e) => return error(StatusCode::NOT_FOUND, "E_UNKNOWN_PAGE", e),
    };
    let mut fetcher = state.fetcher.lock().await;
    let data = match DashboardData::load(&mut fetcher) {
        Ok(d) => d,
        Err(e) => return warehouse_error(e),
    };
    let interaction = InteractionState {
        page,
        filters: params.to_input(),
        selected_image: params.selected.clone(),
    };
    let mut rendered = pages::render(&interaction, &data, state.quality_bands);
    pages::presign_selected(&mut rendered, &data, &fetcher);
    Json(rendered).into_response()
}

async fn handle_image(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let mut fetcher = state.fetcher.lock().await;
    let imagery = match fetcher.imagery() {
        Ok(r) => r,
        Err(e) => return warehouse_error(e),
    };
    let Some(record) = imagery.iter().find(|r| r.image_id == id) else {
        return error(
            StatusCode::NOT_FOUND,
            "E_NOT_FOUND",
            format!("no image '{id}'"),
        );
    };
    let spatial = match fetcher.spatial() {
        Ok(r) => r,
        Err(e) => return warehouse_error(e),
    };
    let url = record
        .s3_key
        .as_deref()
        .and_then(|key| fetcher.presigned_url(key));
    Json(json!({
        "detail": views::image_detail(record, &spatial),
        "presigned_url": url,
    }))
    .into_response()
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<FilterParams>,
) -> Response {
    let Some(kind) = ExportKind::parse(&kind) else {
        return error(
            StatusCode::NOT_FOUND,
            "E_UNKNOWN_EXPORT",
            format!("unknown export '{kind}' (expected filtered or summary)"),
        );
    };
    let payload = {
        let mut fetcher = state.fetcher.lock().await;
        export_cmd::payload(&mut fetcher, kind, &params.to_input())
    };
    let (csv, _rows) = match payload {
        Ok(p) => p,
        Err(e) => return warehouse_error(format!("{e:#}")),
    };
    let name = kind.file_name(chrono::Local::now().naive_local());
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        csv,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    /// Constraints applied to the returned rows; absent axes pass through.
    #[serde(default)]
    pub filters: Option<FilterInput>,
}

async fn handle_ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let Some(proxy) = state.proxy.clone() else {
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            "E_ANALYST_UNAVAILABLE",
            "analyst service is not configured",
        );
    };

    let (id, mut conv) = {
        let mut conversations = state.conversations.lock().await;
        match req.conversation_id {
            Some(id) => match conversations.take(&id) {
                Some(conv) => (id, conv),
                None => {
                    return error(
                        StatusCode::NOT_FOUND,
                        "E_NO_CONVERSATION",
                        format!("no idle conversation '{id}'"),
                    )
                }
            },
            None => (Uuid::new_v4(), Conversation::new(state.history_window)),
        }
    };

    let answered = proxy.converse(&mut conv, &req.question).await;
    // the outcome is returned below; the conversation is ready for the next turn
    let _ = conv.acknowledge();
    let turns = conv.turns().len();
    // a conversation whose first question was rejected has nothing to resume
    if turns > 0 {
        state.conversations.lock().await.put(id, conv);
    }

    let reply = match answered {
        Ok(reply) => reply,
        Err(ProxyError::Conversation(ImintError::InvalidInput(msg))) => {
            return error(StatusCode::BAD_REQUEST, "E_INVALID_PARAMS", msg)
        }
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "conversation_id": id,
                    "error": { "code": "E_ANALYST", "message": e.to_string() }
                })),
            )
                .into_response()
        }
    };

    let (mut result, sql_error) = {
        let fetcher = state.fetcher.lock().await;
        proxy::execute_reply(&fetcher, &reply)
    };
    if let Some(filters) = &req.filters {
        let criteria = filters.explicit();
        result = result.map(|r| apply_table(&r, &FilterColumns::default(), &criteria));
    }

    Json(json!({
        "conversation_id": id,
        "turns": turns,
        "reply": reply,
        "result": result,
        "sql_error": sql_error,
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct LoiterParams {
    max_gap_secs: Option<u64>,
    max_distance_m: Option<f64>,
}

async fn handle_loitering(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoiterParams>,
) -> Response {
    let thresholds = LoiterThresholds {
        max_gap_secs: params.max_gap_secs.unwrap_or(state.loitering.max_gap_secs),
        max_distance_m: params
            .max_distance_m
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(state.loitering.max_distance_m),
    };
    let fetcher = state.fetcher.lock().await;
    match loitering::detect(fetcher.warehouse(), &thresholds) {
        Ok(events) => Json(json!({
            "thresholds": thresholds,
            "total": events.len(),
            "events": events,
        }))
        .into_response(),
        Err(e) => warehouse_error(e),
    }
}

use std::any::Any;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use crate::error::CitationError;
use crate::live::LiveCitations;
use crate::settings::Settings;

pub const CITATIONS_PATH: &str = "/api/scholar-citations";

#[derive(Clone)]
pub struct AppState {
    live: LiveCitations,
    cache_control: String,
}

impl AppState {
    pub fn new(live: LiveCitations, settings: &Settings) -> Self {
        AppState {
            live,
            cache_control: settings.cache_control(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CITATIONS_PATH, get(scholar_citations))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// A panicking handler still answers with the 500 `{error}` body.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Citation handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Unexpected citation fetch error" })),
    )
        .into_response()
}

pub async fn serve(settings: &Settings, live: LiveCitations) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;
    info!("Serving {} on {}", CITATIONS_PATH, listener.local_addr()?);
    axum::serve(listener, router(AppState::new(live, settings))).await?;
    Ok(())
}

async fn scholar_citations(State(state): State<AppState>) -> Response {
    match state.live.current().await {
        Ok(metric) => (
            [(header::CACHE_CONTROL, state.cache_control.clone())],
            Json(metric),
        )
            .into_response(),
        Err(e) => {
            warn!("Citation request failed: {}", e);
            error_response(&e)
        }
    }
}

fn error_response(e: &CitationError) -> Response {
    let message = match e {
        CitationError::UnparsableResponse => "Unable to parse total citations from Google Scholar",
        CitationError::Network(_) | CitationError::FetchFailed { .. } => {
            "Failed to fetch Google Scholar profile"
        }
        CitationError::Persistence(_) => "Unexpected citation fetch error",
    };
    let status =
        StatusCode::from_u16(e.status_class()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message }))).into_response()
}

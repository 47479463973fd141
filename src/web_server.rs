use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Serialize;
use serde_json::Value;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::ServeArgs;
use crate::decompose::{self, DecomposeError};
use crate::gemini::GeminiClient;
use crate::plan::DecomposeResponse;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    gemini: Arc<GeminiClient>,
}

impl AppState {
    pub fn new(templates_dir: impl Into<PathBuf>, gemini: GeminiClient) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            gemini: Arc::new(gemini),
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    // Templates are re-read when files under the directory change
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir.clone()));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

/// Body of every non-200 reply from `/api/decompose`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_output: Option<String>,
}

impl ErrorBody {
    fn new(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error: error.into(),
            details,
            raw_output: None,
        }
    }
}

const DECOMPOSE_FAILED: &str = "Failed to decompose goal";

impl IntoResponse for DecomposeError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            DecomposeError::InvalidInput => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(DecomposeError::InvalidInput.to_string(), None),
            ),
            DecomposeError::ProviderBlocked(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(DECOMPOSE_FAILED, Some(reason)),
            ),
            err @ DecomposeError::ProviderExtractionFailure => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(DECOMPOSE_FAILED, Some(err.to_string())),
            ),
            DecomposeError::Provider(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(DECOMPOSE_FAILED, Some(err.to_string())),
            ),
            DecomposeError::MalformedOutput {
                details,
                raw_output,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Failed to parse tasks from AI response. Output was not valid JSON."
                        .to_string(),
                    details: Some(details),
                    raw_output: Some(raw_output),
                },
            ),
            DecomposeError::SchemaViolation(violation) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Invalid data structure from AI.", Some(violation.to_string())),
            ),
        };

        if status.is_server_error() {
            error!(%status, error = %body.error, details = ?body.details, "Decompose request failed");
        } else {
            warn!(%status, error = %body.error, "Decompose request rejected");
        }
        (status, Json(body)).into_response()
    }
}

async fn index_handler(State(state): State<AppState>) -> Response {
    // Acquire env, get template, and render within the same block
    let rendered = state.templates.acquire_env().and_then(|env| {
        env.get_template("index.html").and_then(|tmpl| {
            tmpl.render(minijinja::context! {
                title => "Realism Mentor",
                model => state.gemini.model(),
            })
        })
    });

    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        }
    }
}

async fn decompose_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<DecomposeResponse>, DecomposeError> {
    let Json(body) = payload.map_err(|rejection| {
        warn!(%rejection, "Unreadable decompose request body");
        DecomposeError::InvalidInput
    })?;
    let goal = decompose::goal_from_body(&body)?;
    let weekly_plan = decompose::decompose_goal(&state.gemini, goal).await?;
    Ok(Json(DecomposeResponse { weekly_plan }))
}

/// Routes for the chat page, its assets, and the decompose API.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // Serve static files from the configured directory
    let static_files_service =
        ServeDir::new(static_dir.as_ref()).not_found_service(tower::service_fn(
            |_: Request| async {
                Ok::<_, std::convert::Infallible>(
                    (StatusCode::NOT_FOUND, "Not Found").into_response(),
                )
            },
        ));

    Router::new()
        .route("/", get(index_handler))
        .route("/api/decompose", post(decompose_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(args: &ServeArgs, gemini: GeminiClient) -> Result<()> {
    let state = AppState::new(args.templates_dir.clone(), gemini);
    let app = build_router(state, &args.static_dir);

    let addr = args.addr();
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

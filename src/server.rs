// ManimGen HTTP Server
// Copyright (c) 2026 ManimGen

use axum::{
    extract::{Path, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::agent::renderer::RenderOptions;
use crate::agent::task_store::GenerationTask;
use crate::error::{Error, Result};
use crate::state::KernelState;

pub type AppState = Arc<KernelState>;

#[derive(Debug, Deserialize)]
pub struct AnimationRequest {
    pub prompt: String,
    #[serde(default)]
    pub options: Option<RenderOptions>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub task_id: String,
    pub is_positive: bool,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedbackResponse {
    pub status: String,
    pub message: String,
    pub feedback_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_tasks: usize,
}

pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.config.media_dir);
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/generate", post(create_animation))
        .route("/status/:task_id", get(get_status))
        .route("/feedback", post(submit_feedback))
        .route("/health", get(health))
        .nest_service("/videos", media)
        .with_state(state)
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("[SERVER] Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn start_server(port: u16, state: AppState) -> std::io::Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let display_addr = if addr.ip().is_unspecified() {
        format!("127.0.0.1:{}", port)
    } else {
        addr.to_string()
    };
    info!("[SERVER] Manim Animation Generator running on http://{}", display_addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn create_animation(
    State(state): State<AppState>,
    Json(req): Json<AnimationRequest>,
) -> Result<Json<GenerationTask>> {
    if req.prompt.trim().is_empty() {
        return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
    }

    let task = state.tasks.create();
    let options = req.options.unwrap_or_default();
    info!(
        "[SERVER] Task {} queued ({} quality): {:?}",
        task.task_id,
        options.quality.as_str(),
        req.prompt
    );
    state
        .pipeline
        .spawn(task.task_id.clone(), req.prompt, options);

    Ok(Json(task))
}

async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<GenerationTask>> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| Error::NotFound("Task not found".to_string()))
}

async fn submit_feedback(
    State(state): State<AppState>,
    Json(fb): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>> {
    info!(
        "[SERVER] Feedback for {}: positive={} remove={}",
        fb.task_id, fb.is_positive, fb.remove
    );
    state
        .collector
        .update_feedback(&fb.task_id, fb.is_positive, fb.remove)
        .await?;

    let (message, feedback_type) = if fb.remove {
        ("Feedback removed", "removed")
    } else if fb.is_positive {
        ("Feedback recorded", "positive")
    } else {
        ("Feedback recorded", "negative")
    };

    Ok(Json(FeedbackResponse {
        status: "success".to_string(),
        message: message.to_string(),
        feedback_type: feedback_type.to_string(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_tasks: state.tasks.count_active(),
    })
}

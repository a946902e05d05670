// ManimGen Error Types
// Copyright (c) 2026 ManimGen

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::agent::task_store::TaskStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    /// Renderer exited non-zero or produced nothing. Carries stderr verbatim.
    #[error("Manim error: {0}")]
    Render(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    NotFound(String),

    #[error("task {task_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

//! Handler errors

use crate::auth::AuthError;
use crate::server::views::ViewError;
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AppError::Storage(StorageError::NotFound(_)) => "That item could not be found.",
            _ => "Something went wrong. Please try again.",
        }
    }
}

/// Error page that does not depend on templates rendering
fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{} · Kharcha</title></head>\
         <body><main><h1>{}</h1><p>{}</p><a href=\"/\">Back home</a></main></body></html>",
        status.canonical_reason().unwrap_or("Error"),
        status.as_u16(),
        message
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Html(error_page(status, self.message()))).into_response()
    }
}

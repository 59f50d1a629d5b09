//! Error types and their HTTP mapping
//!
//! Every fallible operation in the crate returns [`AppError`]. Handlers return it
//! directly and axum turns it into the uniform `{success: false, error, data?}`
//! envelope through the [`IntoResponse`] impl below.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::model::SiteSummary;

#[derive(Error, Debug)]
pub enum AppError {
    /// Required fields missing or malformed. Nothing was written.
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// A site with the same URL already exists in the owner's collection.
    #[error("Conflict: {message}")]
    Conflict { message: String, existing: Box<Value> },

    /// Category or tag is still referenced by at least one site.
    #[error("{entity} is still used by {} site(s)", .sites.len())]
    InUse {
        entity: String,
        sites: Vec<SiteSummary>,
    },

    #[error("Not Found: {0}")]
    NotFound(String),

    /// No undo is pending for the view, or its window has closed.
    #[error("Undo unavailable: {0}")]
    UndoUnavailable(String),

    /// The backing store call failed. The raw detail is preserved.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// An import file could not be parsed; the import was aborted.
    #[error("Import failed: {0}")]
    ImportParse(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>) -> Self {
        AppError::Validation(vec![field.into()])
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } | AppError::InUse { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UndoUnavailable(_) => StatusCode::GONE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ImportParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        let body = match self {
            AppError::Conflict { existing, .. } => json!({
                "success": false,
                "error": message,
                "code": "conflict",
                "data": existing,
            }),
            AppError::InUse { sites, .. } => json!({
                "success": false,
                "error": message,
                "code": "in_use",
                "data": { "sites": sites },
            }),
            AppError::Validation(fields) => json!({
                "success": false,
                "error": message,
                "code": "validation",
                "data": { "fields": fields },
            }),
            AppError::Upstream(detail) => {
                tracing::error!(%detail, "backing store call failed");
                json!({
                    "success": false,
                    "error": message,
                    "code": "upstream",
                    "debug": { "detail": detail },
                })
            }
            AppError::NotFound(_) => json!({ "success": false, "error": message, "code": "not_found" }),
            AppError::UndoUnavailable(_) => {
                json!({ "success": false, "error": message, "code": "undo_unavailable" })
            }
            AppError::ImportParse(_) => {
                json!({ "success": false, "error": message, "code": "import_parse" })
            }
        };

        (status, Json(body)).into_response()
    }
}

macro_rules! upstream_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AppError {
                fn from(err: $ty) -> Self {
                    AppError::Upstream(redb::Error::from(err).to_string())
                }
            }
        )*
    };
}

upstream_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Upstream(format!("record (de)serialization failed: {err}"))
    }
}

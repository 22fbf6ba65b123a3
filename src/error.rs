use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthRequired,
    AuthInvalid(String),
    NotFound(String),
    AlreadyPublished(String),
    Busy(String),
    InvalidInput(String),
    UnsupportedFileType(String),
    EmptyInput(String),
    PayloadTooLarge,
    TileServerUnready(String),
    Cancelled,
    Conflict(String),
    UpstreamFailure(String),
    DatabaseError(sea_orm::DbErr),
    InternalServerError(String),
}

impl AppError {
    /// Stable machine-readable code carried in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthRequired => "auth_required",
            AppError::AuthInvalid(_) => "auth_invalid",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyPublished(_) => "already_published",
            AppError::Busy(_) => "busy",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::UnsupportedFileType(_) => "unsupported_file_type",
            AppError::EmptyInput(_) => "empty_input",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::TileServerUnready(_) => "tile_server_unready",
            AppError::Cancelled => "cancelled",
            AppError::Conflict(_) => "conflict",
            AppError::UpstreamFailure(_) => "upstream_failure",
            AppError::DatabaseError(_) => "upstream_failure",
            AppError::InternalServerError(_) => "internal_error",
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::AuthRequired => write!(f, "authentication required"),
            AppError::AuthInvalid(msg) => write!(f, "{}", msg),
            AppError::NotFound(msg) => write!(f, "{}", msg),
            AppError::AlreadyPublished(msg) => write!(f, "{}", msg),
            AppError::Busy(msg) => write!(f, "{}", msg),
            AppError::InvalidInput(msg) => write!(f, "{}", msg),
            AppError::UnsupportedFileType(msg) => write!(f, "{}", msg),
            AppError::EmptyInput(msg) => write!(f, "{}", msg),
            AppError::PayloadTooLarge => write!(f, "request body too large"),
            AppError::TileServerUnready(msg) => write!(f, "{}", msg),
            AppError::Cancelled => write!(f, "job cancelled"),
            AppError::Conflict(msg) => write!(f, "{}", msg),
            AppError::UpstreamFailure(msg) => write!(f, "{}", msg),
            AppError::DatabaseError(e) => write!(f, "{}", e),
            AppError::InternalServerError(msg) => write!(f, "{}", msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message, detail) = match self {
            AppError::AuthRequired => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string(), None)
            }
            AppError::AuthInvalid(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::AlreadyPublished(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Busy(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::UnsupportedFileType(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::EmptyInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
                None,
            ),
            AppError::TileServerUnready(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Tile server not ready".to_string(), Some(msg))
            }
            AppError::Cancelled => (StatusCode::CONFLICT, "Job cancelled".to_string(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::UpstreamFailure(msg) => {
                eprintln!("Upstream failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service failure".to_string(),
                    Some(msg),
                )
            }
            AppError::DatabaseError(e) => {
                eprintln!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::InternalServerError(msg) => {
                eprintln!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "code": code,
            "message": message,
        });
        if let Some(detail) = detail {
            body["detail"] = json!(detail);
        }

        (status, Json(body)).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        // Constraint violations are client errors, not 500s.
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(msg)) => {
                AppError::Conflict(format!("Unique constraint violated: {}", msg))
            }
            Some(sea_orm::SqlErr::ForeignKeyConstraintViolation(msg)) => {
                AppError::InvalidInput(format!("Referenced row does not exist: {}", msg))
            }
            _ => {
                let text = err.to_string();
                if text.contains("null value in column") {
                    AppError::InvalidInput(text)
                } else {
                    AppError::DatabaseError(err)
                }
            }
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("I/O error: {}", err))
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Errors surfaced to API clients. Messages are shown verbatim by the UI.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Error interno del servidor")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("No tiene permisos para realizar esta acción".into())
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} no encontrado"))
    }

    pub fn too_large(max_bytes: usize) -> Self {
        AppError::PayloadTooLarge(format!(
            "El archivo supera el tamaño máximo permitido ({:.1} MB)",
            max_bytes as f64 / (1024.0 * 1024.0)
        ))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            error!(error = %e, "internal error");
        }
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::forbidden().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("Proyecto").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn too_large_reports_limit_in_megabytes() {
        let err = AppError::too_large(25 * 1024 * 1024);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            err.to_string(),
            "El archivo supera el tamaño máximo permitido (25.0 MB)"
        );
    }

    #[test]
    fn internal_error_hides_details() {
        let err = AppError::from(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(
            AppError::not_found("Proyecto").to_string(),
            "Proyecto no encontrado"
        );
    }
}

//! HTTP error responses for scoring failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ScoreError;

impl ScoreError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ScoreError::Validation(_) => "INVALID_CONFIGURATION",
            ScoreError::InvalidInput(_) => "BAD_REQUEST",
            ScoreError::AllPerspectivesInvalid => "ALL_PERSPECTIVES_INVALID",
            ScoreError::TransientStore(_) => "STORE_BUSY",
            ScoreError::PersistentStore(_) => "STORE_ERROR",
            ScoreError::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            ScoreError::AllModelsUnavailable { .. } => "ALL_MODELS_UNAVAILABLE",
            ScoreError::NotFound(_) => "NOT_FOUND",
            ScoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ScoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScoreError::NotFound(_) => StatusCode::NOT_FOUND,
            ScoreError::TransientStore(_)
            | ScoreError::ModelUnavailable { .. }
            | ScoreError::AllModelsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ScoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_agrees_with_server_error_flag() {
        let errors = vec![
            ScoreError::Validation("x".into()),
            ScoreError::InvalidInput("x".into()),
            ScoreError::AllPerspectivesInvalid,
            ScoreError::TransientStore("x".into()),
            ScoreError::PersistentStore("x".into()),
            ScoreError::all_models_unavailable(ScoreError::Internal("x".into())),
            ScoreError::NotFound("x".into()),
            ScoreError::Internal("x".into()),
        ];
        for err in errors {
            assert_eq!(
                err.status_code().is_server_error(),
                err.is_server_error(),
                "mismatch for {}",
                err.code()
            );
        }
    }

    #[test]
    fn test_all_invalid_is_not_a_success_response() {
        let response = ScoreError::AllPerspectivesInvalid.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

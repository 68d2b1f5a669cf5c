use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;
use tracing::error;
use uptime_service::ManagementError;

use crate::response::Envelope;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Management(#[from] ManagementError),
    #[error("missing or empty X-User-Id header")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Management(ManagementError::Validation(_) | ManagementError::Duplicate) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Management(ManagementError::NotFound) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Management(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(Envelope::failure(message))
    }
}

use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use transformations::TransformationError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transformation error: {0}")]
    Transformation(#[from] TransformationError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        let (mut status, error_type) = match self {
            Self::Internal(_) | Self::Io(_) => {
                (HttpResponse::InternalServerError(), "internal_error")
            }
            Self::InvalidInput(_) | Self::Multipart(_) => {
                (HttpResponse::BadRequest(), "invalid_request")
            }
            Self::Transformation(e) => match e {
                TransformationError::Decode(_) | TransformationError::Encode(_) => {
                    (HttpResponse::UnprocessableEntity(), e.kind())
                }
                TransformationError::UnsupportedTransform(_)
                | TransformationError::InvalidInput(_) => (HttpResponse::BadRequest(), e.kind()),
                TransformationError::BufferError(_) => {
                    (HttpResponse::InternalServerError(), e.kind())
                }
            },
        };

        status.json(serde_json::json!({
            "error": error_type,
            "message": self.to_string()
        }))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GatewayError::InvalidInput("test input".to_string());
        assert_eq!(error.to_string(), "Invalid input: test input");
    }

    #[test]
    fn test_error_response_status_codes() {
        let internal = GatewayError::Internal("boom".to_string());
        assert_eq!(internal.error_response().status(), 500);

        let input_error = GatewayError::InvalidInput("Bad input".to_string());
        assert_eq!(input_error.error_response().status(), 400);

        let decode = GatewayError::from(TransformationError::Decode("bad png".to_string()));
        assert_eq!(decode.error_response().status(), 422);

        let unsupported =
            GatewayError::from(TransformationError::UnsupportedTransform("x".to_string()));
        assert_eq!(unsupported.error_response().status(), 400);
    }
}

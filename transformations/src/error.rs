use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformationError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported transform type: {0}")]
    UnsupportedTransform(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Buffer error: {0}")]
    BufferError(String),
}

impl TransformationError {
    /// Short machine-readable kind, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::UnsupportedTransform(_) => "unsupported_transform",
            Self::Encode(_) => "encode_error",
            Self::InvalidInput(_) => "invalid_request",
            Self::BufferError(_) => "buffer_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformationError>;

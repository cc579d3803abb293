use thiserror::Error;

use storage::StorageError;

use crate::{Payload, Response, Status};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn into_response(self) -> Response {
        let (kind, target) = match &self {
            ApiError::Storage(err) => (err.kind(), err.target()),
            ApiError::BadRequest(_) => ("BadRequest", None),
            ApiError::InternalError(_) => ("Internal", None),
        };

        Response {
            status: Status::Error,
            message: self.to_string(),
            payload: Some(Payload::Failure {
                kind: kind.to_string(),
                target,
            }),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

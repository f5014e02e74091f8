use hyper::StatusCode;
use thiserror::Error;

/// Errors that can occur while serving edge requests
#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),

    #[error("store error: {0}")]
    Store(#[from] settings::store::StoreError),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Upstream request failed for {0}: {1}")]
    UpstreamRequestFailed(String, String),

    #[error("Upstream timeout for {0}")]
    UpstreamTimeout(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl EdgeError {
    /// Status code reported to the client when a handler fails with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            EdgeError::UpstreamRequestFailed(..) => StatusCode::BAD_GATEWAY,
            EdgeError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EdgeError::RequestBodyError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use healthid::{Error, InvalidHid};
use serde::Serialize;

/// Every way a request can fail, as seen by an HTTP client.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] Error),

    #[error(transparent)]
    InvalidHid(#[from] InvalidHid),

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Service is shutting down")]
    ServiceShutdown,

    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Engine(err) => match err {
                Error::Validation(_) | Error::UnknownOwner { .. } | Error::InvalidOwner { .. } => {
                    StatusCode::BAD_REQUEST
                }
                Error::PoolExhausted | Error::HidNotFound { .. } => StatusCode::NOT_FOUND,
                Error::StoreUnavailable { .. } | Error::CursorContention { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                Error::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidHid(_) | Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Self::ChannelError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable name of the failure.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Engine(err) => match err {
                Error::Validation(_) => "validation",
                Error::PoolExhausted => "pool_exhausted",
                Error::StoreUnavailable { .. } => "store_unavailable",
                Error::UnknownOwner { .. } => "unknown_owner",
                Error::InvalidOwner { .. } => "invalid_owner",
                Error::HidNotFound { .. } => "hid_not_found",
                Error::CursorContention { .. } => "cursor_contention",
                Error::InvalidConfig { .. } => "internal",
            },
            Self::InvalidHid(_) => "invalid_hid",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ServiceShutdown => "service_shutdown",
            Self::ChannelError { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Request failed: {self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

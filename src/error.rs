//! Error taxonomy for the HTTP/WebSocket surface.
//!
//! Internal components return `anyhow::Result`; this type is the single
//! place that maps failures onto the wire-visible `{code, message}` shape
//! and HTTP status from spec §7. SSH/SFTP error text never crosses this
//! boundary unmapped.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("credential not found")]
    CredentialNotFound,
    #[error("SFTP error: {0}")]
    Sftp(String),
    #[error("SFTP not initialized: {0}")]
    SftpNotInitialized(String),
    #[error("access denied")]
    AccessDenied,
    #[error("session connect failed: {0}")]
    ConnectFailed(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl BrokerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::CredentialNotFound => "CREDENTIAL_NOT_FOUND",
            Self::Sftp(_) => "SFTP_ERROR",
            Self::SftpNotInitialized(_) => "SFTP_NOT_INITIALIZED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::ConnectFailed(_) => "CONNECT_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound | Self::CredentialNotFound => StatusCode::NOT_FOUND,
            Self::Sftp(_) | Self::SftpNotInitialized(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::AccessDenied => StatusCode::UNAUTHORIZED,
            Self::ConnectFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<crate::session::SftpFailure> for BrokerError {
    fn from(f: crate::session::SftpFailure) -> Self {
        match f {
            crate::session::SftpFailure::NotInitialized(e) => Self::SftpNotInitialized(e),
            crate::session::SftpFailure::Io(e) => Self::Sftp(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal failure surfaced to client");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

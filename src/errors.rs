use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every way a redemption or download can fail.
/// Status codes: validation 400, code/token state 401, missing file 404.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing code or img")]
    MissingFields,

    #[error("missing token or img")]
    MissingParams,

    #[error("protected file not found: {0}")]
    FileNotFound(String),

    #[error("invalid redemption code")]
    InvalidCode,

    #[error("redemption code already used")]
    CodeAlreadyUsed,

    #[error("token invalid or expired")]
    TokenNotFound,

    #[error("token expired")]
    TokenExpired,

    #[error("token already used")]
    TokenAlreadyUsed,

    #[error("token does not match the requested file")]
    TokenFileMismatch,

    #[error("too many outstanding download tokens, try again later")]
    TokenStoreFull,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingFields | GatewayError::MissingParams => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::FileNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidCode
            | GatewayError::CodeAlreadyUsed
            | GatewayError::TokenNotFound
            | GatewayError::TokenExpired
            | GatewayError::TokenAlreadyUsed
            | GatewayError::TokenFileMismatch => StatusCode::UNAUTHORIZED,
            GatewayError::TokenStoreFull => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Message safe to hand to clients, internals stay in the logs
    fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(err) => {
                error!(
                    error = ?err,
                    backtrace = ?err.backtrace(),
                    "Internal Server error"
                );
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Plain text body, used by the download route
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, self.public_message()).into_response()
    }
}

/// `{ok: false, msg}` body, used by the redemption route
pub struct JsonError(pub GatewayError);

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = Json(json!({
            "ok": false,
            "msg": self.0.public_message(),
        }));
        (status, body).into_response()
    }
}

impl From<GatewayError> for JsonError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

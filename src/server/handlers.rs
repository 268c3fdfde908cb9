use crate::config;
use crate::errors::{GatewayError, JsonError};
use crate::guard::ProtectedFiles;
use crate::server::state::AppState;
use crate::tokens;
use axum::{
    body::Body,
    extract::{Query, State},
    http::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub const BANNER: &str = "Backend is running. Use /health /redeem /download";

#[derive(Debug, Default, Deserialize)]
pub struct RedeemRequest {
    pub code: Option<String>,
    pub img: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub ok: bool,
    pub msg: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub token: Option<String>,
    pub img: Option<String>,
}

pub async fn banner() -> &'static str {
    BANNER
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "ok": true,
        "msg": "server is running"
    }))
}

pub async fn redeem(
    State(state): State<AppState>,
    // Missing or unparseable bodies fall through to the 400 below
    body: Option<Json<RedeemRequest>>,
) -> Result<Json<RedeemResponse>, JsonError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let (code, img) = match (non_empty(&req.code), non_empty(&req.img)) {
        (Some(code), Some(img)) => (code, img),
        _ => return Err(GatewayError::MissingFields.into()),
    };

    let issued = state
        .ledger
        .redeem(code, img)
        .await
        .inspect_err(|e| log_rejection("Redemption", e))?;

    Ok(Json(RedeemResponse {
        ok: true,
        msg: format!(
            "Redeemed! Download token issued (valid for {}, single use)",
            config::describe_ttl(state.tokens.ttl())
        ),
        token: issued.token,
    }))
}

pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response<Body>, GatewayError> {
    let (token, img) = match (non_empty(&params.token), non_empty(&params.img)) {
        (Some(token), Some(img)) => (token, img),
        _ => return Err(GatewayError::MissingParams),
    };

    release(&state, token, img)
        .await
        .inspect_err(|e| log_rejection("Download", e))
}

// Token state is checked before the disk so unauthenticated callers
// cannot learn which files exist. The token is only burned once the
// file is known to be there.
async fn release(state: &AppState, token: &str, img: &str) -> Result<Response<Body>, GatewayError> {
    // Tokens are only ever bound to sanitized names, so an unusable name
    // cannot match one
    let Ok(img) = ProtectedFiles::sanitize(img) else {
        state.tokens.validate(token, img)?;
        return Err(GatewayError::TokenFileMismatch);
    };

    state.tokens.validate(token, &img)?;
    let file = state.files.resolve(&img).await?;
    state.tokens.validate_and_consume(token, &img)?;

    info!(
        token = tokens::short(token),
        img = %file.name,
        "Download released"
    );

    state.files.attachment(&file).await
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn log_rejection(action: &str, err: &GatewayError) {
    // Internal errors are logged with their chain when rendered
    if !matches!(err, GatewayError::Internal(_)) {
        info!(status = err.status().as_u16(), reason = %err, "{} rejected", action);
    }
}

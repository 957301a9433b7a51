//! Credential issuance and the token guard.

use super::reject;
use crate::access::{self, INVITE_LIMITER, TOKENS};
use crate::error::AccessError;
use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Query};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Middleware for every non-credential route: a request passes iff its
/// `X-API-KEY` header resolves in the token store.
pub async fn require_token(request: Request<Body>, next: Next) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    match presented {
        Some(token) if TOKENS.verify_token(token) => next.run(request).await,
        _ => reject(StatusCode::FORBIDDEN, AccessError::InvalidToken),
    }
}

fn guard_source(addr: &SocketAddr) -> Option<Response> {
    if !access::is_local_network(addr.ip()) {
        return Some(reject(StatusCode::FORBIDDEN, AccessError::NotLocalNetwork));
    }
    if !INVITE_LIMITER.check(addr.ip()) {
        return Some(reject(
            StatusCode::TOO_MANY_REQUESTS,
            AccessError::RateLimited,
        ));
    }
    None
}

pub async fn create_invitation(ConnectInfo(addr): ConnectInfo<SocketAddr>) -> Response {
    if let Some(denied) = guard_source(&addr) {
        return denied;
    }
    match TOKENS.create_invitation() {
        Ok(invitation) => Json(json!({
            "code": invitation.code,
            "expires_at": invitation.expires_at,
        }))
        .into_response(),
        Err(err) => {
            error!("failed to create invitation: {err}");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create invitation",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    invitation_code: String,
}

pub async fn create_token(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
) -> Response {
    if let Some(denied) = guard_source(&addr) {
        return denied;
    }
    match TOKENS.redeem_invitation(&query.invitation_code) {
        Ok(token) => Json(json!({ "token": token })).into_response(),
        Err(err) => reject(StatusCode::BAD_REQUEST, err),
    }
}

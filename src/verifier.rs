use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

const DENY_TOKENS: [&str; 5] = ["blocked", "deny", "forbidden", "403", "9999"];

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub caller: Option<String>,
    pub callee: Option<String>,
}

/// Reference verification service: denies recording when either party
/// contains a well-known deny token.
pub fn router() -> Router {
    Router::new()
        .route("/verify", get(verify))
        .fallback(not_found)
}

async fn verify(Query(query): Query<VerifyQuery>) -> impl IntoResponse {
    let allow = should_allow(
        query.caller.as_deref().unwrap_or_default(),
        query.callee.as_deref().unwrap_or_default(),
    );
    let reason = if allow {
        "allowed by test verifier"
    } else {
        "denied by test verifier"
    };
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({ "record": allow, "reason": reason })),
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "ok": false })))
}

pub fn should_allow(caller: &str, callee: &str) -> bool {
    let mut tokens = parse_tokens(caller);
    tokens.extend(parse_tokens(callee));
    !DENY_TOKENS.iter().any(|d| tokens.contains(*d))
}

/// Splits a party string such as `"Alice" <sip:alice@example.com>` into
/// lowercase tokens: each whole address plus its user and host parts.
pub fn parse_tokens(value: &str) -> HashSet<String> {
    let value = value.to_lowercase();
    let mut tokens = HashSet::new();
    for part in value.split(|c: char| c.is_whitespace() || c == '<' || c == '>') {
        if part.is_empty() {
            continue;
        }
        let part = part
            .strip_prefix("sips:")
            .or_else(|| part.strip_prefix("sip:"))
            .unwrap_or(part);
        if let Some((user, host)) = part.split_once('@') {
            tokens.insert(user.to_string());
            tokens.insert(host.to_string());
        }
        tokens.insert(part.to_string());
    }
    tokens
}

use std::{fmt::Display, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use code_checker_core::config::Config;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parse an `X-Hub-Signature-256` value (`sha256=<hex>`) into raw bytes.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix("sha256=")?).ok()
}

/// Compute the `sha256=<hex>` header value GitHub sends for `payload`.
pub fn signature_header(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify `signature_header` against the raw payload bytes in constant time.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Verified GitHub delivery: the event name and the exact bytes that were signed.
#[derive(Clone)]
#[must_use]
pub struct GitHubEvent {
    pub kind: Option<String>,
    pub delivery: Option<String>,
    pub body: Bytes,
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        fn err(m: impl Display) -> Response {
            tracing::error!("{m}");
            (StatusCode::BAD_REQUEST, m.to_string()).into_response()
        }
        // Owned copies only: nothing borrowing `req` may live across the body await
        let (kind, delivery, signature) = {
            let header = |name: &str| {
                req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
            };
            (header("X-GitHub-Event"), header("X-GitHub-Delivery"), header("X-Hub-Signature-256"))
        };
        let signature = signature.ok_or_else(|| err("X-Hub-Signature-256 missing"))?;
        let config = <Arc<Config>>::from_ref(state);
        let body = Bytes::from_request(req, state).await.map_err(|_| err("error reading body"))?;
        if !verify_signature(&body, &signature, config.github.app.webhook_secret.as_bytes()) {
            return Err(err("Invalid signature"));
        }
        Ok(GitHubEvent { kind, delivery, body })
    }
}

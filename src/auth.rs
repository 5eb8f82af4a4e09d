use std::sync::Arc;

use poem::http::{Method, StatusCode};
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use poem_openapi::payload::Json;

use crate::response::Detail;

/// The header callers pass the shared secret in.
pub const TOKEN_HEADER: &str = "token";

/// Rejects any request without the shared secret before it reaches a
/// handler. The liveness probe is the only route left open.
pub struct TokenGuard {
    token: Arc<str>,
}

impl TokenGuard {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self { token: token.into() }
    }
}

impl<E: Endpoint> Middleware<E> for TokenGuard {
    type Output = TokenGuardEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        TokenGuardEndpoint {
            inner: ep,
            token: self.token.clone(),
        }
    }
}

pub struct TokenGuardEndpoint<E> {
    inner: E,
    token: Arc<str>,
}

impl<E: Endpoint> Endpoint for TokenGuardEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        if !is_liveness_probe(&req) {
            let given = req
                .headers()
                .get(TOKEN_HEADER)
                .map(|v| v.as_bytes())
                .unwrap_or_default();

            if given.is_empty() {
                return Ok(unauthorized("API token required"));
            }

            if given != self.token.as_bytes() {
                return Ok(unauthorized("Invalid API token"));
            }
        }

        self.inner.call(req).await.map(IntoResponse::into_response)
    }
}

fn is_liveness_probe(req: &Request) -> bool {
    req.method() == Method::GET && req.uri().path() == "/"
}

fn unauthorized(message: &str) -> Response {
    Json(Detail::new(message))
        .with_status(StatusCode::UNAUTHORIZED)
        .into_response()
}

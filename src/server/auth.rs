//! Bearer secret authentication

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::warn;

use super::{ApiError, AppState};

/// Use the configured secret, or generate one for this process
pub fn resolve_secret(configured: Option<String>) -> String {
    match configured.filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => {
            let secret = hex::encode(rand::random::<[u8; 32]>());
            warn!(
                "GRADER_SECRET not set. Generated {}. Set a secret in production.",
                secret
            );
            secret
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

pub(crate) async fn require_secret(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match bearer_token(&req) {
        Some(token) if token == state.secret => Ok(next.run(req).await),
        Some(_) => Err(ApiError::forbidden("Invalid secret")),
        None => Err(ApiError::forbidden("Not authenticated")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/cache");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&request(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&request(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&request(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&request(None)), None);
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret(Some("fixed".to_string())), "fixed");

        let generated = resolve_secret(Some(String::new()));
        assert_eq!(generated.len(), 64);
        assert_ne!(generated, resolve_secret(None));
    }
}

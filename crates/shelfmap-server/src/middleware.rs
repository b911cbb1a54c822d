use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shelfmap_core::Actor;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Actor recorded when admin auth is disabled in development.
const DEVELOPMENT_ACTOR: &str = "development";

fn token_matches(candidate: &str, token: &str) -> bool {
    candidate.as_bytes().ct_eq(token.as_bytes()).into()
}

fn parse_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// API key auth settings used by middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `SHELFMAP_API_KEYS` (comma-separated bearer tokens).
    ///
    /// In development, empty/missing keys disable auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("SHELFMAP_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: Vec<String> = parse_list(raw).map(ToOwned::to_owned).collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "SHELFMAP_API_KEYS not set; bearer auth disabled in development environment"
                );
                return Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "SHELFMAP_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        // No short-circuit, so timing does not reveal which key matched.
        self.api_keys
            .iter()
            .fold(false, |found, key| found | token_matches(key, token))
    }
}

/// Admin tokens, each bound to the actor recorded as reviewer.
#[derive(Debug, Clone)]
pub struct AdminAuthState {
    admins: Arc<Vec<(Actor, String)>>,
    pub enabled: bool,
}

impl AdminAuthState {
    /// Builds admin auth from `SHELFMAP_ADMIN_KEYS` (comma-separated
    /// `actor:token` pairs).
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("SHELFMAP_ADMIN_KEYS").unwrap_or_default();
        Self::from_pairs(&raw, is_development)
    }

    pub fn from_pairs(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut admins = Vec::new();
        for pair in parse_list(raw) {
            let Some((actor, token)) = pair.split_once(':') else {
                anyhow::bail!("SHELFMAP_ADMIN_KEYS entries must look like actor:token");
            };
            let (actor, token) = (actor.trim(), token.trim());
            if actor.is_empty() || token.is_empty() {
                anyhow::bail!("SHELFMAP_ADMIN_KEYS entries need a non-empty actor and token");
            }
            admins.push((Actor::new(actor), token.to_string()));
        }

        if admins.is_empty() {
            if is_development {
                tracing::warn!(
                    "SHELFMAP_ADMIN_KEYS not set; admin routes open in development environment"
                );
                return Ok(Self {
                    admins: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "SHELFMAP_ADMIN_KEYS is required outside development; provide actor:token pairs"
            );
        }

        Ok(Self {
            admins: Arc::new(admins),
            enabled: true,
        })
    }

    fn actor_for(&self, token: &str) -> Option<Actor> {
        let mut matched = None;
        for (actor, key) in self.admins.iter() {
            if token_matches(key, token) && matched.is_none() {
                matched = Some(actor.clone());
            }
        }
        matched
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Sliding fixed-window limiter for simple API protection.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is inserted into request
/// extensions as [`RequestId`] and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Middleware admitting only admin tokens; the matching [`Actor`] is
/// inserted into request extensions.
pub async fn require_admin(
    State(admin): State<AdminAuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !admin.enabled {
        req.extensions_mut().insert(Actor::new(DEVELOPMENT_ACTOR));
        return next.run(req).await;
    }

    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        );
    };

    match admin.actor_for(token) {
        Some(actor) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        None => reject(
            StatusCode::FORBIDDEN,
            "forbidden",
            "admin privileges required",
        ),
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn auth_state_disables_when_no_keys_in_dev() {
        let state = AuthState::from_keys("", true).expect("dev should allow missing keys");
        assert!(!state.enabled);
    }

    #[test]
    fn auth_state_requires_keys_outside_dev() {
        assert!(AuthState::from_keys(" , ", false).is_err());
    }

    #[test]
    fn auth_state_matches_any_configured_key() {
        let state = AuthState::from_keys("alpha, beta", false).expect("keys");
        assert!(state.allows("beta"));
        assert!(!state.allows("bet"));
        assert!(!state.allows("gamma"));
    }

    #[test]
    fn admin_pairs_resolve_actor() {
        let state = AdminAuthState::from_pairs("maria:tok-1,jose:tok-2", false).expect("pairs");
        assert_eq!(state.actor_for("tok-2"), Some(Actor::new("jose")));
        assert_eq!(state.actor_for("tok-3"), None);
    }

    #[test]
    fn admin_pairs_reject_malformed_entries() {
        assert!(AdminAuthState::from_pairs("no-separator", false).is_err());
        assert!(AdminAuthState::from_pairs(":token", false).is_err());
        assert!(AdminAuthState::from_pairs("", false).is_err());
        assert!(!AdminAuthState::from_pairs("", true).expect("dev").enabled);
    }
}

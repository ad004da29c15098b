//! HTTP surface: shared state, router assembly, CORS, and the chatbot rate
//! limiter.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{
    ConnectInfo, DefaultBodyLimit, FromRequest, FromRequestParts, Request, State,
};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Extensions, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analytics::{FunnelTracker, analytics_routes};
use crate::chat::{SessionManager, chat_routes, chat_ws_routes};
use crate::config::{FunnelConfig, RateLimitConfig};
use crate::email::{Outbox, email_routes};
use crate::error::{ApiError, ConfigError};
use crate::leads::{LeadRegistry, lead_routes};

/// Headers added to every response unless a handler already set them.
const SECURITY_HEADERS: [(HeaderName, &str); 9] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::X_DNS_PREFETCH_CONTROL, "off"),
    (header::X_XSS_PROTECTION, "0"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=15552000; includeSubDomains",
    ),
    (
        HeaderName::from_static("cross-origin-opener-policy"),
        "same-origin",
    ),
    (
        HeaderName::from_static("cross-origin-resource-policy"),
        "same-origin",
    ),
    (
        HeaderName::from_static("x-permitted-cross-domain-policies"),
        "none",
    ),
];

/// Largest accepted request body.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Every in-memory service behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub leads: Arc<LeadRegistry>,
    pub outbox: Arc<Outbox>,
    pub tracker: Arc<FunnelTracker>,
    pub limiter: Arc<ChatRateLimiter>,
}

impl AppState {
    pub fn new(config: &FunnelConfig) -> Result<Self, ConfigError> {
        let leads = LeadRegistry::new(config.history_retention);
        Ok(Self {
            sessions: SessionManager::new(&config.session),
            outbox: Outbox::new(&config.email_from, Arc::clone(&leads))?,
            leads,
            tracker: FunnelTracker::new(),
            limiter: Arc::new(ChatRateLimiter::new(&config.rate_limit)?),
        })
    }
}

/// Assemble the full router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate limiter can key on the peer address.
pub fn app(state: &AppState, config: &FunnelConfig) -> Router {
    let chatbot = chat_routes(Arc::clone(&state.sessions)).layer(middleware::from_fn_with_state(
        Arc::clone(&state.limiter),
        rate_limit,
    ));

    let router = Router::new()
        .route("/health", get(health).with_state(config.environment.as_str()))
        .nest("/api/chatbot", chatbot)
        .nest("/api/leads", lead_routes(Arc::clone(&state.leads)))
        .nest("/api/email", email_routes(Arc::clone(&state.outbox)))
        .nest("/api/analytics", analytics_routes(Arc::clone(&state.tracker)))
        .merge(chat_ws_routes(Arc::clone(&state.sessions)))
        .layer(Extension(TrustedProxies(config.trusted_proxies)))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(&config.allowed_origins));

    with_security_headers(router).layer(CompressionLayer::new())
}

fn with_security_headers(mut router: Router) -> Router {
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ));
    }
    router
}

async fn health(State(environment): State<&'static str>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "environment": environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Parse a path or body id, naming the kind of id in the error.
pub fn parse_id(raw: &str, kind: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid {kind} ID")))
}

// ── Client metadata ─────────────────────────────────────────────────────

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Number of reverse proxies in front of the server, set per request by
/// [`app`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedProxies(pub usize);

/// Client address for rate limiting and lead metadata.
///
/// Without trusted proxies this is the peer address. With `n` trusted
/// proxies it is the `n`-th `X-Forwarded-For` entry from the right, since
/// entries further left are written by the client.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let hops = extensions.get::<TrustedProxies>().map_or(0, |t| t.0);
    if hops == 0 {
        return peer;
    }
    forwarded_client(headers, hops).or(peer)
}

fn forwarded_client(headers: &HeaderMap, hops: usize) -> Option<IpAddr> {
    let chain: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();
    // A chain shorter than the proxy count resolves to its left-most entry.
    let index = chain.len().saturating_sub(hops);
    chain.get(index)?.parse().ok()
}

/// Request metadata recorded alongside leads and visitors.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let text = |name: HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Ok(Self {
            ip: client_ip(&parts.headers, &parts.extensions),
            user_agent: text(header::USER_AGENT),
            referrer: text(header::REFERER),
        })
    }
}

/// JSON body extractor whose rejections render as [`ApiError`] bodies.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// ── Rate limiting ───────────────────────────────────────────────────────

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Per-IP limiter for the chatbot endpoints.
///
/// Allows `max_requests` in a burst, refilling one slot every
/// `window / max_requests`.
pub struct ChatRateLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
}

impl ChatRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "FUNNEL_CHAT_RATE_LIMIT".into(),
            message: message.into(),
        };
        let burst = NonZeroU32::new(config.max_requests)
            .ok_or_else(|| invalid("limit must be non-zero"))?;
        let quota = Quota::with_period(config.window / config.max_requests)
            .ok_or_else(|| invalid("window too short for limit"))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        })
    }

    /// Take one request slot for `ip`. On refusal, returns how many whole
    /// seconds until a slot frees up.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }

    /// Forget clients whose buckets have fully refilled.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

async fn rate_limit(
    State(limiter): State<Arc<ChatRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), request.extensions())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if let Err(retry_after) = limiter.check(ip) {
        debug!(ip = %ip, retry_after, "Chat request rate limited");
        let mut response = ApiError::too_many_requests().into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    next.run(request).await
}

/// Spawn a background task that periodically prunes idle limiter entries.
pub fn spawn_limiter_pruner(
    limiter: Arc<ChatRateLimiter>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            limiter.prune();
            debug!(clients = limiter.tracked_clients(), "Pruned rate limiter");
        }
    })
}

//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod categories;
pub mod circulation;
pub mod fines;
pub mod health;
pub mod openapi;
pub mod users;

use std::{any::Any, net::SocketAddr};

use axum::{
    async_trait,
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        request::Parts,
        Method,
    },
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    extract::{cookie::CookieJar, Multipart},
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::{PeerIpKeyExtractor, SmartIpKeyExtractor},
    GovernorLayer,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    logging::SECURITY_TARGET,
    models::{audit::ClientInfo, user::SessionClaims},
    AppState,
};

/// Header carrying the double-submit CSRF token
pub const CSRF_HEADER: &str = "x-csrf-token";

const ADMIN_REQUIRED: &str = "Access denied. Admin privileges required.";

/// Where the session token was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Bearer,
    Cookie,
}

async fn session_token(parts: &mut Parts, state: &AppState) -> Option<(String, SessionSource)> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Some((bearer.token().to_string(), SessionSource::Bearer));
    }

    CookieJar::from_headers(&parts.headers)
        .get(&state.config.auth.cookie_name)
        .map(|cookie| (cookie.value().to_string(), SessionSource::Cookie))
}

/// Unsafe methods on cookie sessions must echo the session's CSRF token
pub fn check_csrf(source: SessionSource, method: &Method, header: Option<&str>, expected: &str) -> AppResult<()> {
    if source == SessionSource::Bearer || method.is_safe() {
        return Ok(());
    }

    match header {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(AppError::Authorization("CSRF token missing or incorrect.".to_string())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor for an authenticated user (session cookie or Bearer token)
pub struct AuthenticatedUser(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (token, source) = session_token(parts, state).await.ok_or_else(|| {
            AppError::Authentication("Authentication credentials were not provided.".to_string())
        })?;

        let mut claims = state.services.users.verify_session(&token).await?;

        let csrf = parts.headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
        check_csrf(source, &parts.method, csrf, &claims.csrf)?;

        // Deactivation and role changes apply to open sessions
        let user = state
            .services
            .users
            .get_by_id(claims.user_id)
            .await
            .map_err(|_| AppError::Authentication("Invalid or expired session".to_string()))?;
        if !user.is_active {
            return Err(AppError::Authentication("User account is disabled.".to_string()));
        }
        claims.role = user.role;

        Ok(AuthenticatedUser(claims))
    }
}

/// Session claims when a valid session is present, for public endpoints
pub struct OptionalUser(pub Option<SessionClaims>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some((token, _)) = session_token(parts, state).await else {
            return Ok(OptionalUser(None));
        };
        Ok(OptionalUser(state.services.users.verify_session(&token).await.ok()))
    }
}

/// Administrator session; anonymous callers are refused with 403 as well
pub struct AdminUser(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(AuthenticatedUser(claims)) if claims.role.can_view_audit_log() => Ok(AdminUser(claims)),
            Ok(_) | Err(AppError::Authentication(_)) => {
                tracing::warn!(target: SECURITY_TARGET, "Refused admin-only request to {}", parts.uri.path());
                Err(AppError::Authorization(ADMIN_REQUIRED.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Client address and user agent, for the audit trail
pub struct ClientContext(pub ClientInfo);

#[async_trait]
impl FromRequestParts<AppState> for ClientContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let forwarded = state.config.server.trusted_proxy;
        Ok(ClientContext(ClientInfo::new(
            client_ip(&parts.headers, peer, forwarded),
            user_agent,
        )))
    }
}

/// Socket peer address. Behind a trusted proxy the first `X-Forwarded-For`
/// entry wins instead.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|ip| ip.parse::<std::net::IpAddr>().ok());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}

/// Read one file field from a multipart body
pub async fn read_upload(mut multipart: Multipart, field_name: &str) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        return Ok((file_name, data));
    }

    Err(AppError::Validation(format!("No file was submitted in field '{}'.", field_name)))
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Accounts
        .merge(throttled_auth_routes(&config))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile).put(auth::update_profile))
        .route("/auth/profile/picture", post(auth::upload_profile_picture))
        .route("/auth/audit-log", get(auth::audit_log))
        .route("/users", get(users::list_users))
        .route("/users/:id/role", put(users::change_role))
        .route("/users/:id/active", put(users::set_active))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        .route("/books/:id/cover", post(books::upload_cover))
        .route("/categories", get(categories::list_categories).post(categories::create_category))
        // Circulation
        .route("/books/:id/borrow", post(circulation::borrow_book))
        .route("/books/:id/reserve", post(circulation::reserve_book))
        .route("/borrows/:id/return", post(circulation::return_book))
        .route("/my-books", get(circulation::my_books))
        .route("/reservations/:id/cancel", post(circulation::cancel_reservation))
        // Fines
        .route("/fines", get(fines::list_fines))
        .route("/fines/:id/pay", post(fines::pay_fine))
        .route("/fines/:id/waive", post(fines::waive_fine))
        .with_state(state);

    let mut app = Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router());

    if config.debug {
        app = app.nest_service("/media", ServeDir::new(&config.uploads.media_root));
    }

    let hsts = (!config.debug)
        .then(|| HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"));

    app.fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(header::STRICT_TRANSPORT_SECURITY, hsts))
        .layer(cors_layer(&config))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Login and registration, rate limited per client IP when enabled
fn throttled_auth_routes(config: &AppConfig) -> Router<AppState> {
    let routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    if !config.rate_limit.enabled {
        return routes;
    }

    // Forwarded headers are client-controlled unless a proxy we run rewrites them.
    // The layer borrows its config for the life of the process.
    let throttled = if config.server.trusted_proxy {
        GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(config.rate_limit.per_second)
            .burst_size(config.rate_limit.burst_size)
            .finish()
            .map(|governor| {
                routes.clone().layer(GovernorLayer {
                    config: &*Box::leak(Box::new(governor)),
                })
            })
    } else {
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(config.rate_limit.per_second)
            .burst_size(config.rate_limit.burst_size)
            .finish()
            .map(|governor| {
                routes.clone().layer(GovernorLayer {
                    config: &*Box::leak(Box::new(governor)),
                })
            })
    };

    throttled.unwrap_or_else(|| {
        tracing::warn!("Invalid rate limit settings; login throttling disabled");
        routes
    })
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
}

async fn not_found() -> AppError {
    AppError::NotFound("The requested resource was not found.".to_string())
}

fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    AppError::Internal("Request handler panicked".to_string()).into_response()
}

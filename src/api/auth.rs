//! Authentication and own-account endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    Multipart,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        audit::{AuditLog, AuditQuery},
        user::{LoginRequest, RegisterUser, UpdateProfile, User},
    },
    AppState,
};

use super::{books::PaginatedResponse, read_upload, AdminUser, AuthenticatedUser, ClientContext};

/// Login response
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// Session token, also set as an HttpOnly cookie
    pub token: String,
    pub token_type: String,
    /// Send back in `X-CSRF-Token` on unsafe requests made with the cookie
    pub csrf_token: String,
    pub expires_in: i64,
    pub user: User,
}

/// Multipart form for `POST /auth/profile/picture`
#[derive(ToSchema)]
pub struct ProfilePictureForm {
    /// JPEG, PNG, GIF or WebP image
    #[schema(value_type = String, format = Binary)]
    pub profile_picture: Vec<u8>,
}

/// Register a new student account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid form", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ClientContext(client): ClientContext,
    Json(form): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.register(form, &client).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientContext(client): ClientContext,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let session = state.services.users.login(&request, &client).await?;

    let cookie = Cookie::build((state.config.auth.cookie_name.clone(), session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookies());

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: session.token,
            token_type: "Bearer".to_string(),
            csrf_token: session.claims.csrf,
            expires_in: state.config.auth.session_seconds,
            user: session.user,
        }),
    ))
}

/// Logout and revoke the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    jar: CookieJar,
) -> AppResult<(StatusCode, CookieJar)> {
    state.services.users.logout(&claims, &client).await?;

    let jar = jar.remove(Cookie::build((state.config.auth.cookie_name.clone(), "")).path("/"));
    Ok((StatusCode::NO_CONTENT, jar))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_id(claims.user_id).await?;
    Ok(Json(user))
}

/// Update own profile
#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    profile.validate()?;

    let user = state
        .services
        .users
        .update_profile(claims.user_id, profile, &client)
        .await?;
    Ok(Json(user))
}

/// Upload a new profile picture (multipart field `profile_picture`)
#[utoipa::path(
    post,
    path = "/auth/profile/picture",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body(content = ProfilePictureForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Picture stored", body = User),
        (status = 400, description = "Rejected image"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    multipart: Multipart,
) -> AppResult<Json<User>> {
    let (file_name, data) = read_upload(multipart, "profile_picture").await?;

    let user = state
        .services
        .users
        .set_profile_picture(claims.user_id, &file_name, &data, &client)
        .await?;
    Ok(Json(user))
}

/// Browse the audit log (administrators only)
#[utoipa::path(
    get,
    path = "/auth/audit-log",
    tag = "auth",
    security(("bearer_auth" = [])),
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = PaginatedResponse<AuditLog>),
        (status = 403, description = "Access denied. Admin privileges required.")
    )
)]
pub async fn audit_log(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<PaginatedResponse<AuditLog>>> {
    let (entries, total) = state.services.audit.search(&query).await?;

    Ok(Json(PaginatedResponse {
        items: entries,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: state.services.audit.per_page(),
    }))
}

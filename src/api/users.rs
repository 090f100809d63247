//! User administration endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::user::{UpdateActive, UpdateRole, User, UserQuery, UserSummary},
    AppState,
};

use super::{books::PaginatedResponse, AuthenticatedUser, ClientContext};

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = PaginatedResponse<UserSummary>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PaginatedResponse<UserSummary>>> {
    claims.require_manage_users()?;

    let (users, total) = state.services.users.search_users(&query).await?;

    Ok(Json(PaginatedResponse {
        items: users,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(20).clamp(1, 100),
    }))
}

/// Change a user's role
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Cannot change own role")
    )
)]
pub async fn change_role(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
    Json(body): Json<UpdateRole>,
) -> AppResult<Json<User>> {
    claims.require_manage_users()?;

    let user = state.services.users.change_role(&claims, id, body.role, &client).await?;
    Ok(Json(user))
}

/// Activate or deactivate a user
#[utoipa::path(
    put,
    path = "/users/{id}/active",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateActive,
    responses(
        (status = 200, description = "Account updated", body = User),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Cannot deactivate own account")
    )
)]
pub async fn set_active(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
    Json(body): Json<UpdateActive>,
) -> AppResult<Json<User>> {
    claims.require_manage_users()?;

    let user = state.services.users.set_active(&claims, id, body.is_active, &client).await?;
    Ok(Json(user))
}

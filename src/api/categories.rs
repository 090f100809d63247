//! Category endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::category::{Category, CreateCategory},
    AppState,
};

use super::{AuthenticatedUser, ClientContext};

/// List categories with book counts
#[utoipa::path(
    get,
    path = "/categories",
    tag = "books",
    responses((status = 200, description = "All categories", body = Vec<Category>))
)]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.services.catalog.list_categories().await?))
}

/// Create a category; the slug is derived from the name
#[utoipa::path(
    post,
    path = "/categories",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Librarian privileges required"),
        (status = 409, description = "Name or slug already used")
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Json(category): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    claims.require_manage_books()?;

    let created = state.services.catalog.create_category(&claims, category, &client).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

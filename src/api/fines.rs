//! Fine endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::fine::{Fine, PayFine, WaiveFine},
    AppState,
};

use super::{AuthenticatedUser, ClientContext};

/// List the caller's fines
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fines, newest first", body = Vec<Fine>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Fine>>> {
    Ok(Json(state.services.fines.list_for_user(claims.user_id).await?))
}

/// Record payment of a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Fine ID")),
    request_body = PayFine,
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 403, description = "Librarian privileges required"),
        (status = 404, description = "Fine not found"),
        (status = 422, description = "Fine is not pending")
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
    body: Bytes,
) -> AppResult<Json<Fine>> {
    claims.require_manage_books()?;

    let payment = PayFine::from_body(&body)?;
    let fine = state.services.fines.pay(&claims, id, payment, &client).await?;
    Ok(Json(fine))
}

/// Waive a fine
#[utoipa::path(
    post,
    path = "/fines/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Fine ID")),
    request_body = WaiveFine,
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 403, description = "Librarian privileges required"),
        (status = 404, description = "Fine not found"),
        (status = 422, description = "Fine is not pending")
    )
)]
pub async fn waive_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
    Json(waiver): Json<WaiveFine>,
) -> AppResult<Json<Fine>> {
    claims.require_manage_books()?;

    let fine = state.services.fines.waive(&claims, id, waiver, &client).await?;
    Ok(Json(fine))
}

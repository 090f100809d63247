//! Borrowing, returns and reservations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrow::{BorrowReceipt, MyBooks, ReturnReceipt},
        reservation::{Reservation, ReservationReceipt},
    },
    AppState,
};

use super::{AuthenticatedUser, ClientContext};

/// Borrow a copy of a book
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Book borrowed", body = BorrowReceipt),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already borrowed by the caller"),
        (status = 422, description = "Borrow limit reached or no copy available")
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<BorrowReceipt>)> {
    let receipt = state.services.circulation.borrow(&claims, id, &client).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No open borrow record with this ID for the caller")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ReturnReceipt>> {
    let receipt = state.services.circulation.return_book(&claims, id, &client).await?;
    Ok(Json(receipt))
}

/// The caller's loans, reservations and pending fines
#[utoipa::path(
    get,
    path = "/my-books",
    tag = "circulation",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Member shelf", body = MyBooks),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MyBooks>> {
    Ok(Json(state.services.circulation.my_books(&claims).await?))
}

/// Reserve a book
#[utoipa::path(
    post,
    path = "/books/{id}/reserve",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Reservation queued", body = ReservationReceipt),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already reserved by the caller")
    )
)]
pub async fn reserve_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<ReservationReceipt>)> {
    let receipt = state.services.circulation.reserve(&claims, id, &client).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Cancel one of the caller's reservations
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation is no longer active")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ClientContext(client): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Reservation>> {
    let cancelled = state
        .services
        .circulation
        .cancel_reservation(&claims, id, &client)
        .await?;
    Ok(Json(cancelled))
}

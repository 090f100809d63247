//! Circulation SQL against a real database
//!
//! Each test gets a fresh database with the migrations applied. Needs a
//! PostgreSQL server at `DATABASE_URL`; run with `cargo test --test database_tests -- --ignored`.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use libris_server::{
    config::AppConfig,
    models::{audit::ClientInfo, book::UpdateBook, reservation::ReservationStatus, user::LoginRequest},
    repository::{
        borrows::{LendingRules, ReturnRules},
        Repository,
    },
    services::{redis::RedisService, Services},
    AppError,
};

fn lending() -> LendingRules {
    LendingRules {
        max_books_per_user: 2,
        borrow_period_days: 14,
    }
}

fn returns() -> ReturnRules {
    ReturnRules {
        fine_per_day: Decimal::new(50, 2),
        hold_days: 3,
    }
}

async fn member(pool: &PgPool, email: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (email, password) VALUES ($1, 'unusable') RETURNING id")
        .bind(email)
        .fetch_one(pool)
        .await
        .expect("insert user")
}

async fn book(pool: &PgPool, isbn: &str, copies: i32) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO books (title, author, isbn, total_copies, available_copies)
        VALUES ('Dune', 'Frank Herbert', $1, $2, $2)
        RETURNING id
        "#,
    )
    .bind(isbn)
    .bind(copies)
    .fetch_one(pool)
    .await
    .expect("insert book")
}

async fn queue(pool: &PgPool, book_id: i64) -> Vec<(i64, i32)> {
    sqlx::query_as(
        "SELECT user_id, queue_position FROM reservations WHERE book_id = $1 AND status = 'PENDING' ORDER BY queue_position",
    )
    .bind(book_id)
    .fetch_all(pool)
    .await
    .expect("queue")
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn cancelling_a_pending_reservation_closes_the_gap(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let book_id = book(&pool, "9780000000001", 1).await;
    let a = member(&pool, "a@example.org").await;
    let b = member(&pool, "b@example.org").await;
    let c = member(&pool, "c@example.org").await;

    for user in [a, b, c] {
        repo.reservations.create(user, book_id).await.unwrap();
    }
    assert_eq!(queue(&pool, book_id).await, vec![(a, 1), (b, 2), (c, 3)]);

    let (b_reservation, _) = sqlx::query_as::<_, (i64, i32)>(
        "SELECT id, queue_position FROM reservations WHERE user_id = $1",
    )
    .bind(b)
    .fetch_one(&pool)
    .await
    .unwrap();

    let (cancelled, promoted) = repo
        .reservations
        .cancel(b_reservation, b, Utc::now(), 3)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert!(promoted.is_none());
    assert_eq!(queue(&pool, book_id).await, vec![(a, 1), (c, 2)]);

    // A second reservation by the same member is refused
    let again = repo.reservations.create(a, book_id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn return_hands_the_copy_to_the_head_of_the_queue(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let book_id = book(&pool, "9780000000002", 1).await;
    let lender = member(&pool, "lender@example.org").await;
    let first = member(&pool, "first@example.org").await;
    let second = member(&pool, "second@example.org").await;
    let now = Utc::now();

    let (record, _) = repo.borrows.borrow(lender, book_id, lending(), now).await.unwrap();
    repo.reservations.create(first, book_id).await.unwrap();
    repo.reservations.create(second, book_id).await.unwrap();

    let outcome = repo
        .borrows
        .return_record(record.id, lender, None, returns(), now)
        .await
        .unwrap();
    assert_eq!(outcome.book.available_copies, 1);
    assert!(outcome.fine.is_none());

    let promoted = outcome.promoted.expect("head of queue promoted");
    assert_eq!(promoted.user_id, first);
    assert_eq!(promoted.status, ReservationStatus::Ready);
    assert!(promoted.expiry_date.is_some());
    assert_eq!(queue(&pool, book_id).await, vec![(second, 1)]);

    // The shelf copy is held for the first member
    let blocked = repo.borrows.borrow(second, book_id, lending(), now).await;
    assert!(matches!(blocked, Err(AppError::NotAvailable(_))));

    let (_, book) = repo.borrows.borrow(first, book_id, lending(), now).await.unwrap();
    assert_eq!(book.available_copies, 0);
    let status: ReservationStatus = sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1")
        .bind(promoted.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, ReservationStatus::Fulfilled);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn ready_hold_passes_on_when_cancelled_or_lapsed(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let book_id = book(&pool, "9780000000003", 1).await;
    let lender = member(&pool, "lender@example.org").await;
    let first = member(&pool, "first@example.org").await;
    let second = member(&pool, "second@example.org").await;
    let third = member(&pool, "third@example.org").await;
    let now = Utc::now();

    let (record, _) = repo.borrows.borrow(lender, book_id, lending(), now).await.unwrap();
    for user in [first, second, third] {
        repo.reservations.create(user, book_id).await.unwrap();
    }
    let ready = repo
        .borrows
        .return_record(record.id, lender, None, returns(), now)
        .await
        .unwrap()
        .promoted
        .expect("first promoted");

    let (_, promoted) = repo.reservations.cancel(ready.id, first, now, 3).await.unwrap();
    let promoted = promoted.expect("second promoted");
    assert_eq!(promoted.user_id, second);
    assert_eq!(promoted.status, ReservationStatus::Ready);

    // Nothing lapses inside the pickup window
    assert!(repo.reservations.expire_holds(now, 3).await.unwrap().is_empty());

    let lapsed = repo
        .reservations
        .expire_holds(now + Duration::days(4), 3)
        .await
        .unwrap();
    assert_eq!(lapsed.len(), 1);
    assert_eq!(lapsed[0].expired.user_id, second);
    assert_eq!(lapsed[0].expired.status, ReservationStatus::Expired);
    let next = lapsed[0].promoted.as_ref().expect("third promoted");
    assert_eq!(next.user_id, third);
    assert!(queue(&pool, book_id).await.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn late_return_is_flagged_and_fined(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let book_id = book(&pool, "9780000000004", 1).await;
    let reader = member(&pool, "reader@example.org").await;
    let now = Utc::now();

    let (record, _) = repo
        .borrows
        .borrow(reader, book_id, lending(), now - Duration::days(20))
        .await
        .unwrap();

    assert_eq!(repo.borrows.mark_overdue(now).await.unwrap(), 1);
    assert_eq!(repo.borrows.mark_overdue(now).await.unwrap(), 0);

    let outcome = repo
        .borrows
        .return_record(record.id, reader, None, returns(), now)
        .await
        .unwrap();
    let fine = outcome.fine.expect("fine for six late days");
    assert_eq!(fine.amount, Decimal::new(300, 2));
    assert_eq!(fine.user_id, reader);

    // The record is closed; a second return finds nothing open
    let again = repo
        .borrows
        .return_record(record.id, reader, None, returns(), now)
        .await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn loan_limit_and_duplicates_are_enforced(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let reader = member(&pool, "reader@example.org").await;
    let first = book(&pool, "9780000000005", 2).await;
    let second = book(&pool, "9780000000006", 1).await;
    let third = book(&pool, "9780000000007", 1).await;
    let now = Utc::now();

    repo.borrows.borrow(reader, first, lending(), now).await.unwrap();
    let duplicate = repo.borrows.borrow(reader, first, lending(), now).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    repo.borrows.borrow(reader, second, lending(), now).await.unwrap();
    let over_limit = repo.borrows.borrow(reader, third, lending(), now).await;
    assert!(matches!(over_limit, Err(AppError::BusinessRule(_))));

    let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE user_id = $1")
        .bind(reader)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(open, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn stock_update_keeps_copies_on_loan(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let book_id = book(&pool, "9780000000008", 2).await;
    let reader = member(&pool, "reader@example.org").await;
    repo.borrows.borrow(reader, book_id, lending(), Utc::now()).await.unwrap();

    let shrink = UpdateBook {
        total_copies: Some(0),
        ..Default::default()
    };
    let refused = repo.books.update(book_id, &shrink).await;
    assert!(matches!(refused, Err(AppError::Validation(_))));

    let grow = UpdateBook {
        total_copies: Some(4),
        ..Default::default()
    };
    let book = repo.books.update(book_id, &grow).await.unwrap();
    assert_eq!(book.total_copies, 4);
    assert_eq!(book.available_copies, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn malformed_login_form_is_audited(pool: PgPool) {
    let config = AppConfig::default();
    // Form errors are caught before Redis is consulted
    let redis = RedisService::new("redis://127.0.0.1:1").unwrap();
    let services = Services::new(Repository::new(pool.clone()), &config, redis);

    let request = LoginRequest {
        email: "nobody".to_string(),
        password: String::new(),
    };
    let client = ClientInfo::new(Some("198.51.100.7".to_string()), "curl/8.0");
    let result = services.users.login(&request, &client).await;
    assert!(matches!(result, Err(AppError::Fields(_))));

    let (details, ip): (String, Option<String>) =
        sqlx::query_as("SELECT details, ip_address FROM audit_logs WHERE action = 'FAILED_LOGIN'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(details.contains("nobody"));
    assert_eq!(ip.as_deref(), Some("198.51.100.7"));
}

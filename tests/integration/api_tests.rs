//! API integration tests against a running server
//!
//! Start the server with a bootstrap admin (`LIBRIS_AUTH__BOOTSTRAP_ADMIN_EMAIL`,
//! `LIBRIS_AUTH__BOOTSTRAP_ADMIN_PASSWORD`) and rate limiting disabled, then run
//! `cargo test --test integration -- --ignored`.

use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("LIBRIS_AUTH__BOOTSTRAP_ADMIN_EMAIL").unwrap_or_else(|_| "admin@libris.local".into()),
        std::env::var("LIBRIS_AUTH__BOOTSTRAP_ADMIN_PASSWORD").unwrap_or_else(|_| "Admin#Passw0rd!".into()),
    )
}

async fn login(client: &Client, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a fresh student and return (email, token)
async fn register_student(client: &Client) -> (String, String) {
    let email = format!("student-{}@example.org", Uuid::new_v4().simple());
    let password = "Correct#Horse#Battery9";

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": email,
            "first_name": "Grace",
            "last_name": "Hopper",
            "password1": password,
            "password2": password
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let token = login(client, &email, password).await;
    (email, token)
}

async fn create_book(client: &Client, admin_token: &str, copies: i32) -> i64 {
    let isbn: String = format!("978{:010}", Uuid::new_v4().as_u128() % 10_000_000_000);
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin_token)
        .json(&json!({
            "title": "Integration Testing in Practice",
            "author": "A. Tester",
            "isbn": isbn,
            "total_copies": copies
        }))
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().expect("book id")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": "nobody@example.org", "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invalid email or password.");
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return() {
    let client = Client::new();
    let (email, password) = admin_credentials();
    let admin = login(&client, &email, &password).await;
    let (_, student) = register_student(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt: Value = response.json().await.unwrap();
    let record_id = receipt["record"]["id"].as_i64().unwrap();

    // Last copy is out
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .post(format!("{}/borrows/{}/return", BASE_URL, record_id))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let returned: Value = response.json().await.unwrap();
    assert_eq!(returned["record"]["status"], "RETURNED");
    assert!(returned["fine"].is_null());

    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(book["available_copies"], 1);
    assert_eq!(book["is_available"], true);
}

#[tokio::test]
#[ignore]
async fn test_reservation_queue() {
    let client = Client::new();
    let (email, password) = admin_credentials();
    let admin = login(&client, &email, &password).await;
    let (_, first) = register_student(&client).await;
    let (_, second) = register_student(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let mut positions = Vec::new();
    for token in [&first, &second] {
        let response = client
            .post(format!("{}/books/{}/reserve", BASE_URL, book_id))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let receipt: Value = response.json().await.unwrap();
        positions.push(receipt["reservation"]["queue_position"].as_i64().unwrap());
    }
    assert_eq!(positions, vec![1, 2]);

    let response = client
        .post(format!("{}/books/{}/reserve", BASE_URL, book_id))
        .bearer_auth(&first)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_profile_picture_rejects_non_image() {
    let client = Client::new();
    let (_, student) = register_student(&client).await;

    let form = multipart::Form::new().part(
        "profile_picture",
        multipart::Part::bytes(b"%PDF-1.4 not an image".to_vec()).file_name("avatar.png"),
    );

    let response = client
        .post(format!("{}/auth/profile/picture", BASE_URL))
        .bearer_auth(&student)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_student_cannot_read_audit_log() {
    let client = Client::new();
    let (_, student) = register_student(&client).await;

    let response = client
        .get(format!("{}/auth/audit-log", BASE_URL))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_logout_revokes_token() {
    let client = Client::new();
    let (_, student) = register_student(&client).await;

    let response = client
        .post(format!("{}/auth/logout", BASE_URL))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/auth/profile", BASE_URL))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

//! Smoke tests against a running server
//!
//! Start the server with the default configuration, then run
//! `cargo test --test live_server -- --ignored`.

use bibliotheca_server::models::{Identity, Role, UserClaims};
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";
const JWT_SECRET: &str = "change-this-secret-in-production";

fn token(role: Role) -> String {
    let identity = Identity {
        id: Uuid::new_v4(),
        name: "Smoke Test".to_string(),
        email: "smoke@example.org".to_string(),
        role,
    };
    UserClaims::new(&identity, 1)
        .create_token(JWT_SECRET)
        .expect("Failed to sign token")
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
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return() {
    let client = Client::new();
    let admin = token(Role::Admin);
    let member = token(Role::User);

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Smoke Test Book",
            "author": "Test Author",
            "price": 25,
            "quantity": 1
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    let book_id = body["id"].as_str().expect("No book ID").to_string();

    let response = client
        .post(format!("{}/borrows/books/{}", BASE_URL, book_id))
        .bearer_auth(&member)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .put(format!("{}/borrows/books/{}/return", BASE_URL, book_id))
        .bearer_auth(&member)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    // Cleanup
    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 204);
}

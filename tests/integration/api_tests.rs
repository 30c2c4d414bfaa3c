//! HTTP surface tests against the in-memory store

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use circulation_desk::models::PatronClaims;
use serde_json::json;
use uuid::Uuid;

use crate::common::{test_config, TestApp, SECRET};

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.request(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_welcome_and_openapi() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("Welcome"));

    let (status, body) = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/book/books"].is_object());
}

#[tokio::test]
async fn test_borrow_return_scenario() {
    let app = TestApp::new();
    let (a_id, a_token) = app.patron("A").await;
    let (b_id, b_token) = app.patron("B").await;
    let book_id = app.book(&a_token, "111", 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/book/borrow/{}", book_id),
            Some(&a_token),
            Some(json!({ "patronId": a_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["bookId"], json!(book_id));
    assert_eq!(app.available_copies(book_id).await, 0);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/book/borrow/{}", book_id),
            Some(&b_token),
            Some(json!({ "patronId": b_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NotAvailable");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/book/return/{}", book_id),
            Some(&a_token),
            Some(json!({ "patronId": a_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.available_copies(book_id).await, 1);

    // The body is optional: the token names the patron
    let (status, body) = app
        .request(Method::POST, &format!("/book/borrow/{}", book_id), Some(&b_token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.available_copies(book_id).await, 0);
}

#[tokio::test]
async fn test_borrowed_listing_and_profile() {
    let app = TestApp::new();
    let (_, token) = app.patron("Reader").await;
    let book_id = app.book(&token, "222", 2).await;

    app.request(Method::POST, &format!("/book/borrow/{}", book_id), Some(&token), None)
        .await;

    let (status, body) = app
        .request(Method::GET, "/user/me/borrowed", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["bookId"], json!(book_id));
    assert_eq!(items[0]["overdue"], false);

    let (status, body) = app.request(Method::GET, "/user/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "reader@example.com");
    assert!(body.get("passwordHash").is_none());
    assert_eq!(body["borrowedItems"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_mismatched_patron_id_is_unauthorized() {
    let app = TestApp::new();
    let (_, a_token) = app.patron("A").await;
    let (b_id, _) = app.patron("B").await;
    let book_id = app.book(&a_token, "333", 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/book/borrow/{}", book_id),
            Some(&a_token),
            Some(json!({ "patronId": b_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
    assert_eq!(app.available_copies(book_id).await, 1);
}

#[tokio::test]
async fn test_malformed_lending_body_is_rejected() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "334", 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/book/borrow/{}", book_id),
            Some(&token),
            Some(json!({ "patronId": "junk" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(app.available_copies(book_id).await, 1);

    let raw = Request::builder()
        .method(Method::POST)
        .uri(format!("/book/borrow/{}", book_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = app.send(raw).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.available_copies(book_id).await, 1);

    app.request(Method::POST, &format!("/book/borrow/{}", book_id), Some(&token), None)
        .await;
    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/book/return/{}", book_id),
            Some(&token),
            Some(json!({ "userID": 42 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.available_copies(book_id).await, 0);
}

#[tokio::test]
async fn test_ledger_rule_failures_map_to_statuses() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "444", 5).await;
    let borrow = format!("/book/borrow/{}", book_id);
    let give_back = format!("/book/return/{}", book_id);

    let (status, body) = app.request(Method::DELETE, &give_back, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NotBorrowed");

    let (status, _) = app.request(Method::POST, &borrow, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request(Method::POST, &borrow, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duplicate");

    let (status, body) = app
        .request(Method::POST, &format!("/book/borrow/{}", Uuid::new_v4()), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Book not found.");

    let (status, _) = app
        .request(Method::POST, "/book/borrow/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fourth_borrow_hits_limit() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;

    for isbn in ["501", "502", "503"] {
        let book_id = app.book(&token, isbn, 1).await;
        let (status, _) = app
            .request(Method::POST, &format!("/book/borrow/{}", book_id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let fourth = app.book(&token, "504", 1).await;
    let (status, body) = app
        .request(Method::POST, &format!("/book/borrow/{}", fourth), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MaxBorrowsReached");
    assert_eq!(app.available_copies(fourth).await, 1);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "601", 1).await;

    for (method, uri) in [
        (Method::POST, format!("/book/borrow/{}", book_id)),
        (Method::DELETE, format!("/book/return/{}", book_id)),
        (Method::GET, "/user/me".to_string()),
        (Method::GET, "/user/me/borrowed".to_string()),
    ] {
        let (status, body) = app.request(method, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "NotAuthorized");
    }

    let (status, _) = app
        .request(
            Method::POST,
            "/book/addbook",
            Some("garbage"),
            Some(json!({"ISBN": "9", "title": "t", "author": "a", "publishedYear": 1, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new();
    let (patron_id, _) = app.patron("A").await;

    let issued = Utc::now().timestamp() - 25 * 3600;
    let expired = PatronClaims::new(patron_id, issued, 24)
        .create_token(SECRET)
        .unwrap();

    let (status, body) = app.request(Method::GET, "/user/me", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::new();
    app.patron("A").await;

    let (wrong_status, wrong) = app
        .request(
            Method::POST,
            "/user/login",
            None,
            Some(json!({ "email": "a@example.com", "password": "nope" })),
        )
        .await;
    let (unknown_status, unknown) = app
        .request(
            Method::POST,
            "/user/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": "nope" })),
        )
        .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn test_duplicates_are_bad_requests() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    app.book(&token, "701", 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/book/addbook",
            Some(&token),
            Some(json!({"ISBN": "701", "title": "t", "author": "a", "publishedYear": 1, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duplicate");

    let (status, body) = app
        .request(
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "name": "A", "email": "A@Example.com", "password": "secret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duplicate");
}

#[tokio::test]
async fn test_invalid_bodies_are_bad_requests() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "name": "A", "email": "not-an-email", "password": "secret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/user/login")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_pagination_boundary() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    for isbn in ["801", "802", "803"] {
        app.book(&token, isbn, 1).await;
    }

    let (status, body) = app
        .request(Method::GET, "/book/books?page=1&limit=2", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["ISBN"], "801");
    assert_eq!(items[1]["ISBN"], "802");
    assert_eq!(body["total"], 3);
    assert_eq!(body["pagination"]["next"], json!({ "page": 2, "limit": 2 }));
    assert!(body["pagination"].get("prev").is_none());

    let (_, body) = app
        .request(Method::GET, "/book/books?page=2&limit=2", None, None)
        .await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["ISBN"], "803");
    assert_eq!(body["pagination"]["prev"], json!({ "page": 1, "limit": 2 }));
    assert!(body["pagination"].get("next").is_none());

    // Junk falls back to the defaults
    let (status, body) = app
        .request(Method::GET, "/book/books?page=abc&limit=-4", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_applies_zero_quantity() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "901", 4).await;

    let (status, body) = app
        .request(
            Method::PATCH,
            "/book/update/901",
            None,
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["book"]["availableCopies"], 0);
    assert_eq!(body["book"]["title"], "Title 901");
    assert_eq!(app.available_copies(book_id).await, 0);

    let (status, _) = app
        .request(Method::PATCH, "/book/update/000", None, Some(json!({ "title": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_book() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "950", 1).await;

    let (status, _) = app.request(Method::DELETE, "/book/delete/950", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::GET, &format!("/book/{}", book_id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request(Method::DELETE, "/book/delete/950", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchEntity");
}

#[tokio::test]
async fn test_deleted_book_can_still_be_returned() {
    let app = TestApp::new();
    let (_, token) = app.patron("A").await;
    let book_id = app.book(&token, "960", 1).await;

    app.request(Method::POST, &format!("/book/borrow/{}", book_id), Some(&token), None)
        .await;
    app.request(Method::DELETE, "/book/delete/960", None, None).await;

    let (status, _) = app
        .request(Method::DELETE, &format!("/book/return/{}", book_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .request(Method::GET, "/user/me/borrowed", Some(&token), None)
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.refill_period_secs = 60;
    config.rate_limit.burst_size = 3;
    config.rate_limit.trust_forwarded = true;
    let app = TestApp::with_config(config);

    let from = |addr: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", addr)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..3 {
        let (status, _) = app.send(from("198.51.100.1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.send(from("198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "TooManyRequests");

    let (status, _) = app.send(from("198.51.100.2")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_header_shares_the_peer_bucket() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.refill_period_secs = 60;
    config.rate_limit.burst_size = 1;
    let app = TestApp::with_config(config);

    let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    let from = |peer: SocketAddr, forwarded: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", forwarded)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = app.send(from(peer, "198.51.100.1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(from(peer, "198.51.100.2")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "TooManyRequests");

    let other: SocketAddr = "192.0.2.11:40000".parse().unwrap();
    let (status, _) = app.send(from(other, "198.51.100.2")).await;
    assert_eq!(status, StatusCode::OK);
}

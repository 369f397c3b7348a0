use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;

use codifeed::api::{self, AppState};
use codifeed::auth::{AuthService, RequireAuth};
use codifeed::store::Store;

/// Helper macro to build the service under test with the auth middleware
macro_rules! test_app {
    ($store:expr, $auth:expr) => {
        test::init_service(
            App::new()
                .wrap(RequireAuth::new($auth.clone()))
                .app_data(web::Data::new(AppState {
                    store: $store.clone(),
                    auth_service: $auth.clone(),
                }))
                .configure(api::configure_routes),
        )
        .await
    };
}

/// Helper macro to sign up a user and get their access token
macro_rules! signup_and_get_token {
    ($app:expr, $username:expr, $name:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/signup")
            .set_json(json!({
                "email": format!("{}@example.com", $username),
                "username": $username,
                "name": $name,
                "password": "password123"
            }))
            .to_request();

        let resp: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        assert_eq!(resp["success"], true, "signup failed: {}", resp);
        resp["data"]["access_token"].as_str().unwrap().to_string()
    }};
}

fn test_state() -> (Arc<Store>, Arc<AuthService>) {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth = Arc::new(AuthService::new("test_secret".to_string()));
    (store, auth)
}

// ==================== Auth Tests ====================

#[actix_web::test]
async fn test_signup_login_and_me() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);

    let token = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["username"], "ada");
    // Secrets never serialize
    assert!(resp["data"].get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ada@example.com", "password": "password123" }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["success"], true);
    assert!(resp["data"]["access_token"].as_str().is_some());
    assert!(resp["data"]["refresh_token"].as_str().is_some());
}

#[actix_web::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let _ = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ada@example.com", "password": "nope" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_duplicate_signup_is_bad_request() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let _ = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::post()
        .uri("/api/auth/signup")
        .set_json(json!({
            "email": "ada@example.com",
            "username": "ada2",
            "name": "Ada Again",
            "password": "password123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_refresh_issues_new_pair() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);

    let req = test::TestRequest::post()
        .uri("/api/auth/signup")
        .set_json(json!({
            "email": "ada@example.com",
            "username": "ada",
            "name": "Ada Lovelace",
            "password": "password123"
        }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let refresh_token = resp["data"]["refresh_token"].as_str().unwrap().to_string();
    let access_token = resp["data"]["access_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/auth/refresh")
        .set_json(json!({ "refresh_token": refresh_token }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["success"], true);
    assert!(resp["data"]["access_token"].as_str().is_some());

    // An access token must not pass as a refresh token
    let req = test::TestRequest::post()
        .uri("/api/auth/refresh")
        .set_json(json!({ "refresh_token": access_token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_protected_routes_require_auth() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);

    let req = test::TestRequest::get().uri("/api/users/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(("Authorization", "Bearer not-a-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

// ==================== Follow Graph Tests ====================

#[actix_web::test]
async fn test_follow_unfollow_flow() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let linus = signup_and_get_token!(app, "linus", "Linus Torvalds");
    let _ = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::post()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", linus)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["followers_count"], 1);
    assert_eq!(resp["data"]["is_following"], true);

    // Following twice is a no-op, not an error
    let req = test::TestRequest::post()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", linus)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["followers_count"], 1);

    let req = test::TestRequest::delete()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", linus)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["followers_count"], 0);
    assert_eq!(resp["data"]["is_following"], false);

    // Unfollowing again is a caller error
    let req = test::TestRequest::delete()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", linus)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_self_follow_is_bad_request() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let token = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::post()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_follow_unknown_user_is_not_found() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let token = signup_and_get_token!(app, "ada", "Ada Lovelace");

    let req = test::TestRequest::post()
        .uri("/api/users/ghost/follow")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_followers_listing_with_pagination() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let viewer = signup_and_get_token!(app, "ada", "Ada Lovelace");
    for i in 0..3 {
        let follower = signup_and_get_token!(app, &format!("fan{}", i), &format!("Fan {}", i));
        let req = test::TestRequest::post()
            .uri("/api/users/ada/follow")
            .insert_header(("Authorization", format!("Bearer {}", follower)))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get()
        .uri("/api/users/ada/followers?page=1&per_page=2")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["data"].as_array().unwrap().len(), 2);
    assert_eq!(resp["data"]["meta"]["total_count"], 3);
    assert_eq!(resp["data"]["meta"]["has_more"], true);

    let req = test::TestRequest::get()
        .uri("/api/users/ada/followers?page=2&per_page=2")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["data"].as_array().unwrap().len(), 1);
    assert_eq!(resp["data"]["meta"]["has_more"], false);
}

#[actix_web::test]
async fn test_follow_flags_are_viewer_relative() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let ada = signup_and_get_token!(app, "ada", "Ada Lovelace");
    let linus = signup_and_get_token!(app, "linus", "Linus Torvalds");

    let req = test::TestRequest::post()
        .uri("/api/users/ada/follow")
        .insert_header(("Authorization", format!("Bearer {}", linus)))
        .to_request();
    test::call_service(&app, req).await;

    // From ada's side, linus follows her but she does not follow back
    let req = test::TestRequest::get()
        .uri("/api/users/linus")
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["is_following"], false);
    assert_eq!(resp["data"]["is_followed_by"], true);
}

// ==================== Search Tests ====================

#[actix_web::test]
async fn test_search_ranks_exact_above_prefix_above_fuzzy() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let viewer = signup_and_get_token!(app, "viewer", "The Viewer");
    let _ = signup_and_get_token!(app, "alicia", "Alicia Example");
    let _ = signup_and_get_token!(app, "alice", "Alice Example");
    let _ = signup_and_get_token!(app, "bob", "Bob Example");

    let req = test::TestRequest::get()
        .uri("/api/users/search?q=alice")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let results = resp["data"]["data"].as_array().unwrap();
    assert_eq!(results[0]["username"], "alice");

    let req = test::TestRequest::get()
        .uri("/api/users/search?q=ali")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let usernames: Vec<&str> = resp["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, vec!["alice", "alicia"]);
}

#[actix_web::test]
async fn test_search_blank_query_is_bad_request() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let viewer = signup_and_get_token!(app, "viewer", "The Viewer");

    let req = test::TestRequest::get()
        .uri("/api/users/search?q=%20%20")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

// ==================== Account Deletion ====================

#[actix_web::test]
async fn test_deleted_account_disappears_from_detail_and_search() {
    let (store, auth) = test_state();
    let app = test_app!(store, auth);
    let ada = signup_and_get_token!(app, "ada", "Ada Lovelace");
    let viewer = signup_and_get_token!(app, "viewer", "The Viewer");

    // Only the owner may delete the account
    let req = test::TestRequest::delete()
        .uri("/api/users/ada")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::delete()
        .uri("/api/users/ada")
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/users/ada")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get()
        .uri("/api/users/search?q=ada")
        .insert_header(("Authorization", format!("Bearer {}", viewer)))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["meta"]["total_count"], 0);
}

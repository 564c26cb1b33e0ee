/// End-to-end account flow against PostgreSQL
///
/// Needs a database at `TEST_DATABASE_URL`.
///
/// Run with: cargo test -p accord-api --test account_flow_tests -- --ignored

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};

async fn signup(ctx: &TestContext, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        &ctx.app,
        json_request(
            "POST",
            "/v1/auth/signup",
            None,
            json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": email,
                "password": password,
                "confirm_password": password
            }),
        ),
    )
    .await;
    (status, body)
}

async fn login(ctx: &TestContext, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        &ctx.app,
        json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({ "email": email, "password": password }),
        ),
    )
    .await;
    (status, body)
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_full_account_lifecycle() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email();
    let password = "analytical";

    // signup
    let (status, body) = signup(&ctx, &email, password).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["verification_email_sent"], true);
    assert_eq!(body["user"]["is_verified"], false);
    assert!(body["user"].get("password_hash").is_none());

    // duplicate email, different case
    let (status, _) = signup(&ctx, &email.to_uppercase(), password).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // verify
    let verification = ctx.mailer.verification_token(&email).unwrap();
    let (status, _, body) = send(
        &ctx.app,
        empty_request("GET", &format!("/v1/auth/verify?token={}", verification), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    // login
    let (status, _) = login(&ctx, &email, "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = login(&ctx, &email, password).await;
    assert_eq!(status, StatusCode::OK);
    let auth = format!("Bearer {}", body["access_token"].as_str().unwrap());

    // issue a key and use it
    let (status, _, body) = send(
        &ctx.app,
        json_request("POST", "/v1/keys", Some(&auth), json!({ "description": "Nightly export" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("acrd_"));

    let request = axum::http::Request::builder()
        .uri("/v1/subscription")
        .header("x-api-key", &key)
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, body) = send(&ctx.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription_type"], "free");
    assert_eq!(body["usage_limit"], 100);

    // API keys cannot manage keys
    let request = axum::http::Request::builder()
        .uri("/v1/keys")
        .header("x-api-key", &key)
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, _) = send(&ctx.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // profile
    let (status, _, body) = send(&ctx.app, empty_request("GET", "/v1/users/me", Some(&auth))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], email.as_str());
    assert_eq!(body["keys"].as_array().unwrap().len(), 1);
    assert!(body["keys"][0].get("key_hash").is_none());

    // admin routes are closed to ordinary users
    let (status, _, _) = send(
        &ctx.app,
        empty_request("GET", "/v1/admin/users", Some(&auth)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // delete the account
    let (status, _, body) = send(&ctx.app, empty_request("DELETE", "/v1/users/me", Some(&auth))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["deleted"], true);
    assert_eq!(body["subscriptions_deleted"], 1);
    assert_eq!(body["keys_deleted"], 1);
    assert_eq!(body["mode"], "transactional");

    let (remaining,): (i64,) = sqlx::query_as(
        r#"
        SELECT (SELECT COUNT(*) FROM users WHERE LOWER(email) = LOWER($1))
             + (SELECT COUNT(*) FROM api_keys WHERE key_prefix = $2)
        "#,
    )
    .bind(&email)
    .bind(&key[..10])
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    assert_eq!(remaining, 0);

    // the account is gone everywhere
    let (status, _) = login(&ctx, &email, password).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&ctx.app, empty_request("DELETE", "/v1/users/me", Some(&auth))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_password_change() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email();

    let (status, _) = signup(&ctx, &email, "first-password").await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = login(&ctx, &email, "first-password").await;
    let auth = format!("Bearer {}", body["access_token"].as_str().unwrap());

    let (status, _, _) = send(
        &ctx.app,
        json_request(
            "PUT",
            "/v1/users/me/password",
            Some(&auth),
            json!({
                "current_password": "not-the-password",
                "new_password": "second-password",
                "confirm_password": "second-password"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &ctx.app,
        json_request(
            "PUT",
            "/v1/users/me/password",
            Some(&auth),
            json!({
                "current_password": "first-password",
                "new_password": "second-password",
                "confirm_password": "second-password"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(login(&ctx, &email, "first-password").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(login(&ctx, &email, "second-password").await.0, StatusCode::OK);

    send(&ctx.app, empty_request("DELETE", "/v1/users/me", Some(&auth))).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_admin_grant() {
    let ctx = TestContext::new().await.unwrap();
    let admin_email = TestContext::unique_email();
    let user_email = TestContext::unique_email();

    signup(&ctx, &admin_email, "admin-password").await;
    signup(&ctx, &user_email, "user-password").await;

    // bootstrap the first administrator directly
    accord_shared::models::user::User::grant_admin(&ctx.db, &admin_email)
        .await
        .unwrap()
        .unwrap();

    let (_, body) = login(&ctx, &admin_email, "admin-password").await;
    let auth = format!("Bearer {}", body["access_token"].as_str().unwrap());

    let grant = |email: String| json!({ "email": email });

    let (status, _, body) = send(
        &ctx.app,
        json_request("POST", "/v1/admin/grant", Some(&auth), grant(user_email.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["is_admin"], true);

    let (status, _, _) = send(
        &ctx.app,
        json_request("POST", "/v1/admin/grant", Some(&auth), grant(user_email.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(
        &ctx.app,
        json_request(
            "POST",
            "/v1/admin/grant",
            Some(&auth),
            grant(TestContext::unique_email()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(
        &ctx.app,
        empty_request("GET", "/v1/admin/users?limit=1", Some(&auth)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
    assert!(body["total"].as_i64().unwrap() >= 2);

    for email in [admin_email, user_email] {
        let user = accord_shared::models::user::User::find_by_email(&ctx.db, &email)
            .await
            .unwrap()
            .unwrap();
        let auth = bearer(user.id);
        send(&ctx.app, empty_request("DELETE", "/v1/users/me", Some(&auth))).await;
    }
}

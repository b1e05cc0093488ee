// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth flow tests.
//!
//! These tests verify that frontend URLs survive the round trip through the
//! signed OAuth state parameter, and that the callback stores the user and
//! credential and hands a fresh credential to any sync waiting for consent.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use challenge_tracker::config::Config;
use challenge_tracker::db::{CredentialStore, UserStore};
use challenge_tracker::middleware::auth::verify_jwt;
use challenge_tracker::models::AccessCredential;
use challenge_tracker::routes::auth::verify_and_decode_state;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

async fn send(router: axum::Router, uri: &str) -> Response {
    router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without Location")
        .to_str()
        .unwrap()
        .to_string()
}

/// Extract a query parameter from a URL without decoding it.
fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// App whose Google endpoints point at `server`.
fn app_for(server: &MockServer) -> common::TestApp {
    let config = Config {
        google_token_url: format!("{}/token", server.uri()),
        google_userinfo_url: format!("{}/userinfo", server.uri()),
        ..Config::default()
    };
    common::create_test_app_with(config, Arc::new(common::StubProvider::default()))
}

async fn mount_google(server: &MockServer, refresh_token: Option<&str>) {
    let mut token = serde_json::json!({
        "access_token": "fresh-access",
        "expires_in": 3599,
        "token_type": "Bearer",
    });
    if let Some(refresh) = refresh_token {
        token["refresh_token"] = serde_json::json!(refresh);
    }

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": "google-123",
            "name": "Grace Hopper",
            "email": "grace@example.com",
        })))
        .mount(server)
        .await;
}

// ═══════════════════════════════════════════════════════════════════════════
// STATE PARAMETER
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_auth_start_state_roundtrip() {
    let app = common::create_test_app();

    let response = send(
        app.router,
        "/auth/google?redirect_uri=https%3A%2F%2Fpreview.example.com",
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let target = location(&response);
    assert!(target.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(target.contains("access_type=offline"));
    assert!(target.contains(&format!(
        "redirect_uri={}",
        urlencoding::encode("http://localhost:8080/auth/google/callback")
    )));

    let state = query_param(&target, "state").expect("state parameter");
    let decoded = verify_and_decode_state(&state, &Config::default().oauth_state_key);
    assert_eq!(decoded, Some("https://preview.example.com".to_string()));
}

#[tokio::test]
async fn test_auth_start_defaults_to_configured_frontend() {
    let app = common::create_test_app();

    let response = send(app.router, "/auth/google").await;
    let state = query_param(&location(&response), "state").unwrap();

    let decoded = verify_and_decode_state(&state, &Config::default().oauth_state_key);
    assert_eq!(decoded, Some("http://localhost:5173".to_string()));
}

#[tokio::test]
async fn test_callback_error_redirects_to_frontend() {
    let app = common::create_test_app();

    let response = send(
        app.router,
        "/auth/google/callback?error=access_denied&state=tampered",
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://localhost:5173?error=access_denied"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CALLBACK
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_callback_stores_user_and_credential() {
    let server = MockServer::start().await;
    mount_google(&server, Some("refresh-1")).await;
    let app = app_for(&server);

    let response = send(app.router, "/auth/google/callback?code=abc&state=").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let target = location(&response);
    assert!(target.starts_with("http://localhost:5173/callback?token="));
    let jwt = query_param(&target, "token").unwrap();
    assert_eq!(
        verify_jwt(&jwt, &Config::default().jwt_signing_key).as_deref(),
        Some("google-123")
    );

    let user = app.db.get_user("google-123").await.unwrap().unwrap();
    assert_eq!(user.name, "Grace Hopper");
    assert_eq!(user.email.as_deref(), Some("grace@example.com"));

    let credential = app.db.load_credential("google-123").await.unwrap().unwrap();
    assert_eq!(credential.token, "fresh-access");
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    assert!(credential.expires_at > Utc::now() + Duration::minutes(50));
}

#[tokio::test]
async fn test_callback_keeps_previous_refresh_token() {
    let server = MockServer::start().await;
    mount_google(&server, None).await;
    let app = app_for(&server);

    app.db
        .save_credential(
            "google-123",
            &AccessCredential {
                token: "old".to_string(),
                expires_at: Utc::now() - Duration::hours(1),
                refresh_token: Some("long-lived".to_string()),
            },
        )
        .await
        .unwrap();

    let response = send(app.router, "/auth/google/callback?code=abc&state=").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let credential = app.db.load_credential("google-123").await.unwrap().unwrap();
    assert_eq!(credential.token, "fresh-access");
    assert_eq!(credential.refresh_token.as_deref(), Some("long-lived"));
}

#[tokio::test]
async fn test_callback_wakes_waiting_consent() {
    let server = MockServer::start().await;
    mount_google(&server, Some("refresh-2")).await;
    let app = app_for(&server);

    // An open real-time connection lets a sync cycle wait for consent.
    let _subscription = app.state.hub.subscribe("google-123");
    let broker = app.state.consent.clone();
    let waiter = tokio::spawn(async move {
        broker
            .wait("google-123", std::time::Duration::from_secs(5))
            .await
    });

    while !app.state.consent.is_waiting("google-123") {
        tokio::task::yield_now().await;
    }

    let response = send(app.router, "/auth/google/callback?code=abc&state=").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let granted = waiter.await.unwrap().expect("consent should be granted");
    assert_eq!(granted.token, "fresh-access");
    assert_eq!(granted.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_callback_exchange_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("{\"error\":\"invalid_grant\"}"))
        .mount(&server)
        .await;
    let app = app_for(&server);

    let response = send(app.router, "/auth/google/callback?code=stale&state=").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.db.load_credential("google-123").await.unwrap().is_none());
}
